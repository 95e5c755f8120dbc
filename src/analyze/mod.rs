// src/analyze/mod.rs
//! Relevance verdicts and the analysis collaborator contract.
//!
//! The gateway must never propagate a parsing failure: malformed or empty
//! upstream output degrades to a default verdict (`relevant = false`), the
//! pipeline counts the error and moves on. Fail closed — a defaulted
//! verdict never produces an alert.

pub mod gateway;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Rate-limiter / breaker key for the analysis collaborator.
pub const SOURCE_ID: &str = "analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    pub sentiment: Sentiment,
    /// 0..=10
    pub score: u8,
    pub impact: Impact,
    pub direction: Direction,
    pub assets: Vec<String>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            relevant: false,
            sentiment: Sentiment::Neutral,
            score: 5,
            impact: Impact::Medium,
            direction: Direction::Neutral,
            assets: Vec::new(),
        }
    }
}

/// A verdict plus whether defaulting kicked in upstream.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub verdict: Verdict,
    /// True when the upstream output was missing/malformed and the verdict
    /// carries defaults. Counted as an error, not retried.
    pub degraded: bool,
}

impl Analysis {
    pub fn degraded() -> Self {
        Self {
            verdict: Verdict::default(),
            degraded: true,
        }
    }
}

/// External collaborator: scores item text for relevance.
#[async_trait::async_trait]
pub trait AnalysisGateway: Send + Sync {
    async fn analyze(&self, text: &str) -> Analysis;
}

/// Parse a model response into a verdict, leniently.
///
/// Handles ``` fences and JSON embedded in surrounding prose; every field
/// defaults individually, so a partial object still yields a full verdict.
/// Returns `None` only when no JSON object can be found at all.
pub fn parse_verdict(raw: &str) -> Option<Verdict> {
    let content = extract_json_block(raw)?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    let obj = value.as_object()?;

    let score = obj
        .get("score")
        .and_then(|v| v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .map(|f| f.round().clamp(0.0, 10.0) as u8)
        .unwrap_or(5);

    Some(Verdict {
        relevant: obj.get("relevant").and_then(|v| v.as_bool()).unwrap_or(false),
        sentiment: parse_enum_field(obj.get("sentiment")),
        score,
        impact: parse_enum_field(obj.get("impact")),
        direction: parse_direction(obj.get("direction")),
        assets: obj
            .get("assets")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

fn parse_enum_field<T: Default + serde::de::DeserializeOwned>(
    value: Option<&serde_json::Value>,
) -> T {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| serde_json::from_value(serde_json::Value::String(s.to_lowercase())).ok())
        .unwrap_or_default()
}

fn parse_direction(value: Option<&serde_json::Value>) -> Direction {
    // some upstream prompts misspell "neutral" as "neautral"; be lenient
    match value.and_then(|v| v.as_str()).map(str::to_lowercase).as_deref() {
        Some("bullish") => Direction::Bullish,
        Some("bearish") => Direction::Bearish,
        _ => Direction::Neutral,
    }
}

fn extract_json_block(raw: &str) -> Option<String> {
    let mut content = raw.trim().to_string();
    if content.is_empty() {
        return None;
    }
    if let Some(stripped) = content.strip_prefix("```json") {
        content = stripped.split("```").next().unwrap_or("").trim().to_string();
    } else if let Some(stripped) = content.strip_prefix("```") {
        content = stripped.split("```").next().unwrap_or("").trim().to_string();
    }
    if content.starts_with('{') && content.ends_with('}') {
        return Some(content);
    }
    static RE_JSON: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_JSON.get_or_init(|| regex::Regex::new(r"(?s)(\{.*\})").unwrap());
    re.captures(&content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
