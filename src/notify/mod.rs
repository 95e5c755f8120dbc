// src/notify/mod.rs
//! Alert payloads and the messaging-sink contract.
//!
//! Platform-specific escaping belongs to the dispatcher, not the pipeline.

pub mod telegram;

use crate::analyze::Verdict;
use crate::poll::types::Category;

#[derive(Debug, Clone)]
pub struct Alert {
    pub category: Category,
    pub source_label: String,
    pub item_id: String,
    pub text: String,
    pub url: Option<String>,
    pub verdict: Verdict,
}

/// Render the alert body. Plain text; the dispatcher escapes it for its
/// platform.
pub fn format_alert(alert: &Alert) -> String {
    let header = match alert.category {
        Category::Social => format!("📣 @{}", alert.source_label),
        Category::News => format!("📰 {} news", alert.source_label),
    };
    let assets = if alert.verdict.assets.is_empty() {
        "—".to_string()
    } else {
        alert.verdict.assets.join(", ")
    };
    let mut body = format!(
        "{header}\n\n{}\n\nSentiment: {:?} ({}/10) | Impact: {:?} | Direction: {:?}\nAssets: {assets}",
        alert.text, alert.verdict.sentiment, alert.verdict.score, alert.verdict.impact,
        alert.verdict.direction,
    );
    if let Some(url) = &alert.url {
        let link_label = match alert.category {
            Category::Social => "View post",
            Category::News => "Read more",
        };
        body.push_str(&format!("\n{link_label}: {url}"));
    }
    body
}

#[async_trait::async_trait]
pub trait AlertDispatcher: Send + Sync {
    /// Deliver one formatted alert. `Ok(false)` means the sink refused it.
    async fn send(&self, text: &str) -> anyhow::Result<bool>;

    /// Startup connectivity check; a failure here aborts startup.
    async fn probe(&self) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{Direction, Impact, Sentiment};

    #[test]
    fn formatted_alert_carries_verdict_fields() {
        let alert = Alert {
            category: Category::Social,
            source_label: "elonmusk".into(),
            item_id: "1".into(),
            text: "Dogecoin to the moon".into(),
            url: Some("https://x.com/elonmusk/status/1".into()),
            verdict: Verdict {
                relevant: true,
                sentiment: Sentiment::Positive,
                score: 9,
                impact: Impact::High,
                direction: Direction::Bullish,
                assets: vec!["DOGE".into()],
            },
        };
        let out = format_alert(&alert);
        assert!(out.contains("@elonmusk"));
        assert!(out.contains("Dogecoin to the moon"));
        assert!(out.contains("(9/10)"));
        assert!(out.contains("DOGE"));
        assert!(out.contains("View post: https://x.com/elonmusk/status/1"));
    }

    #[test]
    fn empty_assets_render_as_dash() {
        let alert = Alert {
            category: Category::News,
            source_label: "crypto".into(),
            item_id: "2".into(),
            text: "Market roundup".into(),
            url: None,
            verdict: Verdict::default(),
        };
        let out = format_alert(&alert);
        assert!(out.contains("Assets: —"));
        // no dangling link line when the provider gave no url
        assert!(!out.contains("Read more"));
    }
}
