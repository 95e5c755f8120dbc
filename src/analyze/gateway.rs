// src/analyze/gateway.rs
//! HTTP analysis gateway against an OpenAI-compatible chat completions API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{parse_verdict, Analysis, AnalysisGateway};

const SYSTEM_PROMPT: &str = "You are a financial market analysis assistant. \
Analyze the user's input and return a JSON object with the following keys: \
'sentiment' (positive, negative, or neutral), \
'score' (integer from 0 to 10), \
'impact' (high, medium, or low), \
'direction' (bullish, bearish or neutral), \
'assets' (a list of asset names), \
'relevant' (boolean indicating if the analysis is relevant). \
Only return a valid JSON object. Do not include any explanations or extra text.";

pub struct HttpAnalysisGateway {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl HttpAnalysisGateway {
    pub fn new(api_key: String, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentry/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    async fn completion(&self, input: &str) -> Option<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: input,
                },
            ],
            temperature: 0.2,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            tracing::warn!(status = %resp.status(), "analysis gateway returned non-success");
            return None;
        }
        let body: Resp = resp.json().await.ok()?;
        body.choices.into_iter().next().map(|c| c.message.content)
    }
}

#[async_trait::async_trait]
impl AnalysisGateway for HttpAnalysisGateway {
    async fn analyze(&self, text: &str) -> Analysis {
        let Some(raw) = self.completion(text).await else {
            tracing::warn!("analysis call failed, defaulting verdict");
            return Analysis::degraded();
        };
        match parse_verdict(&raw) {
            Some(verdict) => {
                tracing::debug!(relevant = verdict.relevant, score = verdict.score, "analysis ok");
                Analysis {
                    verdict,
                    degraded: false,
                }
            }
            None => {
                tracing::warn!(raw = %raw.chars().take(100).collect::<String>(),
                    "unparsable analysis output, defaulting verdict");
                Analysis::degraded()
            }
        }
    }
}
