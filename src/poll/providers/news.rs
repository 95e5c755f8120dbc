// src/poll/providers/news.rs
//! Market-news feed adapter (Finnhub wire shape). The target key is the
//! news category ("forex", "crypto", "merger").

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde::Deserialize;

use super::{rate_hint_from_headers, retry_after};
use crate::poll::types::{
    CandidateItem, Category, FetchBatch, FetchError, FetchTarget, SourceFetcher,
};

pub const SOURCE_ID: &str = "news";

pub struct NewsFetcher {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct Article {
    id: i64,
    #[serde(default)]
    datetime: i64,
    #[serde(default)]
    headline: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    url: String,
}

impl NewsFetcher {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, "https://finnhub.io")
    }

    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentry/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl SourceFetcher for NewsFetcher {
    async fn fetch(
        &self,
        target: &FetchTarget,
        lookback: Duration,
    ) -> Result<FetchBatch, FetchError> {
        let url = format!("{}/api/v1/news", self.base_url);
        let resp = self
            .http
            .get(url)
            .query(&[
                ("category", target.key.as_str()),
                ("token", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        let rate = rate_hint_from_headers(
            resp.headers(),
            "x-ratelimit-remaining",
            "x-ratelimit-reset",
        );
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                retry_after: retry_after(resp.headers()).or(rate.and_then(|h| h.reset_after)),
                remaining: rate.and_then(|h| h.remaining),
            });
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("server error {status}")));
        }
        if !status.is_success() {
            return Err(FetchError::Fatal(format!("client error {status}")));
        }

        let articles: Vec<Article> = resp
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("decoding news response: {e}")))?;

        let cutoff = Utc::now().timestamp() - lookback.as_secs() as i64;
        let mut items: Vec<CandidateItem> = articles
            .into_iter()
            .filter(|a| a.datetime >= cutoff)
            .map(|a| {
                let published_at = Utc
                    .timestamp_opt(a.datetime, 0)
                    .single()
                    .unwrap_or_else(Utc::now);
                CandidateItem {
                    id: a.id.to_string(),
                    category: Category::News,
                    source_label: target.label.clone(),
                    published_at,
                    // headline plus summary gives the analyzer enough context
                    text: format!("{} {}", a.headline, a.summary).trim().to_string(),
                    url: (!a.url.is_empty()).then_some(a.url),
                }
            })
            .collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        Ok(FetchBatch { items, rate })
    }

    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }
}
