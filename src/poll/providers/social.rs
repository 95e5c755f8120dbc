// src/poll/providers/social.rs
//! Social-post feed adapter (X API v2 wire shape).

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::{rate_hint_from_headers, retry_after};
use crate::poll::types::{
    CandidateItem, Category, FetchBatch, FetchError, FetchTarget, SourceFetcher,
};

pub const SOURCE_ID: &str = "social";

const MAX_RESULTS: u32 = 5;

pub struct SocialFetcher {
    http: reqwest::Client,
    base_url: String,
    bearer_token: String,
}

#[derive(Debug, Deserialize)]
struct TweetsResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: Option<UserData>,
}

#[derive(Debug, Deserialize)]
struct UserData {
    id: String,
}

impl SocialFetcher {
    pub fn new(bearer_token: String) -> Self {
        Self::with_base_url(bearer_token, "https://api.x.com")
    }

    pub fn with_base_url(bearer_token: String, base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("market-sentry/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.into(),
            bearer_token,
        }
    }

    /// Resolve a screen name to the provider's user id. `None` when the
    /// handle doesn't exist.
    pub async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, FetchError> {
        let url = format!("{}/2/users/by/username/{}", self.base_url, handle);
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_status(status, resp.headers()));
        }
        let body: UserResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("decoding user response: {e}")))?;
        Ok(body.data.map(|d| d.id))
    }
}

#[async_trait::async_trait]
impl SourceFetcher for SocialFetcher {
    async fn fetch(
        &self,
        target: &FetchTarget,
        lookback: Duration,
    ) -> Result<FetchBatch, FetchError> {
        let start_time = (Utc::now()
            - chrono::Duration::from_std(lookback).unwrap_or(chrono::Duration::zero()))
        .to_rfc3339_opts(SecondsFormat::Secs, true);
        let url = format!("{}/2/users/{}/tweets", self.base_url, target.key);

        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("max_results", MAX_RESULTS.to_string()),
                ("start_time", start_time),
                ("tweet.fields", "created_at,id,text".to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Transient(e.to_string()))?;

        let status = resp.status();
        let rate = rate_hint_from_headers(
            resp.headers(),
            "x-rate-limit-remaining",
            "x-rate-limit-reset",
        );
        if !status.is_success() {
            return Err(classify_status(status, resp.headers()));
        }

        let body: TweetsResponse = resp
            .json()
            .await
            .map_err(|e| FetchError::Transient(format!("decoding tweets response: {e}")))?;

        let mut items: Vec<CandidateItem> = body
            .data
            .into_iter()
            .map(|t| CandidateItem {
                url: Some(format!("https://x.com/{}/status/{}", target.label, t.id)),
                id: t.id,
                category: Category::Social,
                source_label: target.label.clone(),
                published_at: t.created_at.unwrap_or_else(Utc::now),
                text: t.text,
            })
            .collect();
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        Ok(FetchBatch { items, rate })
    }

    fn source_id(&self) -> &'static str {
        SOURCE_ID
    }
}

fn classify_status(
    status: reqwest::StatusCode,
    headers: &reqwest::header::HeaderMap,
) -> FetchError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let hint = rate_hint_from_headers(headers, "x-rate-limit-remaining", "x-rate-limit-reset");
        return FetchError::RateLimited {
            retry_after: retry_after(headers).or(hint.and_then(|h| h.reset_after)),
            remaining: hint.and_then(|h| h.remaining),
        };
    }
    if status.is_server_error() {
        return FetchError::Transient(format!("server error {status}"));
    }
    // 401/403 and friends: credentials or permissions, retrying won't help
    FetchError::Fatal(format!("client error {status}"))
}
