// src/poll/types.rs
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::breaker::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    News,
    Social,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::News => "news",
            Category::Social => "social",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sub-target of a polling job: a tracked account or a news category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTarget {
    /// Human-readable name used in logs and alerts (e.g. "elonmusk", "crypto").
    pub label: String,
    /// Provider-side key (resolved user id, or the category name itself).
    pub key: String,
}

impl FetchTarget {
    pub fn new(label: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub id: String,
    pub category: Category,
    pub source_label: String,
    pub published_at: DateTime<Utc>,
    pub text: String,
    /// Web link to the item, when the provider gives one.
    pub url: Option<String>,
}

/// Provider-reported quota carried back from a successful call, fed into
/// `RateLimiter::acknowledge`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateHint {
    pub remaining: Option<u32>,
    pub reset_after: Option<Duration>,
}

#[derive(Debug)]
pub struct FetchBatch {
    /// Newest first.
    pub items: Vec<CandidateItem>,
    pub rate: Option<RateHint>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider rate limited (retry after {retry_after:?})")]
    RateLimited {
        retry_after: Option<Duration>,
        remaining: Option<u32>,
    },
    #[error("transient provider failure: {0}")]
    Transient(String),
    #[error("fatal provider failure: {0}")]
    Fatal(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::RateLimited { retry_after, .. } => FailureKind::RateLimited {
                retry_after: *retry_after,
            },
            FetchError::Transient(_) => FailureKind::Transient,
            FetchError::Fatal(_) => FailureKind::Fatal,
        }
    }
}

/// External collaborator: obtains candidate items for one sub-target.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, target: &FetchTarget, lookback: Duration)
        -> Result<FetchBatch, FetchError>;

    /// Rate-limiter / breaker key for this feed.
    fn source_id(&self) -> &'static str;
}
