// src/poll/providers/mod.rs
pub mod news;
pub mod social;

use std::time::Duration;

use crate::poll::types::RateHint;

/// Pull `x-rate-limit-*` style quota headers into a [`RateHint`], converting
/// the epoch reset timestamp into a duration from now.
pub(crate) fn rate_hint_from_headers(
    headers: &reqwest::header::HeaderMap,
    remaining_name: &str,
    reset_name: &str,
) -> Option<RateHint> {
    let remaining = header_u64(headers, remaining_name).and_then(|v| u32::try_from(v).ok());
    let reset_after = header_u64(headers, reset_name).map(epoch_to_duration);
    if remaining.is_none() && reset_after.is_none() {
        return None;
    }
    Some(RateHint {
        remaining,
        reset_after,
    })
}

pub(crate) fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

fn epoch_to_duration(epoch_secs: u64) -> Duration {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    Duration::from_secs(epoch_secs.saturating_sub(now))
}

/// Retry-after as given by a 429 response, if any.
pub(crate) fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    header_u64(headers, "retry-after").map(Duration::from_secs)
}
