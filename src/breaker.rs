// src/breaker.rs
//! Consecutive-failure circuit breaker and retry backoff policy.
//!
//! Failures are recorded at the smallest scope (one sub-target's fetch) and
//! converted into breaker signals; they never escape to abort a polling job.
//! Backoff sleeps happen in the caller, scoped to that one source's
//! processing path, so a backing-off source never blocks the others.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;

/// Classified failure of a collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Provider explicitly refused due to quota. Prefer its reset hint.
    RateLimited { retry_after: Option<Duration> },
    /// Network/5xx-class error, worth a bounded retry.
    Transient,
    /// Not retried; surfaced immediately.
    Fatal,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::RateLimited { .. } => "rate_limited",
            FailureKind::Transient => "transient",
            FailureKind::Fatal => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base_backoff: Duration,
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based), or `None` when the
    /// failure should not be retried this cycle.
    ///
    /// Rate-limit hints from the provider always win over the locally
    /// computed backoff, floored at one second so a zero hint cannot
    /// produce a hot loop.
    pub fn compute_backoff(&self, attempt: u32, kind: &FailureKind) -> Option<Duration> {
        if matches!(kind, FailureKind::Fatal) || attempt > self.max_retries {
            return None;
        }
        let wait = match kind {
            FailureKind::RateLimited { retry_after } => {
                retry_after.unwrap_or_else(|| self.exponential(attempt))
            }
            _ => self.exponential(attempt),
        };
        Some(wait.max(Duration::from_secs(1)))
    }

    fn exponential(&self, attempt: u32) -> Duration {
        let doubled = self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1));
        doubled.mul_f64(rand::rng().random_range(0.5..=1.5))
    }
}

pub struct CircuitBreaker {
    threshold: u32,
    failures: HashMap<String, u32>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: HashMap::new(),
        }
    }

    /// True once `threshold` consecutive failures have been recorded and no
    /// success has happened since.
    pub fn should_skip(&self, source_id: &str) -> bool {
        self.failures
            .get(source_id)
            .is_some_and(|n| *n >= self.threshold)
    }

    /// Returns the updated consecutive-failure count.
    pub fn record_failure(&mut self, source_id: &str, kind: &FailureKind) -> u32 {
        let count = self.failures.entry(source_id.to_string()).or_insert(0);
        *count += 1;
        if *count == self.threshold {
            tracing::warn!(
                source = source_id,
                failures = *count,
                kind = kind.label(),
                "circuit opened, source will be skipped until next success"
            );
        }
        *count
    }

    pub fn record_success(&mut self, source_id: &str) {
        self.failures.insert(source_id.to_string(), 0);
    }

    pub fn consecutive_failures(&self, source_id: &str) -> u32 {
        self.failures.get(source_id).copied().unwrap_or(0)
    }
}
