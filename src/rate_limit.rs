// src/rate_limit.rs
//! Per-source request budgets inside a rolling window.
//!
//! The limiter only computes decisions; it never sleeps. Callers are
//! responsible for suspending for the returned wait. Provider-reported
//! quota (via [`RateLimiter::acknowledge`]) always overrides the local
//! estimate: the server is the source of truth, local tracking is a
//! conservative fallback between calls.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct BudgetCfg {
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug)]
struct RateBudget {
    cfg: BudgetCfg,
    remaining: u32,
    window_reset_at: Instant,
}

impl RateBudget {
    fn new(cfg: BudgetCfg, now: Instant) -> Self {
        Self {
            cfg,
            remaining: cfg.max_requests,
            window_reset_at: now + cfg.window,
        }
    }

    fn roll_window_if_elapsed(&mut self, now: Instant) {
        if now >= self.window_reset_at {
            self.remaining = self.cfg.max_requests;
            self.window_reset_at = now + self.cfg.window;
        }
    }
}

/// Outcome of a single acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquire {
    pub allowed: bool,
    /// Suggested wait before retrying, jittered. Zero when allowed.
    pub wait: Duration,
}

impl Acquire {
    fn allowed() -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
        }
    }
}

pub struct RateLimiter {
    budgets: HashMap<String, RateBudget>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            budgets: HashMap::new(),
        }
    }

    /// Register a budget for a source. Called once at startup per source.
    pub fn register(&mut self, source_id: &str, cfg: BudgetCfg) {
        self.budgets
            .insert(source_id.to_string(), RateBudget::new(cfg, Instant::now()));
    }

    /// Decide whether a request to `source_id` may proceed now.
    ///
    /// Unregistered sources are allowed through (no budget to enforce).
    pub fn try_acquire(&mut self, source_id: &str) -> Acquire {
        let now = Instant::now();
        let Some(budget) = self.budgets.get_mut(source_id) else {
            tracing::debug!(source = source_id, "no budget registered, allowing");
            return Acquire::allowed();
        };

        budget.roll_window_if_elapsed(now);

        if budget.remaining > 0 {
            budget.remaining -= 1;
            return Acquire::allowed();
        }

        let base = budget.window_reset_at.duration_since(now);
        // 10-30% jitter on top of the reset wait avoids synchronized retries.
        let jitter = base.mul_f64(rand::rng().random_range(0.10..=0.30));
        Acquire {
            allowed: false,
            wait: base + jitter,
        }
    }

    /// Fold an authoritative provider response into the local budget.
    ///
    /// Adapters convert provider reset headers (epoch seconds or
    /// retry-after) into a duration from now before calling this.
    pub fn acknowledge(
        &mut self,
        source_id: &str,
        remaining: Option<u32>,
        reset_after: Option<Duration>,
    ) {
        let now = Instant::now();
        let Some(budget) = self.budgets.get_mut(source_id) else {
            return;
        };
        if let Some(r) = remaining {
            budget.remaining = r.min(budget.cfg.max_requests);
        }
        if let Some(d) = reset_after {
            budget.window_reset_at = now + d;
        }
    }

    /// Current local estimate of remaining requests, for status/diagnostics.
    pub fn remaining(&self, source_id: &str) -> Option<u32> {
        self.budgets.get(source_id).map(|b| b.remaining)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_secs: u64, max: u32) -> RateLimiter {
        let mut rl = RateLimiter::new();
        rl.register(
            "src",
            BudgetCfg {
                window: Duration::from_secs(window_secs),
                max_requests: max,
            },
        );
        rl
    }

    #[tokio::test(start_paused = true)]
    async fn allows_at_most_max_requests_per_window() {
        let mut rl = limiter(60, 5);
        let allowed = (0..20).filter(|_| rl.try_acquire("src").allowed).count();
        assert_eq!(allowed, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_reports_wait_with_jitter() {
        let mut rl = limiter(5, 1);
        assert!(rl.try_acquire("src").allowed);

        let acq = rl.try_acquire("src");
        assert!(!acq.allowed);
        // base wait is ~5s; jitter adds 10-30% of it
        assert!(acq.wait >= Duration::from_millis(4_900), "wait {:?}", acq.wait);
        assert!(acq.wait <= Duration::from_millis(6_600), "wait {:?}", acq.wait);
    }

    #[tokio::test(start_paused = true)]
    async fn window_reset_restores_budget_exactly_once() {
        let mut rl = limiter(10, 2);
        assert!(rl.try_acquire("src").allowed);
        assert!(rl.try_acquire("src").allowed);
        assert!(!rl.try_acquire("src").allowed);

        tokio::time::advance(Duration::from_secs(11)).await;
        // fresh window: exactly max_requests again, not cumulative
        assert!(rl.try_acquire("src").allowed);
        assert!(rl.try_acquire("src").allowed);
        assert!(!rl.try_acquire("src").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_overrides_local_estimate() {
        let mut rl = limiter(60, 10);
        for _ in 0..10 {
            rl.try_acquire("src");
        }
        assert!(!rl.try_acquire("src").allowed);

        // server says there is still quota left
        rl.acknowledge("src", Some(3), None);
        assert_eq!(rl.remaining("src"), Some(3));
        assert!(rl.try_acquire("src").allowed);

        // server-reported remaining is clamped to the configured maximum
        rl.acknowledge("src", Some(999), None);
        assert_eq!(rl.remaining("src"), Some(10));
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_can_move_the_reset_forward() {
        let mut rl = limiter(10, 1);
        assert!(rl.try_acquire("src").allowed);
        rl.acknowledge("src", Some(0), Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(11)).await;
        // local window would have reset by now; authoritative reset wins
        assert!(!rl.try_acquire("src").allowed);

        tokio::time::advance(Duration::from_secs(25)).await;
        assert!(rl.try_acquire("src").allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn unregistered_source_is_allowed() {
        let mut rl = RateLimiter::new();
        assert!(rl.try_acquire("unknown").allowed);
    }
}
