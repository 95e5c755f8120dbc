// src/app.rs
//! Process-wide shared state, constructed once at startup and passed into
//! every component. No ambient globals.
//!
//! All jobs run on one cooperative runtime; guards are held only between
//! suspension points and never across an await.

use std::sync::{Mutex, MutexGuard};

use anyhow::Result;

use crate::breaker::CircuitBreaker;
use crate::config::AppConfig;
use crate::dedup::{DedupStore, HandleDirectory};
use crate::rate_limit::RateLimiter;
use crate::stats::StatsRecorder;
use crate::{analyze, poll};

pub struct AppContext {
    pub cfg: AppConfig,
    limiter: Mutex<RateLimiter>,
    breaker: Mutex<CircuitBreaker>,
    dedup: Mutex<DedupStore>,
    handles: Mutex<HandleDirectory>,
    stats: Mutex<StatsRecorder>,
}

impl AppContext {
    /// Build the context: load durable state, register per-source budgets.
    pub fn init(cfg: AppConfig) -> Result<Self> {
        let mut limiter = RateLimiter::new();
        limiter.register(poll::providers::social::SOURCE_ID, cfg.limits.social.into());
        limiter.register(poll::providers::news::SOURCE_ID, cfg.limits.news.into());
        limiter.register(analyze::SOURCE_ID, cfg.limits.analysis.into());

        let dedup = DedupStore::load(&cfg.dedup.path, cfg.dedup.cap)?;
        let handles = HandleDirectory::load(&cfg.dedup.handles_path)?;
        let breaker = CircuitBreaker::new(cfg.retry.circuit_breaker_threshold);

        Ok(Self {
            cfg,
            limiter: Mutex::new(limiter),
            breaker: Mutex::new(breaker),
            dedup: Mutex::new(dedup),
            handles: Mutex::new(handles),
            stats: Mutex::new(StatsRecorder::new()),
        })
    }

    pub fn limiter(&self) -> MutexGuard<'_, RateLimiter> {
        self.limiter.lock().expect("rate limiter mutex poisoned")
    }

    pub fn breaker(&self) -> MutexGuard<'_, CircuitBreaker> {
        self.breaker.lock().expect("circuit breaker mutex poisoned")
    }

    pub fn dedup(&self) -> MutexGuard<'_, DedupStore> {
        self.dedup.lock().expect("dedup mutex poisoned")
    }

    pub fn handles(&self) -> MutexGuard<'_, HandleDirectory> {
        self.handles.lock().expect("handles mutex poisoned")
    }

    pub fn stats(&self) -> MutexGuard<'_, StatsRecorder> {
        self.stats.lock().expect("stats mutex poisoned")
    }
}
