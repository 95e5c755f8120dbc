// src/lib.rs
//! Rate-limited market polling with deduplicated alerting.
//!
//! Two recurring jobs (social accounts, news categories) fetch candidate
//! items, run them through an analysis gateway, and push relevant ones to a
//! notification sink. Per-source budgets, a consecutive-failure breaker, and
//! a durable seen-set keep the pipeline polite and at-most-once.

pub mod analyze;
pub mod api;
pub mod app;
pub mod breaker;
pub mod config;
pub mod dedup;
pub mod metrics_exporter;
pub mod notify;
pub mod poll;
pub mod rate_limit;
pub mod scheduler;
pub mod stats;

pub use app::AppContext;
pub use config::{AppConfig, Secrets};
pub use poll::Pipeline;
