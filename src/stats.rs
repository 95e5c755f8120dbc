// src/stats.rs
//! Pipeline counters, mirrored into the Prometheus recorder.

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::poll::types::Category;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "sentry_items_processed_total",
            "New (non-duplicate) items handed to analysis."
        );
        describe_counter!(
            "sentry_items_relevant_total",
            "Items the analysis gateway judged relevant."
        );
        describe_counter!(
            "sentry_pipeline_errors_total",
            "Fetch/analysis/dispatch errors, per category."
        );
        describe_gauge!(
            "sentry_last_run_ts",
            "Unix ts of the last cycle start, per category."
        );
    });
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct CategoryCounters {
    pub processed: u64,
    pub relevant: u64,
    pub errors: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub news: CategoryCounters,
    pub social: CategoryCounters,
}

#[derive(Debug, Default)]
pub struct StatsRecorder {
    news: CategoryCounters,
    social: CategoryCounters,
}

impl StatsRecorder {
    pub fn new() -> Self {
        ensure_metrics_described();
        Self::default()
    }

    fn counters_mut(&mut self, category: Category) -> &mut CategoryCounters {
        match category {
            Category::News => &mut self.news,
            Category::Social => &mut self.social,
        }
    }

    pub fn record_processed(&mut self, category: Category) {
        self.counters_mut(category).processed += 1;
        counter!("sentry_items_processed_total", "category" => category.as_str()).increment(1);
    }

    pub fn record_relevant(&mut self, category: Category) {
        self.counters_mut(category).relevant += 1;
        counter!("sentry_items_relevant_total", "category" => category.as_str()).increment(1);
    }

    pub fn record_error(&mut self, category: Category) {
        self.counters_mut(category).errors += 1;
        counter!("sentry_pipeline_errors_total", "category" => category.as_str()).increment(1);
    }

    pub fn mark_run(&mut self, category: Category) {
        let now = Utc::now();
        self.counters_mut(category).last_run_at = Some(now);
        gauge!("sentry_last_run_ts", "category" => category.as_str())
            .set(now.timestamp().max(0) as f64);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            news: self.news.clone(),
            social: self.social.clone(),
        }
    }
}
