// src/api.rs
//! Observation surface: liveness probe and a JSON status snapshot.
//! Read-only; nothing here mutates pipeline state.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::app::AppContext;
use crate::stats::StatsSnapshot;

pub fn create_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(ctx)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Per-category counters plus last cycle timestamps, straight from the
/// in-memory recorder.
async fn status(State(ctx): State<Arc<AppContext>>) -> Json<StatsSnapshot> {
    Json(ctx.stats().snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::poll::types::Category;

    fn test_ctx() -> Arc<AppContext> {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.dedup.path = dir.path().join("processed_ids.json");
        cfg.dedup.handles_path = dir.path().join("user_ids.json");
        // keep the tempdir alive for the duration of the test
        std::mem::forget(dir);
        Arc::new(AppContext::init(cfg).unwrap())
    }

    #[tokio::test]
    async fn status_reflects_recorded_counters() {
        let ctx = test_ctx();
        ctx.stats().record_processed(Category::News);
        ctx.stats().record_relevant(Category::News);

        let Json(snap) = status(State(ctx)).await;
        assert_eq!(snap.news.processed, 1);
        assert_eq!(snap.news.relevant, 1);
        assert_eq!(snap.social.processed, 0);
    }
}
