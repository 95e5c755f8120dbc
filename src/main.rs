// src/main.rs
//! Binary entrypoint: wires config, shared state, providers, the HTTP
//! observation surface, and the two polling jobs; runs until SIGINT.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_sentry::analyze::gateway::HttpAnalysisGateway;
use market_sentry::api;
use market_sentry::metrics_exporter::MetricsExporter;
use market_sentry::notify::telegram::TelegramDispatcher;
use market_sentry::notify::AlertDispatcher;
use market_sentry::poll::providers::news::NewsFetcher;
use market_sentry::poll::providers::social::SocialFetcher;
use market_sentry::scheduler::{JobOptions, PollingScheduler};
use market_sentry::{AppConfig, AppContext, Pipeline, Secrets};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("market_sentry=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load()?;
    let secrets = Secrets::from_env()?;

    // Recorder must be installed before the first counter is touched.
    let exporter = MetricsExporter::init();

    let ctx = Arc::new(AppContext::init(cfg)?);

    let social = Arc::new(SocialFetcher::new(secrets.social_bearer_token.clone()));
    let news = Arc::new(NewsFetcher::new(secrets.news_api_key.clone()));
    let gateway = Arc::new(HttpAnalysisGateway::new(
        secrets.analysis_api_key.clone(),
        std::env::var("ANALYSIS_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        std::env::var("ANALYSIS_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
    ));
    let dispatcher = Arc::new(TelegramDispatcher::new(
        secrets.telegram_bot_token.clone(),
        secrets.telegram_chat_id.clone(),
        secrets.telegram_topic_id,
    ));

    // A dead notification sink makes every cycle pointless; fail fast.
    dispatcher
        .probe()
        .await
        .context("notification sink unreachable at startup")?;

    resolve_handles(&ctx, &social).await;

    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                token.cancel();
            }
        });
    }

    let pipeline = Arc::new(Pipeline::new(
        ctx.clone(),
        social,
        news,
        gateway,
        dispatcher,
        shutdown.clone(),
    ));

    let mut scheduler = PollingScheduler::new();
    let job_opts = JobOptions {
        coalesce_missed_runs: ctx.cfg.schedule.coalesce_missed_runs,
        misfire_grace: ctx.cfg.misfire_grace(),
    };
    {
        let p = pipeline.clone();
        scheduler.register_job(
            "social_poll",
            Duration::from_secs(ctx.cfg.schedule.social_poll_secs),
            job_opts,
            move || {
                let p = p.clone();
                async move { p.run_social_cycle().await }
            },
        );
    }
    {
        let p = pipeline.clone();
        scheduler.register_job(
            "news_poll",
            Duration::from_secs(ctx.cfg.schedule.news_poll_secs),
            job_opts,
            move || {
                let p = p.clone();
                async move { p.run_news_cycle().await }
            },
        );
    }

    let router = api::create_router(ctx.clone()).merge(exporter.router());
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], ctx.cfg.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "serving status endpoints");
    let server_token = shutdown.clone();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_token.cancelled().await })
            .await;
    });

    tracing::info!(
        social_interval_secs = ctx.cfg.schedule.social_poll_secs,
        news_interval_secs = ctx.cfg.schedule.news_poll_secs,
        sub_cycles = ctx.cfg.social_sub_cycles(),
        "pipeline started"
    );
    scheduler.run(shutdown).await;

    // Final checkpoint after the last in-flight cycle finished.
    pipeline.persist();
    if let Err(e) = ctx.handles().save() {
        tracing::warn!(error = ?e, "saving handle directory failed");
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Map configured screen names to provider user ids, once at startup.
/// Already-known handles are served from the persisted directory; unknown
/// ones cost one lookup each. A failed lookup only mutes that account.
async fn resolve_handles(ctx: &Arc<AppContext>, social: &Arc<SocialFetcher>) {
    let accounts = ctx.cfg.social.accounts.clone();
    let mut resolved_any = false;
    for handle in accounts {
        if ctx.handles().get(&handle).is_some() {
            continue;
        }
        match social.resolve_handle(&handle).await {
            Ok(Some(id)) => {
                tracing::info!(handle = %handle, id = %id, "resolved account");
                ctx.handles().insert(&handle, &id);
                resolved_any = true;
            }
            Ok(None) => {
                tracing::warn!(handle = %handle, "account not found, it will be skipped");
            }
            Err(e) => {
                tracing::warn!(handle = %handle, error = %e, "handle lookup failed");
            }
        }
        tokio::time::sleep(ctx.cfg.min_inter_request_delay()).await;
    }
    if resolved_any {
        if let Err(e) = ctx.handles().save() {
            tracing::warn!(error = ?e, "saving handle directory failed");
        }
    }
}
