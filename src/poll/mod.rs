// src/poll/mod.rs
//! Cycle orchestration: gate, fetch, dedup, analyze, dispatch.
//!
//! Every collaborator error is caught at the scope of one sub-target and
//! converted into a breaker signal; nothing here aborts a polling job.
//! Items are marked seen *before* the analysis call (at-most-once
//! alerting: a crash in between loses that alert, a restart never
//! duplicates one). Dedup state is persisted at cycle end; a failed save
//! keeps the in-memory state and is retried next cycle.

pub mod providers;
pub mod types;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::analyze::{self, AnalysisGateway};
use crate::app::AppContext;
use crate::notify::{self, Alert, AlertDispatcher};
use crate::scheduler::{sleep_or_cancel, stagger::StaggerPlanner};
use types::{CandidateItem, Category, FetchBatch, FetchError, FetchTarget, SourceFetcher};

pub struct Pipeline {
    ctx: Arc<AppContext>,
    social: Arc<dyn SourceFetcher>,
    news: Arc<dyn SourceFetcher>,
    gateway: Arc<dyn AnalysisGateway>,
    dispatcher: Arc<dyn AlertDispatcher>,
    planner: Mutex<StaggerPlanner>,
    shutdown: CancellationToken,
}

impl Pipeline {
    pub fn new(
        ctx: Arc<AppContext>,
        social: Arc<dyn SourceFetcher>,
        news: Arc<dyn SourceFetcher>,
        gateway: Arc<dyn AnalysisGateway>,
        dispatcher: Arc<dyn AlertDispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        let planner = StaggerPlanner::new(
            ctx.cfg.social.accounts.clone(),
            ctx.cfg.social_sub_cycles(),
        );
        Self {
            ctx,
            social,
            news,
            gateway,
            dispatcher,
            planner: Mutex::new(planner),
            shutdown,
        }
    }

    fn planner(&self) -> std::sync::MutexGuard<'_, StaggerPlanner> {
        self.planner.lock().expect("planner mutex poisoned")
    }

    /// One social sub-cycle: visit this sub-cycle's share of the tracked
    /// accounts under the shared social budget.
    pub async fn run_social_cycle(&self) {
        self.ctx.stats().mark_run(Category::Social);
        let batch = self.planner().next_batch();
        tracing::info!(targets = batch.len(), "social sub-cycle start");
        let lookback = Duration::from_secs(self.ctx.cfg.social.lookback_minutes * 60);

        for (i, handle) in batch.into_iter().enumerate() {
            if self.shutdown.is_cancelled() {
                break;
            }
            if i > 0
                && !sleep_or_cancel(&self.shutdown, self.ctx.cfg.min_inter_request_delay()).await
            {
                break;
            }

            let Some(user_id) = self.ctx.handles().get(&handle).map(str::to_string) else {
                tracing::debug!(handle = %handle, "no resolved id for handle, skipping");
                continue;
            };
            let target = FetchTarget::new(handle.clone(), user_id);

            let Some(fetched) = self
                .fetch_with_retry(self.social.as_ref(), Category::Social, &target, lookback)
                .await
            else {
                // stays uncovered; the planner prioritizes it next epoch
                continue;
            };
            self.planner().mark_covered(&handle);
            tracing::debug!(handle = %target.label, items = fetched.items.len(), "fetched");

            for item in fetched.items {
                if self.shutdown.is_cancelled() {
                    break;
                }
                self.process_item(item).await;
            }
        }

        self.persist();
    }

    /// One news cycle: every configured category, shared news budget.
    pub async fn run_news_cycle(&self) {
        self.ctx.stats().mark_run(Category::News);
        let lookback = Duration::from_secs(self.ctx.cfg.news.lookback_minutes * 60);
        let categories = self.ctx.cfg.news.categories.clone();

        for (i, category) in categories.into_iter().enumerate() {
            if self.shutdown.is_cancelled() {
                break;
            }
            if i > 0
                && !sleep_or_cancel(&self.shutdown, self.ctx.cfg.min_inter_request_delay()).await
            {
                break;
            }

            let target = FetchTarget::new(category.clone(), category);
            let Some(fetched) = self
                .fetch_with_retry(self.news.as_ref(), Category::News, &target, lookback)
                .await
            else {
                continue;
            };
            tracing::debug!(category = %target.label, items = fetched.items.len(), "fetched");

            for item in fetched.items {
                if self.shutdown.is_cancelled() {
                    break;
                }
                self.process_item(item).await;
            }
        }

        self.persist();
    }

    /// Rate-gate plus bounded retries for one sub-target. `None` means the
    /// sub-target is skipped for this cycle.
    async fn fetch_with_retry(
        &self,
        fetcher: &dyn SourceFetcher,
        category: Category,
        target: &FetchTarget,
        lookback: Duration,
    ) -> Option<FetchBatch> {
        let source = fetcher.source_id();
        if self.ctx.breaker().should_skip(source) {
            tracing::warn!(source, target = %target.label, "circuit open, skipping source");
            return None;
        }
        let policy: crate::breaker::RetryPolicy = self.ctx.cfg.retry.clone().into();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            // every attempt is a real provider request and must consume budget
            if !self.acquire_budget(source).await {
                return None;
            }
            match fetcher.fetch(target, lookback).await {
                Ok(batch) => {
                    if let Some(hint) = batch.rate {
                        self.ctx
                            .limiter()
                            .acknowledge(source, hint.remaining, hint.reset_after);
                    }
                    self.ctx.breaker().record_success(source);
                    return Some(batch);
                }
                Err(err) => {
                    let kind = err.kind();
                    self.ctx.breaker().record_failure(source, &kind);
                    self.ctx.stats().record_error(category);
                    if let FetchError::RateLimited {
                        retry_after,
                        remaining,
                    } = &err
                    {
                        // the provider's own quota report beats our estimate
                        self.ctx.limiter().acknowledge(source, *remaining, *retry_after);
                    }
                    match policy.compute_backoff(attempt, &kind) {
                        Some(wait) => {
                            tracing::warn!(
                                source,
                                target = %target.label,
                                attempt,
                                wait_secs = wait.as_secs_f64(),
                                error = %err,
                                "fetch failed, backing off"
                            );
                            if !sleep_or_cancel(&self.shutdown, wait).await {
                                return None;
                            }
                        }
                        None => {
                            tracing::warn!(
                                source,
                                target = %target.label,
                                attempt,
                                error = %err,
                                "fetch failed, giving up for this cycle"
                            );
                            return None;
                        }
                    }
                }
            }
        }
    }

    /// Wait out the limiter once; a second refusal skips the request.
    async fn acquire_budget(&self, source: &str) -> bool {
        let acq = self.ctx.limiter().try_acquire(source);
        if acq.allowed {
            return true;
        }
        tracing::info!(
            source,
            wait_secs = acq.wait.as_secs_f64(),
            "budget exhausted, waiting for window reset"
        );
        if !sleep_or_cancel(&self.shutdown, acq.wait).await {
            return false;
        }
        let retry = self.ctx.limiter().try_acquire(source);
        if !retry.allowed {
            tracing::warn!(source, "budget still exhausted after wait, skipping");
        }
        retry.allowed
    }

    async fn process_item(&self, item: CandidateItem) {
        let category = item.category;
        {
            let mut dedup = self.ctx.dedup();
            if dedup.is_seen(category, &item.id) {
                tracing::debug!(id = %item.id, %category, "already processed, skipping");
                return;
            }
            // committed before any suspension point that could fail
            dedup.mark_seen(category, &item.id);
        }
        self.ctx.stats().record_processed(category);

        // pace the analysis service like any other provider
        if !sleep_or_cancel(&self.shutdown, self.ctx.cfg.min_inter_request_delay()).await {
            return;
        }
        if !self.acquire_budget(analyze::SOURCE_ID).await {
            // fail closed: no verdict, no alert
            tracing::warn!(id = %item.id, "analysis budget unavailable, item dropped");
            self.ctx.stats().record_error(category);
            return;
        }

        let analysis = self.gateway.analyze(&item.text).await;
        if analysis.degraded {
            self.ctx.stats().record_error(category);
        }
        if !analysis.verdict.relevant {
            tracing::debug!(id = %item.id, degraded = analysis.degraded, "not relevant");
            return;
        }

        self.ctx.stats().record_relevant(category);
        let alert = Alert {
            category,
            source_label: item.source_label,
            item_id: item.id,
            text: item.text,
            url: item.url,
            verdict: analysis.verdict,
        };
        let text = notify::format_alert(&alert);
        match self.dispatcher.send(&text).await {
            Ok(true) => {
                tracing::info!(id = %alert.item_id, source = %alert.source_label, "alert sent");
            }
            Ok(false) => {
                tracing::warn!(id = %alert.item_id, "alert refused by sink");
                self.ctx.stats().record_error(category);
            }
            Err(e) => {
                tracing::warn!(id = %alert.item_id, error = %e, "alert delivery failed");
                self.ctx.stats().record_error(category);
            }
        }
    }

    /// Durable checkpoint. A failed save keeps in-memory state; the next
    /// cycle retries.
    pub fn persist(&self) {
        if let Err(e) = self.ctx.dedup().save() {
            tracing::warn!(error = ?e, "persisting dedup state failed, retaining in memory");
        }
    }
}
