// src/scheduler/mod.rs
//! Recurring-job runner.
//!
//! One cooperative scheduling domain: each registered job gets its own loop
//! that awaits the handler inline, so two firings of the same job can never
//! overlap. Different jobs interleave freely at suspension points. Shutdown
//! stops new firings and lets the in-flight run finish; long sleeps inside
//! handlers should use [`sleep_or_cancel`] so they end at a checkpoint.

pub mod stagger;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use metrics::counter;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct JobOptions {
    /// Collapse firings missed while a run was in flight into one catch-up
    /// run. When false, missed firings are dropped entirely.
    pub coalesce_missed_runs: bool,
    /// A firing delayed past this grace period is dropped, not executed late.
    pub misfire_grace: Option<Duration>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            coalesce_missed_runs: true,
            misfire_grace: None,
        }
    }
}

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

struct Job {
    id: &'static str,
    interval: Duration,
    options: JobOptions,
    handler: Box<dyn FnMut() -> JobFuture + Send>,
}

pub struct PollingScheduler {
    jobs: Vec<Job>,
}

impl PollingScheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn register_job<F, Fut>(
        &mut self,
        id: &'static str,
        interval: Duration,
        options: JobOptions,
        mut handler: F,
    ) where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.jobs.push(Job {
            id,
            interval,
            options,
            handler: Box::new(move || Box::pin(handler())),
        });
    }

    /// Drive all jobs until `shutdown` is cancelled. Returns once every
    /// in-flight run has completed.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut handles = Vec::with_capacity(self.jobs.len());
        for job in self.jobs {
            let token = shutdown.clone();
            handles.push(tokio::spawn(drive_job(job, token)));
        }
        for h in handles {
            let _ = h.await;
        }
    }
}

impl Default for PollingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn drive_job(mut job: Job, shutdown: CancellationToken) {
    let interval = job.interval;
    let mut next_fire = Instant::now() + interval;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                tracing::info!(job = job.id, "scheduler job stopping");
                return;
            }
            _ = tokio::time::sleep_until(next_fire) => {}
        }

        let now = Instant::now();
        // Find the most recent due firing; anything older was missed while
        // the previous run was in flight (max one concurrent instance).
        let mut due = next_fire;
        let mut missed = 0u64;
        while due + interval <= now {
            due += interval;
            missed += 1;
        }
        next_fire = due + interval;

        if missed > 0 {
            if job.options.coalesce_missed_runs {
                tracing::warn!(job = job.id, missed, "coalescing missed firings into one run");
                counter!("sentry_scheduler_coalesced_total", "job" => job.id).increment(missed);
            } else {
                tracing::warn!(job = job.id, missed, "dropping overlapped firings");
                counter!("sentry_scheduler_skipped_total", "job" => job.id)
                    .increment(missed + 1);
                continue;
            }
        }

        if let Some(grace) = job.options.misfire_grace {
            let late = now.duration_since(due);
            if late > grace {
                tracing::warn!(job = job.id, late_secs = late.as_secs(), "misfire, dropping run");
                counter!("sentry_scheduler_misfires_total", "job" => job.id).increment(1);
                continue;
            }
        }

        (job.handler)().await;
    }
}

/// Sleep that ends early at shutdown. Returns false when cancelled.
pub async fn sleep_or_cancel(shutdown: &CancellationToken, dur: Duration) -> bool {
    if dur.is_zero() {
        return !shutdown.is_cancelled();
    }
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(dur) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_per_interval() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let mut sched = PollingScheduler::new();
        sched.register_job("tick", Duration::from_secs(10), JobOptions::default(), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(35)).await;
            stopper.cancel();
        });
        sched.run(shutdown).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handler_never_overlaps_and_coalesces() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let mut sched = PollingScheduler::new();
        // handler takes 2.5 intervals
        sched.register_job("slow", Duration::from_secs(10), JobOptions::default(), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(25)).await;
            }
        });

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(55)).await;
            stopper.cancel();
        });
        sched.run(shutdown).await;
        // t=10 run (ends 35), then one catch-up run at t=35 for the missed
        // firing; no back-to-back runs for each missed tick.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn without_coalescing_missed_firings_are_dropped() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let mut sched = PollingScheduler::new();
        let opts = JobOptions {
            coalesce_missed_runs: false,
            misfire_grace: None,
        };
        sched.register_job("strict", Duration::from_secs(10), opts, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(25)).await;
            }
        });

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(68)).await;
            stopper.cancel();
        });
        sched.run(shutdown).await;
        // t=10 run (ends 35); firing at 30 dropped; next run t=40 (ends 65);
        // firing at 60 dropped before the token cancels at 68.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn firings_past_misfire_grace_are_dropped() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let mut sched = PollingScheduler::new();
        let opts = JobOptions {
            coalesce_missed_runs: true,
            misfire_grace: Some(Duration::from_secs(1)),
        };
        // each run overshoots its interval by 2s, so the catch-up firing is
        // always 2s late, past the 1s grace
        sched.register_job("late", Duration::from_secs(10), opts, move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(12)).await;
            }
        });

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(55)).await;
            stopper.cancel();
        });
        sched.run(shutdown).await;
        // runs start at t=10, 30, 50; the catch-up firings at 22 and 42 are
        // 2s late and get dropped instead of running
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_run() {
        let done = Arc::new(AtomicU32::new(0));
        let d = done.clone();
        let mut sched = PollingScheduler::new();
        sched.register_job("long", Duration::from_secs(5), JobOptions::default(), move || {
            let d = d.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(20)).await;
                d.fetch_add(1, Ordering::SeqCst);
            }
        });

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            // cancel mid-run (run starts at t=5)
            tokio::time::sleep(Duration::from_secs(10)).await;
            stopper.cancel();
        });
        sched.run(shutdown).await;
        // run() returned only after the in-flight handler finished
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_or_cancel_ends_early_on_shutdown() {
        let token = CancellationToken::new();
        let t = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            t.cancel();
        });
        let completed = sleep_or_cancel(&token, Duration::from_secs(60)).await;
        assert!(!completed);
    }
}
