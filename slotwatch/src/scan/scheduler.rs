//! Interval scheduler for background jobs.
//!
//! One master loop ticks on a short interval and claims whichever jobs
//! are due. Each claimed job runs in its own task; a job that is still
//! running when its next tick comes due has that tick dropped rather
//! than queued, so a slow upstream never builds a backlog of cycles.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::errors::Result;

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Cleared when the guard drops, releasing the job for its next tick.
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Outcome of asking a job slot whether it should run now.
#[derive(Debug, PartialEq, Eq)]
pub enum Claim {
    Claimed,
    /// Due by the clock, but the previous run has not finished.
    StillRunning,
    NotDue,
}

/// Bookkeeping for one recurring job. Cadence is measured start-to-start.
pub struct JobSlot {
    interval: Duration,
    last_run: Option<DateTime<Utc>>,
    running: Arc<AtomicBool>,
}

impl JobSlot {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_run: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    fn due(&self, now: DateTime<Utc>) -> bool {
        match self.last_run {
            None => true,
            Some(last) => (now - last).to_std().unwrap_or(Duration::ZERO) >= self.interval,
        }
    }

    /// Claim the slot for a run. On success the returned guard must be
    /// held for the duration of the run.
    pub fn try_claim(&mut self, now: DateTime<Utc>) -> (Claim, Option<RunGuard>) {
        if !self.due(now) {
            return (Claim::NotDue, None);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return (Claim::StillRunning, None);
        }
        self.last_run = Some(now);
        let guard = RunGuard {
            running: self.running.clone(),
        };
        (Claim::Claimed, Some(guard))
    }
}

struct ScheduledJob {
    name: &'static str,
    slot: JobSlot,
    task: JobFn,
}

/// Runs a fixed set of recurring jobs until cancelled.
pub struct Scheduler {
    tick_interval: Duration,
    jobs: Vec<ScheduledJob>,
}

impl Scheduler {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            jobs: Vec::new(),
        }
    }

    pub fn add_job<F, Fut>(&mut self, name: &'static str, interval: Duration, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.jobs.push(ScheduledJob {
            name,
            slot: JobSlot::new(interval),
            task: Arc::new(move || Box::pin(f())),
        });
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(jobs = self.jobs.len(), "Scheduler started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    for job in &mut self.jobs {
                        match job.slot.try_claim(now) {
                            (Claim::Claimed, Some(guard)) => {
                                let task = job.task.clone();
                                let name = job.name;
                                tokio::spawn(async move {
                                    let _guard = guard;
                                    tracing::debug!(job = name, "Job starting");
                                    if let Err(error) = task().await {
                                        tracing::error!(job = name, %error, "Job failed");
                                    }
                                });
                            }
                            (Claim::StillRunning, _) => {
                                tracing::warn!(job = job.name, "Previous run still in flight, dropping tick");
                            }
                            _ => {}
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Scheduler shutting down");
                    break;
                }
            }
        }
    }
}
