//! Daily sync scheduling.
//!
//! One run at startup, then one at every local midnight. Each deadline is
//! recomputed from the wall clock after the previous one fires, so suspends
//! and long uptimes cannot drift the schedule. Manual triggers share the same
//! admission check, so at most one run is ever in flight and overlapping
//! triggers are dropped.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connector::SyncRunner;
use crate::state::{LogCategory, LogEntry, LogStatus, SyncStateStore};

/// Nominal interval between scheduled runs.
pub const RUN_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// A deadline closer than this is pushed to the following midnight, so a
/// timer that wakes a little early cannot fire twice around one midnight.
const MIDNIGHT_SLACK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run was admitted.
    Started,
    /// Another run is in flight; the request was dropped.
    AlreadyRunning,
}

/// Entry point for anything that wants to start a run.
pub trait SyncTrigger: Send + Sync {
    fn trigger(&self) -> TriggerOutcome;
}

/// Pairs a runner with the state store and enforces one-run-at-a-time.
pub struct SyncService<R> {
    runner: Arc<R>,
    store: Arc<SyncStateStore>,
}

impl<R> Clone for SyncService<R> {
    fn clone(&self) -> Self {
        Self {
            runner: Arc::clone(&self.runner),
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: SyncRunner + 'static> SyncService<R> {
    pub fn new(runner: Arc<R>, store: Arc<SyncStateStore>) -> Self {
        Self { runner, store }
    }

    pub fn store(&self) -> &Arc<SyncStateStore> {
        &self.store
    }

    /// Start a run if none is in flight. The handle settles once the run's
    /// outcome has been published to the store.
    pub fn spawn_run(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = self.store.try_begin_run() else {
            tracing::info!("sync already in progress, trigger dropped");
            return None;
        };

        let runner = Arc::clone(&self.runner);
        let store = Arc::clone(&self.store);

        Some(tokio::spawn(async move {
            // The run gets its own task so a panic inside it surfaces as a
            // JoinError here instead of taking the scheduler down.
            let run = tokio::spawn(async move { runner.run_once().await });

            match run.await {
                Ok(outcome) => {
                    if let Err(e) = &outcome.result {
                        tracing::error!(error = %e, "sync run failed");
                    } else {
                        tracing::info!("sync run completed");
                    }
                    store.record_run(outcome).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "sync run aborted unexpectedly");
                    store
                        .append_log(LogEntry::new(
                            LogCategory::System,
                            LogStatus::Error,
                            format!("sync failed: run aborted unexpectedly ({e})"),
                        ))
                        .await;
                }
            }

            drop(guard);
        }))
    }
}

impl<R: SyncRunner + 'static> SyncTrigger for SyncService<R> {
    fn trigger(&self) -> TriggerOutcome {
        match self.spawn_run() {
            Some(_) => TriggerOutcome::Started,
            None => TriggerOutcome::AlreadyRunning,
        }
    }
}

/// Time from `now` until the next midnight in `now`'s offset.
pub fn duration_until_next_midnight(now: DateTime<FixedOffset>) -> Duration {
    now.date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| now.offset().from_local_datetime(&midnight).single())
        .and_then(|deadline| (deadline - now).to_std().ok())
        .unwrap_or(RUN_PERIOD)
}

/// Delay from `now` until the next re-armed midnight, skipping one that is
/// less than [`MIDNIGHT_SLACK`] away.
pub fn delay_until_next_run(now: DateTime<FixedOffset>) -> Duration {
    let slack = chrono::Duration::from_std(MIDNIGHT_SLACK).unwrap_or_else(|_| chrono::Duration::zero());
    duration_until_next_midnight(now + slack) + MIDNIGHT_SLACK
}

/// Owns the scheduling loop. Dropping it without `shutdown` leaves the loop
/// running for the life of the runtime.
pub struct Scheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Scheduler {
    /// Run now, then at every midnight in `offset`. Only re-armed deadlines
    /// apply the slack; the first is exactly the next midnight.
    pub fn start<T>(trigger: T, store: Arc<SyncStateStore>, offset: FixedOffset) -> Self
    where
        T: SyncTrigger + 'static,
    {
        let mut first = true;
        Self::spawn(trigger, store, move || {
            let now = Utc::now().with_timezone(&offset);
            if std::mem::take(&mut first) {
                duration_until_next_midnight(now)
            } else {
                delay_until_next_run(now)
            }
        })
    }

    /// For testing: run now, after `first_delay`, then every `period`.
    #[cfg(test)]
    pub fn start_with<T>(
        trigger: T,
        store: Arc<SyncStateStore>,
        first_delay: Duration,
        period: Duration,
    ) -> Self
    where
        T: SyncTrigger + 'static,
    {
        let mut first = Some(first_delay);
        Self::spawn(trigger, store, move || first.take().unwrap_or(period))
    }

    fn spawn<T, F>(trigger: T, store: Arc<SyncStateStore>, next_delay: F) -> Self
    where
        T: SyncTrigger + 'static,
        F: FnMut() -> Duration + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(trigger, store, next_delay, cancel.clone()));
        Self { cancel, handle }
    }

    /// Cancel the pending deadline, then wait for the loop to exit. A run
    /// already in flight finishes on its own.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "scheduler loop ended abnormally");
        }
        tracing::info!("scheduler stopped");
    }
}

async fn run_schedule<T, F>(trigger: T, store: Arc<SyncStateStore>, mut next_delay: F, cancel: CancellationToken)
where
    T: SyncTrigger,
    F: FnMut() -> Duration,
{
    let mut delay = next_delay();
    let next_run = chrono::Duration::from_std(delay)
        .map(|delay| Utc::now() + delay)
        .unwrap_or_else(|_| Utc::now());
    tracing::info!(first_delay_secs = delay.as_secs(), "scheduler started");
    store
        .append_log(LogEntry::new(
            LogCategory::System,
            LogStatus::Info,
            format!("daily sync scheduled, next run at {}", next_run.to_rfc3339()),
        ))
        .await;

    trigger.trigger();

    // Run outcomes never reach this loop, so a failed run cannot disarm it.
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {
                tracing::info!("scheduled sync due");
                trigger.trigger();
            }
        }
        delay = next_delay();
        tracing::debug!(delay_secs = delay.as_secs(), "next sync armed");
    }
}
