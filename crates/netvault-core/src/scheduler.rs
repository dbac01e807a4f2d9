//! Cron-driven run scheduling with non-overlap.
//!
//! One `Scheduler` instance owns the lifecycle `Idle -> Armed -> Firing`;
//! there is no ambient global state. Scheduler-triggered runs never
//! overlap: a tick that lands while the previous one is still running is
//! skipped and logged, never queued. Manual runs are not serialized
//! against scheduled ones.

use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::info;

use crate::domain::{BackupError, Result};
use crate::obs;

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No cron expression loaded.
    Idle,
    /// Armed with a schedule, waiting for the next tick.
    Armed,
    /// A scheduler-triggered run is in flight.
    Firing,
}

/// Releases the non-overlap slot when the scheduled run finishes.
pub struct TickGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct Scheduler {
    schedule: Option<Schedule>,
    run_active: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and load a cron expression, moving the scheduler to `Armed`.
    pub fn arm(&mut self, cron_expression: &str) -> Result<()> {
        let schedule = Schedule::from_str(cron_expression).map_err(|e| {
            BackupError::Config(format!("invalid cron expression {cron_expression:?}: {e}"))
        })?;
        self.schedule = Some(schedule);
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        if self.run_active.load(Ordering::SeqCst) {
            SchedulerState::Firing
        } else if self.schedule.is_some() {
            SchedulerState::Armed
        } else {
            SchedulerState::Idle
        }
    }

    /// Next fire time strictly after `after`, or `None` for a schedule
    /// that never fires again.
    pub fn next_fire(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.as_ref()?.after(&after).next()
    }

    /// Claim the non-overlap slot for one tick.
    ///
    /// Returns a guard when the slot is free. `None` means the previous
    /// scheduled run is still in flight; the tick is skipped and logged.
    pub fn try_begin_tick(&self) -> Option<TickGuard> {
        if self.run_active.swap(true, Ordering::SeqCst) {
            obs::emit_tick_skipped();
            return None;
        }
        Some(TickGuard {
            flag: Arc::clone(&self.run_active),
        })
    }

    /// Run the cadence loop until ctrl-c.
    ///
    /// `launch` starts one full backup run and resolves when it finishes;
    /// each tick that wins the non-overlap slot spawns it. Shutdown is
    /// cooperative: an in-flight run is allowed to finish before this
    /// returns, so the repository is never left mid-commit.
    pub async fn run_daemon<F, Fut>(self, launch: F) -> Result<()>
    where
        F: Fn() -> Fut + Send,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.schedule.is_none() {
            return Err(BackupError::Config(
                "scheduler is not armed with a cron expression".to_string(),
            ));
        }

        info!("scheduler daemon started; press ctrl-c to stop");

        loop {
            let now = Utc::now();
            let Some(next) = self.next_fire(now) else {
                return Err(BackupError::Config(
                    "cron expression yields no future fire times".to_string(),
                ));
            };
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_fire = %next, "waiting for next scheduled run");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown requested");
                    break;
                }
            }

            if let Some(guard) = self.try_begin_tick() {
                let run = launch();
                tokio::spawn(async move {
                    run.await;
                    drop(guard);
                });
            }
        }

        // Let an in-flight run drain before returning.
        while self.run_active.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        info!("scheduler daemon stopped");
        Ok(())
    }
}
