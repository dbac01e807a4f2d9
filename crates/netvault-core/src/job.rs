//! Backup job state machine.
//!
//! One task drives one device through
//! `PENDING -> CONNECTING -> FETCHING -> DETECTING -> COMMITTING -> DONE`.
//! The worker-pool permit is held for the duration of a single attempt and
//! released before any backoff sleep, so a backing-off device never holds
//! a slot that a pending device could use.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::detect::ChangeDetector;
use crate::domain::{
    BackupError, BackupJob, ChangeRecord, Credential, Device, ErrorKind, JobError, JobState,
    Result,
};
use crate::obs;
use crate::repo::VersionedRepository;
use crate::retry::RetryPolicy;
use crate::session::SessionFactory;

/// Everything a job needs besides the device itself.
pub struct JobContext {
    pub repository: Arc<dyn VersionedRepository>,
    pub pool: Arc<Semaphore>,
    pub retry_policy: RetryPolicy,

    /// Wall-clock budget for one attempt (connect + fetch + commit).
    /// Retries each get a fresh budget.
    pub per_device_timeout: Duration,
}

/// Drive one device's backup to a terminal state.
///
/// Per-device errors are absorbed into the returned job; nothing escapes
/// to the caller, so a failing device can never abort its siblings.
pub async fn execute_job(
    device: &Device,
    credential: &Credential,
    factory: &dyn SessionFactory,
    ctx: &JobContext,
) -> BackupJob {
    let mut job = BackupJob::new(&device.name, &device.hostname);

    loop {
        let permit = match ctx.pool.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                // Pool closed: the run is shutting down.
                job.finish_failed(JobError {
                    kind: ErrorKind::Timeout,
                    message: "run cancelled before the job could finish".to_string(),
                });
                return job;
            }
        };

        job.attempt_count += 1;
        let attempt = job.attempt_count;
        debug!(device = %device.name, attempt, "starting backup attempt");

        let outcome = tokio::time::timeout(
            ctx.per_device_timeout,
            run_attempt(device, credential, factory, ctx, &mut job),
        )
        .await;
        drop(permit);

        let error = match outcome {
            Ok(Ok(record)) => {
                job.finish_done(record);
                obs::emit_job_finished(&device.name, &job.state.to_string(), attempt);
                return job;
            }
            Ok(Err(error)) => error,
            Err(_) => BackupError::Timeout(format!(
                "{}: attempt exceeded {}s",
                device.name,
                ctx.per_device_timeout.as_secs()
            )),
        };

        obs::emit_attempt_failed(&device.name, attempt, &error);

        if ctx.retry_policy.should_retry(&error, attempt) {
            job.state = JobState::Pending;
            let delay = ctx.retry_policy.delay(attempt - 1);
            debug!(
                device = %device.name,
                delay_ms = delay.as_millis() as u64,
                "backing off before retry"
            );
            // Slot already released; only this job waits.
            tokio::time::sleep(delay).await;
            continue;
        }

        job.finish_failed(JobError::from(&error));
        obs::emit_job_finished(&device.name, &job.state.to_string(), attempt);
        return job;
    }
}

/// One pass through the state machine: connect, fetch, detect, and commit
/// when the content warrants it.
async fn run_attempt(
    device: &Device,
    credential: &Credential,
    factory: &dyn SessionFactory,
    ctx: &JobContext,
    job: &mut BackupJob,
) -> Result<ChangeRecord> {
    job.state = JobState::Connecting;
    let mut session = factory.open(device, credential)?;
    session.connect().await?;

    job.state = JobState::Fetching;
    let fetched = match session.fetch_config().await {
        Ok(text) => text,
        Err(error) => {
            session.disconnect().await;
            return Err(error);
        }
    };
    session.disconnect().await;

    job.state = JobState::Detecting;
    let previous = ctx.repository.latest_snapshot(&device.name).await?;
    let mut record = ChangeDetector::classify(&device.name, &fetched, previous.as_ref());

    if !record.requires_commit() {
        debug!(device = %device.name, "configuration unchanged, skipping commit");
        return Ok(record);
    }

    job.state = JobState::Committing;
    let snapshot = ctx
        .repository
        .commit_snapshot(&device.name, &fetched, Utc::now())
        .await?;
    record.new_commit_id = Some(snapshot.commit_id);

    Ok(record)
}
