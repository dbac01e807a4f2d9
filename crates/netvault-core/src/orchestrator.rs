//! Bounded fan-out of backup jobs across a device fleet.
//!
//! One spawned task per target device; a semaphore bounds how many
//! attempts are active at once. Job results land in a shared map keyed by
//! device name, and a run-level deadline guarantees the run always
//! completes even when a device wedges.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tracing::warn;

use crate::config::BackupSettings;
use crate::domain::{
    BackupError, BackupJob, BackupRun, Credential, Device, ErrorKind, JobError, Result,
    TriggerKind,
};
use crate::job::{execute_job, JobContext};
use crate::obs;
use crate::report::Report;
use crate::repo::VersionedRepository;
use crate::retry::RetryPolicy;
use crate::session::SessionFactory;

/// Tuning knobs for one run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_concurrent_backups: usize,
    pub per_device_timeout: Duration,
    pub retry_policy: RetryPolicy,
    pub run_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_backups: 3,
            per_device_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            run_deadline: Duration::from_secs(900),
        }
    }
}

impl From<&BackupSettings> for OrchestratorConfig {
    fn from(settings: &BackupSettings) -> Self {
        Self {
            max_concurrent_backups: settings.concurrent_backups.max(1),
            per_device_timeout: Duration::from_secs(settings.timeout_seconds),
            retry_policy: RetryPolicy {
                max_retries: settings.retry_attempts,
                backoff_base: Duration::from_secs(settings.backoff_base_seconds),
                ..RetryPolicy::default()
            },
            run_deadline: Duration::from_secs(settings.run_deadline_seconds),
        }
    }
}

/// One device plus its resolved credential, ready to back up.
pub struct BackupTarget {
    pub device: Device,
    pub credential: Credential,
}

pub struct Orchestrator {
    repository: Arc<dyn VersionedRepository>,
    sessions: Arc<dyn SessionFactory>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        repository: Arc<dyn VersionedRepository>,
        sessions: Arc<dyn SessionFactory>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            repository,
            sessions,
            config,
        }
    }

    /// Execute one backup batch.
    ///
    /// Always returns a finalized run with a terminal job entry for every
    /// target device. Individual device failures never abort the batch;
    /// when the run deadline elapses, unfinished jobs are aborted and
    /// recorded as timed out.
    pub async fn run(&self, targets: Vec<BackupTarget>, triggered_by: TriggerKind) -> BackupRun {
        let deadline = Utc::now()
            + chrono::Duration::from_std(self.config.run_deadline)
                .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let target_names: Vec<String> = targets.iter().map(|t| t.device.name.clone()).collect();
        let hostnames: BTreeMap<String, String> = targets
            .iter()
            .map(|t| (t.device.name.clone(), t.device.hostname.clone()))
            .collect();

        let mut run = BackupRun::new(triggered_by, target_names, deadline);
        obs::emit_run_started(
            &run.run_id.to_string(),
            &triggered_by.to_string(),
            run.target_devices.len(),
        );

        let pool = Arc::new(Semaphore::new(self.config.max_concurrent_backups));
        let results: Arc<Mutex<BTreeMap<String, BackupJob>>> =
            Arc::new(Mutex::new(BTreeMap::new()));

        let mut tasks = Vec::new();
        for target in targets {
            let ctx = JobContext {
                repository: Arc::clone(&self.repository),
                pool: Arc::clone(&pool),
                retry_policy: self.config.retry_policy.clone(),
                per_device_timeout: self.config.per_device_timeout,
            };
            let sessions = Arc::clone(&self.sessions);
            let results = Arc::clone(&results);

            tasks.push(tokio::spawn(async move {
                let job =
                    execute_job(&target.device, &target.credential, sessions.as_ref(), &ctx).await;
                results.lock().await.insert(job.device_name.clone(), job);
            }));
        }

        tokio::select! {
            _ = async {
                for task in tasks.iter_mut() {
                    let _ = task.await;
                }
            } => {}
            _ = tokio::time::sleep(self.config.run_deadline) => {
                warn!(
                    run_id = %run.run_id,
                    "run deadline elapsed; failing unfinished jobs"
                );
            }
        }
        for task in &tasks {
            task.abort();
        }

        let mut jobs = results.lock().await.clone();
        for (name, hostname) in &hostnames {
            jobs.entry(name.clone()).or_insert_with(|| {
                let mut job = BackupJob::new(name, hostname);
                job.finish_failed(JobError {
                    kind: ErrorKind::Timeout,
                    message: "run deadline elapsed before the job finished".to_string(),
                });
                job
            });
        }

        run.jobs = jobs;
        run.finalize();

        let report = Report::build(&run);
        obs::emit_run_finished(
            &run.run_id.to_string(),
            run.duration_ms(),
            report.changed,
            report.failed,
        );

        run
    }

    /// Connect-only reachability probe; no fetch, no detection, no commit.
    pub async fn test_connection(&self, target: &BackupTarget) -> Result<()> {
        let mut session = self.sessions.open(&target.device, &target.credential)?;
        let outcome =
            tokio::time::timeout(self.config.per_device_timeout, session.connect()).await;
        session.disconnect().await;
        match outcome {
            Ok(result) => result,
            Err(_) => Err(BackupError::Timeout(format!(
                "{}: connect exceeded {}s",
                target.device.name,
                self.config.per_device_timeout.as_secs()
            ))),
        }
    }
}
