//! Per-run and per-job records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::change::ChangeRecord;
use super::error::JobError;

/// Lifecycle of one device's backup attempt within a run.
///
/// `PENDING -> CONNECTING -> FETCHING -> DETECTING -> COMMITTING -> DONE`,
/// with `FAILED` reachable from the connect, fetch, and commit stages.
/// A transiently failed job re-enters `PENDING` for its backoff wait.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Pending,
    Connecting,
    Fetching,
    Detecting,
    Committing,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobState::Pending => "PENDING",
            JobState::Connecting => "CONNECTING",
            JobState::Fetching => "FETCHING",
            JobState::Detecting => "DETECTING",
            JobState::Committing => "COMMITTING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// What started a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Schedule,
    Manual,
    Filter,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TriggerKind::Schedule => "schedule",
            TriggerKind::Manual => "manual",
            TriggerKind::Filter => "filter",
        };
        f.write_str(name)
    }
}

/// One device's unit of work within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupJob {
    pub device_name: String,
    pub hostname: String,
    pub state: JobState,
    pub attempt_count: u32,
    pub error: Option<JobError>,
    pub change_record: Option<ChangeRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BackupJob {
    pub fn new(device_name: &str, hostname: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            hostname: hostname.to_string(),
            state: JobState::Pending,
            attempt_count: 0,
            error: None,
            change_record: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Terminate the job successfully with its change record attached.
    pub fn finish_done(&mut self, record: ChangeRecord) {
        self.state = JobState::Done;
        self.change_record = Some(record);
        self.finished_at = Some(Utc::now());
    }

    /// Terminate the job with a failure.
    pub fn finish_failed(&mut self, error: JobError) {
        self.state = JobState::Failed;
        self.error = Some(error);
        self.finished_at = Some(Utc::now());
    }
}

/// One batch execution over a set of target devices.
///
/// Finalized exactly once, after every job reaches a terminal state or the
/// run deadline elapses; immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupRun {
    pub run_id: Uuid,
    pub triggered_by: TriggerKind,

    /// Targets in inventory order.
    pub target_devices: Vec<String>,

    /// One terminal entry per target device, keyed by device name.
    pub jobs: BTreeMap<String, BackupJob>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deadline: DateTime<Utc>,
}

impl BackupRun {
    pub fn new(triggered_by: TriggerKind, target_devices: Vec<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            triggered_by,
            target_devices,
            jobs: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
            deadline,
        }
    }

    pub fn failed_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|j| j.state == JobState::Failed)
            .count()
    }

    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn finalize(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self.finished_at {
            Some(end) => (end - self.started_at).num_milliseconds().max(0) as u64,
            None => 0,
        }
    }
}
