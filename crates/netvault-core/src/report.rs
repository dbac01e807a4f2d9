//! Run report construction and rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{BackupRun, ChangeKind, ChangeRecord, ErrorKind, JobState, TriggerKind};

const RULE: &str = "----------------------------------------------------------------------";
const BANNER: &str = "======================================================================";

/// A failed device's final disposition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureEntry {
    pub device_name: String,
    pub hostname: String,
    pub error_kind: ErrorKind,
    pub message: String,
    pub attempt_count: u32,
}

/// Aggregated outcome of one backup run.
///
/// Built once from a finalized run; serializes to JSON so the CLI can
/// persist the most recent run for `status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub run_id: Uuid,
    pub triggered_by: TriggerKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub total_devices: usize,
    pub first_snapshot: usize,
    pub unchanged: usize,
    pub changed: usize,
    pub failed: usize,

    /// Change records for devices classified `changed`, in device order.
    pub changes: Vec<ChangeRecord>,
    pub failures: Vec<FailureEntry>,
    pub first_snapshot_devices: Vec<String>,
    pub unchanged_devices: Vec<String>,
}

impl Report {
    /// Build a report from a finalized run. Pure; no side effects.
    pub fn build(run: &BackupRun) -> Self {
        let mut report = Self {
            run_id: run.run_id,
            triggered_by: run.triggered_by,
            started_at: run.started_at,
            finished_at: run.finished_at,
            total_devices: run.target_devices.len(),
            first_snapshot: 0,
            unchanged: 0,
            changed: 0,
            failed: 0,
            changes: Vec::new(),
            failures: Vec::new(),
            first_snapshot_devices: Vec::new(),
            unchanged_devices: Vec::new(),
        };

        for job in run.jobs.values() {
            match job.state {
                JobState::Done => match &job.change_record {
                    Some(record) => match record.classification {
                        ChangeKind::FirstSnapshot => {
                            report.first_snapshot += 1;
                            report.first_snapshot_devices.push(job.device_name.clone());
                        }
                        ChangeKind::Unchanged => {
                            report.unchanged += 1;
                            report.unchanged_devices.push(job.device_name.clone());
                        }
                        ChangeKind::Changed => {
                            report.changed += 1;
                            report.changes.push(record.clone());
                        }
                    },
                    None => {
                        report.unchanged += 1;
                        report.unchanged_devices.push(job.device_name.clone());
                    }
                },
                _ => {
                    report.failed += 1;
                    let error = job.error.clone().unwrap_or(crate::domain::JobError {
                        kind: ErrorKind::Internal,
                        message: "job ended without a recorded error".to_string(),
                    });
                    report.failures.push(FailureEntry {
                        device_name: job.device_name.clone(),
                        hostname: job.hostname.clone(),
                        error_kind: error.kind,
                        message: error.message,
                        attempt_count: job.attempt_count,
                    });
                }
            }
        }

        report
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        match self.finished_at {
            Some(end) => (end - self.started_at).num_milliseconds().max(0) as f64 / 1000.0,
            None => 0.0,
        }
    }

    /// One-line outcome used for notification subjects.
    pub fn status_line(&self) -> &'static str {
        if self.failed > 0 {
            "FAILED"
        } else if self.changed > 0 || self.first_snapshot > 0 {
            "SUCCESS (changes detected)"
        } else {
            "SUCCESS (no changes)"
        }
    }

    /// Render the fixed-width text report printed to stdout and mailed to
    /// operators.
    pub fn render_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push(BANNER.to_string());
        lines.push("NETWORK DEVICE BACKUP REPORT".to_string());
        lines.push(BANNER.to_string());
        lines.push(format!("Run ID:     {}", self.run_id));
        lines.push(format!("Trigger:    {}", self.triggered_by));
        lines.push(format!(
            "Start Time: {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        if let Some(end) = self.finished_at {
            lines.push(format!("End Time:   {}", end.format("%Y-%m-%d %H:%M:%S UTC")));
        }
        lines.push(format!("Duration:   {:.1} seconds", self.duration_seconds()));
        lines.push(String::new());

        lines.push("SUMMARY".to_string());
        lines.push(RULE.to_string());
        lines.push(format!("Total Devices:    {}", self.total_devices));
        lines.push(format!("Failed:           {}", self.failed));
        lines.push(format!("Changed:          {}", self.changed));
        lines.push(format!("Unchanged:        {}", self.unchanged));
        lines.push(format!("First Snapshot:   {}", self.first_snapshot));
        lines.push(String::new());

        if !self.changes.is_empty() {
            lines.push("CHANGED CONFIGURATIONS".to_string());
            lines.push(RULE.to_string());
            for record in &self.changes {
                lines.push(format!("  * {}", record.device_name));
                if let Some(commit) = &record.new_commit_id {
                    lines.push(format!("    Commit: {}", &commit[..8.min(commit.len())]));
                }
                let preview: String = record.diff_text.chars().take(500).collect();
                for line in preview.lines() {
                    lines.push(format!("      {line}"));
                }
                lines.push(String::new());
            }
        }

        if !self.first_snapshot_devices.is_empty() {
            lines.push("FIRST SNAPSHOTS".to_string());
            lines.push(RULE.to_string());
            for device in &self.first_snapshot_devices {
                lines.push(format!("  * {device}"));
            }
            lines.push(String::new());
        }

        if !self.unchanged_devices.is_empty() {
            lines.push("UNCHANGED CONFIGURATIONS".to_string());
            lines.push(RULE.to_string());
            for device in &self.unchanged_devices {
                lines.push(format!("  * {device}"));
            }
            lines.push(String::new());
        }

        if !self.failures.is_empty() {
            lines.push("FAILED BACKUPS".to_string());
            lines.push(RULE.to_string());
            for failure in &self.failures {
                lines.push(format!(
                    "  * {} ({})",
                    failure.device_name, failure.hostname
                ));
                lines.push(format!(
                    "    Error: [{}] {} (after {} attempt(s))",
                    failure.error_kind.as_str(),
                    failure.message,
                    failure.attempt_count
                ));
                lines.push(String::new());
            }
        }

        lines.push(BANNER.to_string());
        lines.join("\n")
    }
}
