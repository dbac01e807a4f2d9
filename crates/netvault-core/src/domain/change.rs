//! Classified comparison between a fresh fetch and the last committed snapshot.

use serde::{Deserialize, Serialize};

/// How a fresh fetch relates to the device's stored history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    /// No prior snapshot exists for this device.
    FirstSnapshot,
    /// Content hash matches the last snapshot; nothing to store.
    Unchanged,
    /// Content differs from the last snapshot.
    Changed,
}

/// Output of change detection for one device, consumed by the report builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChangeRecord {
    pub device_name: String,

    /// Absent for a device's first-ever snapshot.
    pub previous_commit_id: Option<String>,

    /// Set once a commit is made; unchanged fetches never get one.
    pub new_commit_id: Option<String>,

    /// Full content for a first snapshot, a unified diff for a change,
    /// empty when unchanged.
    pub diff_text: String,

    pub classification: ChangeKind,
}

impl ChangeRecord {
    /// Whether this classification produces a new commit.
    pub fn requires_commit(&self) -> bool {
        matches!(
            self.classification,
            ChangeKind::FirstSnapshot | ChangeKind::Changed
        )
    }
}
