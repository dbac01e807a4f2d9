//! Committed configuration snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One immutable capture of a device's configuration text.
///
/// Created once per successful fetch-and-commit; never mutated. A newer
/// snapshot supersedes it; nothing is ever deleted from the history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub device_name: String,

    /// Raw configuration text as fetched from the device.
    pub content: String,

    /// SHA-256 of `content`, hex-encoded.
    pub content_hash: String,

    /// Opaque handle from the versioned repository (a git SHA here).
    pub commit_id: String,

    pub captured_at: DateTime<Utc>,
}

/// History listing entry for one snapshot; content is not loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub commit_id: String,
    pub message: String,
    pub captured_at: DateTime<Utc>,
}
