//! Change detection between a fresh fetch and the last committed snapshot.

use sha2::{Digest, Sha256};
use similar::TextDiff;

use crate::domain::{ChangeKind, ChangeRecord, Snapshot};

/// SHA-256 content hash, hex-encoded.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Classifies fetched configuration text against a device's stored history.
pub struct ChangeDetector;

impl ChangeDetector {
    /// Classify `new_content` against the device's last committed snapshot.
    ///
    /// The hash comparison runs before any diff is computed, so the common
    /// unchanged case costs one hash instead of a full line diff.
    pub fn classify(
        device_name: &str,
        new_content: &str,
        previous: Option<&Snapshot>,
    ) -> ChangeRecord {
        let Some(prev) = previous else {
            return ChangeRecord {
                device_name: device_name.to_string(),
                previous_commit_id: None,
                new_commit_id: None,
                diff_text: new_content.to_string(),
                classification: ChangeKind::FirstSnapshot,
            };
        };

        if content_hash(new_content) == prev.content_hash {
            return ChangeRecord {
                device_name: device_name.to_string(),
                previous_commit_id: Some(prev.commit_id.clone()),
                new_commit_id: None,
                diff_text: String::new(),
                classification: ChangeKind::Unchanged,
            };
        }

        let diff = TextDiff::from_lines(prev.content.as_str(), new_content);
        let diff_text = diff
            .unified_diff()
            .context_radius(3)
            .header("previous", "current")
            .to_string();

        ChangeRecord {
            device_name: device_name.to_string(),
            previous_commit_id: Some(prev.commit_id.clone()),
            new_commit_id: None,
            diff_text,
            classification: ChangeKind::Changed,
        }
    }
}
