//! Versioned snapshot storage.
//!
//! The orchestrator depends on the [`VersionedRepository`] capability;
//! [`GitRepository`] implements it by shelling out to the `git` binary.
//! Layout is one file per device (`<device>/running-config`), which gives
//! each device its own logical history stream; the commit subject carries
//! the device name and capture timestamp.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::detect::content_hash;
use crate::domain::{BackupError, Result, Snapshot, SnapshotMeta};

/// Append-only per-device snapshot history.
#[async_trait]
pub trait VersionedRepository: Send + Sync {
    /// Most recent committed snapshot for a device, if any.
    async fn latest_snapshot(&self, device_name: &str) -> Result<Option<Snapshot>>;

    /// Durably append a new snapshot. Commit operations for one device
    /// name are mutually exclusive, including across overlapping runs.
    async fn commit_snapshot(
        &self,
        device_name: &str,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<Snapshot>;

    /// Snapshot metadata for a device, oldest first.
    async fn history(&self, device_name: &str, limit: usize) -> Result<Vec<SnapshotMeta>>;

    /// Textual diff between the two most recent snapshots, if at least two
    /// exist.
    async fn diff_latest(&self, device_name: &str) -> Result<Option<String>>;
}

pub struct GitRepository {
    root: PathBuf,
    /// Serializes commits. The git index is repository-wide, so this also
    /// enforces the per-device commit exclusivity contract.
    commit_lock: Mutex<()>,
}

impl GitRepository {
    /// Open an existing repository, or initialize a new one with an
    /// initial commit.
    pub async fn open_or_init(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(BackupError::Io)?;

        let repo = Self {
            root,
            commit_lock: Mutex::new(()),
        };

        if repo.root.join(".git").exists() {
            debug!(path = %repo.root.display(), "opened existing backup repository");
            return Ok(repo);
        }

        repo.git(&["init"]).await.map_err(BackupError::Repository)?;
        repo.git(&["config", "user.name", "netvault"])
            .await
            .map_err(BackupError::Repository)?;
        repo.git(&["config", "user.email", "netvault@localhost"])
            .await
            .map_err(BackupError::Repository)?;

        let readme = repo.root.join("README.md");
        tokio::fs::write(
            &readme,
            "# Device Configuration Backups\n\nRunning-config snapshots collected by netvault.\n",
        )
        .await
        .map_err(BackupError::Io)?;
        repo.git(&["add", "README.md"])
            .await
            .map_err(BackupError::Repository)?;
        repo.git(&["commit", "-m", "Initial commit"])
            .await
            .map_err(BackupError::Repository)?;
        info!(path = %repo.root.display(), "initialized backup repository");

        Ok(repo)
    }

    fn device_path(device_name: &str) -> String {
        format!("{device_name}/running-config")
    }

    async fn git(&self, args: &[&str]) -> std::result::Result<String, String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run git: {e}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Capture time for a snapshot: the timestamp embedded in the commit
    /// subject when present, the author date otherwise.
    fn capture_time(subject: &str, author_date: &str) -> Option<DateTime<Utc>> {
        subject
            .rsplit_once(": ")
            .and_then(|(_, ts)| DateTime::parse_from_rfc3339(ts).ok())
            .or_else(|| DateTime::parse_from_rfc3339(author_date).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

#[async_trait]
impl VersionedRepository for GitRepository {
    async fn latest_snapshot(&self, device_name: &str) -> Result<Option<Snapshot>> {
        let rel = Self::device_path(device_name);
        let log = self
            .git(&["log", "-n", "1", "--format=%H%x09%aI%x09%s", "--", rel.as_str()])
            .await
            .map_err(BackupError::Repository)?;
        let line = log.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let mut parts = line.splitn(3, '\t');
        let (commit_id, author_date, subject) =
            match (parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(d), Some(s)) => (h, d, s),
                _ => {
                    return Err(BackupError::Repository(format!(
                        "unparseable log line: {line}"
                    )))
                }
            };

        let captured_at = Self::capture_time(subject, author_date).ok_or_else(|| {
            BackupError::Repository(format!("unparseable commit timestamp: {line}"))
        })?;

        let rev_path = format!("{commit_id}:{rel}");
        let content = self
            .git(&["show", rev_path.as_str()])
            .await
            .map_err(BackupError::Repository)?;

        Ok(Some(Snapshot {
            device_name: device_name.to_string(),
            content_hash: content_hash(&content),
            content,
            commit_id: commit_id.to_string(),
            captured_at,
        }))
    }

    async fn commit_snapshot(
        &self,
        device_name: &str,
        content: &str,
        captured_at: DateTime<Utc>,
    ) -> Result<Snapshot> {
        let _guard = self.commit_lock.lock().await;

        let rel = Self::device_path(device_name);
        let abs = self.root.join(&rel);
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BackupError::Commit(format!("{device_name}: {e}")))?;
        }
        tokio::fs::write(&abs, content)
            .await
            .map_err(|e| BackupError::Commit(format!("{device_name}: {e}")))?;

        self.git(&["add", rel.as_str()])
            .await
            .map_err(BackupError::Commit)?;

        // `git commit` with nothing staged would fail; an identical write
        // is treated as already committed.
        let staged = Command::new("git")
            .args(["diff", "--cached", "--quiet", "--", rel.as_str()])
            .current_dir(&self.root)
            .status()
            .await
            .map_err(|e| BackupError::Commit(format!("failed to run git: {e}")))?;

        if !staged.success() {
            let message = format!("backup({device_name}): {}", captured_at.to_rfc3339());
            self.git(&["commit", "-m", message.as_str()])
                .await
                .map_err(BackupError::Commit)?;
        }

        let commit_id = self
            .git(&["rev-parse", "HEAD"])
            .await
            .map_err(BackupError::Commit)?
            .trim()
            .to_string();

        info!(
            device = %device_name,
            commit = %&commit_id[..8.min(commit_id.len())],
            "snapshot committed"
        );

        Ok(Snapshot {
            device_name: device_name.to_string(),
            content: content.to_string(),
            content_hash: content_hash(content),
            commit_id,
            captured_at,
        })
    }

    async fn history(&self, device_name: &str, limit: usize) -> Result<Vec<SnapshotMeta>> {
        let rel = Self::device_path(device_name);
        let limit_arg = limit.to_string();
        let log = self
            .git(&[
                "log",
                "-n",
                limit_arg.as_str(),
                "--format=%H%x09%aI%x09%s",
                "--",
                rel.as_str(),
            ])
            .await
            .map_err(BackupError::Repository)?;

        let mut entries = Vec::new();
        for line in log.lines() {
            let mut parts = line.splitn(3, '\t');
            let (commit_id, author_date, subject) =
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(h), Some(d), Some(s)) => (h, d, s),
                    _ => continue,
                };
            let captured_at = Self::capture_time(subject, author_date).ok_or_else(|| {
                BackupError::Repository(format!("unparseable commit timestamp: {line}"))
            })?;
            entries.push(SnapshotMeta {
                commit_id: commit_id.to_string(),
                message: subject.to_string(),
                captured_at,
            });
        }

        // git log lists newest first; callers want oldest first.
        entries.reverse();
        Ok(entries)
    }

    async fn diff_latest(&self, device_name: &str) -> Result<Option<String>> {
        let rel = Self::device_path(device_name);
        let log = self
            .git(&["log", "-n", "2", "--format=%H", "--", rel.as_str()])
            .await
            .map_err(BackupError::Repository)?;
        let commits: Vec<&str> = log.lines().collect();
        if commits.len() < 2 {
            return Ok(None);
        }

        let diff = self
            .git(&["diff", commits[1], commits[0], "--", rel.as_str()])
            .await
            .map_err(BackupError::Repository)?;
        Ok(Some(diff))
    }
}
