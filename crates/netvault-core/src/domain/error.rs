//! Error taxonomy for backup operations.

use serde::{Deserialize, Serialize};

/// How an error responds to retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to resolve on retry (network-level).
    Transient,
    /// Retrying cannot help (credentials, platform, storage).
    Fatal,
}

/// Errors produced while backing up a fleet.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("unsupported device type: {0}")]
    UnsupportedDevice(String),

    #[error("commit failed: {0}")]
    Commit(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("no enabled devices in group: {0}")]
    EmptyGroup(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackupError {
    /// Retry classification for this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            BackupError::Connection(_) | BackupError::Timeout(_) => ErrorClass::Transient,
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether this error aborts a whole run before any job is dispatched.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            BackupError::UnknownDevice(_) | BackupError::EmptyGroup(_) | BackupError::Config(_)
        )
    }
}

/// Result type for backup operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Serializable error tag carried on failed jobs and surfaced in reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Timeout,
    Authentication,
    UnsupportedDevice,
    Commit,
    Config,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "connection",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Authentication => "authentication",
            ErrorKind::UnsupportedDevice => "unsupported_device",
            ErrorKind::Commit => "commit",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Final error attached to a failed job: kind tag plus a human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&BackupError> for JobError {
    fn from(err: &BackupError) -> Self {
        let kind = match err {
            BackupError::Connection(_) => ErrorKind::Connection,
            BackupError::Timeout(_) => ErrorKind::Timeout,
            BackupError::Authentication(_) => ErrorKind::Authentication,
            BackupError::UnsupportedDevice(_) => ErrorKind::UnsupportedDevice,
            BackupError::Commit(_) | BackupError::Repository(_) => ErrorKind::Commit,
            BackupError::UnknownDevice(_) | BackupError::EmptyGroup(_) | BackupError::Config(_) => {
                ErrorKind::Config
            }
            BackupError::Io(_) | BackupError::Serialization(_) => ErrorKind::Internal,
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_classify_as_transient() {
        assert_eq!(
            BackupError::Connection("refused".into()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            BackupError::Timeout("30s elapsed".into()).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn fatal_errors_classify_as_fatal() {
        assert_eq!(
            BackupError::Authentication("bad password".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            BackupError::UnsupportedDevice("acme_os".into()).class(),
            ErrorClass::Fatal
        );
        assert_eq!(
            BackupError::Commit("index locked".into()).class(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn selection_errors_are_run_fatal() {
        assert!(BackupError::UnknownDevice("ghost".into()).is_run_fatal());
        assert!(BackupError::EmptyGroup("empty".into()).is_run_fatal());
        assert!(!BackupError::Connection("refused".into()).is_run_fatal());
    }

    #[test]
    fn job_error_carries_kind_and_message() {
        let err = BackupError::Authentication("bad password for sw-01".into());
        let job_err = JobError::from(&err);
        assert_eq!(job_err.kind, ErrorKind::Authentication);
        assert!(job_err.message.contains("bad password for sw-01"));
    }

    #[test]
    fn job_error_serde_roundtrip() {
        let job_err = JobError {
            kind: ErrorKind::Timeout,
            message: "attempt exceeded 30s".into(),
        };
        let json = serde_json::to_string(&job_err).unwrap();
        assert!(json.contains("\"timeout\""));
        let back: JobError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job_err);
    }
}
