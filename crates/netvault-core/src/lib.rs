//! netvault Core Library
//!
//! Fleet configuration backup: bounded-concurrency orchestration of
//! per-device fetches, textual change detection, git-backed snapshot
//! history, and operator reporting.

pub mod config;
pub mod detect;
pub mod domain;
pub mod job;
pub mod notify;
pub mod obs;
pub mod orchestrator;
pub mod registry;
pub mod repo;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod telemetry;

pub use domain::{
    BackupError, BackupJob, BackupRun, ChangeKind, ChangeRecord, Credential, CredentialRef,
    Device, DeviceFilter, ErrorClass, ErrorKind, JobError, JobState, Result, Snapshot,
    SnapshotMeta, TriggerKind,
};

pub use config::{
    AppConfig, AppSettings, BackupSettings, EmailSettings, EnvSecretProvider, Inventory,
    LoggingSettings, NotificationSettings, ScheduleSettings, SecretProvider, SlackSettings,
};

pub use detect::{content_hash, ChangeDetector};
pub use job::{execute_job, JobContext};
pub use notify::{send_all, sinks_from_settings, slack_payload, EmailSink, NotificationSink, SlackSink};
pub use orchestrator::{BackupTarget, Orchestrator, OrchestratorConfig};
pub use registry::DeviceRegistry;
pub use repo::{GitRepository, VersionedRepository};
pub use report::{FailureEntry, Report};
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, SchedulerState, TickGuard};
pub use session::{
    show_command, DeviceSession, SessionFactory, SshDeviceSession, SshSessionFactory,
};
pub use telemetry::init_tracing;

/// netvault version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
