//! Domain types for fleet backup runs.

pub mod change;
pub mod device;
pub mod error;
pub mod run;
pub mod snapshot;

pub use change::{ChangeKind, ChangeRecord};
pub use device::{Credential, CredentialRef, Device, DeviceFilter};
pub use error::{BackupError, ErrorClass, ErrorKind, JobError, Result};
pub use run::{BackupJob, BackupRun, JobState, TriggerKind};
pub use snapshot::{Snapshot, SnapshotMeta};
