//! Device inventory records and run-target selection.

use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    22
}

fn default_enabled() -> bool {
    true
}

/// One network device in the registry. Immutable for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    /// Unique identity within the registry.
    pub name: String,

    /// Address the transport connects to.
    pub hostname: String,

    /// Vendor/platform tag; selects the session dialect.
    pub device_type: String,

    /// Group memberships used by group filters.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Disabled devices are excluded from fleet-wide selection.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Device {
    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}

/// Named environment references used to resolve a device's credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CredentialRef {
    pub username_env: String,
    pub password_env: String,
}

/// A resolved username/secret pair.
///
/// The secret never leaves this struct: it is not serializable and the
/// `Debug` impl redacts it.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Selects which devices a run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceFilter {
    /// Every enabled device in the registry.
    AllEnabled,
    /// A single device selected by name (may be disabled; the operator
    /// asked for it explicitly).
    Name(String),
    /// All enabled devices in a group.
    Group(String),
}
