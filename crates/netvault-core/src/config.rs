//! Inventory and settings loading.
//!
//! Two YAML files live under the configuration directory:
//! - `devices.yaml` — device inventory plus credential environment references
//! - `settings.yaml` — backup, schedule, notification, and logging settings
//!
//! Secrets never appear in either file. The inventory names environment
//! variables and a [`SecretProvider`] resolves them when a session or sink
//! is constructed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{BackupError, Credential, CredentialRef, Device, Result};

/// Resolves a named secret reference to its value.
///
/// Injected wherever credentials are needed so an alternate secret store
/// can be substituted without touching the core.
pub trait SecretProvider: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String>;
}

/// Environment-variable-backed secret provider.
pub struct EnvSecretProvider;

impl SecretProvider for EnvSecretProvider {
    fn resolve(&self, reference: &str) -> Result<String> {
        std::env::var(reference).map_err(|_| {
            BackupError::Config(format!("environment variable {reference} is not set"))
        })
    }
}

/// Parsed `devices.yaml`: the device fleet and its credential references.
#[derive(Debug, Clone, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub devices: Vec<Device>,

    /// Entry name -> environment references. A device-specific entry wins
    /// over the `default` entry.
    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialRef>,
}

impl Inventory {
    pub fn credential_ref(&self, device_name: &str) -> Result<&CredentialRef> {
        self.credentials
            .get(device_name)
            .or_else(|| self.credentials.get("default"))
            .ok_or_else(|| {
                BackupError::Config(format!(
                    "no credentials configured for device {device_name}"
                ))
            })
    }

    pub fn resolve_credential(
        &self,
        device_name: &str,
        secrets: &dyn SecretProvider,
    ) -> Result<Credential> {
        let cred_ref = self.credential_ref(device_name)?;
        Ok(Credential {
            username: secrets.resolve(&cred_ref.username_env)?,
            password: secrets.resolve(&cred_ref.password_env)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    pub repository_path: PathBuf,

    /// Where run artifacts (e.g. the last run's report) are written.
    pub state_dir: PathBuf,

    pub concurrent_backups: usize,

    /// Wall-clock budget for one attempt (connect + fetch + commit).
    pub timeout_seconds: u64,

    pub retry_attempts: u32,
    pub backoff_base_seconds: u64,

    /// Overall deadline for one run; unfinished jobs are failed when it
    /// elapses.
    pub run_deadline_seconds: u64,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            repository_path: PathBuf::from("./backups/repo"),
            state_dir: PathBuf::from("./state"),
            concurrent_backups: 3,
            timeout_seconds: 30,
            retry_attempts: 3,
            backoff_base_seconds: 5,
            run_deadline_seconds: 900,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub enabled: bool,

    /// Seven-field cron expression (seconds first), e.g. `0 0 2 * * *`.
    pub cron_expression: String,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cron_expression: "0 0 2 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub to_addresses: Vec<String>,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_server: String::new(),
            smtp_port: 587,
            from_address: String::new(),
            to_addresses: Vec::new(),
            username_env: None,
            password_env: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackSettings {
    pub enabled: bool,
    pub webhook_url_env: String,
}

impl Default for SlackSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url_env: "NETVAULT_SLACK_WEBHOOK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email: EmailSettings,
    pub slack: SlackSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default tracing level when `RUST_LOG` is not set.
    pub level: String,

    /// Emit newline-delimited JSON log lines.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Parsed `settings.yaml`. Every section falls back to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub backup: BackupSettings,
    pub schedule: ScheduleSettings,
    pub notifications: NotificationSettings,
    pub logging: LoggingSettings,
}

/// Everything loaded from the configuration directory.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub inventory: Inventory,
    pub settings: AppSettings,
}

impl AppConfig {
    /// Load `devices.yaml` (required) and `settings.yaml` (optional) from
    /// `config_dir`.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let devices_path = config_dir.join("devices.yaml");
        let raw = std::fs::read_to_string(&devices_path).map_err(|e| {
            BackupError::Config(format!(
                "cannot read {}: {e} (copy devices.yaml.example and configure your fleet)",
                devices_path.display()
            ))
        })?;
        let inventory: Inventory = serde_yaml::from_str(&raw)
            .map_err(|e| BackupError::Config(format!("invalid {}: {e}", devices_path.display())))?;

        let settings_path = config_dir.join("settings.yaml");
        let settings = if settings_path.exists() {
            let raw = std::fs::read_to_string(&settings_path).map_err(|e| {
                BackupError::Config(format!("cannot read {}: {e}", settings_path.display()))
            })?;
            serde_yaml::from_str(&raw).map_err(|e| {
                BackupError::Config(format!("invalid {}: {e}", settings_path.display()))
            })?
        } else {
            AppSettings::default()
        };

        Ok(Self {
            inventory,
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapSecretProvider(Mutex<HashMap<String, String>>);

    impl MapSecretProvider {
        fn new(pairs: &[(&str, &str)]) -> Self {
            Self(Mutex::new(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ))
        }
    }

    impl SecretProvider for MapSecretProvider {
        fn resolve(&self, reference: &str) -> Result<String> {
            self.0
                .lock()
                .unwrap()
                .get(reference)
                .cloned()
                .ok_or_else(|| BackupError::Config(format!("{reference} not set")))
        }
    }

    const DEVICES_YAML: &str = r#"
devices:
  - name: sw-01
    hostname: 10.0.0.1
    device_type: cisco_ios
    groups: [core]
  - name: fw-01
    hostname: 10.0.1.1
    device_type: juniper_junos
    enabled: false

credentials:
  default:
    username_env: NET_USER
    password_env: NET_PASS
  fw-01:
    username_env: FW_USER
    password_env: FW_PASS
"#;

    #[test]
    fn inventory_parses_devices_and_credentials() {
        let inventory: Inventory = serde_yaml::from_str(DEVICES_YAML).unwrap();
        assert_eq!(inventory.devices.len(), 2);
        assert!(!inventory.devices[1].enabled);
        assert_eq!(
            inventory.credential_ref("sw-01").unwrap().username_env,
            "NET_USER"
        );
        assert_eq!(
            inventory.credential_ref("fw-01").unwrap().username_env,
            "FW_USER"
        );
    }

    #[test]
    fn resolve_credential_uses_device_override() {
        let inventory: Inventory = serde_yaml::from_str(DEVICES_YAML).unwrap();
        let secrets = MapSecretProvider::new(&[
            ("NET_USER", "netops"),
            ("NET_PASS", "s3cret"),
            ("FW_USER", "fwadmin"),
            ("FW_PASS", "fw-s3cret"),
        ]);

        let default_cred = inventory.resolve_credential("sw-01", &secrets).unwrap();
        assert_eq!(default_cred.username, "netops");

        let override_cred = inventory.resolve_credential("fw-01", &secrets).unwrap();
        assert_eq!(override_cred.username, "fwadmin");
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let inventory: Inventory = serde_yaml::from_str(DEVICES_YAML).unwrap();
        let secrets = MapSecretProvider::new(&[]);
        let err = inventory.resolve_credential("sw-01", &secrets).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn settings_sections_fall_back_to_defaults() {
        let settings: AppSettings = serde_yaml::from_str("backup:\n  concurrent_backups: 8\n").unwrap();
        assert_eq!(settings.backup.concurrent_backups, 8);
        assert_eq!(settings.backup.timeout_seconds, 30);
        assert!(!settings.schedule.enabled);
        assert_eq!(settings.notifications.email.smtp_port, 587);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn load_errors_on_missing_devices_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(dir.path()).unwrap_err();
        assert!(matches!(err, BackupError::Config(_)));
    }

    #[test]
    fn load_reads_both_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("devices.yaml"), DEVICES_YAML).unwrap();
        std::fs::write(
            dir.path().join("settings.yaml"),
            "backup:\n  retry_attempts: 1\nschedule:\n  enabled: true\n",
        )
        .unwrap();

        let config = AppConfig::load(dir.path()).unwrap();
        assert_eq!(config.inventory.devices.len(), 2);
        assert_eq!(config.settings.backup.retry_attempts, 1);
        assert!(config.settings.schedule.enabled);
    }
}
