//! Device transport sessions.
//!
//! [`DeviceSession`] is the capability the orchestrator depends on; the
//! shipped implementation drives the system `ssh` binary, one subprocess
//! per operation. Vendor differences reduce to the command used to dump
//! the running configuration, selected by the device's type tag.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{BackupError, Credential, Device, Result};

/// Transport session for one device.
#[async_trait]
pub trait DeviceSession: Send {
    /// Open the session. Must succeed before [`DeviceSession::fetch_config`].
    async fn connect(&mut self) -> Result<()>;

    /// Retrieve the device's running configuration text.
    async fn fetch_config(&mut self) -> Result<String>;

    /// Close the session. Never fails.
    async fn disconnect(&mut self);
}

/// Builds a fresh session for a device; one implementation per deployment.
pub trait SessionFactory: Send + Sync {
    fn open(&self, device: &Device, credential: &Credential) -> Result<Box<dyn DeviceSession>>;
}

/// The command that dumps the running configuration for a vendor tag.
pub fn show_command(device_type: &str) -> Result<&'static str> {
    match device_type {
        "cisco_ios" | "cisco_xe" | "cisco_nxos" | "arista_eos" => Ok("show running-config"),
        "juniper_junos" => Ok("show configuration"),
        "hp_comware" | "aruba_aoscx" => Ok("display current-configuration"),
        "mikrotik_routeros" => Ok("/export"),
        other => Err(BackupError::UnsupportedDevice(other.to_string())),
    }
}

/// `ssh`-subprocess-backed session.
///
/// Authentication uses the SSH agent or keys by default; when the resolved
/// credential carries a password, the subprocess is wrapped in
/// `sshpass -e` with the secret passed through the `SSHPASS` environment
/// variable so it never appears on a command line.
pub struct SshDeviceSession {
    device: Device,
    credential: Credential,
    show_command: &'static str,
    connected: bool,
}

/// Factory producing [`SshDeviceSession`]s; unknown vendor tags fail fast.
pub struct SshSessionFactory;

impl SessionFactory for SshSessionFactory {
    fn open(&self, device: &Device, credential: &Credential) -> Result<Box<dyn DeviceSession>> {
        let show = show_command(&device.device_type)?;
        Ok(Box::new(SshDeviceSession {
            device: device.clone(),
            credential: credential.clone(),
            show_command: show,
            connected: false,
        }))
    }
}

impl SshDeviceSession {
    async fn run_remote(&self, remote_command: &str) -> Result<String> {
        let target = format!("{}@{}", self.credential.username, self.device.hostname);
        let port = self.device.port.to_string();

        let ssh_args = [
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=accept-new",
            "-p",
            port.as_str(),
            target.as_str(),
            remote_command,
        ];

        let mut command = if self.credential.password.is_empty() {
            let mut c = Command::new("ssh");
            c.args(ssh_args);
            c
        } else {
            let mut c = Command::new("sshpass");
            c.arg("-e")
                .arg("ssh")
                .args(ssh_args)
                .env("SSHPASS", &self.credential.password);
            c
        };

        let output = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackupError::Connection(format!("failed to spawn ssh: {e}")))?;

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        if stderr.contains("Permission denied") || stderr.contains("Authentication failed") {
            return Err(BackupError::Authentication(format!(
                "{}: {stderr}",
                self.device.name
            )));
        }
        Err(BackupError::Connection(format!(
            "{}: ssh exited with {}: {stderr}",
            self.device.name, output.status
        )))
    }
}

#[async_trait]
impl DeviceSession for SshDeviceSession {
    async fn connect(&mut self) -> Result<()> {
        debug!(device = %self.device.name, host = %self.device.hostname, "opening ssh session");
        self.run_remote("exit").await?;
        self.connected = true;
        Ok(())
    }

    async fn fetch_config(&mut self) -> Result<String> {
        if !self.connected {
            return Err(BackupError::Connection(format!(
                "{}: session not connected",
                self.device.name
            )));
        }
        let config = self.run_remote(self.show_command).await?;
        if config.trim().is_empty() {
            return Err(BackupError::Connection(format!(
                "{}: device returned an empty configuration",
                self.device.name
            )));
        }
        Ok(config)
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(device_type: &str) -> Device {
        Device {
            name: "sw-01".into(),
            hostname: "10.0.0.1".into(),
            device_type: device_type.into(),
            groups: vec![],
            enabled: true,
            port: 22,
        }
    }

    fn credential() -> Credential {
        Credential {
            username: "netops".into(),
            password: String::new(),
        }
    }

    #[test]
    fn show_command_covers_supported_vendors() {
        assert_eq!(show_command("cisco_ios").unwrap(), "show running-config");
        assert_eq!(show_command("juniper_junos").unwrap(), "show configuration");
        assert_eq!(
            show_command("hp_comware").unwrap(),
            "display current-configuration"
        );
        assert_eq!(show_command("mikrotik_routeros").unwrap(), "/export");
    }

    #[test]
    fn unknown_vendor_tag_is_unsupported() {
        let err = show_command("acme_os").unwrap_err();
        assert!(matches!(err, BackupError::UnsupportedDevice(tag) if tag == "acme_os"));
    }

    #[test]
    fn factory_rejects_unsupported_device_type() {
        let err = SshSessionFactory
            .open(&device("acme_os"), &credential())
            .err()
            .unwrap();
        assert!(matches!(err, BackupError::UnsupportedDevice(_)));
    }

    #[tokio::test]
    async fn fetch_before_connect_is_rejected() {
        let mut session = SshSessionFactory
            .open(&device("cisco_ios"), &credential())
            .unwrap();
        let err = session.fetch_config().await.unwrap_err();
        assert!(matches!(err, BackupError::Connection(_)));
    }
}
