//! Read-only device catalog with filtered selection.

use crate::domain::{BackupError, Device, DeviceFilter, Result};

/// Static catalog of devices loaded from the inventory file.
///
/// Read-only to the orchestrator; no run mutates it.
pub struct DeviceRegistry {
    devices: Vec<Device>,
}

impl DeviceRegistry {
    pub fn new(devices: Vec<Device>) -> Self {
        Self { devices }
    }

    pub fn all(&self) -> &[Device] {
        &self.devices
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Select devices for a run. Order follows the inventory file.
    ///
    /// An explicit name that matches nothing and a group with zero enabled
    /// devices are configuration errors, raised before any job is
    /// dispatched.
    pub fn list(&self, filter: &DeviceFilter) -> Result<Vec<Device>> {
        match filter {
            DeviceFilter::AllEnabled => {
                Ok(self.devices.iter().filter(|d| d.enabled).cloned().collect())
            }
            DeviceFilter::Name(name) => {
                let device = self
                    .get(name)
                    .ok_or_else(|| BackupError::UnknownDevice(name.clone()))?;
                Ok(vec![device.clone()])
            }
            DeviceFilter::Group(group) => {
                let selected: Vec<Device> = self
                    .devices
                    .iter()
                    .filter(|d| d.enabled && d.in_group(group))
                    .cloned()
                    .collect();
                if selected.is_empty() {
                    return Err(BackupError::EmptyGroup(group.clone()));
                }
                Ok(selected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, groups: &[&str], enabled: bool) -> Device {
        Device {
            name: name.into(),
            hostname: format!("{name}.example.net"),
            device_type: "cisco_ios".into(),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            enabled,
            port: 22,
        }
    }

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(vec![
            device("sw-01", &["core"], true),
            device("sw-02", &["core", "dc1"], true),
            device("sw-03", &["edge"], false),
        ])
    }

    #[test]
    fn all_enabled_excludes_disabled_devices() {
        let selected = registry().list(&DeviceFilter::AllEnabled).unwrap();
        let names: Vec<&str> = selected.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["sw-01", "sw-02"]);
    }

    #[test]
    fn name_filter_selects_even_disabled_devices() {
        let selected = registry()
            .list(&DeviceFilter::Name("sw-03".into()))
            .unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name, "sw-03");
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = registry()
            .list(&DeviceFilter::Name("ghost".into()))
            .unwrap_err();
        assert!(matches!(err, BackupError::UnknownDevice(name) if name == "ghost"));
    }

    #[test]
    fn group_filter_selects_enabled_members_only() {
        let selected = registry().list(&DeviceFilter::Group("core".into())).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn group_with_no_enabled_members_is_an_error() {
        let err = registry()
            .list(&DeviceFilter::Group("edge".into()))
            .unwrap_err();
        assert!(matches!(err, BackupError::EmptyGroup(group) if group == "edge"));
    }
}
