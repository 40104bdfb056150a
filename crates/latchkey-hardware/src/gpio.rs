//! Linux sysfs GPIO actuator.
//!
//! Drives a door strike or LED through the legacy `/sys/class/gpio`
//! interface. The line is exported and configured as an output by
//! [`SysfsActuator::init`], then switched by writing `0`/`1` to its
//! `value` attribute.

use crate::{
    HardwareError, Result,
    traits::Actuator,
    types::{DeviceInfo, OutputLevel},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default sysfs GPIO class directory.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class/gpio";

/// Actuator backed by a sysfs GPIO line.
#[derive(Debug)]
pub struct SysfsActuator {
    root: PathBuf,
    pin: u32,
    active_high: bool,
    level: OutputLevel,
}

impl SysfsActuator {
    /// Create an actuator for `pin` under the default sysfs root.
    pub fn new(pin: u32, active_high: bool) -> Self {
        Self::with_root(DEFAULT_SYSFS_ROOT, pin, active_high)
    }

    /// Create an actuator for `pin` under a custom sysfs root.
    pub fn with_root(root: impl AsRef<Path>, pin: u32, active_high: bool) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            pin,
            active_high,
            level: OutputLevel::Inactive,
        }
    }

    /// Export the line if needed, configure it as an output and release it.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if the line cannot be
    /// exported or configured.
    pub async fn init(&mut self) -> Result<()> {
        let line = self.line_dir();

        let exported = tokio::fs::try_exists(&line).await.unwrap_or(false);
        if !exported {
            debug!(pin = self.pin, "Exporting GPIO line");
            tokio::fs::write(self.root.join("export"), self.pin.to_string())
                .await
                .map_err(|e| {
                    HardwareError::initialization_failed(format!(
                        "cannot export gpio{}: {e}",
                        self.pin
                    ))
                })?;
        }

        tokio::fs::write(line.join("direction"), "out")
            .await
            .map_err(|e| {
                HardwareError::initialization_failed(format!(
                    "cannot configure gpio{} as output: {e}",
                    self.pin
                ))
            })?;

        self.write_level(OutputLevel::Inactive).await?;
        info!(pin = self.pin, active_high = self.active_high, "GPIO actuator ready");
        Ok(())
    }

    /// GPIO line number.
    pub fn pin(&self) -> u32 {
        self.pin
    }

    fn line_dir(&self) -> PathBuf {
        self.root.join(format!("gpio{}", self.pin))
    }

    fn output_name(&self) -> String {
        format!("gpio{}", self.pin)
    }

    async fn write_level(&mut self, level: OutputLevel) -> Result<()> {
        let value = level.pin_value(self.active_high).to_string();
        tokio::fs::write(self.line_dir().join("value"), value)
            .await
            .map_err(|e| HardwareError::output(self.output_name(), e.to_string()))?;

        self.level = level;
        debug!(pin = self.pin, level = %level, "GPIO level written");
        Ok(())
    }
}

impl Actuator for SysfsActuator {
    async fn activate(&mut self) -> Result<()> {
        self.write_level(OutputLevel::Active).await
    }

    async fn deactivate(&mut self) -> Result<()> {
        self.write_level(OutputLevel::Inactive).await
    }

    fn level(&self) -> OutputLevel {
        self.level
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new("Door output", "sysfs-gpio").with_serial_number(self.output_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn exported_line(pin: u32) -> (TempDir, SysfsActuator) {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(root.path().join(format!("gpio{pin}")))
            .await
            .unwrap();
        let actuator = SysfsActuator::with_root(root.path(), pin, true);
        (root, actuator)
    }

    async fn read_attr(root: &TempDir, pin: u32, attr: &str) -> String {
        tokio::fs::read_to_string(root.path().join(format!("gpio{pin}")).join(attr))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_init_configures_output_inactive() {
        let (root, mut actuator) = exported_line(5).await;

        actuator.init().await.unwrap();

        assert_eq!(read_attr(&root, 5, "direction").await, "out");
        assert_eq!(read_attr(&root, 5, "value").await, "0");
        assert_eq!(actuator.level(), OutputLevel::Inactive);
    }

    #[tokio::test]
    async fn test_activate_and_deactivate_write_value() {
        let (root, mut actuator) = exported_line(5).await;
        actuator.init().await.unwrap();

        actuator.activate().await.unwrap();
        assert_eq!(read_attr(&root, 5, "value").await, "1");
        assert_eq!(actuator.level(), OutputLevel::Active);

        actuator.deactivate().await.unwrap();
        assert_eq!(read_attr(&root, 5, "value").await, "0");
        assert_eq!(actuator.level(), OutputLevel::Inactive);
    }

    #[tokio::test]
    async fn test_active_low_polarity() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(root.path().join("gpio12")).await.unwrap();
        let mut actuator = SysfsActuator::with_root(root.path(), 12, false);

        actuator.init().await.unwrap();
        assert_eq!(read_attr(&root, 12, "value").await, "1");

        actuator.activate().await.unwrap();
        assert_eq!(read_attr(&root, 12, "value").await, "0");
    }

    #[tokio::test]
    async fn test_init_exports_missing_line() {
        let root = tempfile::tempdir().unwrap();
        let mut actuator = SysfsActuator::with_root(root.path(), 7, true);

        // A plain directory does not create the line on export.
        let result = actuator.init().await;
        assert!(matches!(
            result,
            Err(HardwareError::InitializationFailed { .. })
        ));

        let export = tokio::fs::read_to_string(root.path().join("export"))
            .await
            .unwrap();
        assert_eq!(export, "7");
    }

    #[tokio::test]
    async fn test_write_failure_keeps_level() {
        let root = tempfile::tempdir().unwrap();
        let mut actuator = SysfsActuator::with_root(root.path(), 9, true);

        let result = actuator.activate().await;
        assert!(matches!(result, Err(HardwareError::OutputError { .. })));
        assert_eq!(actuator.level(), OutputLevel::Inactive);
    }

    #[tokio::test]
    async fn test_get_info() {
        let actuator = SysfsActuator::new(5, true);
        let info = actuator.get_info().await.unwrap();
        assert_eq!(info.model, "sysfs-gpio");
        assert_eq!(info.serial_number.as_deref(), Some("gpio5"));
        assert_eq!(actuator.pin(), 5);
    }
}
