//! Enum wrappers for hardware device dispatch.
//!
//! Native `async fn` in traits (RPITIT) is not object-safe, so the endpoint
//! cannot hold a `Box<dyn Actuator>` when the output is chosen from
//! configuration. This enum provides concrete dispatch instead.
//!
//! # Examples
//!
//! ```
//! use latchkey_hardware::devices::AnyActuator;
//! use latchkey_hardware::mock::MockActuator;
//! use latchkey_hardware::traits::Actuator;
//!
//! #[tokio::main]
//! async fn main() -> latchkey_hardware::Result<()> {
//!     let mut output = AnyActuator::Mock(MockActuator::new());
//!     output.activate().await?;
//!     assert!(output.level().is_active());
//!     Ok(())
//! }
//! ```

use crate::gpio::SysfsActuator;
use crate::mock::MockActuator;
use crate::traits::Actuator;
use crate::{DeviceInfo, OutputLevel, Result};

/// Enum wrapper for actuator dispatch.
#[derive(Debug)]
#[non_exhaustive]
pub enum AnyActuator {
    /// Simulated output that only logs level changes.
    Mock(MockActuator),

    /// Linux sysfs GPIO line.
    Sysfs(SysfsActuator),
}

impl Actuator for AnyActuator {
    async fn activate(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.activate().await,
            Self::Sysfs(device) => device.activate().await,
        }
    }

    async fn deactivate(&mut self) -> Result<()> {
        match self {
            Self::Mock(device) => device.deactivate().await,
            Self::Sysfs(device) => device.deactivate().await,
        }
    }

    fn level(&self) -> OutputLevel {
        match self {
            Self::Mock(device) => device.level(),
            Self::Sysfs(device) => device.level(),
        }
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        match self {
            Self::Mock(device) => device.get_info().await,
            Self::Sysfs(device) => device.get_info().await,
        }
    }
}

impl From<MockActuator> for AnyActuator {
    fn from(device: MockActuator) -> Self {
        Self::Mock(device)
    }
}

impl From<SysfsActuator> for AnyActuator {
    fn from(device: SysfsActuator) -> Self {
        Self::Sysfs(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_any_actuator_dispatches_to_mock() {
        let mut output: AnyActuator = MockActuator::with_name("Lock").into();

        output.activate().await.unwrap();
        assert_eq!(output.level(), OutputLevel::Active);

        output.deactivate().await.unwrap();
        assert_eq!(output.level(), OutputLevel::Inactive);

        let info = output.get_info().await.unwrap();
        assert_eq!(info.name, "Lock");
    }

    #[tokio::test]
    async fn test_any_actuator_dispatches_to_sysfs() {
        let root = tempfile::tempdir().unwrap();
        tokio::fs::create_dir(root.path().join("gpio4")).await.unwrap();

        let mut output: AnyActuator = SysfsActuator::with_root(root.path(), 4, true).into();
        output.activate().await.unwrap();

        let value = tokio::fs::read_to_string(root.path().join("gpio4/value"))
            .await
            .unwrap();
        assert_eq!(value, "1");
        assert_eq!(output.get_info().await.unwrap().model, "sysfs-gpio");
    }
}
