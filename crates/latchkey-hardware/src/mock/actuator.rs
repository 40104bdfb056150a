//! Mock actuator for testing and simulation.
//!
//! Records every pulse with monotonic timestamps so tests can assert both
//! the number of activations and their exact duration.

use crate::{
    HardwareError, Result,
    traits::Actuator,
    types::{DeviceInfo, OutputLevel},
};
use tokio::time::{Duration, Instant};
use tracing::info;

/// One activate/deactivate cycle observed by a [`MockActuator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulse {
    /// When the output went active.
    pub activated_at: Instant,

    /// When the output was released, `None` while still active.
    pub released_at: Option<Instant>,
}

impl Pulse {
    /// Duration of a completed pulse.
    pub fn duration(&self) -> Option<Duration> {
        self.released_at.map(|end| end - self.activated_at)
    }
}

/// Simulated door output.
///
/// Logs level changes and keeps a pulse log. Used by the endpoint when no
/// GPIO line is configured, and by tests.
///
/// # Examples
///
/// ```
/// use latchkey_hardware::mock::MockActuator;
/// use latchkey_hardware::traits::Actuator;
///
/// #[tokio::main]
/// async fn main() -> latchkey_hardware::Result<()> {
///     let mut lock = MockActuator::new();
///
///     lock.activate().await?;
///     lock.deactivate().await?;
///
///     assert_eq!(lock.activation_count(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockActuator {
    name: String,
    level: OutputLevel,
    pulses: Vec<Pulse>,
    faulty: bool,
}

impl MockActuator {
    /// Create a mock actuator with the default name.
    pub fn new() -> Self {
        Self::with_name("Mock Actuator")
    }

    /// Create a mock actuator with a custom name.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: OutputLevel::Inactive,
            pulses: Vec::new(),
            faulty: false,
        }
    }

    /// Make every subsequent level change fail until cleared.
    pub fn set_faulty(&mut self, faulty: bool) {
        self.faulty = faulty;
    }

    fn check_fault(&self) -> Result<()> {
        if self.faulty {
            return Err(HardwareError::output(self.name.clone(), "simulated output fault"));
        }
        Ok(())
    }

    /// All pulses observed so far, oldest first.
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    /// Number of times the output went from inactive to active.
    pub fn activation_count(&self) -> usize {
        self.pulses.len()
    }

    /// Returns `true` while the output is driven.
    pub fn is_active(&self) -> bool {
        self.level.is_active()
    }
}

impl Default for MockActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl Actuator for MockActuator {
    async fn activate(&mut self) -> Result<()> {
        if self.level.is_active() {
            return Ok(());
        }
        self.check_fault()?;

        self.level = OutputLevel::Active;
        self.pulses.push(Pulse {
            activated_at: Instant::now(),
            released_at: None,
        });
        info!(output = %self.name, level = %self.level, "Output switched");
        Ok(())
    }

    async fn deactivate(&mut self) -> Result<()> {
        if !self.level.is_active() {
            return Ok(());
        }
        self.check_fault()?;

        self.level = OutputLevel::Inactive;
        if let Some(pulse) = self.pulses.last_mut() {
            pulse.released_at = Some(Instant::now());
        }
        info!(output = %self.name, level = %self.level, "Output switched");
        Ok(())
    }

    fn level(&self) -> OutputLevel {
        self.level
    }

    async fn get_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo::new(self.name.clone(), "simulated"))
    }
}
