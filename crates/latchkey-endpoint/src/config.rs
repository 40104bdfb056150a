use std::{collections::HashMap, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use latchkey_bus::{MqttConfig, qos_from_level};
use latchkey_core::constants::{
    ACTUATION_HOLD_MS, CONNECT_RETRY_INTERVAL_MS, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT,
    DEFAULT_CLIENT_ID_PREFIX, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_DECISION_TOPIC,
    DEFAULT_KEEP_ALIVE_SECS, DEFAULT_REQUEST_TOPIC, DEFAULT_TICK_INTERVAL_MS,
};
use latchkey_hardware::{AnyActuator, HardwareError, SysfsActuator, gpio::DEFAULT_SYSFS_ROOT, mock::MockActuator};
use latchkey_session::EndpointConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub device: DeviceConfig,
    pub bus: BusConfig,
    pub session: SessionConfig,
    pub actuator: ActuatorConfig,
    pub provisioning: ProvisioningConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Stable identity; a random one is generated per process when unset.
    #[serde(default = "generate_device_id")]
    pub id: String,
    pub name: String,
}

fn generate_device_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    pub client_id_prefix: String,
    pub request_topic: String,
    pub decision_topic: String,
    pub qos: u8,
    pub keep_alive_secs: u64,
    pub retry_interval_ms: u64,
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub actuation_ms: u64,
    pub tick_interval_ms: u64,
    #[serde(default)]
    pub decision_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorKind {
    Simulated,
    Gpio,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    #[serde(default)]
    pub gpio_pin: Option<u32>,
    pub active_high: bool,
    pub sysfs_root: String,
}

impl ActuatorConfig {
    /// Create the configured output. A GPIO line is exported and released.
    ///
    /// # Errors
    /// Returns an error if the GPIO line cannot be initialised.
    pub async fn build(&self) -> latchkey_hardware::Result<AnyActuator> {
        match self.kind {
            ActuatorKind::Simulated => Ok(MockActuator::with_name("Door output").into()),
            ActuatorKind::Gpio => {
                let pin = self.gpio_pin.ok_or_else(|| {
                    HardwareError::configuration("actuator.gpio_pin is required for a gpio actuator")
                })?;
                let mut actuator = SysfsActuator::with_root(&self.sysfs_root, pin, self.active_high);
                actuator.init().await?;
                Ok(actuator.into())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    pub enabled: bool,
    pub timeout_ms: u64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("device.name", "latchkey")?
            .set_default("bus.host", DEFAULT_BROKER_HOST)?
            .set_default("bus.port", i64::from(DEFAULT_BROKER_PORT))?
            .set_default("bus.client_id_prefix", DEFAULT_CLIENT_ID_PREFIX)?
            .set_default("bus.request_topic", DEFAULT_REQUEST_TOPIC)?
            .set_default("bus.decision_topic", DEFAULT_DECISION_TOPIC)?
            .set_default("bus.qos", 1)?
            .set_default("bus.keep_alive_secs", DEFAULT_KEEP_ALIVE_SECS as i64)?
            .set_default("bus.retry_interval_ms", CONNECT_RETRY_INTERVAL_MS as i64)?
            .set_default("bus.connect_timeout_ms", DEFAULT_CONNECT_TIMEOUT_MS as i64)?
            .set_default("session.actuation_ms", ACTUATION_HOLD_MS as i64)?
            .set_default("session.tick_interval_ms", DEFAULT_TICK_INTERVAL_MS as i64)?
            .set_default("actuator.kind", "simulated")?
            .set_default("actuator.active_high", true)?
            .set_default("actuator.sysfs_root", DEFAULT_SYSFS_ROOT)?
            .set_default("provisioning.enabled", true)?
            .set_default("provisioning.timeout_ms", 10_000)?
            .add_source(File::with_name("config/latchkey").required(false));

        // Explicit overrides keep tests independent of the process environment.
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // LATCHKEY_BUS__HOST, LATCHKEY_SESSION__DECISION_TIMEOUT_MS, ...
            builder = builder.add_source(
                Environment::with_prefix("LATCHKEY")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(config)
    }

    /// Check values the type system cannot.
    pub fn validate(&self) -> latchkey_core::Result<()> {
        if self.bus.qos > 2 {
            return Err(latchkey_core::Error::Config(format!(
                "bus.qos must be 0, 1 or 2, got {}",
                self.bus.qos
            )));
        }
        if self.bus.request_topic.is_empty() || self.bus.decision_topic.is_empty() {
            return Err(latchkey_core::Error::Config(
                "bus topics must not be empty".to_string(),
            ));
        }
        if self.session.actuation_ms == 0 || self.session.tick_interval_ms == 0 {
            return Err(latchkey_core::Error::Config(
                "session durations must be positive".to_string(),
            ));
        }
        if self.actuator.kind == ActuatorKind::Gpio && self.actuator.gpio_pin.is_none() {
            return Err(latchkey_core::Error::MissingConfig(
                "actuator.gpio_pin".to_string(),
            ));
        }
        Ok(())
    }

    /// Client identifier presented to the broker.
    pub fn client_id(&self) -> String {
        format!("{}{}", self.bus.client_id_prefix, self.device.id)
    }

    pub fn mqtt(&self) -> latchkey_bus::Result<MqttConfig> {
        let credentials = match (&self.bus.username, &self.bus.password) {
            (Some(username), password) => {
                Some((username.clone(), password.clone().unwrap_or_default()))
            }
            (None, _) => None,
        };

        Ok(MqttConfig {
            host: self.bus.host.clone(),
            port: self.bus.port,
            client_id: self.client_id(),
            keep_alive: Duration::from_secs(self.bus.keep_alive_secs),
            retry_interval: Duration::from_millis(self.bus.retry_interval_ms),
            connect_timeout: Duration::from_millis(self.bus.connect_timeout_ms),
            qos: qos_from_level(self.bus.qos)?,
            credentials,
        })
    }

    pub fn endpoint(&self) -> EndpointConfig {
        EndpointConfig {
            request_topic: self.bus.request_topic.clone(),
            decision_topic: self.bus.decision_topic.clone(),
            actuation: Duration::from_millis(self.session.actuation_ms),
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
            decision_timeout: self.session.decision_timeout_ms.map(Duration::from_millis),
            retry_interval: Duration::from_millis(self.bus.retry_interval_ms),
        }
    }
}
