//! Message bus layer for Latchkey
//!
//! This crate connects the endpoint to the authorization service over a
//! publish/subscribe broker. It defines the JSON request and decision
//! messages, the [`BusClient`] abstraction the session logic talks to, and
//! an MQTT implementation on top of `rumqttc`.
//!
//! # Components
//!
//! - **MqttBus**: Broker client with background reconnection
//! - **MockBus**: In-memory broker for tests and simulation
//! - **AccessRequest / AccessDecision**: Wire messages
//!
//! # Example
//!
//! ```no_run
//! use latchkey_bus::{BusClient, MqttBus, MqttConfig, connect_with_retry};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut bus = MqttBus::new(MqttConfig::default());
//! connect_with_retry(&mut bus, "RFID_PORBLE/SUB", Duration::from_secs(5)).await;
//!
//! bus.publish("RFID_PORBLE", br#"{"rfid":" 04 A2 3B 9C"}"#.to_vec()).await?;
//! # Ok(())
//! # }
//! ```

#![allow(async_fn_in_trait)]

pub mod client;
pub mod error;
pub mod message;
pub mod mock;
pub mod mqtt;

pub use client::{BusClient, connect_with_retry};
pub use error::{BusError, Result};
pub use message::{AccessDecision, AccessRequest, InboundMessage, Verdict};
pub use mqtt::{MqttBus, MqttConfig, qos_from_level};
pub use rumqttc::QoS;
