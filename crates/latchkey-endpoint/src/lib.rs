//! Latchkey endpoint application.
//!
//! Configuration, telemetry and the provisioning check used by the
//! `latchkey` binary.

pub mod config;
pub mod provisioning;
pub mod telemetry;
