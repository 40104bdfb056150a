//! Core constants for the Latchkey access-control endpoint.
//!
//! This module centralizes the values shared by every crate in the workspace:
//! bus topics and broker defaults, timing of the session cycle, and the
//! limits applied to credentials and wire payloads.
//!
//! # Request/Response Cycle
//!
//! ```text
//! reader ──UID──> endpoint ──{"rfid": ...}──> RFID_PORBLE
//!                    ▲
//!                    └──{"door": "open"}──── RFID_PORBLE/SUB
//! ```
//!
//! # Usage
//!
//! ```
//! use latchkey_core::constants::*;
//! use std::time::Duration;
//!
//! assert_eq!(DEFAULT_DECISION_TOPIC, "RFID_PORBLE/SUB");
//!
//! let hold = Duration::from_millis(ACTUATION_HOLD_MS);
//! assert_eq!(hold.as_secs(), 3);
//! ```
//!
//! # Compatibility
//!
//! Topic names, the `open` command literal and the hold duration are shared
//! with the deployed authorization service. Changing them breaks the
//! endpoint's interoperability with that service.

// ============================================================================
// Message Bus
// ============================================================================

/// Broker host used when no configuration overrides it.
pub const DEFAULT_BROKER_HOST: &str = "broker.emqx.io";

/// Plain MQTT port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Prefix of the client identity presented to the broker.
///
/// The device identifier is appended to form the full client id.
pub const DEFAULT_CLIENT_ID_PREFIX: &str = "latchkey-endpoint-";

/// Topic that carries outbound access requests.
pub const DEFAULT_REQUEST_TOPIC: &str = "RFID_PORBLE";

/// Topic the endpoint subscribes to for access decisions.
pub const DEFAULT_DECISION_TOPIC: &str = "RFID_PORBLE/SUB";

/// Keep-alive interval negotiated with the broker (seconds).
///
/// The client library rejects values below 5 seconds.
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 15;

/// Delay between startup connection attempts (milliseconds).
///
/// Startup retries forever at this interval until the broker accepts the
/// connection and the decision topic is subscribed.
pub const CONNECT_RETRY_INTERVAL_MS: u64 = 5000;

/// Upper bound for a single connection attempt (milliseconds).
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Capacity of the inbound message queue between the bus driver and the session.
pub const INBOUND_QUEUE_CAPACITY: usize = 32;

// ============================================================================
// Session Timing
// ============================================================================

/// How long the actuator output stays active after an `open` decision (milliseconds).
pub const ACTUATION_HOLD_MS: u64 = 3000;

/// Pause between two ticks of the session loop (milliseconds).
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 10;

// ============================================================================
// Credentials
// ============================================================================

/// Longest card UID accepted as a credential (ISO 14443 triple-size UID).
pub const MAX_CREDENTIAL_LENGTH: usize = 10;

// ============================================================================
// Decisions
// ============================================================================

/// The only `door` value that authorizes actuation.
///
/// Comparison is exact and case-sensitive.
pub const OPEN_COMMAND: &str = "open";
