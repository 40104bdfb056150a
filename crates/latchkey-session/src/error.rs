//! Error types for the session controller.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the endpoint controller.
///
/// Reader, bus and actuator failures during a cycle are absorbed and
/// logged by the controller; only broken session invariants and shutdown
/// failures reach the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session state machine rejected a transition
    #[error("Session error: {0}")]
    State(#[from] latchkey_core::Error),

    /// A state expected a captured credential but none was recorded
    #[error("No credential captured in state {0}")]
    MissingCredential(crate::SessionState),

    /// Access request could not be encoded
    #[error("Request encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Hardware failure outside a cycle
    #[error("Hardware error: {0}")]
    Hardware(#[from] latchkey_hardware::HardwareError),
}
