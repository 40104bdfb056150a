//! Latchkey session crate providing the access-control core.
//!
//! This crate contains the session state machine and the endpoint
//! controller that sequences card capture, the authorization request,
//! decision evaluation and actuation.

pub mod decision;
pub mod endpoint;
pub mod error;
pub mod state_machine;

pub use decision::{DenialReason, Evaluation, PendingDecision};
pub use endpoint::{Endpoint, EndpointConfig, TickOutcome};
pub use error::{Result, SessionError};
pub use state_machine::{Session, SessionState, StateTransition};
