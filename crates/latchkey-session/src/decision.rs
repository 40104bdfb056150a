//! Decision evaluation.
//!
//! Inbound payloads on the decision topic become a [`PendingDecision`] in
//! the session buffer. Evaluation folds every outcome other than an exact
//! `"open"` into a [`DenialReason`].

use latchkey_bus::{AccessDecision, Verdict};
use std::fmt;

/// Decision buffered in the session until the next evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingDecision {
    /// Payload decoded as a decision object.
    Parsed(AccessDecision),

    /// Payload could not be decoded.
    Unreadable(String),
}

impl PendingDecision {
    /// Build a pending decision from a raw payload.
    ///
    /// Returns `None` for an empty payload, which is not a decision.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_session::PendingDecision;
    ///
    /// assert!(PendingDecision::from_payload(b"").is_none());
    /// assert!(matches!(
    ///     PendingDecision::from_payload(b"garbage"),
    ///     Some(PendingDecision::Unreadable(_))
    /// ));
    /// ```
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        if payload.is_empty() {
            return None;
        }

        Some(match AccessDecision::decode(payload) {
            Ok(decision) => Self::Parsed(decision),
            Err(e) => Self::Unreadable(e.to_string()),
        })
    }

    /// Informational message attached by the service, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Parsed(decision) => decision.message.as_deref(),
            Self::Unreadable(_) => None,
        }
    }

    /// Decide whether this decision grants access.
    pub fn evaluate(&self) -> Evaluation {
        match self {
            Self::Parsed(decision) => match decision.verdict() {
                Verdict::Open => Evaluation::Grant,
                Verdict::Refused { door } => Evaluation::Deny(DenialReason::Refused { door }),
                Verdict::MissingDoor => Evaluation::Deny(DenialReason::MissingDoor),
            },
            Self::Unreadable(reason) => Evaluation::Deny(DenialReason::Unreadable {
                reason: reason.clone(),
            }),
        }
    }
}

/// Result of evaluating a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    Grant,
    Deny(DenialReason),
}

/// Why a cycle ended without actuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// The service answered with a door command other than `"open"`.
    Refused { door: String },

    /// The decision had no string `door` field.
    MissingDoor,

    /// The payload was not a decision object.
    Unreadable { reason: String },

    /// No decision arrived within the configured bound.
    TimedOut,

    /// The actuator could not be driven.
    ActuatorFault { reason: String },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused { door } => write!(f, "refused (door={door})"),
            Self::MissingDoor => write!(f, "missing door field"),
            Self::Unreadable { reason } => write!(f, "unreadable decision: {reason}"),
            Self::TimedOut => write!(f, "no decision received in time"),
            Self::ActuatorFault { reason } => write!(f, "actuator fault: {reason}"),
        }
    }
}
