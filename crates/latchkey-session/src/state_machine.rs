//! Access session state machine.
//!
//! This module tracks one request/response cycle at a time, from card
//! capture through the authorization request to actuation or denial.
//!
//! # States
//!
//! - `Idle`: Polling the reader for a new card
//! - `CardCaptured`: Card read, request not yet published
//! - `AwaitingDecision`: Request published, waiting for the service
//! - `Actuating`: Access granted, output held active until a deadline
//!
//! # Valid Transitions
//!
//! - Idle → CardCaptured → AwaitingDecision
//! - AwaitingDecision → Actuating → Idle
//! - AwaitingDecision → Idle (denial)
//!
//! Entering `Idle` clears the captured credential, the decision buffer and
//! the actuation deadline, so nothing carries over into the next cycle.
//!
//! # Examples
//!
//! ```
//! use latchkey_core::CredentialId;
//! use latchkey_session::{Session, SessionState};
//!
//! let mut session = Session::new();
//! assert_eq!(session.state(), SessionState::Idle);
//!
//! let credential = CredentialId::new([0x04, 0xA2, 0x3B, 0x9C]).unwrap();
//! session.capture(credential).unwrap();
//! assert_eq!(session.state(), SessionState::CardCaptured);
//!
//! // A card cannot be captured twice in one cycle
//! let again = CredentialId::new([0x01, 0x02, 0x03, 0x04]).unwrap();
//! assert!(session.capture(again).is_err());
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use crate::decision::PendingDecision;
use latchkey_core::{CredentialId, Error, Result};

/// Maximum number of state transitions to keep in history.
///
/// A full cycle is three or four transitions, so this covers the last
/// 25 or more cycles.
const MAX_HISTORY_SIZE: usize = 100;

/// Phase of the current access cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for a card.
    #[default]
    Idle,

    /// Card read; the access request is published on the next tick.
    CardCaptured,

    /// Request published; no new card is captured in this state.
    AwaitingDecision,

    /// Access granted; the output is held active until the deadline.
    Actuating,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state_str = match self {
            SessionState::Idle => "Idle",
            SessionState::CardCaptured => "CardCaptured",
            SessionState::AwaitingDecision => "AwaitingDecision",
            SessionState::Actuating => "Actuating",
        };
        write!(f, "{}", state_str)
    }
}

impl SessionState {
    /// Check if transition to target state is valid from this state.
    ///
    /// # Examples
    ///
    /// ```
    /// use latchkey_session::SessionState;
    ///
    /// assert!(SessionState::Idle.can_transition_to(&SessionState::CardCaptured));
    /// assert!(!SessionState::AwaitingDecision.can_transition_to(&SessionState::CardCaptured));
    /// ```
    pub fn can_transition_to(&self, target: &SessionState) -> bool {
        matches!(
            (self, target),
            (SessionState::Idle, SessionState::CardCaptured)
                | (SessionState::CardCaptured, SessionState::AwaitingDecision)
                | (
                    SessionState::AwaitingDecision,
                    SessionState::Actuating | SessionState::Idle
                )
                | (SessionState::Actuating, SessionState::Idle)
        )
    }

    /// Returns `true` if the reader may be polled in this state.
    pub fn accepts_cards(&self) -> bool {
        matches!(self, SessionState::Idle)
    }
}

/// Represents a single state transition with timestamp.
///
/// The `timestamp` field is not serialized; on deserialization it is set
/// to the current time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: SessionState,

    /// The state transitioned to.
    pub to: SessionState,

    /// When the transition occurred.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl StateTransition {
    /// Create a new state transition record stamped with the current time.
    pub fn new(from: SessionState, to: SessionState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    /// Get the duration since this transition occurred.
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// The single access session owned by the endpoint controller.
///
/// Holds the current state, the credential being processed, the decision
/// buffer, the actuation deadline and a bounded transition history.
///
/// # Examples
///
/// ```
/// use latchkey_core::CredentialId;
/// use latchkey_session::{PendingDecision, Session, SessionState};
///
/// let mut session = Session::new();
/// session.capture(CredentialId::new([1, 2, 3, 4]).unwrap()).unwrap();
/// session.transition_to(SessionState::AwaitingDecision).unwrap();
///
/// // The latest decision replaces an unevaluated one
/// session.offer_decision(PendingDecision::from_payload(br#"{"door":"closed"}"#).unwrap());
/// let replaced = session.offer_decision(PendingDecision::from_payload(br#"{"door":"open"}"#).unwrap());
/// assert!(replaced.is_some());
///
/// assert!(session.take_decision().is_some());
/// assert!(session.take_decision().is_none());
/// ```
#[derive(Debug)]
pub struct Session {
    /// Current phase of the cycle.
    state: SessionState,

    /// When the current state was entered.
    state_entered_at: Instant,

    /// History of state transitions (limited to MAX_HISTORY_SIZE).
    history: VecDeque<StateTransition>,

    /// Optional bound on the current state.
    current_timeout: Option<Duration>,

    /// Credential captured for this cycle.
    credential: Option<CredentialId>,

    /// Latest unevaluated decision.
    pending_decision: Option<PendingDecision>,

    /// Release deadline while actuating.
    active_until: Option<Instant>,
}

impl Session {
    /// Create a new idle session.
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            state_entered_at: Instant::now(),
            history: VecDeque::with_capacity(MAX_HISTORY_SIZE),
            current_timeout: None,
            credential: None,
            pending_decision: None,
            active_until: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the time elapsed in the current state.
    pub fn time_in_current_state(&self) -> Duration {
        self.state_entered_at.elapsed()
    }

    /// Returns `true` if a timeout is set and has been exceeded.
    pub fn has_timed_out(&self) -> bool {
        self.current_timeout
            .is_some_and(|timeout| self.time_in_current_state() >= timeout)
    }

    /// Bound the time spent in the current state. Cleared on every transition.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.current_timeout = Some(timeout);
    }

    /// Get the last `count` state transitions, oldest first.
    pub fn last_transitions(&self, count: usize) -> Vec<StateTransition> {
        self.history
            .iter()
            .rev()
            .take(count)
            .rev()
            .cloned()
            .collect()
    }

    /// Credential captured for the current cycle.
    pub fn credential(&self) -> Option<&CredentialId> {
        self.credential.as_ref()
    }

    /// Release deadline while in `Actuating`.
    pub fn active_until(&self) -> Option<Instant> {
        self.active_until
    }

    /// Returns `true` if a decision is buffered.
    pub fn has_pending_decision(&self) -> bool {
        self.pending_decision.is_some()
    }

    /// Transition to a new state, validating the transition.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidStateTransition` if the transition is not
    /// allowed from the current state. The session is left unchanged.
    pub fn transition_to(&mut self, new_state: SessionState) -> Result<StateTransition> {
        if !self.state.can_transition_to(&new_state) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: new_state.to_string(),
            });
        }

        let transition = StateTransition::new(self.state, new_state);
        self.perform_state_change(new_state, transition.clone());
        Ok(transition)
    }

    /// Record a captured credential and move to `CardCaptured`.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `Idle`.
    pub fn capture(&mut self, credential: CredentialId) -> Result<StateTransition> {
        let transition = self.transition_to(SessionState::CardCaptured)?;
        self.credential = Some(credential);
        Ok(transition)
    }

    /// Move to `Actuating` with the given release deadline.
    ///
    /// # Errors
    ///
    /// Returns an error unless the session is `AwaitingDecision`.
    pub fn begin_actuation(&mut self, until: Instant) -> Result<StateTransition> {
        let transition = self.transition_to(SessionState::Actuating)?;
        self.active_until = Some(until);
        Ok(transition)
    }

    /// Returns `true` once the actuation deadline has been reached.
    pub fn actuation_due(&self, now: Instant) -> bool {
        self.active_until.is_some_and(|until| now >= until)
    }

    /// Buffer a decision, returning the one it replaced.
    pub fn offer_decision(&mut self, decision: PendingDecision) -> Option<PendingDecision> {
        self.pending_decision.replace(decision)
    }

    /// Remove the buffered decision for evaluation.
    pub fn take_decision(&mut self) -> Option<PendingDecision> {
        self.pending_decision.take()
    }

    /// Force the session back to `Idle` regardless of the current state.
    pub fn reset(&mut self) -> StateTransition {
        let transition = StateTransition::new(self.state, SessionState::Idle);
        self.perform_state_change(SessionState::Idle, transition.clone());
        transition
    }

    fn perform_state_change(&mut self, new_state: SessionState, transition: StateTransition) {
        info!(from = %transition.from, to = %transition.to, "Session transition");

        self.state = new_state;
        self.state_entered_at = transition.timestamp;
        self.current_timeout = None;

        if new_state == SessionState::Idle {
            self.credential = None;
            self.pending_decision = None;
            self.active_until = None;
        }

        self.add_to_history(transition);
    }

    fn add_to_history(&mut self, transition: StateTransition) {
        self.history.push_back(transition);
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
