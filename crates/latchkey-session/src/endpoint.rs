//! Endpoint controller.
//!
//! [`Endpoint`] owns the reader, the bus client, the actuator and the one
//! [`Session`]. Each [`tick`](Endpoint::tick) runs exactly one state
//! handler:
//!
//! | state              | handler                                              |
//! |--------------------|------------------------------------------------------|
//! | `Idle`             | poll the reader, capture a new card                  |
//! | `CardCaptured`     | discard stale inbound messages, publish the request  |
//! | `AwaitingDecision` | drain inbound messages, evaluate the latest decision |
//! | `Actuating`        | release the output once the deadline has passed      |
//!
//! While `Actuating` nothing else runs: the reader is not polled, inbound
//! messages stay queued and nothing is published.

use std::future::Future;
use std::time::Duration;

use latchkey_bus::{AccessRequest, BusClient, connect_with_retry};
use latchkey_core::{
    CredentialId,
    constants::{
        ACTUATION_HOLD_MS, CONNECT_RETRY_INTERVAL_MS, DEFAULT_DECISION_TOPIC,
        DEFAULT_REQUEST_TOPIC, DEFAULT_TICK_INTERVAL_MS,
    },
};
use latchkey_hardware::{Actuator, CredentialReader};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::decision::{DenialReason, Evaluation, PendingDecision};
use crate::error::{Result, SessionError};
use crate::state_machine::{Session, SessionState};

/// Transitions logged when a failed tick forces a reset.
const RECENT_TRANSITIONS: usize = 5;

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Topic access requests are published on
    pub request_topic: String,

    /// Topic decisions are received on
    pub decision_topic: String,

    /// How long the output stays active after a grant
    pub actuation: Duration,

    /// Pause between ticks in [`Endpoint::run_until`]
    pub tick_interval: Duration,

    /// Bound on `AwaitingDecision`; `None` waits forever
    pub decision_timeout: Option<Duration>,

    /// Pause between broker connection attempts at startup
    pub retry_interval: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            request_topic: DEFAULT_REQUEST_TOPIC.to_string(),
            decision_topic: DEFAULT_DECISION_TOPIC.to_string(),
            actuation: Duration::from_millis(ACTUATION_HOLD_MS),
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            decision_timeout: None,
            retry_interval: Duration::from_millis(CONNECT_RETRY_INTERVAL_MS),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No card in the field.
    NoCard,

    /// A card was detected but could not be read.
    ReadFailed { reason: String },

    /// A card was captured.
    Captured { credential: CredentialId },

    /// The access request was handed to the bus (`delivered == false` if
    /// the publish failed and the session waits anyway).
    RequestPublished {
        credential: CredentialId,
        delivered: bool,
    },

    /// Still waiting for a decision.
    Waiting,

    /// Access granted; the output is active until `until`.
    Granted { until: Instant },

    /// Cycle ended without actuation.
    Denied(DenialReason),

    /// Output held; deadline not reached.
    Holding,

    /// Output released and session back to idle.
    Released,

    /// Releasing the output failed; retried on the next tick.
    ReleaseFailed { reason: String },
}

/// Access-control endpoint: one reader, one bus, one output.
pub struct Endpoint<R, B, A> {
    reader: R,
    bus: B,
    actuator: A,
    session: Session,
    config: EndpointConfig,
}

impl<R, B, A> Endpoint<R, B, A>
where
    R: CredentialReader,
    B: BusClient,
    A: Actuator,
{
    /// Assemble an endpoint. Nothing is connected until [`start`](Self::start).
    pub fn new(reader: R, bus: B, actuator: A, config: EndpointConfig) -> Self {
        Self {
            reader,
            bus,
            actuator,
            session: Session::new(),
            config,
        }
    }

    /// The access session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The controller settings.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    /// The output device.
    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Mutable access to the output device.
    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    /// The bus client.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Connect to the broker and subscribe to the decision topic, retrying
    /// until both succeed.
    pub async fn start(&mut self) {
        let attempts = connect_with_retry(
            &mut self.bus,
            &self.config.decision_topic,
            self.config.retry_interval,
        )
        .await;
        info!(
            attempts,
            request_topic = %self.config.request_topic,
            decision_topic = %self.config.decision_topic,
            "Endpoint ready"
        );
    }

    /// Run one state handler.
    ///
    /// # Errors
    ///
    /// Returns an error only if a session invariant is broken. Device and
    /// bus failures are logged and folded into the outcome.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        match self.session.state() {
            SessionState::Idle => self.poll_reader().await,
            SessionState::CardCaptured => self.publish_request().await,
            SessionState::AwaitingDecision => self.await_decision().await,
            SessionState::Actuating => self.hold_output().await,
        }
    }

    /// Tick until `shutdown` resolves, then release the output.
    ///
    /// Shutdown is only observed between ticks. A tick that fails resets
    /// the session to idle and releases the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the output cannot be released at shutdown.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(state = %self.session.state(), "Shutdown requested");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!(error = %e, state = %self.session.state(), "Tick failed, resetting session");
                        self.recover().await;
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Release the output and reset the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the actuator cannot be deactivated.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.session.reset();
        self.actuator.deactivate().await?;
        info!("Output released, endpoint stopped");
        Ok(())
    }

    async fn recover(&mut self) {
        for transition in self.session.last_transitions(RECENT_TRANSITIONS) {
            warn!(
                from = %transition.from,
                to = %transition.to,
                ago_ms = millis(transition.elapsed()),
                "Recent transition"
            );
        }
        self.session.reset();
        self.discard_presented_cards().await;
        if let Err(e) = self.actuator.deactivate().await {
            error!(error = %e, "Failed to release output during recovery");
        }
    }

    async fn poll_reader(&mut self) -> Result<TickOutcome> {
        match self.reader.is_new_card_present().await {
            Ok(true) => {}
            Ok(false) => return Ok(TickOutcome::NoCard),
            Err(e) => {
                warn!(error = %e, "Reader poll failed");
                return Ok(TickOutcome::ReadFailed {
                    reason: e.to_string(),
                });
            }
        }

        let card = match self.reader.read_card_serial().await {
            Ok(card) => card,
            Err(e) => {
                warn!(error = %e, "Card read failed");
                return Ok(TickOutcome::ReadFailed {
                    reason: e.to_string(),
                });
            }
        };

        let credential = match card.credential() {
            Ok(credential) => credential,
            Err(e) => {
                warn!(error = %e, uid = %card.uid_hex(), "Rejected card identifier");
                return Ok(TickOutcome::ReadFailed {
                    reason: e.to_string(),
                });
            }
        };

        info!(uid = %credential, card_type = card.card_type.name(), "Card captured");
        self.session.capture(credential.clone())?;
        Ok(TickOutcome::Captured { credential })
    }

    async fn publish_request(&mut self) -> Result<TickOutcome> {
        let credential = self
            .session
            .credential()
            .cloned()
            .ok_or(SessionError::MissingCredential(SessionState::CardCaptured))?;

        // Anything queued so far answers an earlier request.
        match self.bus.process_inbound().await {
            Ok(stale) if !stale.is_empty() => {
                debug!(count = stale.len(), "Discarded stale inbound messages");
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Inbound drain failed"),
        }

        let payload = AccessRequest::new(&credential).to_payload()?;
        let delivered = match self.bus.publish(&self.config.request_topic, payload).await {
            Ok(()) => {
                info!(topic = %self.config.request_topic, rfid = %credential, "Access request published");
                true
            }
            Err(e) => {
                warn!(error = %e, topic = %self.config.request_topic, "Publish failed, awaiting decision anyway");
                false
            }
        };

        self.session.transition_to(SessionState::AwaitingDecision)?;
        if let Some(timeout) = self.config.decision_timeout {
            self.session.set_timeout(timeout);
        }

        Ok(TickOutcome::RequestPublished {
            credential,
            delivered,
        })
    }

    async fn await_decision(&mut self) -> Result<TickOutcome> {
        let messages = match self.bus.process_inbound().await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(error = %e, "Inbound processing failed");
                Vec::new()
            }
        };

        for message in messages {
            if message.topic != self.config.decision_topic {
                debug!(topic = %message.topic, "Ignoring message on unrelated topic");
                continue;
            }
            let Some(decision) = PendingDecision::from_payload(&message.payload) else {
                debug!("Ignoring empty decision payload");
                continue;
            };
            if let Some(replaced) = self.session.offer_decision(decision) {
                debug!(?replaced, "Decision superseded by a newer one");
            }
        }

        if let Some(decision) = self.session.take_decision() {
            return self.apply_decision(decision).await;
        }

        if self.session.has_timed_out() {
            return self.deny(DenialReason::TimedOut).await;
        }

        Ok(TickOutcome::Waiting)
    }

    async fn apply_decision(&mut self, decision: PendingDecision) -> Result<TickOutcome> {
        if let Some(message) = decision.message() {
            info!(decision_message = message, "Decision message");
        }

        match decision.evaluate() {
            Evaluation::Grant => {
                if let Err(e) = self.actuator.activate().await {
                    error!(error = %e, "Failed to activate output");
                    return self
                        .deny(DenialReason::ActuatorFault {
                            reason: e.to_string(),
                        })
                        .await;
                }

                let until = Instant::now() + self.config.actuation;
                self.session.begin_actuation(until)?;
                info!(
                    hold_ms = millis(self.config.actuation),
                    "Access granted, output active"
                );
                Ok(TickOutcome::Granted { until })
            }
            Evaluation::Deny(reason) => self.deny(reason).await,
        }
    }

    async fn deny(&mut self, reason: DenialReason) -> Result<TickOutcome> {
        info!(reason = %reason, "Access denied");
        self.return_to_idle().await?;
        Ok(TickOutcome::Denied(reason))
    }

    async fn return_to_idle(&mut self) -> Result<()> {
        self.session.transition_to(SessionState::Idle)?;
        self.discard_presented_cards().await;
        Ok(())
    }

    /// Cards presented while a cycle was running are not carried into the
    /// next one.
    async fn discard_presented_cards(&mut self) {
        match self.reader.discard_pending().await {
            Ok(0) => {}
            Ok(count) => debug!(count, "Discarded cards presented during the cycle"),
            Err(e) => warn!(error = %e, "Failed to clear reader"),
        }
    }

    async fn hold_output(&mut self) -> Result<TickOutcome> {
        if !self.session.actuation_due(Instant::now()) {
            return Ok(TickOutcome::Holding);
        }

        match self.actuator.deactivate().await {
            Ok(()) => {
                info!("Output released");
                self.return_to_idle().await?;
                Ok(TickOutcome::Released)
            }
            Err(e) => {
                error!(error = %e, "Failed to release output, retrying");
                Ok(TickOutcome::ReleaseFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use latchkey_bus::mock::{MockBus, MockBusHandle};
    use latchkey_hardware::CardType;
    use latchkey_hardware::mock::{MockActuator, MockReader, MockReaderHandle};

    const DECISION: &str = "RFID_PORBLE/SUB";

    async fn started() -> (
        Endpoint<MockReader, MockBus, MockActuator>,
        MockReaderHandle,
        MockBusHandle,
    ) {
        let (reader, reader_handle) = MockReader::new();
        let (bus, bus_handle) = MockBus::new();
        let mut endpoint = Endpoint::new(reader, bus, MockActuator::new(), EndpointConfig::default());
        endpoint.start().await;
        (endpoint, reader_handle, bus_handle)
    }

    async fn awaiting(
    ) -> (
        Endpoint<MockReader, MockBus, MockActuator>,
        MockReaderHandle,
        MockBusHandle,
    ) {
        let (mut endpoint, reader, bus) = started().await;
        reader
            .present_card(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K)
            .await
            .unwrap();
        endpoint.tick().await.unwrap();
        endpoint.tick().await.unwrap();
        assert_eq!(endpoint.session().state(), SessionState::AwaitingDecision);
        (endpoint, reader, bus)
    }

    #[tokio::test]
    async fn test_idle_without_card() {
        let (mut endpoint, _reader, _bus) = started().await;
        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::NoCard);
        assert_eq!(endpoint.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_capture_then_publish() {
        let (mut endpoint, reader, bus) = started().await;
        reader
            .present_card(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K)
            .await
            .unwrap();

        let credential = CredentialId::new([0x04, 0xA2, 0x3B, 0x9C]).unwrap();
        assert_eq!(
            endpoint.tick().await.unwrap(),
            TickOutcome::Captured {
                credential: credential.clone()
            }
        );
        assert!(bus.published().is_empty());

        assert_eq!(
            endpoint.tick().await.unwrap(),
            TickOutcome::RequestPublished {
                credential,
                delivered: true
            }
        );
        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "RFID_PORBLE");
        assert_eq!(published[0].payload.as_ref(), br#"{"rfid":" 04 A2 3B 9C"}"#);
    }

    #[tokio::test]
    async fn test_read_failure_stays_idle() {
        let (mut endpoint, reader, _bus) = started().await;
        reader.fail_next_read("collision").await.unwrap();

        let outcome = endpoint.tick().await.unwrap();
        assert!(matches!(outcome, TickOutcome::ReadFailed { .. }));
        assert_eq!(endpoint.session().state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_publish_failure_still_awaits_decision() {
        let (mut endpoint, reader, bus) = started().await;
        bus.disconnect();
        reader
            .present_card(vec![0x01, 0x02, 0x03, 0x04], CardType::MifareUltralight)
            .await
            .unwrap();

        endpoint.tick().await.unwrap();
        let outcome = endpoint.tick().await.unwrap();

        assert!(matches!(
            outcome,
            TickOutcome::RequestPublished {
                delivered: false,
                ..
            }
        ));
        assert_eq!(endpoint.session().state(), SessionState::AwaitingDecision);
    }

    #[tokio::test]
    async fn test_stale_decision_is_discarded() {
        let (mut endpoint, reader, bus) = started().await;
        reader
            .present_card(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K)
            .await
            .unwrap();
        endpoint.tick().await.unwrap();

        // Arrives before the request is published
        bus.deliver(DECISION, r#"{"door":"open"}"#);
        endpoint.tick().await.unwrap();

        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::Waiting);
        assert_eq!(endpoint.actuator().activation_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_keeps_waiting() {
        let (mut endpoint, _reader, bus) = awaiting().await;

        bus.deliver(DECISION, "");
        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::Waiting);
        assert_eq!(endpoint.session().state(), SessionState::AwaitingDecision);
    }

    #[tokio::test]
    async fn test_activation_failure_denies() {
        let (mut endpoint, _reader, bus) = awaiting().await;
        endpoint.actuator_mut().set_faulty(true);

        bus.deliver(DECISION, r#"{"door":"open"}"#);
        let outcome = endpoint.tick().await.unwrap();

        assert!(matches!(
            outcome,
            TickOutcome::Denied(DenialReason::ActuatorFault { .. })
        ));
        assert_eq!(endpoint.session().state(), SessionState::Idle);
        assert!(!endpoint.actuator().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_failure_retries() {
        let (mut endpoint, _reader, bus) = awaiting().await;
        bus.deliver(DECISION, r#"{"door":"open"}"#);
        endpoint.tick().await.unwrap();

        endpoint.actuator_mut().set_faulty(true);
        tokio::time::advance(Duration::from_millis(3000)).await;

        assert!(matches!(
            endpoint.tick().await.unwrap(),
            TickOutcome::ReleaseFailed { .. }
        ));
        assert_eq!(endpoint.session().state(), SessionState::Actuating);
        assert!(endpoint.actuator().is_active());

        endpoint.actuator_mut().set_faulty(false);
        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::Released);
        assert!(!endpoint.actuator().is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_timeout_denies() {
        let (reader, reader_handle) = MockReader::new();
        let (bus, _bus_handle) = MockBus::new();
        let config = EndpointConfig {
            decision_timeout: Some(Duration::from_secs(2)),
            ..EndpointConfig::default()
        };
        let mut endpoint = Endpoint::new(reader, bus, MockActuator::new(), config);
        endpoint.start().await;

        reader_handle
            .present_card(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K)
            .await
            .unwrap();
        endpoint.tick().await.unwrap();
        endpoint.tick().await.unwrap();

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::Waiting);

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(
            endpoint.tick().await.unwrap(),
            TickOutcome::Denied(DenialReason::TimedOut)
        );
        assert_eq!(endpoint.session().state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_timeout_by_default() {
        let (mut endpoint, _reader, _bus) = awaiting().await;

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::Waiting);
    }

    #[tokio::test]
    async fn test_recover_releases_output_and_clears_reader() {
        let (mut endpoint, reader, bus) = awaiting().await;
        bus.deliver(DECISION, r#"{"door":"open"}"#);
        endpoint.tick().await.unwrap();
        reader
            .present_card(vec![0x01, 0x02, 0x03, 0x04], CardType::MifareClassic1K)
            .await
            .unwrap();

        endpoint.recover().await;

        assert_eq!(endpoint.session().state(), SessionState::Idle);
        assert!(!endpoint.actuator().is_active());
        assert_eq!(endpoint.tick().await.unwrap(), TickOutcome::NoCard);

        let last = endpoint.session().last_transitions(1);
        assert_eq!(last[0].from, SessionState::Actuating);
        assert_eq!(last[0].to, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_releases_output() {
        let (mut endpoint, _reader, bus) = awaiting().await;
        bus.deliver(DECISION, r#"{"door":"open"}"#);
        endpoint.tick().await.unwrap();
        assert!(endpoint.actuator().is_active());

        endpoint.shutdown().await.unwrap();
        assert!(!endpoint.actuator().is_active());
        assert_eq!(endpoint.session().state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_stops_on_shutdown() {
        let (mut endpoint, reader, bus) = started().await;
        reader
            .present_card(vec![0x04, 0xA2, 0x3B, 0x9C], CardType::MifareClassic1K)
            .await
            .unwrap();

        endpoint
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(bus.published().len(), 1);
        assert_eq!(endpoint.session().state(), SessionState::Idle);
    }
}
