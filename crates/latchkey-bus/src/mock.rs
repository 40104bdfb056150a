//! In-memory bus for testing and simulation.
//!
//! Behaves like a tiny broker: messages delivered through the
//! [`MockBusHandle`] reach the client only on topics it subscribed to, and
//! everything the client publishes is recorded for inspection.

use crate::{BusError, Result, client::BusClient, message::InboundMessage};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    subscriptions: Vec<String>,
    inbound: VecDeque<InboundMessage>,
    published: Vec<InboundMessage>,
    connect_failures: u32,
    subscribe_rejections: u32,
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory [`BusClient`].
///
/// # Examples
///
/// ```
/// use latchkey_bus::{BusClient, mock::MockBus};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> latchkey_bus::Result<()> {
/// let (mut bus, handle) = MockBus::new();
/// bus.connect().await?;
/// bus.subscribe("RFID_PORBLE/SUB").await?;
///
/// handle.deliver("RFID_PORBLE/SUB", r#"{"door":"open"}"#);
/// let inbound = bus.process_inbound().await?;
/// assert_eq!(inbound.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MockBus {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBus {
    /// Create a disconnected mock bus and its control handle.
    pub fn new() -> (Self, MockBusHandle) {
        let state = Arc::new(Mutex::new(BrokerState::default()));
        let handle = MockBusHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

impl BusClient for MockBus {
    async fn connect(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(BusError::ConnectionRefused("simulated refusal".to_string()));
        }

        state.connected = true;
        debug!("Mock bus connected");
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(BusError::NotConnected);
        }
        if state.subscribe_rejections > 0 {
            state.subscribe_rejections -= 1;
            return Err(BusError::SubscriptionRejected(topic.to_string()));
        }

        if !state.subscriptions.iter().any(|t| t == topic) {
            state.subscriptions.push(topic.to_string());
        }
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Err(BusError::NotConnected);
        }

        state.published.push(InboundMessage::new(topic, payload));
        Ok(())
    }

    async fn process_inbound(&mut self) -> Result<Vec<InboundMessage>> {
        let mut state = lock(&self.state);
        if !state.connected {
            return Ok(Vec::new());
        }
        Ok(state.inbound.drain(..).collect())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// Control side of a [`MockBus`].
#[derive(Debug, Clone)]
pub struct MockBusHandle {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBusHandle {
    /// Deliver a message as if another client published it.
    ///
    /// Returns `false` if the bus is not subscribed to `topic`, in which
    /// case the message is dropped like a real broker would.
    pub fn deliver(&self, topic: &str, payload: impl Into<Bytes>) -> bool {
        let mut state = lock(&self.state);
        if !state.subscriptions.iter().any(|t| t == topic) {
            return false;
        }
        state.inbound.push_back(InboundMessage::new(topic, payload));
        true
    }

    /// Queue a message for the client whatever its subscriptions, as a
    /// broker does when an overlapping wildcard filter matches.
    pub fn inject(&self, topic: &str, payload: impl Into<Bytes>) {
        lock(&self.state)
            .inbound
            .push_back(InboundMessage::new(topic, payload));
    }

    /// Everything the client has published so far.
    pub fn published(&self) -> Vec<InboundMessage> {
        lock(&self.state).published.clone()
    }

    /// Returns `true` if the client subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        lock(&self.state).subscriptions.iter().any(|t| t == topic)
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_connects(&self, count: u32) {
        lock(&self.state).connect_failures = count;
    }

    /// Reject the next `count` subscription requests.
    pub fn reject_subscriptions(&self, count: u32) {
        lock(&self.state).subscribe_rejections = count;
    }

    /// Drop the broker session. Queued messages are lost.
    pub fn disconnect(&self) {
        let mut state = lock(&self.state);
        state.connected = false;
        state.inbound.clear();
    }

    /// Restore the broker session with existing subscriptions.
    pub fn reconnect(&self) {
        lock(&self.state).connected = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_requires_subscription() {
        let (mut bus, handle) = MockBus::new();
        bus.connect().await.unwrap();

        assert!(!handle.deliver("RFID_PORBLE/SUB", "{}"));

        bus.subscribe("RFID_PORBLE/SUB").await.unwrap();
        assert!(handle.deliver("RFID_PORBLE/SUB", "{}"));
        assert!(!handle.deliver("other/topic", "{}"));

        let inbound = bus.process_inbound().await.unwrap();
        assert_eq!(inbound.len(), 1);
        assert!(bus.process_inbound().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inject_bypasses_subscriptions() {
        let (mut bus, handle) = MockBus::new();
        bus.connect().await.unwrap();

        handle.inject("other/topic", "{}");

        let inbound = bus.process_inbound().await.unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].topic, "other/topic");
    }

    #[tokio::test]
    async fn test_publish_records_messages() {
        let (mut bus, handle) = MockBus::new();
        bus.connect().await.unwrap();

        bus.publish("RFID_PORBLE", b"one".to_vec()).await.unwrap();
        bus.publish("RFID_PORBLE", b"two".to_vec()).await.unwrap();

        let published = handle.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[1].payload.as_ref(), b"two");
    }

    #[tokio::test]
    async fn test_publish_while_disconnected_fails() {
        let (mut bus, handle) = MockBus::new();

        let result = bus.publish("RFID_PORBLE", b"x".to_vec()).await;
        assert!(matches!(result, Err(BusError::NotConnected)));
        assert!(handle.published().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_and_reconnect() {
        let (mut bus, handle) = MockBus::new();
        bus.connect().await.unwrap();
        bus.subscribe("RFID_PORBLE/SUB").await.unwrap();

        handle.deliver("RFID_PORBLE/SUB", "{}");
        handle.disconnect();
        assert!(!bus.is_connected());
        assert!(bus.process_inbound().await.unwrap().is_empty());

        handle.reconnect();
        assert!(bus.is_connected());
        assert!(handle.deliver("RFID_PORBLE/SUB", "{}"));
        assert_eq!(bus.process_inbound().await.unwrap().len(), 1);
    }
}
