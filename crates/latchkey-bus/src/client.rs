//! Message bus client abstraction.
//!
//! The endpoint only needs four things from a bus: connect, subscribe to
//! the decision topic, publish requests, and drain whatever arrived since
//! the last poll. [`BusClient`] captures exactly that so the session logic
//! can run against [`MqttBus`](crate::MqttBus) in production and
//! [`MockBus`](crate::mock::MockBus) in tests.
//!
//! # Architecture
//!
//! ```text
//! Endpoint
//!     │
//!     ├─> connect_with_retry ──> BusClient::connect + subscribe
//!     │
//!     └─> tick loop
//!             ├─> BusClient::process_inbound   (never blocks)
//!             └─> BusClient::publish           (best effort)
//! ```

use crate::{Result, message::InboundMessage};
use std::time::Duration;
use tracing::{info, warn};

/// Publish/subscribe client used by the endpoint.
///
/// Implementations must not block in [`process_inbound`](Self::process_inbound):
/// it is called on every tick of the cooperative loop.
pub trait BusClient {
    /// Open the broker session.
    async fn connect(&mut self) -> Result<()>;

    /// Register interest in `topic`.
    async fn subscribe(&mut self, topic: &str) -> Result<()>;

    /// Publish `payload` on `topic`.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Drain messages received since the last call, oldest first.
    async fn process_inbound(&mut self) -> Result<Vec<InboundMessage>>;

    /// Returns `true` while the broker session is up.
    fn is_connected(&self) -> bool;
}

/// Connect and subscribe to `topic`, retrying until both succeed.
///
/// Each failed attempt is logged and followed by a pause of
/// `retry_interval`. Returns the number of attempts it took.
///
/// # Examples
///
/// ```
/// use latchkey_bus::{BusClient, connect_with_retry, mock::MockBus};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let (mut bus, handle) = MockBus::new();
/// handle.fail_connects(1);
///
/// let attempts = connect_with_retry(&mut bus, "RFID_PORBLE/SUB", Duration::from_millis(1)).await;
/// assert_eq!(attempts, 2);
/// assert!(bus.is_connected());
/// # }
/// ```
pub async fn connect_with_retry<B: BusClient>(
    bus: &mut B,
    topic: &str,
    retry_interval: Duration,
) -> u32 {
    let mut attempts = 0;

    loop {
        attempts += 1;
        info!(attempt = attempts, "Attempting broker connection");

        let result = match bus.connect().await {
            Ok(()) => bus.subscribe(topic).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(topic, attempts, "Connected to broker and subscribed");
                return attempts;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = u64::try_from(retry_interval.as_millis()).unwrap_or(u64::MAX),
                    "Broker connection failed"
                );
                tokio::time::sleep(retry_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockBus;

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_first_attempt() {
        let (mut bus, handle) = MockBus::new();

        let attempts = connect_with_retry(&mut bus, "RFID_PORBLE/SUB", Duration::from_secs(5)).await;

        assert_eq!(attempts, 1);
        assert!(bus.is_connected());
        assert!(handle.is_subscribed("RFID_PORBLE/SUB"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_waits_between_attempts() {
        let (mut bus, handle) = MockBus::new();
        handle.fail_connects(3);

        let start = tokio::time::Instant::now();
        let attempts = connect_with_retry(&mut bus, "RFID_PORBLE/SUB", Duration::from_secs(5)).await;

        assert_eq!(attempts, 4);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert!(bus.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_retry_retries_rejected_subscription() {
        let (mut bus, handle) = MockBus::new();
        handle.reject_subscriptions(1);

        let attempts = connect_with_retry(&mut bus, "RFID_PORBLE/SUB", Duration::from_secs(5)).await;

        assert_eq!(attempts, 2);
        assert!(handle.is_subscribed("RFID_PORBLE/SUB"));
    }
}
