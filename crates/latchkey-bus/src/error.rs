//! Error types for bus operations.

use thiserror::Error;

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur while talking to the message bus
#[derive(Debug, Error)]
pub enum BusError {
    /// Client is not connected to the broker
    #[error("Not connected to broker")]
    NotConnected,

    /// Connection attempt timed out
    #[error("Connection timeout after {0}ms")]
    ConnectionTimeout(u64),

    /// Broker answered the connection request with a refusal
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),

    /// Broker rejected a subscription
    #[error("Subscription to '{0}' rejected by broker")]
    SubscriptionRejected(String),

    /// QoS level outside 0-2
    #[error("Invalid QoS level: {0}")]
    InvalidQos(u8),

    /// Request could not be handed to the client library
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// Transport or protocol failure reported by the event loop
    #[error("Connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),
}
