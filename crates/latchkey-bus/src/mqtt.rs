//! MQTT bus client.
//!
//! Wraps a `rumqttc` client and event loop. Until the first subscription is
//! acknowledged, the event loop is driven inline so [`connect`] and
//! [`subscribe`] can report broker answers synchronously. From then on a
//! background task owns it: it sends keep-alives while the endpoint is idle,
//! forwards publications into a bounded queue and restores subscriptions
//! after a reconnect.
//!
//! [`connect`]: BusClient::connect
//! [`subscribe`]: BusClient::subscribe

use crate::{BusError, Result, client::BusClient, message::InboundMessage};
use latchkey_core::constants::{
    CONNECT_RETRY_INTERVAL_MS, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, DEFAULT_CLIENT_ID_PREFIX,
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEP_ALIVE_SECS, INBOUND_QUEUE_CAPACITY,
};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet,
    Publish, QoS, SubscribeReasonCode,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Requests buffered between the client handle and the event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Smallest keep-alive accepted by the client library.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host name or address
    pub host: String,

    /// Broker TCP port
    pub port: u16,

    /// Client identifier presented to the broker
    pub client_id: String,

    /// Keep-alive interval (at least 5 seconds)
    pub keep_alive: Duration,

    /// Pause between reconnection attempts of the background task
    pub retry_interval: Duration,

    /// Upper bound for a broker answer during connect and subscribe
    pub connect_timeout: Duration,

    /// Delivery guarantee for subscriptions and publications
    pub qos: QoS,

    /// Optional username and password
    pub credentials: Option<(String, String)>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            client_id: format!("{DEFAULT_CLIENT_ID_PREFIX}{}", std::process::id()),
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            retry_interval: Duration::from_millis(CONNECT_RETRY_INTERVAL_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            qos: QoS::AtLeastOnce,
            credentials: None,
        }
    }
}

/// Map a numeric QoS level to the client library type.
///
/// # Errors
///
/// Returns `BusError::InvalidQos` for levels above 2.
pub fn qos_from_level(level: u8) -> Result<QoS> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(BusError::InvalidQos(other)),
    }
}

/// [`BusClient`] backed by an MQTT 3.1.1 broker.
pub struct MqttBus {
    config: MqttConfig,
    client: AsyncClient,
    eventloop: Option<EventLoop>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    driver: Option<JoinHandle<()>>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl MqttBus {
    /// Create a client for the configured broker. No I/O happens until
    /// [`connect`](BusClient::connect).
    pub fn new(config: MqttConfig) -> Self {
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive.max(MIN_KEEP_ALIVE));
        options.set_clean_session(true);
        if let Some((username, password)) = &config.credentials {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);

        debug!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "Created MQTT client"
        );

        Self {
            config,
            client,
            eventloop: Some(eventloop),
            inbound_tx,
            inbound_rx,
            driver: None,
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Client identifier presented to the broker.
    pub fn client_id(&self) -> &str {
        &self.config.client_id
    }

    /// Returns `true` once the background task owns the event loop.
    pub fn is_driven(&self) -> bool {
        self.driver.is_some()
    }

    fn timeout_error(&self) -> BusError {
        let millis = u64::try_from(self.config.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        BusError::ConnectionTimeout(millis)
    }

    fn remember(&self, topic: &str) {
        let mut topics = lock(&self.subscriptions);
        if !topics.iter().any(|t| t == topic) {
            topics.push(topic.to_string());
        }
    }

    fn ensure_driver(&mut self) {
        if self.driver.is_some() {
            return;
        }
        let Some(eventloop) = self.eventloop.take() else {
            return;
        };

        let driver = Driver {
            client: self.client.clone(),
            inbound_tx: self.inbound_tx.clone(),
            connected: Arc::clone(&self.connected),
            subscriptions: Arc::clone(&self.subscriptions),
            qos: self.config.qos,
            retry_interval: self.config.retry_interval,
        };
        self.driver = Some(tokio::spawn(driver.run(eventloop)));
        debug!("MQTT event loop moved to background task");
    }
}

impl BusClient for MqttBus {
    async fn connect(&mut self) -> Result<()> {
        // A session left open by a failed subscribe is reused as is.
        if self.is_connected() {
            return Ok(());
        }
        if self.driver.is_some() {
            return Err(BusError::NotConnected);
        }

        let timeout = self.timeout_error();
        let deadline = Instant::now() + self.config.connect_timeout;
        let eventloop = self.eventloop.as_mut().ok_or(BusError::NotConnected)?;

        info!(host = %self.config.host, port = self.config.port, "Connecting to broker");

        loop {
            let event = match tokio::time::timeout_at(deadline, eventloop.poll()).await {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(connection_error(e));
                }
                Err(_) => return Err(timeout),
            };

            match event {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    if ack.code != ConnectReturnCode::Success {
                        return Err(BusError::ConnectionRefused(format!("{:?}", ack.code)));
                    }
                    self.connected.store(true, Ordering::Release);
                    info!(client_id = %self.config.client_id, "Connected to broker");
                    return Ok(());
                }
                Event::Incoming(Packet::Publish(publish)) => forward(&self.inbound_tx, publish),
                other => trace!(event = ?other, "Ignoring event while connecting"),
            }
        }
    }

    async fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.client.subscribe(topic, self.config.qos).await?;

        // Once the background task owns the event loop the SUBACK is
        // observed there.
        if self.driver.is_some() {
            self.remember(topic);
            return Ok(());
        }

        let timeout = self.timeout_error();
        let deadline = Instant::now() + self.config.connect_timeout;
        let eventloop = self.eventloop.as_mut().ok_or(BusError::NotConnected)?;

        let result = loop {
            let event = match tokio::time::timeout_at(deadline, eventloop.poll()).await {
                Ok(Ok(event)) => event,
                Ok(Err(e)) => {
                    self.connected.store(false, Ordering::Release);
                    break Err(connection_error(e));
                }
                Err(_) => break Err(timeout),
            };

            match event {
                Event::Incoming(Packet::SubAck(ack)) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        break Err(BusError::SubscriptionRejected(topic.to_string()));
                    }
                    info!(topic, "Subscribed");
                    break Ok(());
                }
                Event::Incoming(Packet::Publish(publish)) => forward(&self.inbound_tx, publish),
                other => trace!(event = ?other, "Ignoring event while subscribing"),
            }
        };

        if result.is_ok() {
            self.remember(topic);
            self.ensure_driver();
        }
        result
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.ensure_driver();

        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }

        self.client
            .try_publish(topic, self.config.qos, false, payload)?;
        debug!(topic, "Published message");
        Ok(())
    }

    async fn process_inbound(&mut self) -> Result<Vec<InboundMessage>> {
        self.ensure_driver();

        let mut messages = Vec::new();
        while let Ok(message) = self.inbound_rx.try_recv() {
            messages.push(message);
        }
        Ok(messages)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl std::fmt::Debug for MqttBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttBus")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .field("subscriptions", &*lock(&self.subscriptions))
            .field("driver_running", &self.is_driven())
            .finish()
    }
}

fn lock(topics: &Mutex<Vec<String>>) -> MutexGuard<'_, Vec<String>> {
    topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn connection_error(error: ConnectionError) -> BusError {
    match error {
        ConnectionError::ConnectionRefused(code) => BusError::ConnectionRefused(format!("{code:?}")),
        other => BusError::Connection(other),
    }
}

fn forward(inbound_tx: &mpsc::Sender<InboundMessage>, publish: Publish) {
    let message = InboundMessage::new(publish.topic, publish.payload);
    trace!(topic = %message.topic, bytes = message.payload.len(), "Inbound message");

    if let Err(e) = inbound_tx.try_send(message) {
        warn!(error = %e, "Inbound queue full, dropping message");
    }
}

/// State owned by the background event loop task.
struct Driver {
    client: AsyncClient,
    inbound_tx: mpsc::Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    qos: QoS,
    retry_interval: Duration,
}

impl Driver {
    async fn run(self, mut eventloop: EventLoop) {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.on_connected();
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => forward(&self.inbound_tx, publish),
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        warn!(pkid = ack.pkid, "Broker rejected subscription");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if self.connected.swap(false, Ordering::AcqRel) {
                        warn!(error = %e, "Connection to broker lost");
                    } else {
                        debug!(error = %e, "Reconnect attempt failed");
                    }
                    tokio::time::sleep(self.retry_interval).await;
                }
            }
        }
    }

    fn on_connected(&self) {
        if self.connected.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Reconnected to broker");
        let topics = lock(&self.subscriptions).clone();
        for topic in &topics {
            if let Err(e) = self.client.try_subscribe(topic.as_str(), self.qos) {
                warn!(topic = %topic, error = %e, "Failed to restore subscription");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, QoS::AtMostOnce)]
    #[case(1, QoS::AtLeastOnce)]
    #[case(2, QoS::ExactlyOnce)]
    fn test_qos_from_level(#[case] level: u8, #[case] expected: QoS) {
        assert_eq!(qos_from_level(level).unwrap(), expected);
    }

    #[test]
    fn test_qos_from_level_invalid() {
        assert!(matches!(qos_from_level(3), Err(BusError::InvalidQos(3))));
    }

    #[test]
    fn test_default_config() {
        let config = MqttConfig::default();
        assert_eq!(config.host, "broker.emqx.io");
        assert_eq!(config.port, 1883);
        assert!(config.client_id.starts_with("latchkey-endpoint-"));
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert_eq!(config.qos, QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn test_new_client_is_disconnected() {
        let bus = MqttBus::new(MqttConfig::default());
        assert!(!bus.is_connected());
        assert!(bus.client_id().starts_with("latchkey-endpoint-"));
    }

    #[tokio::test]
    async fn test_timeout_error_saturates() {
        let bus = MqttBus::new(MqttConfig {
            connect_timeout: Duration::MAX,
            ..MqttConfig::default()
        });
        assert!(matches!(
            bus.timeout_error(),
            BusError::ConnectionTimeout(u64::MAX)
        ));
        assert!(!bus.is_driven());
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let mut bus = MqttBus::new(MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 9,
            ..MqttConfig::default()
        });

        let result = bus.publish("RFID_PORBLE", b"{}".to_vec()).await;
        assert!(matches!(result, Err(BusError::NotConnected)));
    }
}
