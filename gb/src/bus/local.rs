//! In-memory bus and a simulated gyro device
//!
//! `LocalBus` records everything published to it and lets callers inject
//! inbound events. `spawn_echo_device` listens to the down-topic and answers
//! like the real device does, which is what `gb serve --loopback` runs on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::link::{BusError, BusEvents, BusLink, BusMessage, BusResult};
use crate::correlator::ALIVE_PAYLOAD;

const OUTBOUND_CAPACITY: usize = 64;

/// In-memory bus for tests and loopback runs
#[derive(Debug)]
pub struct LocalBus {
    inbound_tx: mpsc::UnboundedSender<BusMessage>,
    outbound_tx: broadcast::Sender<BusMessage>,
    published: Mutex<Vec<BusMessage>>,
    fail_publishes: AtomicBool,
}

impl LocalBus {
    /// Create a bus and the receiving end of its inbound stream
    pub fn new() -> (Arc<Self>, BusEvents) {
        debug!("LocalBus::new: called");
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);
        let bus = Self {
            inbound_tx,
            outbound_tx,
            published: Mutex::new(Vec::new()),
            fail_publishes: AtomicBool::new(false),
        };
        (Arc::new(bus), inbound_rx)
    }

    /// Deliver an inbound event as if the device had sent it
    pub fn inject(&self, topic: &str, payload: &str) -> BusResult<()> {
        debug!(%topic, %payload, "LocalBus::inject: called");
        self.inbound_tx
            .send(BusMessage::new(topic, payload))
            .map_err(|_| BusError::Closed)
    }

    /// Everything published so far, oldest first
    pub fn published(&self) -> Vec<BusMessage> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Watch outbound publishes as they happen
    pub fn subscribe_outbound(&self) -> broadcast::Receiver<BusMessage> {
        self.outbound_tx.subscribe()
    }

    /// Make subsequent publishes fail with a transport error
    pub fn set_fail_publishes(&self, fail: bool) {
        debug!(fail, "LocalBus::set_fail_publishes: called");
        self.fail_publishes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BusLink for LocalBus {
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()> {
        debug!(%topic, %payload, "LocalBus::publish: called");
        if self.fail_publishes.load(Ordering::SeqCst) {
            return Err(BusError::Transport("simulated publish failure".to_string()));
        }

        let msg = BusMessage::new(topic, payload);
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(msg.clone());
        // No device listening is fine
        let _ = self.outbound_tx.send(msg);
        Ok(())
    }
}

/// Behaviour of the simulated device
#[derive(Debug, Clone)]
pub struct EchoDeviceConfig {
    pub down_topic: String,
    pub up_topic: String,
    /// Delay before answering a command
    pub reply_delay: Duration,
    /// Period of the `Alive` beacon
    pub alive_interval: Duration,
}

impl EchoDeviceConfig {
    pub fn new(down_topic: impl Into<String>, up_topic: impl Into<String>) -> Self {
        Self {
            down_topic: down_topic.into(),
            up_topic: up_topic.into(),
            reply_delay: Duration::from_millis(200),
            alive_interval: Duration::from_secs(30),
        }
    }
}

/// Reply the device sends for a command payload
fn device_reply(command: &str) -> Option<&'static str> {
    match command {
        "ON" => Some("ACK on"),
        "PING" => Some("ACK ping"),
        _ => None,
    }
}

/// Run a simulated device on the bus until the bus side goes away
pub fn spawn_echo_device(bus: Arc<LocalBus>, config: EchoDeviceConfig) -> JoinHandle<()> {
    debug!(?config, "spawn_echo_device: called");
    let mut outbound = bus.subscribe_outbound();

    tokio::spawn(async move {
        let mut beacon = tokio::time::interval(config.alive_interval);
        info!(down_topic = %config.down_topic, "Echo device started");

        loop {
            tokio::select! {
                received = outbound.recv() => {
                    let msg = match received {
                        Ok(msg) => msg,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(skipped, "spawn_echo_device: lagged");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };

                    if msg.topic != config.down_topic {
                        continue;
                    }

                    let Some(reply) = device_reply(&msg.payload) else {
                        debug!(payload = %msg.payload, "spawn_echo_device: unknown command");
                        continue;
                    };

                    tokio::time::sleep(config.reply_delay).await;
                    if bus.inject(&config.up_topic, reply).is_err() {
                        break;
                    }
                }
                _ = beacon.tick() => {
                    if bus.inject(&config.up_topic, ALIVE_PAYLOAD).is_err() {
                        break;
                    }
                }
            }
        }

        info!("Echo device stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_is_recorded() {
        let (bus, _events) = LocalBus::new();
        bus.publish("girobot/DOWN", "PING").await.unwrap();
        bus.publish("girobot/DOWN", "ON").await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0], BusMessage::new("girobot/DOWN", "PING"));
        assert_eq!(published[1].payload, "ON");
    }

    #[tokio::test]
    async fn test_inject_reaches_inbound_stream() {
        let (bus, mut events) = LocalBus::new();
        bus.inject("girobot/UP", "Alive").unwrap();

        let msg = events.recv().await.unwrap();
        assert_eq!(msg.topic, "girobot/UP");
        assert_eq!(msg.payload, "Alive");
    }

    #[tokio::test]
    async fn test_inject_after_reader_dropped() {
        let (bus, events) = LocalBus::new();
        drop(events);
        assert!(matches!(bus.inject("girobot/UP", "Alive"), Err(BusError::Closed)));
    }

    #[tokio::test]
    async fn test_simulated_publish_failure() {
        let (bus, _events) = LocalBus::new();
        bus.set_fail_publishes(true);

        let err = bus.publish("girobot/DOWN", "ON").await.unwrap_err();
        assert!(err.to_string().contains("simulated publish failure"));
        assert!(bus.published().is_empty());

        bus.set_fail_publishes(false);
        assert!(bus.publish("girobot/DOWN", "ON").await.is_ok());
    }

    #[test]
    fn test_device_reply() {
        assert_eq!(device_reply("ON"), Some("ACK on"));
        assert_eq!(device_reply("PING"), Some("ACK ping"));
        assert_eq!(device_reply("OFF"), None);
    }

    #[tokio::test]
    async fn test_echo_device_answers_commands() {
        let (bus, mut events) = LocalBus::new();
        let config = EchoDeviceConfig {
            reply_delay: Duration::from_millis(10),
            alive_interval: Duration::from_secs(3600),
            ..EchoDeviceConfig::new("girobot/DOWN", "girobot/UP")
        };
        let device = spawn_echo_device(bus.clone(), config);

        // First beacon tick fires immediately
        let beacon = events.recv().await.unwrap();
        assert_eq!(beacon.payload, "Alive");

        bus.publish("girobot/DOWN", "PING").await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, BusMessage::new("girobot/UP", "ACK ping"));

        // Commands on other topics are not answered
        bus.publish("other/DOWN", "ON").await.unwrap();
        bus.publish("girobot/DOWN", "ON").await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.payload, "ACK on");

        device.abort();
    }
}
