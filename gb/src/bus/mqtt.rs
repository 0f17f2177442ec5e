//! MQTT transport for the Bus Link
//!
//! The rumqttc event loop runs on its own task. It re-subscribes to the
//! up-topic on every connection acknowledgment, so a broker restart does not
//! leave the link deaf, and it forwards every inbound publish to the
//! [`BusEvents`] stream. Reconnection is the event loop's job: on a
//! connection error we log, wait the reconnect period, and poll again.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::link::{BusError, BusEvents, BusLink, BusMessage, BusResult};
use crate::config::MqttConfig;

/// Capacity of the request queue between the client handle and the event loop
const REQUEST_CAPACITY: usize = 16;

/// Bus Link over an MQTT broker
pub struct MqttLink {
    client: AsyncClient,
}

impl MqttLink {
    /// Connect to the broker and start the event loop task
    ///
    /// Returns the link, the inbound event stream and the event loop task.
    pub fn connect(config: &MqttConfig, up_topic: &str) -> (Arc<Self>, BusEvents, JoinHandle<()>) {
        debug!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            %up_topic,
            "MqttLink::connect: called"
        );

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(config.clean_session);
        if let Some(username) = &config.username {
            debug!(%username, "MqttLink::connect: using credentials");
            options.set_credentials(username, config.password().unwrap_or_default());
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(drive(
            eventloop,
            client.clone(),
            up_topic.to_string(),
            config.reconnect_period(),
            tx,
        ));

        (Arc::new(Self { client }), rx, task)
    }

    /// Ask the broker to close the connection
    pub async fn disconnect(&self) {
        debug!("MqttLink::disconnect: called");
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "Failed to disconnect from MQTT broker");
        }
    }
}

#[async_trait]
impl BusLink for MqttLink {
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()> {
        debug!(%topic, %payload, "MqttLink::publish: called");
        // try_publish never parks the caller behind a stalled connection
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| BusError::Transport(e.to_string()))
    }
}

async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    up_topic: String,
    reconnect_period: Duration,
    tx: mpsc::UnboundedSender<BusMessage>,
) {
    info!("MQTT event loop started");

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT connected");
                if let Err(e) = client.try_subscribe(up_topic.as_str(), QoS::AtMostOnce) {
                    warn!(error = %e, %up_topic, "Failed to subscribe to up-topic");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = BusMessage {
                    topic: publish.topic.clone(),
                    payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                };
                debug!(topic = %msg.topic, payload = %msg.payload, "MQTT message received");
                if tx.send(msg).is_err() {
                    debug!("drive: inbound reader dropped");
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "MQTT connection error");
                tokio::time::sleep(reconnect_period).await;
            }
        }
    }

    info!("MQTT event loop stopped");
}
