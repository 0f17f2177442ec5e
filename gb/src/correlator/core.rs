//! Main Correlator task implementation

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::config::CorrelatorConfig;
use super::handle::CorrelatorHandle;
use super::messages::{CorrelatorRequest, CorrelatorStatus, InboundKind, Outcome, RequestId, RequestKind};
use super::slot::PendingSlot;
use crate::bus::BusLink;
use crate::config::TopicsConfig;

/// The Correlator matches outbound commands to their bus-delivered acks
///
/// It runs as a single task that exclusively owns the [`PendingSlot`]; every
/// resolution attempt (ack, deadline, supersession, publish failure) is a
/// message processed in order on that task, which makes the first attempt to
/// match the winner.
pub struct Correlator {
    config: CorrelatorConfig,
    topics: TopicsConfig,
    bus: Arc<dyn BusLink>,
    tx: mpsc::Sender<CorrelatorRequest>,
    rx: mpsc::Receiver<CorrelatorRequest>,
}

impl Correlator {
    /// Create a new Correlator publishing through `bus`
    pub fn new(config: CorrelatorConfig, topics: TopicsConfig, bus: Arc<dyn BusLink>) -> Self {
        // mpsc::channel panics on a zero capacity
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        Self {
            config,
            topics,
            bus,
            tx,
            rx,
        }
    }

    /// Create a handle for issuing requests
    pub fn handle(&self) -> CorrelatorHandle {
        CorrelatorHandle::new(self.tx.clone())
    }

    /// Run the Correlator task
    ///
    /// This consumes the Correlator and runs until shutdown is requested.
    pub async fn run(mut self) {
        let mut state = State {
            slot: PendingSlot::new(),
            status: CorrelatorStatus::default(),
            timer_tx: self.tx.clone(),
        };

        info!(
            up_topic = %self.topics.up,
            down_topic = %self.topics.down,
            timeout_ms = self.config.timeout_ms,
            "Correlator started"
        );

        while let Some(req) = self.rx.recv().await {
            match req {
                CorrelatorRequest::Start { kind, reply_tx } => {
                    self.start(&mut state, kind, reply_tx).await;
                }

                CorrelatorRequest::BusMessage { topic, payload } => {
                    self.on_bus_message(&mut state, &topic, payload);
                }

                CorrelatorRequest::Deadline { request_id } => {
                    if state.slot.try_resolve(|r| r.id() == request_id, |_| Outcome::TimedOut) {
                        warn!(%request_id, "Request timed out");
                        state.status.timed_out += 1;
                    } else {
                        debug!(%request_id, "Stale deadline ignored");
                    }
                }

                CorrelatorRequest::GetStatus { reply_tx } => {
                    let mut status = state.status.clone();
                    status.pending = state.slot.current_kind();
                    let _ = reply_tx.send(status);
                }

                CorrelatorRequest::Shutdown => {
                    info!("Correlator shutting down");
                    break;
                }
            }
        }

        if let Some(kind) = state.slot.current_kind() {
            warn!(%kind, "Correlator stopped with a request in flight");
        }
        info!("Correlator stopped");
    }

    /// Install, publish, then arm the deadline
    async fn start(&self, state: &mut State, kind: RequestKind, reply_tx: oneshot::Sender<Outcome>) {
        state.status.requests_started += 1;

        let ticket = state.slot.install(kind, self.config.timeout(), reply_tx);
        if let Some(previous) = ticket.superseded {
            info!(%previous, %kind, "Pending request superseded");
            state.status.superseded += 1;
        }

        debug!(request_id = %ticket.id, %kind, topic = %self.topics.down, "Publishing command");
        match self.bus.publish(&self.topics.down, kind.command_payload()).await {
            Ok(()) => {
                state.arm_deadline(ticket.id, ticket.deadline.into());
            }
            Err(e) => {
                warn!(error = %e, %kind, "Bus publish failed");
                state.status.publish_failures += 1;
                let error = e.to_string();
                state
                    .slot
                    .try_resolve(|r| r.id() == ticket.id, |_| Outcome::PublishFailed { error });
            }
        }
    }

    fn on_bus_message(&self, state: &mut State, topic: &str, payload: String) {
        if topic != self.topics.up {
            debug!(%topic, %payload, "Ignoring message from unexpected topic");
            state.status.ignored_messages += 1;
            return;
        }

        match InboundKind::classify(&payload) {
            InboundKind::Alive => {
                info!("Gyro alive received");
                state.status.last_alive = Some(Utc::now());
            }
            InboundKind::Ack(ack) => {
                debug!(?ack, %payload, "Acknowledgment received");
                let resolved = state.slot.try_resolve(
                    |r| r.kind().accepts(ack),
                    |r| Outcome::Acknowledged {
                        payload,
                        latency_ms: u64::try_from(r.elapsed().as_millis()).unwrap_or(u64::MAX),
                    },
                );

                if resolved {
                    info!(?ack, "Gyro acknowledged command");
                    state.status.acknowledged += 1;
                    state.status.last_ack = Some(Utc::now());
                } else {
                    debug!(?ack, "Acknowledgment matched no pending request");
                    state.status.ignored_messages += 1;
                }
            }
            InboundKind::Unrecognized => {
                debug!(%payload, "Ignoring unrecognized payload");
                state.status.ignored_messages += 1;
            }
        }
    }
}

/// State owned by the running task
struct State {
    slot: PendingSlot,
    status: CorrelatorStatus,
    timer_tx: mpsc::Sender<CorrelatorRequest>,
}

impl State {
    /// One-shot deadline timer; never cancelled, a stale fire is a no-op
    fn arm_deadline(&self, request_id: RequestId, deadline: tokio::time::Instant) {
        let timer_tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = timer_tx.send(CorrelatorRequest::Deadline { request_id }).await;
        });
    }
}
