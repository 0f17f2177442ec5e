//! Message types for the Correlator

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

/// Payload the device publishes periodically while it is powered
pub const ALIVE_PAYLOAD: &str = "Alive";

/// Identity of a single pending request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands the front end can issue to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Switch the gyro light on
    TurnOn,
    /// Round-trip liveness check
    Ping,
}

impl RequestKind {
    /// Payload published on the down-topic for this command
    pub fn command_payload(self) -> &'static str {
        match self {
            RequestKind::TurnOn => "ON",
            RequestKind::Ping => "PING",
        }
    }

    /// The acknowledgment that satisfies this command
    pub fn expected_ack(self) -> AckKind {
        match self {
            RequestKind::TurnOn => AckKind::On,
            RequestKind::Ping => AckKind::Ping,
        }
    }

    /// Strict kind matching: only the command's own ack resolves it
    pub fn accepts(self, ack: AckKind) -> bool {
        self.expected_ack() == ack
    }

    /// User-facing command name
    pub fn command_name(self) -> &'static str {
        match self {
            RequestKind::TurnOn => "gyro",
            RequestKind::Ping => "ping",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Acknowledgment kinds the device can send back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckKind {
    On,
    Ping,
}

/// Classification of a payload received on the up-topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// Device liveness beacon
    Alive,
    /// Command acknowledgment
    Ack(AckKind),
    /// Anything else; ignored
    Unrecognized,
}

impl InboundKind {
    /// Classify a raw up-topic payload
    pub fn classify(payload: &str) -> Self {
        match payload.trim() {
            ALIVE_PAYLOAD => InboundKind::Alive,
            "ACK on" => InboundKind::Ack(AckKind::On),
            "ACK ping" => InboundKind::Ack(AckKind::Ping),
            _ => InboundKind::Unrecognized,
        }
    }
}

/// Terminal result of a request, observed exactly once by its waiter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome")]
pub enum Outcome {
    /// The matching ack arrived before the deadline
    Acknowledged {
        payload: String,
        #[serde(rename = "latency-ms")]
        latency_ms: u64,
    },

    /// Deadline elapsed with no matching ack
    TimedOut,

    /// A newer request replaced this one before it resolved
    Superseded,

    /// The bus rejected the outbound command
    PublishFailed { error: String },
}

impl Outcome {
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, Outcome::Acknowledged { .. })
    }

    /// Short label for logs and status output
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Acknowledged { .. } => "acknowledged",
            Outcome::TimedOut => "timed-out",
            Outcome::Superseded => "superseded",
            Outcome::PublishFailed { .. } => "publish-failed",
        }
    }
}

/// Internal requests to the Correlator task
#[derive(Debug)]
pub enum CorrelatorRequest {
    /// Start a new request, replacing any pending one
    Start {
        kind: RequestKind,
        reply_tx: oneshot::Sender<Outcome>,
    },

    /// Inbound event from the bus
    BusMessage { topic: String, payload: String },

    /// Deadline timer fired (internal)
    Deadline { request_id: RequestId },

    /// Get a status snapshot
    GetStatus {
        reply_tx: oneshot::Sender<CorrelatorStatus>,
    },

    /// Shutdown the correlator
    Shutdown,
}

/// Correlator status for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CorrelatorStatus {
    /// Kind of the request currently in flight, if any
    pub pending: Option<RequestKind>,
    /// Last liveness beacon received from the device
    pub last_alive: Option<DateTime<Utc>>,
    /// Last acknowledgment that resolved a request
    pub last_ack: Option<DateTime<Utc>>,
    pub requests_started: u64,
    pub acknowledged: u64,
    pub timed_out: u64,
    pub superseded: u64,
    pub publish_failures: u64,
    pub ignored_messages: u64,
}
