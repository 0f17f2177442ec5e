//! Bus Link contract shared by every transport

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// One event received from (or published to) the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: String,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
}

pub type BusResult<T> = Result<T, BusError>;

/// Lazy, unbounded stream of inbound bus events
pub type BusEvents = mpsc::UnboundedReceiver<BusMessage>;

/// Outbound half of a bus connection
///
/// Inbound events are handed out separately as [`BusEvents`] when the link is
/// created, so that exactly one reader consumes them.
#[async_trait]
pub trait BusLink: Send + Sync {
    async fn publish(&self, topic: &str, payload: &str) -> BusResult<()>;
}
