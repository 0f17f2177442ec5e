//! CorrelatorHandle - client interface to the Correlator task

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{CorrelatorRequest, CorrelatorStatus, Outcome, RequestKind};

/// Handle for issuing requests and feeding bus events to the Correlator
///
/// This handle is cheap to clone. Errors only mean the Correlator task is
/// gone; per-request failures come back as an [`Outcome`].
#[derive(Debug, Clone)]
pub struct CorrelatorHandle {
    tx: mpsc::Sender<CorrelatorRequest>,
}

impl CorrelatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CorrelatorRequest>) -> Self {
        Self { tx }
    }

    /// Issue a command and wait for its outcome
    ///
    /// Any request still pending is superseded by this one.
    pub async fn start_request(&self, kind: RequestKind) -> Result<Outcome> {
        debug!(%kind, "CorrelatorHandle::start_request: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CorrelatorRequest::Start { kind, reply_tx })
            .await
            .map_err(|_| eyre!("Correlator channel closed"))?;

        debug!(%kind, "CorrelatorHandle::start_request: waiting for outcome");
        reply_rx
            .await
            .map_err(|_| eyre!("Correlator shut down before the request resolved"))
    }

    /// Forward one inbound bus event
    pub async fn on_bus_message(&self, topic: &str, payload: &str) -> Result<()> {
        debug!(%topic, %payload, "CorrelatorHandle::on_bus_message: called");
        self.tx
            .send(CorrelatorRequest::BusMessage {
                topic: topic.to_string(),
                payload: payload.to_string(),
            })
            .await
            .map_err(|_| eyre!("Correlator channel closed"))
    }

    /// Get a status snapshot
    pub async fn status(&self) -> Result<CorrelatorStatus> {
        debug!("CorrelatorHandle::status: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CorrelatorRequest::GetStatus { reply_tx })
            .await
            .map_err(|_| eyre!("Correlator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Correlator shut down before reply"))
    }

    /// Request shutdown of the Correlator
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CorrelatorHandle::shutdown: called");
        self.tx
            .send(CorrelatorRequest::Shutdown)
            .await
            .map_err(|_| eyre!("Correlator channel closed"))
    }
}
