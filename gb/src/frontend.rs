//! Command front end
//!
//! Turns a user command into a correlated device request and renders the
//! outcome as the text the user sees.

use std::sync::Arc;

use eyre::Result;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::config::FrontEndConfig;
use crate::correlator::{CorrelatorHandle, Outcome, RequestKind};
use crate::ipc::{DaemonMessage, DaemonResponse};
use crate::replies::ReplyStore;

pub const NOT_CONNECTED: &str = "I'm not connected :sob:";
pub const SUPERSEDED_NOTICE: &str = "A newer command took over before the gyro answered.";

/// Daemon version reported in status responses
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Render the user-facing text for a finished request
pub fn render(kind: RequestKind, outcome: &Outcome, replies: &ReplyStore, config: &FrontEndConfig) -> String {
    match outcome {
        Outcome::Acknowledged { latency_ms, .. } => match kind {
            RequestKind::TurnOn => replies.pick().unwrap_or(config.fallback_reply.as_str()).to_string(),
            RequestKind::Ping => format!("Pong! ({} ms)", latency_ms),
        },
        Outcome::TimedOut => match &config.mention {
            Some(mention) => format!("{} {}", NOT_CONNECTED, mention),
            None => NOT_CONNECTED.to_string(),
        },
        Outcome::Superseded => SUPERSEDED_NOTICE.to_string(),
        Outcome::PublishFailed { error } => format!("Could not send the command to the gyro: {}", error),
    }
}

/// Dispatches user commands to the Correlator
#[derive(Debug, Clone)]
pub struct CommandFrontEnd {
    correlator: CorrelatorHandle,
    replies: Arc<RwLock<ReplyStore>>,
    config: FrontEndConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl CommandFrontEnd {
    pub fn new(
        correlator: CorrelatorHandle,
        replies: ReplyStore,
        config: FrontEndConfig,
        shutdown_tx: mpsc::Sender<()>,
    ) -> Self {
        Self {
            correlator,
            replies: Arc::new(RwLock::new(replies)),
            config,
            shutdown_tx,
        }
    }

    /// Run one command to completion and render its outcome
    pub async fn execute(&self, kind: RequestKind, user: &str) -> Result<(String, Outcome)> {
        info!("{} used the command {}", user, kind.command_name());

        let outcome = self.correlator.start_request(kind).await?;
        match &outcome {
            Outcome::Acknowledged { latency_ms, .. } => info!(%kind, latency_ms, "Command acknowledged"),
            Outcome::TimedOut => warn!(%kind, "Command timed out"),
            Outcome::Superseded => info!(%kind, "Command superseded"),
            Outcome::PublishFailed { error } => warn!(%kind, %error, "Command publish failed"),
        }

        let replies = self.replies.read().await;
        let text = render(kind, &outcome, &replies, &self.config);
        Ok((text, outcome))
    }

    /// Answer one IPC message
    pub async fn handle(&self, msg: DaemonMessage) -> DaemonResponse {
        debug!(?msg, "CommandFrontEnd::handle: called");
        match msg {
            DaemonMessage::Command { kind, user } => match self.execute(kind, &user).await {
                Ok((text, outcome)) => DaemonResponse::Reply { text, outcome },
                Err(e) => DaemonResponse::Error {
                    message: e.to_string(),
                },
            },
            DaemonMessage::Status => match self.correlator.status().await {
                Ok(status) => DaemonResponse::Status {
                    status,
                    version: VERSION.to_string(),
                },
                Err(e) => DaemonResponse::Error {
                    message: e.to_string(),
                },
            },
            // The connection handler calls request_shutdown once this reply is written
            DaemonMessage::Shutdown => {
                info!("Shutdown requested over IPC");
                DaemonResponse::Ok
            }
        }
    }

    /// Ask the daemon to stop
    pub async fn request_shutdown(&self) {
        debug!("CommandFrontEnd::request_shutdown: called");
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("CommandFrontEnd::request_shutdown: shutdown already in progress");
        }
    }

    /// Re-read the reply file from disk
    pub async fn reload_replies(&self) -> Result<()> {
        debug!("CommandFrontEnd::reload_replies: called");
        self.replies.write().await.reload()?;
        Ok(())
    }
}
