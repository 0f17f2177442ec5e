//! IPC client for communicating with the daemon

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::MAX_MESSAGE_SIZE;
use super::get_socket_path;
use super::messages::{DaemonMessage, DaemonResponse};
use crate::correlator::{CorrelatorStatus, Outcome, RequestKind};

/// Default timeout for IPC operations
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time granted on top of the correlator deadline when waiting for a
/// command reply, so a timed-out request is still reported by the daemon
pub const REPLY_MARGIN: Duration = Duration::from_secs(2);

/// Client for communicating with the daemon via IPC
#[derive(Debug, Clone)]
pub struct DaemonClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DaemonClient {
    /// Create a new client with the default socket path
    pub fn new() -> Self {
        Self::with_socket_path(get_socket_path())
    }

    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the timeout used for connect, write and read
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Size the read timeout for a correlator deadline
    pub fn for_correlator_timeout(self, correlator_timeout: Duration) -> Self {
        self.with_timeout(correlator_timeout + REPLY_MARGIN)
    }

    pub fn socket_exists(&self) -> bool {
        self.socket_path.exists()
    }

    /// Issue a device command and return the rendered reply with its outcome
    pub async fn command(&self, kind: RequestKind, user: &str) -> Result<(String, Outcome)> {
        debug!(%kind, %user, "DaemonClient::command: called");
        let msg = DaemonMessage::Command {
            kind,
            user: user.to_string(),
        };
        match self.send_message(msg).await? {
            DaemonResponse::Reply { text, outcome } => Ok((text, outcome)),
            DaemonResponse::Error { message } => Err(eyre!("Daemon error: {}", message)),
            other => Err(eyre!("Unexpected response: {:?}", other)),
        }
    }

    /// Fetch the correlator status and daemon version
    pub async fn status(&self) -> Result<(CorrelatorStatus, String)> {
        debug!("DaemonClient::status: called");
        match self.send_message(DaemonMessage::Status).await? {
            DaemonResponse::Status { status, version } => Ok((status, version)),
            DaemonResponse::Error { message } => Err(eyre!("Daemon error: {}", message)),
            other => Err(eyre!("Unexpected response: {:?}", other)),
        }
    }

    /// Request daemon to shutdown gracefully
    pub async fn shutdown(&self) -> Result<()> {
        debug!("DaemonClient::shutdown: called");
        match self.send_message(DaemonMessage::Shutdown).await? {
            DaemonResponse::Ok => Ok(()),
            DaemonResponse::Error { message } => Err(eyre!("Daemon error: {}", message)),
            other => Err(eyre!("Unexpected response: {:?}", other)),
        }
    }

    /// Send a message to the daemon and wait for response
    async fn send_message(&self, msg: DaemonMessage) -> Result<DaemonResponse> {
        debug!(?self.socket_path, ?msg, "DaemonClient::send_message: called");

        let stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to daemon socket {}", self.socket_path.display()))?;

        self.send_on_stream(stream, msg).await
    }

    async fn send_on_stream(&self, mut stream: UnixStream, msg: DaemonMessage) -> Result<DaemonResponse> {
        let msg_json = serde_json::to_string(&msg).context("Failed to serialize message")?;

        if msg_json.len() > MAX_MESSAGE_SIZE {
            return Err(eyre!("Message too large: {} bytes", msg_json.len()));
        }

        tokio::time::timeout(self.timeout, async {
            stream
                .write_all(msg_json.as_bytes())
                .await
                .context("Failed to write message")?;
            stream.write_all(b"\n").await.context("Failed to write newline")?;
            stream.flush().await.context("Failed to flush stream")?;
            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Write timeout")??;

        let mut reader = BufReader::new((&mut stream).take(MAX_MESSAGE_SIZE as u64 + 1));
        let mut response_line = String::new();

        tokio::time::timeout(self.timeout, async {
            let bytes_read = reader
                .read_line(&mut response_line)
                .await
                .context("Failed to read response")?;

            if bytes_read > MAX_MESSAGE_SIZE {
                return Err(eyre!("Response too large: more than {} bytes", MAX_MESSAGE_SIZE));
            }

            Ok::<_, eyre::Error>(())
        })
        .await
        .context("Read timeout")??;

        let response: DaemonResponse =
            serde_json::from_str(response_line.trim()).context("Failed to parse daemon response")?;

        debug!(?response, "DaemonClient::send_on_stream: received response");
        Ok(response)
    }
}
