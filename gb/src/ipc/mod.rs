//! Inter-Process Communication between the CLI and the daemon
//!
//! The daemon owns the bus connection and the Correlator; short-lived `gb`
//! invocations connect to its Unix Domain Socket, send one message and wait
//! for the response.

use std::path::PathBuf;

pub mod client;
pub mod listener;
pub mod messages;

pub use client::DaemonClient;
pub use listener::{cleanup_socket, create_listener_at, read_message, send_response};
pub use messages::{DaemonMessage, DaemonResponse};

/// Maximum size of one JSON line in either direction
pub const MAX_MESSAGE_SIZE: usize = 4096;

/// Get the default socket path for daemon IPC
pub fn get_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("girobot")
        .join("girobot.sock")
}
