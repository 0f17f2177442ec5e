//! GiroBot - command bridge to a gyro light
//!
//! A command (turn on, ping) is published to the device over a pub/sub bus,
//! and the caller waits for the device's acknowledgment on the up-topic. At
//! most one command is in flight; a newer one supersedes it.
//!
//! # Core Concepts
//!
//! - **Single slot**: the in-flight request lives in one place, owned by one task
//! - **First writer wins**: ack, deadline and supersession race; exactly one resolves
//! - **Strict matching**: only the ack for the pending kind resolves it
//!
//! # Modules
//!
//! - [`correlator`] - Request/ack correlation actor
//! - [`bus`] - MQTT and in-memory bus transports
//! - [`frontend`] - Command dispatch and reply rendering
//! - [`replies`] - Persisted reply texts
//! - [`ipc`] - Daemon socket protocol
//! - [`daemon`] - Daemon runtime
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`logging`] - Log file setup

pub mod bus;
pub mod cli;
pub mod config;
pub mod correlator;
pub mod daemon;
pub mod frontend;
pub mod ipc;
pub mod logging;
pub mod replies;

pub use bus::{BusError, BusLink, BusMessage, LocalBus, MqttLink};
pub use config::Config;
pub use correlator::{Correlator, CorrelatorConfig, CorrelatorHandle, CorrelatorStatus, Outcome, RequestKind};
pub use frontend::CommandFrontEnd;
pub use replies::{ReplyStore, ReplyStoreError};
