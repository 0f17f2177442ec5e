//! Request/acknowledgment correlation
//!
//! The Correlator turns a command into a bus publish and waits for the
//! device's acknowledgment on the up-topic. Every request ends in exactly one
//! [`Outcome`]:
//! - **Acknowledged:** the matching ack arrived before the deadline
//! - **TimedOut:** the deadline passed first
//! - **Superseded:** a newer command replaced it
//! - **PublishFailed:** the bus refused the command

mod config;
mod core;
mod handle;
mod messages;
mod slot;

pub use config::CorrelatorConfig;
pub use self::core::Correlator;
pub use handle::CorrelatorHandle;
pub use messages::{
    ALIVE_PAYLOAD, AckKind, CorrelatorRequest, CorrelatorStatus, InboundKind, Outcome, RequestId, RequestKind,
};
pub use slot::{PendingRequest, PendingSlot, RequestTicket};
