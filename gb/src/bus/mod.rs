//! Bus Link: publish/subscribe transport to the gyro device
//!
//! Two transports implement [`BusLink`]:
//! - [`MqttLink`] talks to a real broker
//! - [`LocalBus`] keeps everything in memory, paired with a simulated device
//!
//! Inbound events are read by exactly one consumer, the pump started with
//! [`spawn_bus_pump`], which forwards them to the Correlator.

mod link;
mod local;
mod mqtt;
mod pump;

pub use link::{BusError, BusEvents, BusLink, BusMessage, BusResult};
pub use local::{EchoDeviceConfig, LocalBus, spawn_echo_device};
pub use mqtt::MqttLink;
pub use pump::spawn_bus_pump;
