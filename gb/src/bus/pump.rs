//! Single reader of the inbound bus stream

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::link::BusEvents;
use crate::correlator::CorrelatorHandle;

/// Forward every inbound bus event to the Correlator
///
/// Stops when either the bus stream ends or the Correlator is gone.
pub fn spawn_bus_pump(mut events: BusEvents, correlator: CorrelatorHandle) -> JoinHandle<()> {
    debug!("spawn_bus_pump: called");
    tokio::spawn(async move {
        info!("Bus pump started");
        while let Some(msg) = events.recv().await {
            if correlator.on_bus_message(&msg.topic, &msg.payload).await.is_err() {
                debug!("spawn_bus_pump: correlator closed");
                break;
            }
        }
        info!("Bus pump stopped");
    })
}
