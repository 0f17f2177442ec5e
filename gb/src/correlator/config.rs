//! Correlator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Correlator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelatorConfig {
    /// How long a command waits for its ack, in milliseconds
    #[serde(rename = "timeout-ms", default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Channel buffer size for correlator requests
    #[serde(rename = "channel-buffer", default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_channel_buffer() -> usize {
    100
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            channel_buffer: default_channel_buffer(),
        }
    }
}

impl CorrelatorConfig {
    /// Get the ack timeout as a Duration
    pub fn timeout(&self) -> Duration {
        debug!(timeout_ms = %self.timeout_ms, "CorrelatorConfig::timeout: called");
        Duration::from_millis(self.timeout_ms)
    }
}
