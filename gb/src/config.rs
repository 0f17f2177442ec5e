//! GiroBot configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::correlator::CorrelatorConfig;

/// Main GiroBot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Broker connection
    pub mqtt: MqttConfig,

    /// Bus topics shared with the device
    pub topics: TopicsConfig,

    /// Ack correlation
    pub correlator: CorrelatorConfig,

    /// Persisted reply texts
    pub replies: RepliesConfig,

    /// How outcomes are rendered for users
    pub frontend: FrontEndConfig,

    /// Daemon socket
    pub ipc: IpcConfig,

    /// Simulated device used by `gb serve --loopback`
    pub loopback: LoopbackConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.port == 0 {
            return Err(eyre!("mqtt.port must not be 0"));
        }
        if self.topics.up.is_empty() || self.topics.down.is_empty() {
            return Err(eyre!("topics.up and topics.down must both be set"));
        }
        if self.topics.up == self.topics.down {
            return Err(eyre!(
                "topics.up and topics.down must differ (both are '{}')",
                self.topics.up
            ));
        }
        if self.correlator.timeout_ms == 0 {
            return Err(eyre!("correlator.timeout-ms must be greater than 0"));
        }
        if self.correlator.channel_buffer == 0 {
            return Err(eyre!("correlator.channel-buffer must be greater than 0"));
        }
        if self.loopback.alive_interval_secs == 0 {
            return Err(eyre!("loopback.alive-interval-secs must be greater than 0"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file_chain(config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read only the log level, before logging is initialized
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load_file_chain(config_path).ok().and_then(|config| config.log_level)
    }

    fn load_file_chain(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .girobot.yml
        let local_config = PathBuf::from(".girobot.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/girobot/girobot.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("girobot").join("girobot.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Override settings from the deployment environment
    ///
    /// `lookup` maps a variable name to its value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup("MQTT_PORT") {
            match port.parse() {
                Ok(port) => self.mqtt.port = port,
                Err(e) => tracing::warn!(%port, error = %e, "Ignoring invalid MQTT_PORT"),
            }
        }
        if let Some(user) = lookup("MQTT_USER") {
            self.mqtt.username = Some(user);
        }
        if let Some(up) = lookup("MQTT_GIROTOPICUP") {
            self.topics.up = up;
        }
        if let Some(down) = lookup("MQTT_GIROTOPICDOWN") {
            self.topics.down = down;
        }
        if let Some(mention) = lookup("GIROBOT_MENTION") {
            self.frontend.mention = Some(mention);
        }
    }
}

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub host: String,

    pub port: u16,

    #[serde(rename = "client-id")]
    pub client_id: String,

    pub username: Option<String>,

    /// Environment variable containing the broker password
    #[serde(rename = "password-env")]
    pub password_env: String,

    #[serde(rename = "keep-alive-secs")]
    pub keep_alive_secs: u64,

    /// Pause between reconnection attempts in milliseconds
    #[serde(rename = "reconnect-ms")]
    pub reconnect_ms: u64,

    #[serde(rename = "clean-session")]
    pub clean_session: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "girobot".to_string(),
            username: None,
            password_env: "MQTT_PASSWORD".to_string(),
            keep_alive_secs: 60,
            reconnect_ms: 1000,
            clean_session: true,
        }
    }
}

impl MqttConfig {
    /// Broker password from the configured environment variable
    pub fn password(&self) -> Option<String> {
        std::env::var(&self.password_env).ok()
    }

    pub fn reconnect_period(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

/// Topics shared with the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicsConfig {
    /// Device to bot: beacons and acks
    pub up: String,

    /// Bot to device: commands
    pub down: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            up: "girobot/UP".to_string(),
            down: "girobot/DOWN".to_string(),
        }
    }
}

/// Reply text storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepliesConfig {
    /// JSON file holding the reply list
    pub path: PathBuf,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        // Use XDG data directory (~/.local/share/girobot on Linux)
        let path = dirs::data_dir()
            .map(|d| d.join("girobot"))
            .unwrap_or_else(|| PathBuf::from("data"))
            .join("giro_config.json");
        Self { path }
    }
}

/// Rendering of outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontEndConfig {
    /// Appended to the "not connected" message, e.g. a role to notify
    pub mention: Option<String>,

    /// Used when the reply list is empty
    #[serde(rename = "fallback-reply")]
    pub fallback_reply: String,
}

impl Default for FrontEndConfig {
    fn default() -> Self {
        Self {
            mention: None,
            fallback_reply: "Let there be light.".to_string(),
        }
    }
}

/// Daemon IPC socket
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcConfig {
    #[serde(rename = "socket-path")]
    pub socket_path: Option<PathBuf>,
}

impl IpcConfig {
    /// Configured socket path, or the runtime-dir default
    pub fn socket_path(&self) -> PathBuf {
        self.socket_path.clone().unwrap_or_else(crate::ipc::get_socket_path)
    }
}

/// Simulated device timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Delay before the device answers a command
    #[serde(rename = "reply-delay-ms")]
    pub reply_delay_ms: u64,

    /// Period of the `Alive` beacon
    #[serde(rename = "alive-interval-secs")]
    pub alive_interval_secs: u64,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: 200,
            alive_interval_secs: 30,
        }
    }
}

impl LoopbackConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn alive_interval(&self) -> Duration {
        Duration::from_secs(self.alive_interval_secs)
    }
}
