//! Configuration for hacoord participants

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Participant ID (unique identifier within the cluster)
    pub node_id: String,

    /// Known cluster members, including this one
    #[serde(default)]
    pub servers: Vec<String>,

    /// Heartbeat / failure detection
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Proxy call settings
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Timer driver settings
    #[serde(default)]
    pub timer: TimerConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Heartbeat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// How often this participant announces itself
    #[serde(default = "default_heartbeat_interval")]
    pub interval_ms: u64,

    /// How long without a heartbeat before a peer is reported failed
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_ms: u64,
}

fn default_heartbeat_interval() -> u64 {
    1_000
}
fn default_heartbeat_timeout() -> u64 {
    3_000
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_heartbeat_interval(),
            timeout_ms: default_heartbeat_timeout(),
        }
    }
}

/// Conversation (proxy call) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Default time a caller waits for a correlated reply
    #[serde(default = "default_conversation_timeout")]
    pub timeout_ms: u64,
}

fn default_conversation_timeout() -> u64 {
    5_000
}

impl ConversationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_conversation_timeout(),
        }
    }
}

/// Timer driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    /// Tick resolution of the background timer driver
    #[serde(default = "default_timer_resolution")]
    pub resolution_ms: u64,
}

fn default_timer_resolution() -> u64 {
    50
}

impl TimerConfig {
    pub fn resolution(&self) -> Duration {
        Duration::from_millis(self.resolution_ms)
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            resolution_ms: default_timer_resolution(),
        }
    }
}

impl Config {
    /// Minimal configuration for a participant with the given id
    pub fn new(node_id: impl Into<String>, servers: Vec<String>) -> Self {
        Self {
            node_id: node_id.into(),
            servers,
            heartbeat: HeartbeatConfig::default(),
            conversation: ConversationConfig::default(),
            timer: TimerConfig::default(),
            log_level: default_log_level(),
        }
    }

    /// Load from `hacoord.toml` (optional) and `HACOORD__*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from("hacoord")
    }

    /// Load from the given file (extension optional, missing file allowed) plus environment
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().into_owned();
        let settings = config::Config::builder()
            .set_default("node_id", "node-1")?
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("HACOORD")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("servers")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.node_id.trim().is_empty() {
            return Err(Error::InvalidConfig("node_id cannot be empty".into()));
        }
        if self.heartbeat.interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "heartbeat interval must be positive".into(),
            ));
        }
        if self.heartbeat.timeout_ms <= self.heartbeat.interval_ms {
            return Err(Error::InvalidConfig(format!(
                "heartbeat timeout ({}ms) must exceed the interval ({}ms)",
                self.heartbeat.timeout_ms, self.heartbeat.interval_ms
            )));
        }
        if self.timer.resolution_ms == 0 {
            return Err(Error::InvalidConfig("timer resolution must be positive".into()));
        }
        Ok(())
    }
}
