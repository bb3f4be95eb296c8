//! Common utilities and types shared across hacoord

pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, ConversationConfig, HeartbeatConfig, TimerConfig};
pub use error::{Error, Result};
pub use utils::{crc32, parse_duration, parse_server_list};
