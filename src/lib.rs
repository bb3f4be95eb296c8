//! # hacoord
//!
//! Cluster coordination core for a replicated database:
//! - A message-driven state machine substrate with named timers
//! - Correlated request/response calls over an asynchronous message bus
//! - A heartbeat failure detector
//! - Slave-to-master commit with master-assigned transaction ids
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Participant                                  │
//! │   StateMachine<Context, State, Message>      │
//! │   Timeouts ──expired triggers──▶ receive()   │
//! │   Conversations ◀──replies── Proxy::call()   │
//! └───────────┬──────────────────────────────────┘
//!             │ Transport (TO = id | "*")
//!   ┌─────────┴──────────┬──────────────┐
//! ┌─▼──────────┐   ┌─────▼──────┐   ┌───▼────────┐
//! │ member A   │   │ member B   │   │ member C   │
//! └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! ## Usage
//!
//! ### Simulate a heartbeat cluster
//! ```bash
//! hacoord simulate \
//!   --servers a,b,c \
//!   --interval 200ms \
//!   --timeout 600ms \
//!   --duration 5s \
//!   --silence c --silence-after 2s
//! ```
//!
//! ### Show the effective configuration
//! ```bash
//! HACOORD__HEARTBEAT__INTERVAL_MS=500 hacoord config
//! ```

pub mod common;
pub mod ha;
pub mod network;
pub mod protocol;
pub mod statemachine;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use network::{InMemoryNetwork, Transport};
pub use statemachine::{Message, MessageType, Participant, State, StateMachine};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
