//! Error types for hacoord

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Protocol Errors ===
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("State handler failed: {0}")]
    Handler(String),

    // === Conversation Errors ===
    #[error("Conversation {conversation_id} timed out after {timeout:?}")]
    ConversationTimeout {
        conversation_id: String,
        timeout: Duration,
    },

    #[error("Remote failure: {0}")]
    RemoteFailure(String),

    #[error("Unknown call: {0}")]
    UnknownCall(String),

    // === Cluster Errors ===
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("No master available")]
    NoMaster,

    #[error("Commit failed on master {master}: {reason}")]
    CommitFailed { master: u32, reason: String },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Can the caller reasonably retry after reconnecting or waiting for a new master?
    ///
    /// Nothing inside this crate retries; this only classifies.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed(_) | Error::NoMaster | Error::ConversationTimeout { .. }
        )
    }

    /// Is this an internal consistency failure rather than a cluster condition?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ProtocolViolation(_) | Error::Internal(_))
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
