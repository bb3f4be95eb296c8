//! Protocols built on the state machine substrate

pub mod heartbeat;
