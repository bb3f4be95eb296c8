//! Transport boundary between participants
//!
//! Outbound messages are handed to a [`Transport`] keyed by their `TO`
//! header; inbound messages reach a [`MessageReceiver`]. The wire encoding is
//! left to the transport implementation.

pub mod memory;

pub use memory::InMemoryNetwork;

use crate::statemachine::message::{Message, MessageType};

/// Outgoing message sink.
///
/// Implementations must not deliver synchronously back into the sending
/// participant; a participant is busy while it emits.
pub trait Transport<M: MessageType>: Send + Sync {
    fn send(&self, message: Message<M>);
}

/// Inbound side of a participant
pub trait MessageReceiver<M: MessageType>: Send + Sync {
    fn receive(&self, message: Message<M>);
}
