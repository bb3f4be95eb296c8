//! Message-driven state machine substrate
//!
//! - `message`: the envelope every protocol exchanges
//! - `timeouts`: named timers that re-inject messages
//! - `machine`: the generic driver and transition listeners
//! - `conversation`: request/response calls over the message bus
//! - `participant`: binds a machine, its timers and a transport together

pub mod conversation;
pub mod machine;
pub mod message;
pub mod participant;
pub mod timeouts;

pub use conversation::{CallAddressing, CallSignature, CallTable, Conversations, Proxy};
pub use machine::{
    MessageProcessor, State, StateMachine, StateTransition, StateTransitionListener,
    StateTransitionLogger,
};
pub use message::{Addressing, Message, MessageType};
pub use participant::Participant;
pub use timeouts::{FixedTimeoutStrategy, Timeout, TimeoutStrategy, Timeouts};
