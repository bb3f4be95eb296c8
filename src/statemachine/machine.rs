//! Generic state machine driver
//!
//! A machine owns one protocol context and one current state. Each inbound
//! message is handed to the current state's handler, which may mutate the
//! context, emit outgoing messages and returns the next state.

use crate::common::{Error, Result};
use crate::statemachine::message::{Message, MessageType};
use std::fmt;
use std::sync::Arc;

/// Sink for messages emitted by a state handler
pub trait MessageProcessor<M: MessageType> {
    fn process(&mut self, message: Message<M>);
}

impl<M: MessageType> MessageProcessor<M> for Vec<Message<M>> {
    fn process(&mut self, message: Message<M>) {
        self.push(message);
    }
}

/// One variant of a protocol's closed set of states.
///
/// `handle` is the transition function. A state that has no behaviour for a
/// message type returns itself unchanged.
pub trait State<C, M: MessageType>: Copy + Eq + fmt::Debug + Send + 'static {
    fn name(&self) -> &'static str;

    fn handle(
        self,
        context: &mut C,
        message: &Message<M>,
        outgoing: &mut dyn MessageProcessor<M>,
    ) -> Result<Self>;
}

/// A completed transition
#[derive(Debug, Clone)]
pub struct StateTransition<S, M: MessageType> {
    pub from: S,
    pub to: S,
    pub message: Message<M>,
}

impl<S: PartialEq, M: MessageType> StateTransition<S, M> {
    pub fn changed_state(&self) -> bool {
        self.from != self.to
    }
}

/// Observer of a single machine's transitions
pub trait StateTransitionListener<S, M: MessageType>: Send + Sync {
    fn state_transition(&self, transition: &StateTransition<S, M>);

    /// Called when a handler fails; the machine stays in `state`
    fn transition_failed(&self, _state: &S, _message: &Message<M>, _error: &Error) {}
}

/// Logs every transition through `tracing`
pub struct StateTransitionLogger {
    participant: String,
}

impl StateTransitionLogger {
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
        }
    }
}

impl<S, M> StateTransitionListener<S, M> for StateTransitionLogger
where
    S: fmt::Debug + Send + Sync,
    M: MessageType,
{
    fn state_transition(&self, transition: &StateTransition<S, M>) {
        tracing::debug!(
            participant = %self.participant,
            from = ?transition.from,
            to = ?transition.to,
            message = %transition.message,
            "state transition"
        );
    }

    fn transition_failed(&self, state: &S, message: &Message<M>, error: &Error) {
        tracing::warn!(
            participant = %self.participant,
            state = ?state,
            message = %message,
            "transition failed: {}",
            error
        );
    }
}

pub struct StateMachine<C, S, M: MessageType> {
    context: C,
    state: S,
    listeners: Vec<Arc<dyn StateTransitionListener<S, M>>>,
}

impl<C, S, M> StateMachine<C, S, M>
where
    S: State<C, M>,
    M: MessageType,
{
    pub fn new(context: C, initial: S) -> Self {
        Self {
            context,
            state: initial,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> S {
        self.state
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Listeners are notified in registration order, from inside `receive`.
    /// A machine wrapped in a `Participant` is locked at that point.
    pub fn add_state_transition_listener(&mut self, listener: Arc<dyn StateTransitionListener<S, M>>) {
        self.listeners.push(listener);
    }

    pub fn remove_state_transition_listener(
        &mut self,
        listener: &Arc<dyn StateTransitionListener<S, M>>,
    ) -> bool {
        let before = self.listeners.len();
        self.listeners
            .retain(|registered| !Arc::ptr_eq(registered, listener));
        before != self.listeners.len()
    }

    /// Feed one message to the current state.
    ///
    /// On success the emitted messages go to `outgoing` in emission order and
    /// listeners see the transition. On failure the state is unchanged, the
    /// emitted messages are discarded and listeners see the error, which is
    /// also returned.
    pub fn receive(
        &mut self,
        message: &Message<M>,
        outgoing: &mut dyn MessageProcessor<M>,
    ) -> Result<S> {
        let from = self.state;
        let mut emitted: Vec<Message<M>> = Vec::new();

        match from.handle(&mut self.context, message, &mut emitted) {
            Ok(to) => {
                self.state = to;
                for out in emitted {
                    outgoing.process(out);
                }

                let transition = StateTransition {
                    from,
                    to,
                    message: message.clone(),
                };
                for listener in &self.listeners {
                    listener.state_transition(&transition);
                }
                Ok(to)
            }
            Err(error) => {
                for listener in &self.listeners {
                    listener.transition_failed(&from, message, &error);
                }
                Err(error)
            }
        }
    }
}

impl<C: fmt::Debug, S: fmt::Debug, M: MessageType> fmt::Debug for StateMachine<C, S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.state)
            .field("context", &self.context)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
