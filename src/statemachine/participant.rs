//! One cluster member running one state machine
//!
//! A participant serialises every inbound message (transport deliveries,
//! expired timers, local calls) through its machine one at a time. Internal
//! messages emitted by a handler are processed after the current message on
//! the same participant; targeted and broadcast messages leave through the
//! transport.
//!
//! Transition listeners registered on the participant run after the machine
//! lock is released, so they may query or feed the participant.

use crate::common::utils::lock;
use crate::network::{MessageReceiver, Transport};
use crate::statemachine::conversation::{CallTable, ConversationEndpoint, Conversations, Proxy};
use crate::common::Error;
use crate::statemachine::machine::{State, StateMachine, StateTransition, StateTransitionListener};
use crate::statemachine::message::{Message, MessageType, CONVERSATION_ID, FROM};
use crate::statemachine::timeouts::Timeouts;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

enum Notice<S, M: MessageType> {
    Transition(StateTransition<S, M>),
    Failed(S, Message<M>, Error),
}

pub struct Participant<C, S, M: MessageType> {
    id: String,
    machine: Mutex<StateMachine<C, S, M>>,
    listeners: Mutex<Vec<Arc<dyn StateTransitionListener<S, M>>>>,
    timeouts: Timeouts<M>,
    conversations: Conversations<M>,
    transport: Arc<dyn Transport<M>>,
}

impl<C, S, M> Participant<C, S, M>
where
    C: Send + 'static,
    S: State<C, M> + Sync,
    M: MessageType,
{
    /// `timeouts` must be the same table the protocol context schedules on
    pub fn new(
        id: impl Into<String>,
        machine: StateMachine<C, S, M>,
        timeouts: Timeouts<M>,
        transport: Arc<dyn Transport<M>>,
    ) -> Arc<Self> {
        let id = id.into();
        Arc::new(Self {
            conversations: Conversations::new(id.clone()),
            id,
            machine: Mutex::new(machine),
            listeners: Mutex::new(Vec::new()),
            timeouts,
            transport,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> S {
        lock(&self.machine).state()
    }

    /// Inspect the protocol context between messages
    pub fn with_context<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(lock(&self.machine).context())
    }

    pub fn timeouts(&self) -> &Timeouts<M> {
        &self.timeouts
    }

    /// Listeners are notified in registration order, once the message and
    /// everything it caused have been processed.
    pub fn add_state_transition_listener(&self, listener: Arc<dyn StateTransitionListener<S, M>>) {
        lock(&self.listeners).push(listener);
    }

    pub fn remove_state_transition_listener(
        &self,
        listener: &Arc<dyn StateTransitionListener<S, M>>,
    ) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|registered| !Arc::ptr_eq(registered, listener));
        before != listeners.len()
    }

    /// Process one inbound message to completion, including every internal
    /// message it causes.
    pub fn receive(&self, message: Message<M>) {
        let notices = self.process(message);
        if notices.is_empty() {
            return;
        }

        let listeners = lock(&self.listeners).clone();
        for notice in &notices {
            for listener in &listeners {
                match notice {
                    Notice::Transition(transition) => listener.state_transition(transition),
                    Notice::Failed(state, message, error) => {
                        listener.transition_failed(state, message, error)
                    }
                }
            }
        }
    }

    fn process(&self, message: Message<M>) -> Vec<Notice<S, M>> {
        let mut notices = Vec::new();
        let mut queue = VecDeque::from([message]);
        let mut machine = lock(&self.machine);

        while let Some(message) = queue.pop_front() {
            if self.conversations.complete(&message) {
                continue;
            }

            let from = machine.state();
            let mut outgoing = Vec::new();
            match machine.receive(&message, &mut outgoing) {
                Ok(to) => notices.push(Notice::Transition(StateTransition {
                    from,
                    to,
                    message: message.clone(),
                })),
                Err(error) => {
                    tracing::warn!(
                        participant = %self.id,
                        message = %message,
                        "message handling failed: {}",
                        error
                    );
                    notices.push(Notice::Failed(from, message, error));
                    continue;
                }
            }

            for mut out in outgoing {
                if !out.has_header(FROM) {
                    out.set_header(FROM, self.id.as_str());
                }
                if !out.has_header(CONVERSATION_ID) {
                    message.copy_headers_to(&mut out, &[CONVERSATION_ID]);
                }

                if out.is_internal() {
                    queue.push_back(out);
                } else {
                    self.transport.send(out);
                }
            }
        }
        notices
    }

    /// Advance the timer clock and deliver every expired trigger. Returns how
    /// many fired.
    pub fn tick(&self, now: Instant) -> usize {
        let expired = self.timeouts.tick(now);
        let fired = expired.len();
        for message in expired {
            self.receive(message);
        }
        fired
    }

    /// Drive timers from the wall clock at the given resolution
    pub fn spawn_timer(self: &Arc<Self>, resolution: Duration) -> tokio::task::JoinHandle<()> {
        let participant = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(resolution);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                participant.tick(Instant::now());
            }
        })
    }

    /// Call client bound to this participant
    pub fn proxy(self: &Arc<Self>, table: Arc<CallTable<M>>, timeout: Duration) -> Proxy<M> {
        let endpoint: Arc<dyn ConversationEndpoint<M>> = self.clone();
        Proxy::new(endpoint, table, timeout)
    }
}

impl<C, S, M> ConversationEndpoint<M> for Participant<C, S, M>
where
    C: Send + 'static,
    S: State<C, M> + Sync,
    M: MessageType,
{
    fn participant_id(&self) -> &str {
        &self.id
    }

    fn conversations(&self) -> &Conversations<M> {
        &self.conversations
    }

    fn send(&self, message: Message<M>) {
        if message.is_internal() {
            self.receive(message);
        } else {
            self.transport.send(message);
        }
    }
}

impl<C, S, M> MessageReceiver<M> for Participant<C, S, M>
where
    C: Send + 'static,
    S: State<C, M> + Sync,
    M: MessageType,
{
    fn receive(&self, message: Message<M>) {
        Participant::receive(self, message);
    }
}
