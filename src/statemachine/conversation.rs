//! Request/response calls on top of the message bus
//!
//! ```text
//! Proxy::call("join")
//!   1. look up the call signature in the CallTable
//!   2. allocate a conversation id, stamp FROM and CONVERSATION-ID
//!   3. register the pending conversation (if a reply is expected)
//!   4. hand the request to the participant's outgoing path
//!   5. await the correlated reply, a failure reply, or the call timeout
//! ```
//!
//! Replies are matched on conversation id and message type only. A reply
//! arriving after its conversation timed out is swallowed: the most recent
//! cancelled conversations are remembered for that purpose.

use crate::common::utils::lock;
use crate::common::{Error, Result};
use crate::statemachine::message::{Message, MessageType, CONVERSATION_ID, FAILURE, FROM};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

/// How a call's request message is addressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAddressing {
    /// Delivered to the caller's own state machine
    Internal,
    /// Delivered to one participant named at call time
    Targeted,
    /// Delivered to every other participant
    Broadcast,
}

/// Mapping of one call to its request and reply message types
#[derive(Debug, Clone, Copy)]
pub struct CallSignature<M: MessageType> {
    pub request: M,
    /// `None` makes the call fire-and-forget
    pub response: Option<M>,
    pub addressing: CallAddressing,
}

/// Explicit table from call name to signature
#[derive(Debug, Clone)]
pub struct CallTable<M: MessageType> {
    calls: HashMap<&'static str, CallSignature<M>>,
}

impl<M: MessageType> Default for CallTable<M> {
    fn default() -> Self {
        Self {
            calls: HashMap::new(),
        }
    }
}

impl<M: MessageType> CallTable<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire-and-forget call
    pub fn cast(mut self, name: &'static str, request: M, addressing: CallAddressing) -> Self {
        self.calls.insert(
            name,
            CallSignature {
                request,
                response: None,
                addressing,
            },
        );
        self
    }

    /// Call that waits for a reply of type `response`
    pub fn call(
        mut self,
        name: &'static str,
        request: M,
        response: M,
        addressing: CallAddressing,
    ) -> Self {
        self.calls.insert(
            name,
            CallSignature {
                request,
                response: Some(response),
                addressing,
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&CallSignature<M>> {
        self.calls.get(name)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

type Reply<M> = Result<Message<M>>;

/// How many cancelled conversations are remembered for dropping late replies
pub const CANCELLED_MEMORY: usize = 1024;

struct PendingConversation<M: MessageType> {
    response: M,
    failure: Option<M>,
    sender: oneshot::Sender<Reply<M>>,
}

struct CancelledConversation<M> {
    id: String,
    response: M,
    failure: Option<M>,
}

impl<M: MessageType> CancelledConversation<M> {
    fn answered_by(&self, message: &Message<M>) -> bool {
        self.response == message.message_type() || self.failure == Some(message.message_type())
    }
}

/// Outstanding conversations of one participant
pub struct Conversations<M: MessageType> {
    participant: String,
    next_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingConversation<M>>>,
    cancelled: Mutex<VecDeque<CancelledConversation<M>>>,
}

impl<M: MessageType> Conversations<M> {
    pub fn new(participant: impl Into<String>) -> Self {
        Self {
            participant: participant.into(),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(VecDeque::new()),
        }
    }

    /// Fresh id, unique within this participant
    pub fn next_conversation_id(&self) -> String {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}/{}", self.participant, id)
    }

    /// Start waiting for a reply of type `response` (or `failure`) on `id`
    pub fn register(
        &self,
        id: impl Into<String>,
        response: M,
        failure: Option<M>,
    ) -> oneshot::Receiver<Reply<M>> {
        let (sender, receiver) = oneshot::channel();
        lock(&self.pending).insert(
            id.into(),
            PendingConversation {
                response,
                failure,
                sender,
            },
        );
        receiver
    }

    /// Resolve the conversation `message` replies to.
    ///
    /// Returns false when the message is not an expected reply; it should then
    /// be dispatched normally. A late reply to a cancelled conversation
    /// returns true and goes nowhere.
    pub fn complete(&self, message: &Message<M>) -> bool {
        let Some(id) = message.conversation_id() else {
            return false;
        };

        let mut pending = lock(&self.pending);
        if !pending.contains_key(id) {
            let late = lock(&self.cancelled)
                .iter()
                .any(|cancelled| cancelled.id == id && cancelled.answered_by(message));
            if late {
                tracing::debug!(conversation = id, message = %message, "late reply dropped");
            }
            return late;
        }

        let reply = match pending.get(id) {
            Some(conversation) if conversation.response == message.message_type() => {
                Ok(message.clone())
            }
            Some(conversation) if conversation.failure == Some(message.message_type()) => {
                Err(Error::RemoteFailure(
                    message.header(FAILURE).unwrap_or("remote failure").to_string(),
                ))
            }
            _ => return false,
        };

        if let Some(conversation) = pending.remove(id) {
            if conversation.sender.send(reply).is_err() {
                tracing::debug!(conversation = id, "caller gone before reply");
            }
        }
        true
    }

    /// Forget a conversation; a later reply is dropped
    pub fn cancel(&self, id: &str) -> bool {
        let Some(conversation) = lock(&self.pending).remove(id) else {
            return false;
        };

        let mut cancelled = lock(&self.cancelled);
        if cancelled.len() == CANCELLED_MEMORY {
            cancelled.pop_front();
        }
        cancelled.push_back(CancelledConversation {
            id: id.to_string(),
            response: conversation.response,
            failure: conversation.failure,
        });
        true
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

/// What a proxy needs from the participant it calls through
pub trait ConversationEndpoint<M: MessageType>: Send + Sync {
    fn participant_id(&self) -> &str;

    fn conversations(&self) -> &Conversations<M>;

    /// Route a locally originated message: internal ones to the own state
    /// machine, everything else to the transport.
    fn send(&self, message: Message<M>);
}

/// Presents a protocol's message exchange as async calls
pub struct Proxy<M: MessageType> {
    endpoint: Arc<dyn ConversationEndpoint<M>>,
    table: Arc<CallTable<M>>,
    timeout: Duration,
}

impl<M: MessageType> Clone for Proxy<M> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            table: self.table.clone(),
            timeout: self.timeout,
        }
    }
}

impl<M: MessageType> Proxy<M> {
    pub fn new(
        endpoint: Arc<dyn ConversationEndpoint<M>>,
        table: Arc<CallTable<M>>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint,
            table,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Internal or broadcast call
    pub async fn call(&self, name: &str, payload: Option<M::Payload>) -> Result<Option<M::Payload>> {
        self.invoke(name, None, payload).await
    }

    /// Targeted call
    pub async fn call_to(
        &self,
        name: &str,
        target: &str,
        payload: Option<M::Payload>,
    ) -> Result<Option<M::Payload>> {
        self.invoke(name, Some(target), payload).await
    }

    async fn invoke(
        &self,
        name: &str,
        target: Option<&str>,
        payload: Option<M::Payload>,
    ) -> Result<Option<M::Payload>> {
        let signature = *self
            .table
            .get(name)
            .ok_or_else(|| Error::UnknownCall(name.to_string()))?;

        let mut message = match (signature.addressing, target) {
            (CallAddressing::Internal, None) => Message::internal(signature.request),
            (CallAddressing::Broadcast, None) => Message::broadcast(signature.request),
            (CallAddressing::Targeted, Some(target)) => Message::to(signature.request, target),
            (CallAddressing::Targeted, None) => {
                return Err(Error::UnknownCall(format!("{} requires a target", name)))
            }
            (_, Some(_)) => {
                return Err(Error::UnknownCall(format!("{} does not take a target", name)))
            }
        };
        if let Some(payload) = payload {
            message = message.with_payload(payload);
        }

        let conversations = self.endpoint.conversations();
        let id = conversations.next_conversation_id();
        message.set_header(CONVERSATION_ID, id.clone());
        message.set_header(FROM, self.endpoint.participant_id());

        let Some(response) = signature.response else {
            tracing::debug!(call = name, conversation = %id, "cast");
            self.endpoint.send(message);
            return Ok(None);
        };

        let receiver = conversations.register(id.clone(), response, signature.request.failure_message());
        tracing::debug!(call = name, conversation = %id, "call");
        self.endpoint.send(message);

        match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(Ok(reply))) => Ok(reply.into_payload()),
            Ok(Ok(Err(error))) => Err(error),
            Ok(Err(_)) => Err(Error::Internal(format!(
                "conversation {} dropped without reply",
                id
            ))),
            Err(_) => {
                conversations.cancel(&id);
                tracing::warn!(call = name, conversation = %id, timeout = ?self.timeout, "call timed out");
                Err(Error::ConversationTimeout {
                    conversation_id: id,
                    timeout: self.timeout,
                })
            }
        }
    }
}
