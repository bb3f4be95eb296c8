//! Message envelope exchanged between state machines
//!
//! A message is a type, an optional payload and a set of named headers.
//! Addressing is carried by the `TO` header:
//!
//! ```text
//! internal   no TO header          timers, self-addressed work
//! targeted   TO = <participant>    one named participant
//! broadcast  TO = *                every other participant
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

/// Sender participant id
pub const FROM: &str = "FROM";
/// Target participant id, or [`BROADCAST`]
pub const TO: &str = "TO";
/// Correlates a request with its reply
pub const CONVERSATION_ID: &str = "CONVERSATION-ID";
/// Reason attached to a failure reply
pub const FAILURE: &str = "FAILURE";
/// `TO` value of a broadcast message
pub const BROADCAST: &str = "*";

/// The closed set of message types of one protocol.
pub trait MessageType: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {
    /// Payload carried by messages of this protocol
    type Payload: Clone + fmt::Debug + Send + Sync + 'static;

    /// Stable name used in logs
    fn name(&self) -> &'static str;

    /// Type of the reply synthesised when a request of this type cannot be delivered
    fn failure_message(&self) -> Option<Self> {
        None
    }
}

/// Delivery mode derived from the `TO` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    Internal,
    Targeted(String),
    Broadcast,
}

#[derive(Clone)]
pub struct Message<M: MessageType> {
    message_type: M,
    payload: Option<M::Payload>,
    headers: BTreeMap<String, String>,
}

impl<M: MessageType> Message<M> {
    /// Self-addressed message (no `TO` header)
    pub fn internal(message_type: M) -> Self {
        Self {
            message_type,
            payload: None,
            headers: BTreeMap::new(),
        }
    }

    /// Message addressed to one participant
    pub fn to(message_type: M, target: impl Into<String>) -> Self {
        Self::internal(message_type).with_header(TO, target)
    }

    /// Message addressed to every participant
    pub fn broadcast(message_type: M) -> Self {
        Self::internal(message_type).with_header(TO, BROADCAST)
    }

    pub fn with_payload(mut self, payload: M::Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn message_type(&self) -> M {
        self.message_type
    }

    pub fn payload(&self) -> Option<&M::Payload> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<M::Payload> {
        self.payload
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn sender(&self) -> Option<&str> {
        self.header(FROM)
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.header(CONVERSATION_ID)
    }

    pub fn addressing(&self) -> Addressing {
        match self.header(TO) {
            None => Addressing::Internal,
            Some(BROADCAST) => Addressing::Broadcast,
            Some(target) => Addressing::Targeted(target.to_string()),
        }
    }

    pub fn is_internal(&self) -> bool {
        !self.has_header(TO)
    }

    pub fn is_broadcast(&self) -> bool {
        self.header(TO) == Some(BROADCAST)
    }

    /// Copy the named headers onto `target`, overwriting its values.
    ///
    /// Headers this message does not carry are left untouched on `target`.
    pub fn copy_headers_to(&self, target: &mut Message<M>, names: &[&str]) {
        for name in names {
            if let Some(value) = self.headers.get(*name) {
                target.headers.insert((*name).to_string(), value.clone());
            }
        }
    }
}

impl<M: MessageType> fmt::Debug for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.message_type.name())
            .field("payload", &self.payload)
            .field("headers", &self.headers)
            .finish()
    }
}

impl<M: MessageType> fmt::Display for Message<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message_type.name())?;
        match self.addressing() {
            Addressing::Internal => Ok(()),
            Addressing::Broadcast => write!(f, " -> *"),
            Addressing::Targeted(target) => write!(f, " -> {}", target),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Ping {
        Ping,
        Pong,
    }

    impl MessageType for Ping {
        type Payload = String;

        fn name(&self) -> &'static str {
            match self {
                Ping::Ping => "ping",
                Ping::Pong => "pong",
            }
        }
    }

    #[test]
    fn test_addressing_modes() {
        let internal = Message::internal(Ping::Ping);
        assert_eq!(internal.addressing(), Addressing::Internal);
        assert!(internal.header(TO).is_none());

        let targeted = Message::to(Ping::Ping, "b");
        assert_eq!(targeted.addressing(), Addressing::Targeted("b".into()));
        assert!(!targeted.is_broadcast());

        let broadcast = Message::broadcast(Ping::Ping);
        assert_eq!(broadcast.header(TO), Some(BROADCAST));
        assert!(broadcast.is_broadcast());
    }

    #[test]
    fn test_copy_headers_overwrites_named_only() {
        let request = Message::to(Ping::Ping, "b")
            .with_header(FROM, "a")
            .with_header(CONVERSATION_ID, "a/7");

        let mut reply = Message::internal(Ping::Pong)
            .with_payload("ok".to_string())
            .with_header(CONVERSATION_ID, "stale");
        request.copy_headers_to(&mut reply, &[CONVERSATION_ID, FAILURE]);

        assert_eq!(reply.conversation_id(), Some("a/7"));
        assert!(reply.is_internal());
        assert!(reply.sender().is_none());
        assert!(!reply.has_header(FAILURE));
        assert_eq!(reply.payload().map(String::as_str), Some("ok"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Message::to(Ping::Pong, "c").to_string(), "pong -> c");
        assert_eq!(Message::broadcast(Ping::Ping).to_string(), "ping -> *");
    }
}
