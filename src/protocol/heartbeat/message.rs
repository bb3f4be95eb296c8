//! Heartbeat message types and payloads

use crate::statemachine::message::{Message, MessageType};
use crate::statemachine::timeouts::TimeoutStrategy;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeartbeatMessage {
    PossibleServers,
    AddHeartbeatListener,
    RemoveHeartbeatListener,
    Join,
    Leave,
    IAmAlive,
    TimedOut,
    SendHeartbeat,
}

impl MessageType for HeartbeatMessage {
    type Payload = HeartbeatPayload;

    fn name(&self) -> &'static str {
        match self {
            HeartbeatMessage::PossibleServers => "possible_servers",
            HeartbeatMessage::AddHeartbeatListener => "add_heartbeat_listener",
            HeartbeatMessage::RemoveHeartbeatListener => "remove_heartbeat_listener",
            HeartbeatMessage::Join => "join",
            HeartbeatMessage::Leave => "leave",
            HeartbeatMessage::IAmAlive => "i_am_alive",
            HeartbeatMessage::TimedOut => "timed_out",
            HeartbeatMessage::SendHeartbeat => "send_heartbeat",
        }
    }
}

/// Observer of liveness changes.
///
/// Called while the participant is handling the message that changed the
/// liveness view, with its machine locked. Calling back into that participant
/// from here deadlocks; hand the event to another task or thread instead.
pub trait HeartbeatListener: Send + Sync {
    fn alive(&self, server: &str);
    fn failed(&self, server: &str);
}

/// Shared handle on a listener, compared by identity
#[derive(Clone)]
pub struct ListenerHandle(pub Arc<dyn HeartbeatListener>);

impl ListenerHandle {
    pub fn new(listener: Arc<dyn HeartbeatListener>) -> Self {
        Self(listener)
    }

    pub fn same(&self, other: &ListenerHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListenerHandle({:p})", Arc::as_ptr(&self.0))
    }
}

#[derive(Debug, Clone)]
pub enum HeartbeatPayload {
    /// Candidate peer set
    Servers(Vec<String>),
    Listener(ListenerHandle),
    /// Reporting or suspected peer
    Server(String),
}

impl HeartbeatPayload {
    pub fn server(&self) -> Option<&str> {
        match self {
            HeartbeatPayload::Server(server) => Some(server),
            _ => None,
        }
    }
}

/// `send_heartbeat` timers use the interval, per-peer timers the failure timeout
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatTimeouts {
    pub interval: Duration,
    pub timeout: Duration,
}

impl TimeoutStrategy<HeartbeatMessage> for HeartbeatTimeouts {
    fn timeout_for(&self, message: &Message<HeartbeatMessage>) -> Duration {
        match message.message_type() {
            HeartbeatMessage::SendHeartbeat => self.interval,
            _ => self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;

    impl HeartbeatListener for Quiet {
        fn alive(&self, _server: &str) {}
        fn failed(&self, _server: &str) {}
    }

    #[test]
    fn test_listener_handle_identity() {
        let listener: Arc<dyn HeartbeatListener> = Arc::new(Quiet);
        let a = ListenerHandle::new(listener.clone());
        let b = ListenerHandle::new(listener);
        let c = ListenerHandle::new(Arc::new(Quiet));
        assert!(a.same(&b));
        assert!(!a.same(&c));
    }

    #[test]
    fn test_timeout_strategy() {
        let strategy = HeartbeatTimeouts {
            interval: Duration::from_millis(100),
            timeout: Duration::from_millis(400),
        };
        assert_eq!(
            strategy.timeout_for(&Message::internal(HeartbeatMessage::SendHeartbeat)),
            Duration::from_millis(100)
        );
        assert_eq!(
            strategy.timeout_for(
                &Message::internal(HeartbeatMessage::TimedOut)
                    .with_payload(HeartbeatPayload::Server("b".into()))
            ),
            Duration::from_millis(400)
        );
    }
}
