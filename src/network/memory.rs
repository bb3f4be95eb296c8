//! In-process network
//!
//! Queues every sent message and delivers on [`InMemoryNetwork::tick`], so a
//! test or simulation decides exactly when messages move. Routing:
//!
//! - targeted: to the named participant, dropped if unknown
//! - broadcast: to every participant except the sender; with no recipient the
//!   sender gets a failure reply instead
//! - isolated participants neither send nor receive

use crate::common::utils::lock;
use crate::network::{MessageReceiver, Transport};
use crate::statemachine::message::{
    Addressing, Message, MessageType, CONVERSATION_ID, FAILURE,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reason carried by the reply to a broadcast nobody received
pub const NO_SERVERS_FOUND: &str = "No servers found";

/// Upper bound on rounds in `tick_until_done`
const MAX_ROUNDS: usize = 10_000;

pub struct InMemoryNetwork<M: MessageType> {
    participants: Mutex<BTreeMap<String, Arc<dyn MessageReceiver<M>>>>,
    isolated: Mutex<BTreeSet<String>>,
    queue: Mutex<VecDeque<Message<M>>>,
}

impl<M: MessageType> Default for InMemoryNetwork<M> {
    fn default() -> Self {
        Self {
            participants: Mutex::new(BTreeMap::new()),
            isolated: Mutex::new(BTreeSet::new()),
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl<M: MessageType> InMemoryNetwork<M> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_participant(&self, id: impl Into<String>, receiver: Arc<dyn MessageReceiver<M>>) {
        let id = id.into();
        tracing::debug!(participant = %id, "joins network");
        lock(&self.participants).insert(id, receiver);
    }

    pub fn remove_participant(&self, id: &str) -> bool {
        tracing::debug!(participant = id, "leaves network");
        lock(&self.participants).remove(id).is_some()
    }

    pub fn participants(&self) -> Vec<String> {
        lock(&self.participants).keys().cloned().collect()
    }

    /// Drop everything sent to or from `id` until healed
    pub fn isolate(&self, id: impl Into<String>) {
        lock(&self.isolated).insert(id.into());
    }

    pub fn heal(&self, id: &str) {
        lock(&self.isolated).remove(id);
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Deliver every message queued so far. Messages sent during delivery
    /// wait for the next tick. Returns the number of deliveries made.
    pub fn tick(&self) -> usize {
        let messages: Vec<Message<M>> = lock(&self.queue).drain(..).collect();
        let mut delivered = 0;
        for message in messages {
            delivered += self.route(message);
        }
        delivered
    }

    /// Tick until no message is in flight
    pub fn tick_until_done(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_ROUNDS {
            let delivered = self.tick();
            total += delivered;
            if delivered == 0 && self.pending() == 0 {
                return total;
            }
        }
        tracing::warn!(rounds = MAX_ROUNDS, "network did not quiesce");
        total
    }

    /// Deliver continuously in the background
    pub fn spawn_delivery(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let network = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                network.tick();
            }
        })
    }

    fn is_isolated(&self, id: &str) -> bool {
        lock(&self.isolated).contains(id)
    }

    fn route(&self, message: Message<M>) -> usize {
        let from = message.sender().unwrap_or_default().to_string();
        if self.is_isolated(&from) {
            tracing::trace!(from = %from, message = %message, "dropped: sender isolated");
            return 0;
        }

        match message.addressing() {
            Addressing::Targeted(to) => {
                if self.is_isolated(&to) {
                    tracing::trace!(to = %to, message = %message, "dropped: target isolated");
                    return 0;
                }
                let target = lock(&self.participants).get(&to).cloned();
                match target {
                    Some(target) => {
                        tracing::trace!(from = %from, to = %to, message = %message, "deliver");
                        target.receive(message);
                        1
                    }
                    None => {
                        tracing::warn!(to = %to, message = %message, "target does not exist");
                        0
                    }
                }
            }
            Addressing::Broadcast => {
                let recipients: Vec<(String, Arc<dyn MessageReceiver<M>>)> =
                    lock(&self.participants)
                        .iter()
                        .filter(|(id, _)| **id != from)
                        .map(|(id, receiver)| (id.clone(), receiver.clone()))
                        .collect();

                if recipients.is_empty() {
                    self.reply_alone(&from, &message);
                    return 0;
                }

                // Isolated members still count as present: no failure reply.
                let mut delivered = 0;
                for (id, recipient) in &recipients {
                    if self.is_isolated(id) {
                        continue;
                    }
                    recipient.receive(message.clone());
                    delivered += 1;
                }
                delivered
            }
            Addressing::Internal => {
                tracing::warn!(message = %message, "internal message handed to network");
                0
            }
        }
    }

    fn reply_alone(&self, from: &str, message: &Message<M>) {
        let Some(failure) = message.message_type().failure_message() else {
            tracing::debug!(message = %message, "broadcast without recipients");
            return;
        };
        let Some(sender) = lock(&self.participants).get(from).cloned() else {
            return;
        };

        let mut reply = Message::to(failure, from).with_header(FAILURE, NO_SERVERS_FOUND);
        message.copy_headers_to(&mut reply, &[CONVERSATION_ID]);
        tracing::debug!(to = from, reply = %reply, "broadcast without recipients");
        sender.receive(reply);
    }
}

impl<M: MessageType> Transport<M> for InMemoryNetwork<M> {
    fn send(&self, message: Message<M>) {
        lock(&self.queue).push_back(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Chat {
        Hello,
        HelloFailed,
    }

    impl MessageType for Chat {
        type Payload = String;

        fn name(&self) -> &'static str {
            match self {
                Chat::Hello => "hello",
                Chat::HelloFailed => "hello_failed",
            }
        }

        fn failure_message(&self) -> Option<Self> {
            match self {
                Chat::Hello => Some(Chat::HelloFailed),
                Chat::HelloFailed => None,
            }
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<Message<Chat>>>);

    impl MessageReceiver<Chat> for Inbox {
        fn receive(&self, message: Message<Chat>) {
            self.0.lock().unwrap().push(message);
        }
    }

    impl Inbox {
        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
    }

    fn network(ids: &[&str]) -> (Arc<InMemoryNetwork<Chat>>, BTreeMap<String, Arc<Inbox>>) {
        let network = InMemoryNetwork::new();
        let mut inboxes = BTreeMap::new();
        for id in ids {
            let inbox = Arc::new(Inbox::default());
            network.add_participant(*id, inbox.clone());
            inboxes.insert(id.to_string(), inbox);
        }
        (network, inboxes)
    }

    #[test]
    fn test_targeted_delivery_waits_for_tick() {
        let (network, inboxes) = network(&["a", "b"]);
        network.send(Message::to(Chat::Hello, "b").with_header("FROM", "a"));

        assert_eq!(inboxes["b"].len(), 0);
        assert_eq!(network.tick(), 1);
        assert_eq!(inboxes["b"].len(), 1);
        assert_eq!(inboxes["a"].len(), 0);
    }

    #[test]
    fn test_broadcast_skips_sender() {
        let (network, inboxes) = network(&["a", "b", "c"]);
        network.send(Message::broadcast(Chat::Hello).with_header("FROM", "a"));

        assert_eq!(network.tick_until_done(), 2);
        assert_eq!(inboxes["a"].len(), 0);
        assert_eq!(inboxes["b"].len(), 1);
        assert_eq!(inboxes["c"].len(), 1);
    }

    #[test]
    fn test_lonely_broadcast_gets_failure_reply() {
        let (network, inboxes) = network(&["a"]);
        network.send(
            Message::broadcast(Chat::Hello)
                .with_header("FROM", "a")
                .with_header(CONVERSATION_ID, "a/3"),
        );
        network.tick();

        let inbox = inboxes["a"].0.lock().unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].message_type(), Chat::HelloFailed);
        assert_eq!(inbox[0].conversation_id(), Some("a/3"));
        assert_eq!(inbox[0].header(FAILURE), Some(NO_SERVERS_FOUND));
    }

    #[test]
    fn test_isolation_and_unknown_target() {
        let (network, inboxes) = network(&["a", "b"]);
        network.isolate("b");
        network.send(Message::to(Chat::Hello, "b").with_header("FROM", "a"));
        network.send(Message::to(Chat::Hello, "a").with_header("FROM", "b"));
        network.send(Message::to(Chat::Hello, "zed").with_header("FROM", "a"));
        assert_eq!(network.tick(), 0);

        network.heal("b");
        network.send(Message::to(Chat::Hello, "b").with_header("FROM", "a"));
        assert_eq!(network.tick(), 1);
        assert_eq!(inboxes["b"].len(), 1);
        assert_eq!(inboxes["a"].len(), 0);
    }
}
