//! Heartbeat protocol state owned by one state machine

use crate::protocol::heartbeat::message::{HeartbeatListener, HeartbeatMessage, ListenerHandle};
use crate::statemachine::timeouts::Timeouts;
use std::collections::BTreeSet;
use std::fmt;

pub struct HeartbeatContext {
    me: String,
    servers: Vec<String>,
    alive: BTreeSet<String>,
    failed: BTreeSet<String>,
    listeners: Vec<ListenerHandle>,
    timeouts: Timeouts<HeartbeatMessage>,
}

impl HeartbeatContext {
    pub fn new(me: impl Into<String>, timeouts: Timeouts<HeartbeatMessage>) -> Self {
        Self {
            me: me.into(),
            servers: Vec::new(),
            alive: BTreeSet::new(),
            failed: BTreeSet::new(),
            listeners: Vec::new(),
            timeouts,
        }
    }

    pub fn me(&self) -> &str {
        &self.me
    }

    /// Known cluster members, possibly including this one
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Known members other than this one
    pub fn peers(&self) -> impl Iterator<Item = &str> {
        self.servers
            .iter()
            .map(String::as_str)
            .filter(move |server| *server != self.me)
    }

    pub fn timeouts(&self) -> &Timeouts<HeartbeatMessage> {
        &self.timeouts
    }

    /// Replace the candidate peer set, keeping first-seen order
    pub fn set_possible_servers(&mut self, servers: Vec<String>) {
        self.servers.clear();
        for server in servers {
            if !self.servers.contains(&server) {
                self.servers.push(server);
            }
        }
    }

    pub fn add_heartbeat_listener(&mut self, listener: ListenerHandle) {
        self.listeners.push(listener);
    }

    pub fn remove_heartbeat_listener(&mut self, listener: &ListenerHandle) {
        self.listeners.retain(|registered| !registered.same(listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Record a liveness report and tell every listener
    pub fn alive(&mut self, server: &str) {
        let recovered = self.failed.remove(server);
        let newly_alive = self.alive.insert(server.to_string());
        if recovered {
            tracing::info!(participant = %self.me, server, "server is alive again");
        } else if newly_alive {
            tracing::debug!(participant = %self.me, server, "server is alive");
        }
        self.notify(|listener| listener.alive(server));
    }

    /// Record a missed heartbeat window and tell every listener
    pub fn failed(&mut self, server: &str) {
        self.alive.remove(server);
        if self.failed.insert(server.to_string()) {
            tracing::info!(participant = %self.me, server, "server failed");
        } else {
            tracing::debug!(participant = %self.me, server, "server still failed");
        }
        self.notify(|listener| listener.failed(server));
    }

    pub fn is_alive(&self, server: &str) -> bool {
        self.alive.contains(server)
    }

    pub fn is_failed(&self, server: &str) -> bool {
        self.failed.contains(server)
    }

    pub fn alive_servers(&self) -> &BTreeSet<String> {
        &self.alive
    }

    pub fn failed_servers(&self) -> &BTreeSet<String> {
        &self.failed
    }

    fn notify(&self, f: impl Fn(&dyn HeartbeatListener)) {
        for listener in &self.listeners {
            f(listener.0.as_ref());
        }
    }
}

impl fmt::Debug for HeartbeatContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatContext")
            .field("me", &self.me)
            .field("servers", &self.servers)
            .field("alive", &self.alive)
            .field("failed", &self.failed)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
