//! Typed call surface over a heartbeat participant

use crate::common::Result;
use crate::protocol::heartbeat::message::{
    HeartbeatListener, HeartbeatMessage, HeartbeatPayload, ListenerHandle,
};
use crate::statemachine::conversation::{CallAddressing, CallTable, Proxy};
use std::sync::Arc;

pub fn call_table() -> CallTable<HeartbeatMessage> {
    CallTable::new()
        .cast(
            "possible_servers",
            HeartbeatMessage::PossibleServers,
            CallAddressing::Internal,
        )
        .cast(
            "add_heartbeat_listener",
            HeartbeatMessage::AddHeartbeatListener,
            CallAddressing::Internal,
        )
        .cast(
            "remove_heartbeat_listener",
            HeartbeatMessage::RemoveHeartbeatListener,
            CallAddressing::Internal,
        )
        .cast("join", HeartbeatMessage::Join, CallAddressing::Internal)
        .cast("leave", HeartbeatMessage::Leave, CallAddressing::Internal)
}

/// Every call is fire-and-forget and has been processed by the local
/// participant when the future resolves.
#[derive(Clone)]
pub struct HeartbeatClient {
    proxy: Proxy<HeartbeatMessage>,
}

impl HeartbeatClient {
    pub fn new(proxy: Proxy<HeartbeatMessage>) -> Self {
        Self { proxy }
    }

    pub async fn possible_servers<I, S>(&self, servers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let servers = servers.into_iter().map(Into::into).collect();
        self.cast("possible_servers", HeartbeatPayload::Servers(servers))
            .await
    }

    pub async fn add_listener(&self, listener: Arc<dyn HeartbeatListener>) -> Result<()> {
        self.cast(
            "add_heartbeat_listener",
            HeartbeatPayload::Listener(ListenerHandle::new(listener)),
        )
        .await
    }

    /// `listener` must be the same `Arc` that was added
    pub async fn remove_listener(&self, listener: Arc<dyn HeartbeatListener>) -> Result<()> {
        self.cast(
            "remove_heartbeat_listener",
            HeartbeatPayload::Listener(ListenerHandle::new(listener)),
        )
        .await
    }

    pub async fn join(&self) -> Result<()> {
        self.proxy.call("join", None).await.map(|_| ())
    }

    pub async fn leave(&self) -> Result<()> {
        self.proxy.call("leave", None).await.map(|_| ())
    }

    async fn cast(&self, name: &str, payload: HeartbeatPayload) -> Result<()> {
        self.proxy.call(name, Some(payload)).await.map(|_| ())
    }
}
