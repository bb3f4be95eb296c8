//! Heartbeat failure detector states
//!
//! One self-addressed timer (keyed by the member's own id) drives the
//! heartbeat cadence; one timer per peer detects failure. A peer that keeps
//! missing its window is reported failed on every expiry until it is heard
//! from again.

use crate::common::{Error, Result};
use crate::protocol::heartbeat::context::HeartbeatContext;
use crate::protocol::heartbeat::message::{HeartbeatMessage, HeartbeatPayload};
use crate::statemachine::machine::{MessageProcessor, State};
use crate::statemachine::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeartbeatState {
    /// Idle, not participating
    Start,
    /// Sending heartbeats and watching peers
    Running,
}

impl State<HeartbeatContext, HeartbeatMessage> for HeartbeatState {
    fn name(&self) -> &'static str {
        match self {
            HeartbeatState::Start => "start",
            HeartbeatState::Running => "running",
        }
    }

    fn handle(
        self,
        context: &mut HeartbeatContext,
        message: &Message<HeartbeatMessage>,
        outgoing: &mut dyn MessageProcessor<HeartbeatMessage>,
    ) -> Result<Self> {
        match self {
            HeartbeatState::Start => start(context, message, outgoing),
            HeartbeatState::Running => running(context, message, outgoing),
        }
    }
}

fn start(
    context: &mut HeartbeatContext,
    message: &Message<HeartbeatMessage>,
    outgoing: &mut dyn MessageProcessor<HeartbeatMessage>,
) -> Result<HeartbeatState> {
    match message.message_type() {
        HeartbeatMessage::PossibleServers => match message.payload() {
            Some(HeartbeatPayload::Servers(servers)) => {
                context.set_possible_servers(servers.clone());
            }
            _ => return Err(bad_payload(message)),
        },
        HeartbeatMessage::AddHeartbeatListener | HeartbeatMessage::RemoveHeartbeatListener => {
            listeners(context, message)?;
        }
        HeartbeatMessage::Join => {
            let peers: Vec<String> = context.peers().map(str::to_string).collect();
            for peer in peers {
                arm_failure_timer(context, &peer, message);
            }
            outgoing.process(Message::internal(HeartbeatMessage::SendHeartbeat));
            tracing::info!(participant = %context.me(), servers = ?context.servers(), "joined");
            return Ok(HeartbeatState::Running);
        }
        _ => {}
    }
    Ok(HeartbeatState::Start)
}

fn running(
    context: &mut HeartbeatContext,
    message: &Message<HeartbeatMessage>,
    outgoing: &mut dyn MessageProcessor<HeartbeatMessage>,
) -> Result<HeartbeatState> {
    match message.message_type() {
        HeartbeatMessage::IAmAlive => {
            let server = server(message)?;
            context.alive(&server);
            if server != context.me() {
                context.timeouts().cancel_timeout(&server);
                arm_failure_timer(context, &server, message);
            }
        }
        HeartbeatMessage::TimedOut => {
            let server = server(message)?;
            // A trigger collected before a heartbeat re-armed the window is stale
            if context.timeouts().pending(&server) > 0 {
                tracing::debug!(
                    participant = %context.me(),
                    server = %server,
                    "stale timeout ignored"
                );
                return Ok(HeartbeatState::Running);
            }
            context.failed(&server);
            arm_failure_timer(context, &server, message);
        }
        HeartbeatMessage::SendHeartbeat => {
            let me = context.me().to_string();
            for server in context.servers() {
                outgoing.process(
                    Message::to(HeartbeatMessage::IAmAlive, server.as_str())
                        .with_payload(HeartbeatPayload::Server(me.clone())),
                );
            }
            // Exactly one cadence timer, whoever triggered this round
            context.timeouts().cancel_timeout(&me);
            context.timeouts().set_timeout_from(
                me,
                Message::internal(HeartbeatMessage::SendHeartbeat),
                message,
            );
        }
        HeartbeatMessage::AddHeartbeatListener | HeartbeatMessage::RemoveHeartbeatListener => {
            listeners(context, message)?;
        }
        HeartbeatMessage::Leave => {
            for server in context.servers() {
                context.timeouts().cancel_timeout(server);
            }
            context.timeouts().cancel_timeout(context.me());
            tracing::info!(participant = %context.me(), "left");
            return Ok(HeartbeatState::Start);
        }
        _ => {}
    }
    Ok(HeartbeatState::Running)
}

fn listeners(context: &mut HeartbeatContext, message: &Message<HeartbeatMessage>) -> Result<()> {
    let Some(HeartbeatPayload::Listener(listener)) = message.payload() else {
        return Err(bad_payload(message));
    };
    if message.message_type() == HeartbeatMessage::AddHeartbeatListener {
        context.add_heartbeat_listener(listener.clone());
    } else {
        context.remove_heartbeat_listener(listener);
    }
    Ok(())
}

fn arm_failure_timer(
    context: &HeartbeatContext,
    server: &str,
    cause: &Message<HeartbeatMessage>,
) {
    context.timeouts().set_timeout_from(
        server,
        Message::internal(HeartbeatMessage::TimedOut)
            .with_payload(HeartbeatPayload::Server(server.to_string())),
        cause,
    );
}

fn server(message: &Message<HeartbeatMessage>) -> Result<String> {
    message
        .payload()
        .and_then(HeartbeatPayload::server)
        .map(str::to_string)
        .ok_or_else(|| bad_payload(message))
}

fn bad_payload(message: &Message<HeartbeatMessage>) -> Error {
    Error::ProtocolViolation(format!(
        "unexpected payload for {}: {:?}",
        message,
        message.payload()
    ))
}
