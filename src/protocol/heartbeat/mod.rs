//! Heartbeat failure detector
//!
//! Each member periodically sends `i_am_alive` to every known server and
//! keeps one failure timer per peer. Listeners hear `alive` whenever a
//! heartbeat arrives and `failed` whenever a peer's window expires.

pub mod client;
pub mod context;
pub mod message;
pub mod state;

pub use client::HeartbeatClient;
pub use context::HeartbeatContext;
pub use message::{
    HeartbeatListener, HeartbeatMessage, HeartbeatPayload, HeartbeatTimeouts, ListenerHandle,
};
pub use state::HeartbeatState;

use crate::common::Config;
use crate::network::Transport;
use crate::statemachine::machine::{StateMachine, StateTransitionLogger};
use crate::statemachine::participant::Participant;
use crate::statemachine::timeouts::Timeouts;
use std::sync::Arc;
use std::time::Instant;

pub type HeartbeatParticipant = Participant<HeartbeatContext, HeartbeatState, HeartbeatMessage>;

/// Assemble a heartbeat participant for `config.node_id`, starting the timer
/// clock now.
pub fn participant(
    config: &Config,
    transport: Arc<dyn Transport<HeartbeatMessage>>,
) -> Arc<HeartbeatParticipant> {
    participant_at(config, transport, Instant::now())
}

/// Like [`participant`] with an explicit clock origin, for simulations that
/// tick the timers themselves.
pub fn participant_at(
    config: &Config,
    transport: Arc<dyn Transport<HeartbeatMessage>>,
    start: Instant,
) -> Arc<HeartbeatParticipant> {
    let strategy = HeartbeatTimeouts {
        interval: config.heartbeat.interval(),
        timeout: config.heartbeat.timeout(),
    };
    let timeouts = Timeouts::starting_at(strategy, start);
    let context = HeartbeatContext::new(config.node_id.clone(), timeouts.clone());
    let machine = StateMachine::new(context, HeartbeatState::Start);

    let participant = Participant::new(config.node_id.clone(), machine, timeouts, transport);
    participant.add_state_transition_listener(Arc::new(StateTransitionLogger::new(
        config.node_id.clone(),
    )));
    participant
}

/// Call client for a heartbeat participant using the configured call timeout
pub fn client(participant: &Arc<HeartbeatParticipant>, config: &Config) -> HeartbeatClient {
    let table = Arc::new(client::call_table());
    HeartbeatClient::new(participant.proxy(table, config.conversation.timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::InMemoryNetwork;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl HeartbeatListener for Events {
        fn alive(&self, server: &str) {
            self.0.lock().unwrap().push(format!("alive {}", server));
        }

        fn failed(&self, server: &str) {
            self.0.lock().unwrap().push(format!("failed {}", server));
        }
    }

    #[tokio::test]
    async fn test_client_drives_participant() {
        let network = InMemoryNetwork::<HeartbeatMessage>::new();
        let config = Config::new("a", vec!["a".into(), "b".into()]);
        let a = participant(&config, network.clone());
        network.add_participant("a", a.clone());

        let client = client(&a, &config);
        let events = Arc::new(Events::default());
        client.possible_servers(config.servers.clone()).await.unwrap();
        client.add_listener(events.clone()).await.unwrap();
        client.join().await.unwrap();

        assert_eq!(a.state(), HeartbeatState::Running);
        assert_eq!(a.timeouts().pending("b"), 1);
        assert_eq!(a.timeouts().pending("a"), 1);
        // one heartbeat to self, one to b (unknown to the network)
        assert_eq!(network.pending(), 2);

        network.tick_until_done();
        assert_eq!(events.0.lock().unwrap().as_slice(), ["alive a"]);

        client.remove_listener(events.clone()).await.unwrap();
        client.leave().await.unwrap();
        assert_eq!(a.state(), HeartbeatState::Start);
        assert!(a.timeouts().is_empty());
        assert_eq!(a.with_context(|c| c.listener_count()), 0);
    }
}
