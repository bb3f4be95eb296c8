//! Timer-driven messages through a participant

use hacoord::common::Result;
use hacoord::network::Transport;
use hacoord::statemachine::conversation::{CallAddressing, CallTable};
use hacoord::statemachine::{
    Message, MessageProcessor, MessageType, Participant, State, StateMachine, StateTransition,
    StateTransitionListener, TimeoutStrategy, Timeouts,
};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Alarm {
    Arm,
    Disarm,
    Ring,
}

impl MessageType for Alarm {
    type Payload = u32;

    fn name(&self) -> &'static str {
        match self {
            Alarm::Arm => "arm",
            Alarm::Disarm => "disarm",
            Alarm::Ring => "ring",
        }
    }
}

/// Alarm `n` rings after `n * 10ms`
struct Staggered;

impl TimeoutStrategy<Alarm> for Staggered {
    fn timeout_for(&self, message: &Message<Alarm>) -> Duration {
        Duration::from_millis(10 * u64::from(message.payload().copied().unwrap_or(1)))
    }
}

struct Clock {
    timeouts: Timeouts<Alarm>,
    rang: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Armed;

impl State<Clock, Alarm> for Armed {
    fn name(&self) -> &'static str {
        "armed"
    }

    fn handle(
        self,
        clock: &mut Clock,
        message: &Message<Alarm>,
        _outgoing: &mut dyn MessageProcessor<Alarm>,
    ) -> Result<Self> {
        let n = message.payload().copied().unwrap_or_default();
        let key = format!("alarm-{}", n);
        match message.message_type() {
            Alarm::Arm => clock
                .timeouts
                .set_timeout(key, Message::internal(Alarm::Ring).with_payload(n)),
            Alarm::Disarm => {
                clock.timeouts.cancel_timeout(&key);
            }
            Alarm::Ring => clock.rang.push(n),
        }
        Ok(self)
    }
}

struct Nowhere;

impl Transport<Alarm> for Nowhere {
    fn send(&self, message: Message<Alarm>) {
        panic!("alarm clock sent {}", message);
    }
}

fn alarm_clock(start: Instant) -> Arc<Participant<Clock, Armed, Alarm>> {
    let timeouts = Timeouts::starting_at(Staggered, start);
    let clock = Clock {
        timeouts: timeouts.clone(),
        rang: Vec::new(),
    };
    Participant::new("clock", StateMachine::new(clock, Armed), timeouts, Arc::new(Nowhere))
}

type AlarmClock = Participant<Clock, Armed, Alarm>;

/// Reads the clock back from inside its own transition callback
struct Observer {
    clock: Weak<AlarmClock>,
    seen: Mutex<Vec<(&'static str, usize)>>,
}

impl StateTransitionListener<Armed, Alarm> for Observer {
    fn state_transition(&self, transition: &StateTransition<Armed, Alarm>) {
        let Some(clock) = self.clock.upgrade() else {
            return;
        };
        assert_eq!(clock.state(), Armed);
        let rang = clock.with_context(|c| c.rang.len());
        self.seen
            .lock()
            .unwrap()
            .push((transition.message.message_type().name(), rang));
        if transition.message.message_type() == Alarm::Ring {
            clock.receive(Message::internal(Alarm::Disarm).with_payload(9));
        }
    }
}

fn arm(n: u32) -> Message<Alarm> {
    Message::internal(Alarm::Arm).with_payload(n)
}

#[test]
fn test_expired_triggers_delivered_in_deadline_order() {
    let start = Instant::now();
    let clock = alarm_clock(start);
    for n in [3, 1, 2] {
        clock.receive(arm(n));
    }

    assert_eq!(clock.tick(start + Duration::from_millis(5)), 0);
    assert_eq!(clock.tick(start + Duration::from_millis(30)), 3);
    assert_eq!(clock.with_context(|c| c.rang.clone()), vec![1, 2, 3]);
}

#[test]
fn test_disarmed_alarm_never_rings() {
    let start = Instant::now();
    let clock = alarm_clock(start);
    clock.receive(arm(1));
    clock.receive(arm(2));
    clock.receive(Message::internal(Alarm::Disarm).with_payload(1));

    clock.tick(start + Duration::from_secs(1));
    assert_eq!(clock.with_context(|c| c.rang.clone()), vec![2]);
    assert!(clock.timeouts().is_empty());
}

#[test]
fn test_arming_twice_rings_twice() {
    let start = Instant::now();
    let clock = alarm_clock(start);
    clock.receive(arm(1));
    clock.receive(arm(1));
    assert_eq!(clock.timeouts().pending("alarm-1"), 2);

    clock.tick(start + Duration::from_millis(10));
    assert_eq!(clock.with_context(|c| c.rang.clone()), vec![1, 1]);
}

#[test]
fn test_deadlines_follow_the_last_tick() {
    let start = Instant::now();
    let clock = alarm_clock(start);
    clock.tick(start + Duration::from_millis(100));
    clock.receive(arm(1));

    assert_eq!(clock.tick(start + Duration::from_millis(105)), 0);
    // the clock never runs backwards
    assert_eq!(clock.tick(start), 0);
    assert_eq!(clock.tick(start + Duration::from_millis(110)), 1);
}

#[test]
fn test_shared_table_under_concurrent_machines() {
    let start = Instant::now();
    let timeouts = Timeouts::starting_at(Staggered, start);

    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let timeouts = timeouts.clone();
            thread::spawn(move || {
                for i in 0..250u32 {
                    let key = format!("w{}-{}", worker, i);
                    timeouts.set_timeout(key.clone(), Message::internal(Alarm::Ring).with_payload(1));
                    if i % 2 == 0 {
                        assert_eq!(timeouts.cancel_timeout(&key), 1);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(timeouts.len(), 4 * 125);
    assert_eq!(timeouts.tick(start + Duration::from_millis(10)).len(), 4 * 125);
    assert!(timeouts.is_empty());
}

#[test]
fn test_arm_through_proxy() {
    let start = Instant::now();
    let clock = alarm_clock(start);
    let table = Arc::new(CallTable::new().cast("arm", Alarm::Arm, CallAddressing::Internal));
    let proxy = clock.proxy(table, Duration::from_secs(1));

    let reply = tokio_test::block_on(proxy.call("arm", Some(2)));
    assert_eq!(tokio_test::assert_ok!(reply), None);
    assert_eq!(clock.timeouts().pending("alarm-2"), 1);
}

#[test]
fn test_listener_may_call_back_into_participant() {
    let start = Instant::now();
    let clock = alarm_clock(start);
    let observer = Arc::new(Observer {
        clock: Arc::downgrade(&clock),
        seen: Mutex::new(Vec::new()),
    });
    clock.add_state_transition_listener(observer.clone());

    clock.receive(arm(1));
    clock.receive(arm(9));
    clock.tick(start + Duration::from_millis(10));

    assert_eq!(
        *observer.seen.lock().unwrap(),
        vec![("arm", 0), ("arm", 0), ("ring", 1), ("disarm", 1)]
    );
    assert!(clock.timeouts().is_empty());
}

#[tokio::test]
async fn test_timer_driver_uses_wall_clock() {
    let clock = alarm_clock(Instant::now());
    let driver = clock.spawn_timer(Duration::from_millis(5));
    clock.receive(arm(2));

    for _ in 0..100 {
        if !clock.with_context(|c| c.rang.is_empty()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    driver.abort();
    assert_eq!(clock.with_context(|c| c.rang.clone()), vec![2]);
}
