//! Named, cancelable timers that re-inject a message on expiry
//!
//! Timers run on a logical clock: `tick(now)` advances the clock and hands back
//! every expired trigger message, and new deadlines are computed from the last
//! tick. A participant feeds the returned messages to its state machine like
//! any other inbound message, so no extra thread touches protocol state.
//!
//! Setting a timer never replaces an existing one under the same key. A
//! protocol that wants to reset a timer cancels it first.

use crate::common::utils::lock;
use crate::statemachine::message::{Message, MessageType, CONVERSATION_ID};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Chooses how long a timer waits before delivering its trigger message
pub trait TimeoutStrategy<M: MessageType>: Send + Sync {
    fn timeout_for(&self, message: &Message<M>) -> Duration;
}

/// Same duration for every timer
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeoutStrategy(pub Duration);

impl<M: MessageType> TimeoutStrategy<M> for FixedTimeoutStrategy {
    fn timeout_for(&self, _message: &Message<M>) -> Duration {
        self.0
    }
}

/// A live timer
#[derive(Debug, Clone)]
pub struct Timeout<M: MessageType> {
    pub key: String,
    pub trigger: Message<M>,
    pub deadline: Instant,
}

struct TimeoutTable<M: MessageType> {
    now: Instant,
    // Insertion order; duplicates per key allowed.
    entries: Vec<Timeout<M>>,
}

/// Timer table shared between a participant and its protocol context.
///
/// Cloning yields another handle on the same table.
pub struct Timeouts<M: MessageType> {
    strategy: Arc<dyn TimeoutStrategy<M>>,
    table: Arc<Mutex<TimeoutTable<M>>>,
}

impl<M: MessageType> Clone for Timeouts<M> {
    fn clone(&self) -> Self {
        Self {
            strategy: self.strategy.clone(),
            table: self.table.clone(),
        }
    }
}

impl<M: MessageType> Timeouts<M> {
    pub fn new(strategy: impl TimeoutStrategy<M> + 'static) -> Self {
        Self::starting_at(strategy, Instant::now())
    }

    /// Start the logical clock at `now`
    pub fn starting_at(strategy: impl TimeoutStrategy<M> + 'static, now: Instant) -> Self {
        Self {
            strategy: Arc::new(strategy),
            table: Arc::new(Mutex::new(TimeoutTable {
                now,
                entries: Vec::new(),
            })),
        }
    }

    /// Schedule `trigger` for delivery once its timeout elapses.
    ///
    /// Does not touch other timers registered under `key`.
    pub fn set_timeout(&self, key: impl Into<String>, trigger: Message<M>) {
        let key = key.into();
        let duration = self.strategy.timeout_for(&trigger);
        let mut table = lock(&self.table);
        let deadline = table.now + duration;
        tracing::trace!(key = %key, trigger = %trigger, ?duration, "timeout set");
        table.entries.push(Timeout {
            key,
            trigger,
            deadline,
        });
    }

    /// Like `set_timeout`, but the trigger carries the conversation of the
    /// message whose handling armed the timer.
    pub fn set_timeout_from(
        &self,
        key: impl Into<String>,
        mut trigger: Message<M>,
        cause: &Message<M>,
    ) {
        cause.copy_headers_to(&mut trigger, &[CONVERSATION_ID]);
        self.set_timeout(key, trigger);
    }

    /// Cancel every live timer under `key`. Returns how many were cancelled.
    pub fn cancel_timeout(&self, key: &str) -> usize {
        let mut table = lock(&self.table);
        let before = table.entries.len();
        table.entries.retain(|timeout| timeout.key != key);
        let cancelled = before - table.entries.len();
        if cancelled > 0 {
            tracing::trace!(key, cancelled, "timeout cancelled");
        }
        cancelled
    }

    /// Advance the clock to `now` and return the trigger messages of every
    /// expired timer, earliest deadline first.
    ///
    /// The clock never moves backwards.
    pub fn tick(&self, now: Instant) -> Vec<Message<M>> {
        let mut table = lock(&self.table);
        if now > table.now {
            table.now = now;
        }
        let now = table.now;

        let (mut expired, live): (Vec<_>, Vec<_>) = table
            .entries
            .drain(..)
            .partition(|timeout| timeout.deadline <= now);
        table.entries = live;

        // Stable sort keeps insertion order for equal deadlines.
        expired.sort_by_key(|timeout| timeout.deadline);
        expired.into_iter().map(|timeout| timeout.trigger).collect()
    }

    /// Current logical time
    pub fn now(&self) -> Instant {
        lock(&self.table).now
    }

    /// Number of live timers under `key`
    pub fn pending(&self, key: &str) -> usize {
        lock(&self.table)
            .entries
            .iter()
            .filter(|timeout| timeout.key == key)
            .count()
    }

    /// Snapshot of every live timer
    pub fn live(&self) -> Vec<Timeout<M>> {
        lock(&self.table).entries.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.table).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<M: MessageType> fmt::Debug for Timeouts<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timeouts").field("live", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Tick {
        Fire,
        Slow,
    }

    impl MessageType for Tick {
        type Payload = u32;

        fn name(&self) -> &'static str {
            match self {
                Tick::Fire => "fire",
                Tick::Slow => "slow",
            }
        }
    }

    struct PerType;

    impl TimeoutStrategy<Tick> for PerType {
        fn timeout_for(&self, message: &Message<Tick>) -> Duration {
            match message.message_type() {
                Tick::Fire => Duration::from_millis(100),
                Tick::Slow => Duration::from_millis(500),
            }
        }
    }

    fn timeouts() -> (Timeouts<Tick>, Instant) {
        let start = Instant::now();
        (
            Timeouts::starting_at(FixedTimeoutStrategy(Duration::from_millis(100)), start),
            start,
        )
    }

    #[test]
    fn test_fires_after_deadline() {
        let (timeouts, start) = timeouts();
        timeouts.set_timeout("a", Message::internal(Tick::Fire).with_payload(1));

        assert!(timeouts.tick(start + Duration::from_millis(99)).is_empty());
        let fired = timeouts.tick(start + Duration::from_millis(100));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].payload(), Some(&1));
        assert!(timeouts.is_empty());

        // Single shot
        assert!(timeouts.tick(start + Duration::from_secs(10)).is_empty());
    }

    #[test]
    fn test_cancel_prevents_delivery() {
        let (timeouts, start) = timeouts();
        timeouts.set_timeout("a", Message::internal(Tick::Fire));
        timeouts.set_timeout("b", Message::internal(Tick::Fire));

        assert_eq!(timeouts.cancel_timeout("a"), 1);
        assert_eq!(timeouts.cancel_timeout("missing"), 0);

        let fired = timeouts.tick(start + Duration::from_secs(1));
        assert_eq!(fired.len(), 1);
        assert_eq!(timeouts.pending("a"), 0);
    }

    #[test]
    fn test_same_key_twice_yields_two_timers() {
        let (timeouts, start) = timeouts();
        timeouts.set_timeout("a", Message::internal(Tick::Fire).with_payload(1));
        timeouts.tick(start + Duration::from_millis(50));
        timeouts.set_timeout("a", Message::internal(Tick::Fire).with_payload(2));
        assert_eq!(timeouts.pending("a"), 2);

        let first = timeouts.tick(start + Duration::from_millis(100));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].payload(), Some(&1));

        let second = timeouts.tick(start + Duration::from_millis(150));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].payload(), Some(&2));
    }

    #[test]
    fn test_strategy_chooses_duration_and_order() {
        let start = Instant::now();
        let timeouts = Timeouts::starting_at(PerType, start);
        timeouts.set_timeout("slow", Message::internal(Tick::Slow));
        timeouts.set_timeout("fast", Message::internal(Tick::Fire));

        assert_eq!(timeouts.tick(start + Duration::from_millis(100)).len(), 1);
        assert_eq!(timeouts.pending("slow"), 1);

        let fired = timeouts.tick(start + Duration::from_millis(500));
        assert_eq!(fired[0].message_type(), Tick::Slow);
    }

    #[test]
    fn test_trigger_keeps_conversation_of_cause() {
        let (timeouts, start) = timeouts();
        let cause = Message::internal(Tick::Slow).with_header(CONVERSATION_ID, "a/7");
        timeouts.set_timeout_from("a", Message::internal(Tick::Fire), &cause);
        timeouts.set_timeout_from("b", Message::internal(Tick::Fire), &Message::internal(Tick::Slow));

        let fired = timeouts.tick(start + Duration::from_millis(100));
        assert_eq!(fired[0].conversation_id(), Some("a/7"));
        assert_eq!(fired[1].conversation_id(), None);
    }

    #[test]
    fn test_clock_never_goes_backwards() {
        let (timeouts, start) = timeouts();
        timeouts.tick(start + Duration::from_secs(1));
        timeouts.tick(start);
        assert_eq!(timeouts.now(), start + Duration::from_secs(1));
    }

    #[test]
    fn test_concurrent_schedule_and_cancel() {
        let (timeouts, start) = timeouts();
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let timeouts = timeouts.clone();
                std::thread::spawn(move || {
                    for n in 0..100 {
                        let key = format!("{}-{}", i, n);
                        timeouts.set_timeout(key.clone(), Message::internal(Tick::Fire));
                        if n % 2 == 0 {
                            timeouts.cancel_timeout(&key);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(timeouts.len(), 8 * 50);
        assert_eq!(timeouts.tick(start + Duration::from_secs(1)).len(), 8 * 50);
    }
}
