use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use rand::Rng;
use serde::Deserialize;

use crate::clock::{Clock, Millis};

use super::connection::{Connection, ConnectionEvent, LinkStats, TransportError};
use super::protocol::Message;

/// Latency and loss applied to one direction of a loopback link.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LinkConditions {
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
    pub loss_percent: f32,
}

impl LinkConditions {
    pub fn fixed(latency_ms: u32) -> Self {
        Self {
            min_latency_ms: latency_ms,
            max_latency_ms: latency_ms,
            ..Default::default()
        }
    }

    pub fn should_drop(&self) -> bool {
        if self.loss_percent <= 0.0 {
            return false;
        }
        rand::thread_rng().gen_range(0.0..100.0) < self.loss_percent
    }

    pub fn delay_ms(&self) -> Millis {
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(base);
        if range == 0 && self.jitter_ms == 0 {
            return base as Millis;
        }
        let mut rng = rand::thread_rng();
        (base + rng.gen_range(0..=range) + rng.gen_range(0..=self.jitter_ms)) as Millis
    }
}

#[derive(Debug)]
enum Payload {
    Open,
    Bytes(Vec<u8>),
    Close,
}

#[derive(Debug)]
struct Delayed {
    release_at: Millis,
    sequence: u64,
    payload: Payload,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.release_at == other.release_at && self.sequence == other.sequence
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap
        other
            .release_at
            .cmp(&self.release_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct Inbox {
    queue: BinaryHeap<Delayed>,
    next_sequence: u64,
    closed: bool,
}

impl Inbox {
    fn push(&mut self, release_at: Millis, payload: Payload) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(Delayed {
            release_at,
            sequence,
            payload,
        });
    }

    fn pop_ready(&mut self, now: Millis) -> Option<Payload> {
        if self.queue.peek()?.release_at > now {
            return None;
        }
        self.queue.pop().map(|delayed| delayed.payload)
    }
}

/// In-process connection end. Messages go through the wire codec and are
/// released to the other end once their simulated latency has elapsed.
#[derive(Debug)]
pub struct LoopbackConnection<K> {
    clock: K,
    inbox: Rc<RefCell<Inbox>>,
    outbox: Rc<RefCell<Inbox>>,
    conditions: LinkConditions,
    stats: LinkStats,
    closed: bool,
}

/// Creates a connected pair: `(authority side, receiver side)`. The receiver
/// side sees `Open` straight away.
pub fn pair<K: Clock + Clone>(
    clock: K,
    conditions: LinkConditions,
) -> (LoopbackConnection<K>, LoopbackConnection<K>) {
    let to_authority = Rc::new(RefCell::new(Inbox::default()));
    let to_receiver = Rc::new(RefCell::new(Inbox::default()));

    to_receiver
        .borrow_mut()
        .push(clock.now_ms(), Payload::Open);

    let authority = LoopbackConnection::new(
        clock.clone(),
        Rc::clone(&to_authority),
        Rc::clone(&to_receiver),
        conditions.clone(),
    );
    let receiver = LoopbackConnection::new(clock, to_receiver, to_authority, conditions);
    (authority, receiver)
}

impl<K: Clock> LoopbackConnection<K> {
    fn new(
        clock: K,
        inbox: Rc<RefCell<Inbox>>,
        outbox: Rc<RefCell<Inbox>>,
        conditions: LinkConditions,
    ) -> Self {
        Self {
            clock,
            inbox,
            outbox,
            conditions,
            stats: LinkStats::default(),
            closed: false,
        }
    }

    /// Conditions for traffic leaving this end.
    pub fn set_conditions(&mut self, conditions: LinkConditions) {
        self.conditions = conditions;
    }

    pub fn conditions(&self) -> &LinkConditions {
        &self.conditions
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<K: Clock> Connection for LoopbackConnection<K> {
    fn send(&mut self, message: Message) -> Result<(), TransportError> {
        if self.closed || self.outbox.borrow().closed {
            return Err(TransportError::Closed);
        }

        let bytes = message.encode()?;
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;

        if self.conditions.should_drop() {
            self.stats.messages_dropped += 1;
            return Ok(());
        }

        let release_at = self.clock.now_ms() + self.conditions.delay_ms();
        self.outbox
            .borrow_mut()
            .push(release_at, Payload::Bytes(bytes));
        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inbox.borrow_mut().closed = true;

        let release_at = self.clock.now_ms() + self.conditions.delay_ms();
        self.outbox.borrow_mut().push(release_at, Payload::Close);
    }

    fn poll_event(&mut self) -> Option<ConnectionEvent> {
        let now = self.clock.now_ms();
        loop {
            let payload = self.inbox.borrow_mut().pop_ready(now)?;
            match payload {
                Payload::Open => return Some(ConnectionEvent::Open),
                Payload::Close => {
                    self.closed = true;
                    self.inbox.borrow_mut().closed = true;
                    return Some(ConnectionEvent::Close);
                }
                Payload::Bytes(bytes) => match Message::decode(&bytes) {
                    Ok(message) => {
                        self.stats.messages_received += 1;
                        self.stats.bytes_received += bytes.len() as u64;
                        return Some(ConnectionEvent::Message(message));
                    }
                    Err(e) => log::warn!("dropping undecodable message: {e}"),
                },
            }
        }
    }
}
