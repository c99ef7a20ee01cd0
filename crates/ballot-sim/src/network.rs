//! Simulated network.
//!
//! Messages are delayed by a random amount in `[0, max_delay]` and delivered
//! in `(arrival_time, message_id)` order. The network never drops, duplicates
//! or corrupts a message; every send is eventually delivered.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

use crate::message::Envelope;
use crate::rng::SimRng;

/// A message in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkItem {
    pub envelope: Envelope,
    pub arrival_time: u64,
}

impl PartialOrd for NetworkItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NetworkItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap
        other
            .arrival_time
            .cmp(&self.arrival_time)
            .then_with(|| other.envelope.message_id.cmp(&self.envelope.message_id))
    }
}

/// Network statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Total messages accepted by the network.
    pub messages_sent: u64,
    /// Total messages handed to the router.
    pub messages_delivered: u64,
}

impl NetworkStats {
    /// Messages sent but not yet delivered.
    pub fn in_flight(&self) -> u64 {
        self.messages_sent - self.messages_delivered
    }
}

/// Time-ordered queue of addressed messages.
#[derive(Debug)]
pub struct SimNetwork {
    queue: BinaryHeap<NetworkItem>,
    max_delay: u64,
    stats: NetworkStats,
}

impl SimNetwork {
    pub fn new(max_delay: u64) -> Self {
        Self {
            queue: BinaryHeap::new(),
            max_delay,
            stats: NetworkStats::default(),
        }
    }

    /// Accepts `envelope` for delivery at `now + draw(0, max_delay)`.
    pub fn push_entry(&mut self, envelope: Envelope, now: u64, rng: &mut SimRng) {
        let delay = rng.draw(0, self.max_delay);
        self.push_entry_with_delay(envelope, now, delay);
    }

    /// Accepts `envelope` for delivery at exactly `now + delay`.
    pub fn push_entry_with_delay(&mut self, envelope: Envelope, now: u64, delay: u64) {
        let arrival_time = now.saturating_add(delay);
        tracing::trace!(
            message_id = %envelope.message_id,
            kind = %envelope.kind,
            from = %envelope.from,
            to = %envelope.to,
            arrival_time,
            "message sent"
        );
        self.stats.messages_sent += 1;
        self.queue.push(NetworkItem {
            envelope,
            arrival_time,
        });
    }

    /// Removes every message that has arrived by `now`, in delivery order.
    pub fn fetch_ready(&mut self, now: u64) -> Vec<Envelope> {
        let mut ready = Vec::new();
        while let Some(head) = self.queue.peek() {
            if head.arrival_time > now {
                break;
            }
            let Some(item) = self.queue.pop() else {
                break;
            };
            ready.push(item.envelope);
        }
        self.stats.messages_delivered += ready.len() as u64;
        ready
    }

    /// Returns true if any message is still in flight.
    pub fn has_messages(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }
}
