//! Delivery queue for the relay: messages that failed to send, kept in memory.
//!
//! The queue is a plain FIFO owned by the session task. It is drained in
//! passes: a pass takes every entry present when it starts, and entries that
//! fail again during the pass are appended behind anything still queued, so a
//! single pass always terminates even when the link stays down.

#![warn(missing_docs)]
#![warn(clippy::all)]

use relay_wire::OutboundMessage;
use std::collections::VecDeque;
use tracing::debug;

/// Counters kept by the queue
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Messages enqueued after a first failed write
    pub deferred: u64,
    /// Messages put back after a failed retry
    pub requeued: u64,
    /// Messages handed out by drain passes
    pub drained: u64,
}

/// In-memory FIFO of messages awaiting retry
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    entries: VecDeque<OutboundMessage>,
    stats: QueueStats,
}

impl DeliveryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message that could not be written
    pub fn enqueue(&mut self, message: OutboundMessage) {
        debug!("Deferring message (tag {}), queue size {}", message.tag(), self.entries.len() + 1);
        self.stats.deferred += 1;
        self.entries.push_back(message);
    }

    /// Put back a message whose retry failed
    pub fn requeue(&mut self, message: OutboundMessage) {
        self.stats.requeued += 1;
        self.entries.push_back(message);
    }

    /// Take every queued message, oldest first, for one drain pass
    pub fn begin_drain(&mut self) -> DrainPass {
        let batch: VecDeque<OutboundMessage> = std::mem::take(&mut self.entries);
        self.stats.drained += batch.len() as u64;
        DrainPass { batch }
    }

    /// Number of queued messages
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue counters
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    /// Iterate over queued messages in send order
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &OutboundMessage> {
        self.entries.iter()
    }
}

/// Snapshot of the queue taken at the start of a drain pass
#[derive(Debug)]
pub struct DrainPass {
    batch: VecDeque<OutboundMessage>,
}

impl DrainPass {
    /// Messages left in this pass
    pub fn remaining(&self) -> usize {
        self.batch.len()
    }

    /// Return every message not yet attempted to the queue, keeping order
    pub fn abandon(self, queue: &mut DeliveryQueue) {
        for message in self.batch {
            queue.requeue(message);
        }
    }
}

impl Iterator for DrainPass {
    type Item = OutboundMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.batch.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut queue = DeliveryQueue::new();
        queue.enqueue(OutboundMessage::raw("a"));
        queue.enqueue(OutboundMessage::structured("b"));
        queue.enqueue(OutboundMessage::compact("c"));

        let lines: Vec<String> = queue.begin_drain().map(|m| m.to_line()).collect();
        assert_eq!(lines, vec!["0a", "2b", "1c"]);
        assert!(queue.is_empty());
        assert_eq!(queue.stats().drained, 3);
    }

    #[test]
    fn test_failed_retries_wait_for_next_pass() {
        let mut queue = DeliveryQueue::new();
        queue.enqueue(OutboundMessage::raw("a"));
        queue.enqueue(OutboundMessage::raw("b"));

        // Link still down: every retry fails and is put back
        let mut attempts = 0;
        for message in queue.begin_drain() {
            attempts += 1;
            queue.requeue(message);
        }

        assert_eq!(attempts, 2);
        assert_eq!(queue.len(), 2);
        let lines: Vec<String> = queue.iter().map(|m| m.to_line()).collect();
        assert_eq!(lines, vec!["0a", "0b"]);
        assert_eq!(queue.stats().requeued, 2);
    }

    #[test]
    fn test_abandon_keeps_order_behind_requeued() {
        let mut queue = DeliveryQueue::new();
        for body in ["a", "b", "c"] {
            queue.enqueue(OutboundMessage::raw(body));
        }

        let mut pass = queue.begin_drain();
        let first = pass.next().unwrap();
        queue.requeue(first);
        assert_eq!(pass.remaining(), 2);
        pass.abandon(&mut queue);

        let lines: Vec<String> = queue.iter().map(|m| m.to_line()).collect();
        assert_eq!(lines, vec!["0a", "0b", "0c"]);
    }

    #[test]
    fn test_messages_deferred_during_pass_are_not_in_it() {
        let mut queue = DeliveryQueue::new();
        queue.enqueue(OutboundMessage::raw("old"));

        let pass = queue.begin_drain();
        queue.enqueue(OutboundMessage::raw("new"));

        let drained: Vec<String> = pass.map(|m| m.to_line()).collect();
        assert_eq!(drained, vec!["0old"]);
        assert_eq!(queue.len(), 1);
    }
}
