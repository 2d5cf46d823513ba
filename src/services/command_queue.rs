// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-device command queues.
//!
//! Delivery is pull-only: a command leaves its queue when the device polls,
//! and is handed to exactly one poll. There is no acknowledgement or
//! redelivery. A device that retries after losing a response may execute a
//! command's effect twice or not at all.

use std::collections::VecDeque;

use chrono::Utc;
use dashmap::DashMap;

use crate::models::{Command, CommandQueueEntry};

/// FIFO of pending commands per device, capped per device.
pub struct CommandQueue {
    queues: DashMap<String, VecDeque<CommandQueueEntry>>,
    capacity: usize,
}

impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queues: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append a command. When the queue is full the oldest entry is dropped
    /// and returned.
    pub fn enqueue(&self, device_id: &str, command: Command) -> Option<CommandQueueEntry> {
        let mut queue = self.queues.entry(device_id.to_string()).or_default();

        let dropped = if queue.len() >= self.capacity {
            queue.pop_front()
        } else {
            None
        };

        tracing::debug!(device_id, command = %command.name, depth = queue.len() + 1, "Command queued");
        queue.push_back(CommandQueueEntry {
            device_id: device_id.to_string(),
            command,
            enqueued_at: Utc::now(),
        });

        if let Some(old) = &dropped {
            tracing::warn!(
                device_id,
                dropped = %old.command.name,
                enqueued_at = %old.enqueued_at,
                "Command queue full, dropped oldest command"
            );
        }
        dropped
    }

    /// Remove and return the head of the device's queue.
    pub fn dequeue_one(&self, device_id: &str) -> Option<Command> {
        let entry = {
            let mut queue = self.queues.get_mut(device_id)?;
            queue.pop_front()
        };
        // Drop emptied queues so idle devices hold no memory. The predicate
        // re-checks under the shard lock in case of a racing enqueue.
        self.queues.remove_if(device_id, |_, q| q.is_empty());

        entry.map(|e| e.command)
    }

    /// Number of pending commands for a device.
    pub fn pending(&self, device_id: &str) -> usize {
        self.queues.get(device_id).map_or(0, |q| q.len())
    }

    /// Discard everything pending for a device. Returns how many were dropped.
    pub fn clear(&self, device_id: &str) -> usize {
        self.queues
            .remove(device_id)
            .map_or(0, |(_, queue)| queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::command::names;
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn numbered(n: u64) -> Command {
        let mut payload = Map::new();
        payload.insert("n".to_string(), json!(n));
        Command::with_payload(names::FEED, payload)
    }

    #[test]
    fn test_fifo_per_device() {
        let queue = CommandQueue::new(50);
        queue.enqueue("a", numbered(1));
        queue.enqueue("b", numbered(100));
        queue.enqueue("a", numbered(2));

        assert_eq!(queue.dequeue_one("a"), Some(numbered(1)));
        assert_eq!(queue.dequeue_one("a"), Some(numbered(2)));
        assert_eq!(queue.dequeue_one("a"), None);
        assert_eq!(queue.dequeue_one("b"), Some(numbered(100)));
    }

    #[test]
    fn test_unknown_device_dequeues_none() {
        let queue = CommandQueue::new(50);
        assert_eq!(queue.dequeue_one("never-seen"), None);
        assert_eq!(queue.pending("never-seen"), 0);
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let queue = CommandQueue::new(3);
        for n in 1..=3 {
            assert!(queue.enqueue("a", numbered(n)).is_none());
        }
        let dropped = queue.enqueue("a", numbered(4)).unwrap();
        assert_eq!(dropped.command, numbered(1));
        assert_eq!(queue.pending("a"), 3);
        assert_eq!(queue.dequeue_one("a"), Some(numbered(2)));
    }

    #[test]
    fn test_duplicate_sync_kept() {
        let queue = CommandQueue::new(50);
        queue.enqueue("a", Command::sync());
        queue.enqueue("a", Command::sync());
        assert_eq!(queue.pending("a"), 2);
    }

    #[test]
    fn test_clear() {
        let queue = CommandQueue::new(50);
        queue.enqueue("a", Command::sync());
        queue.enqueue("a", numbered(1));
        assert_eq!(queue.clear("a"), 2);
        assert_eq!(queue.dequeue_one("a"), None);
    }

    #[test]
    fn test_concurrent_polls_never_share_a_command() {
        let queue = Arc::new(CommandQueue::new(1000));
        for n in 0..500 {
            queue.enqueue("a", numbered(n));
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    let mut got = Vec::new();
                    while let Some(cmd) = queue.dequeue_one("a") {
                        got.push(cmd.payload["n"].as_u64().unwrap());
                    }
                    got
                })
            })
            .collect();

        let mut all: Vec<u64> = Vec::new();
        for handle in handles {
            let got = handle.join().unwrap();
            // Each poller sees its share in enqueue order
            assert!(got.windows(2).all(|w| w[0] < w[1]));
            all.extend(got);
        }
        all.sort_unstable();
        assert_eq!(all, (0..500).collect::<Vec<_>>());
    }
}
