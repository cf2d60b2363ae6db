/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Topic Queue
//!
//! In-memory stable priority queue bound to one topic. Tasks are ordered
//! by `(priority rank, submission time, arrival sequence)` ascending, so
//! pop always returns the highest-priority, oldest-submitted pending task
//! and two tasks of equal priority dispatch in submission order. Backed by
//! a binary heap for O(log n) push and pop. Capacity enforcement lives in
//! the bus, not here; the queue itself never drops a task.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::models::Task;

/// Heap entry carrying the stable ordering key.
#[derive(Debug)]
struct QueuedEntry {
    task: Task,
    /// Bus-assigned arrival counter; breaks ties between identical
    /// submission timestamps so ordering stays a total order.
    seq: u64,
}

impl QueuedEntry {
    fn key(&self) -> (u8, DateTime<Utc>, u64) {
        (self.task.priority.rank(), self.task.submitted_at, self.seq)
    }
}

impl PartialEq for QueuedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedEntry {}

impl PartialOrd for QueuedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

/// Stable priority queue for one topic.
#[derive(Debug)]
pub struct TopicQueue {
    topic: String,
    heap: BinaryHeap<Reverse<QueuedEntry>>,
}

impl TopicQueue {
    /// Creates an empty queue for the given topic.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            heap: BinaryHeap::new(),
        }
    }

    /// The topic this queue serves.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueues a task under the stable ordering key.
    pub fn push(&mut self, task: Task, seq: u64) {
        self.heap.push(Reverse(QueuedEntry { task, seq }));
    }

    /// Removes and returns the highest-priority, oldest-submitted task.
    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|Reverse(entry)| entry.task)
    }

    /// Number of tasks currently queued.
    pub fn depth(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
