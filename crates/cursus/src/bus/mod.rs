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

//! Message Bus
//!
//! Topic-based publish/subscribe with competing consumers and bounded
//! queues. Topics are created lazily on first publish or subscribe and
//! each carries its own [`TopicQueue`], wakeup channel, and capacity
//! budget.
//!
//! Publishing follows a fixed order: wait for a capacity slot, append the
//! task to the journal, push it onto the topic queue, then wake one
//! waiting consumer. A task is therefore never visible to a consumer
//! before it is durable, and a publisher abandoned while blocked on a
//! full queue leaves no journal record behind.
//!
//! Delivery is at-least-once: a task handed to a consumer that dies
//! before reporting a result is recovered from the journal on the next
//! start, not redelivered within the same process.

mod queue;
mod subscription;

pub use queue::TopicQueue;
pub use subscription::Subscription;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Notify, Semaphore, TryAcquireError};
use tracing::{debug, info};

use crate::error::PublishError;
use crate::journal::TaskJournal;
use crate::models::Task;

/// Shared per-topic state: the queue plus the coordination primitives
/// publishers and subscribers meet on.
#[derive(Debug)]
pub(crate) struct TopicState {
    pub(crate) topic: String,
    pub(crate) queue: Mutex<TopicQueue>,
    pub(crate) notify: Notify,
    /// One permit per free queue slot. Publishers block here when the
    /// topic is at capacity; consumers return a permit on every pop.
    pub(crate) slots: Semaphore,
    /// Tasks admitted above capacity during recovery replay. Pops drain
    /// this count before they start returning permits, so the capacity
    /// budget is unchanged once the backlog clears.
    pub(crate) unmetered: AtomicUsize,
    pub(crate) closed: AtomicBool,
    pub(crate) subscribers: AtomicUsize,
}

impl TopicState {
    fn new(topic: String, capacity: usize, closed: bool) -> Self {
        let slots = Semaphore::new(capacity);
        if closed {
            slots.close();
        }
        Self {
            queue: Mutex::new(TopicQueue::new(topic.clone())),
            topic,
            notify: Notify::new(),
            slots,
            unmetered: AtomicUsize::new(0),
            closed: AtomicBool::new(closed),
            subscribers: AtomicUsize::new(0),
        }
    }

    /// Frees the capacity slot of a popped task.
    pub(crate) fn release_slot(&self) {
        let mut unmetered = self.unmetered.load(Ordering::Acquire);
        loop {
            if unmetered == 0 {
                self.slots.add_permits(1);
                return;
            }
            match self.unmetered.compare_exchange(
                unmetered,
                unmetered - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => unmetered = actual,
            }
        }
    }
}

/// Publish/subscribe bus over per-topic priority queues.
pub struct MessageBus {
    journal: Arc<dyn TaskJournal>,
    topics: RwLock<HashMap<String, Arc<TopicState>>>,
    queue_capacity: usize,
    /// Monotonic arrival counter shared by all topics; keeps ordering
    /// stable when submission timestamps collide.
    seq: AtomicU64,
    closed: AtomicBool,
}

impl MessageBus {
    /// Creates a bus whose topics each admit at most `queue_capacity`
    /// queued tasks.
    pub fn new(journal: Arc<dyn TaskJournal>, queue_capacity: usize) -> Self {
        Self {
            journal,
            topics: RwLock::new(HashMap::new()),
            queue_capacity,
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Publishes a task to its topic.
    ///
    /// Blocks while the topic is at capacity. The task is journaled
    /// before it becomes visible to any consumer; if the append fails
    /// the task is not enqueued and the capacity slot is released.
    pub async fn publish(&self, task: Task) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }
        let state = self.topic_state(&task.topic);

        // Blocks while the topic is full; errors once the bus shuts down.
        let permit = state
            .slots
            .acquire()
            .await
            .map_err(|_| PublishError::Closed)?;

        self.journal.append(&task).await?;

        let task_id = task.id;
        let depth = self.enqueue(&state, task);
        // The slot stays consumed until a pop returns it.
        permit.forget();
        state.notify.notify_one();

        debug!(task_id = %task_id, topic = %state.topic, depth, "task enqueued");
        Ok(())
    }

    /// Re-enqueues a task that is already journaled.
    ///
    /// Used on recovery replay; skipping the append keeps the journal
    /// free of duplicate submission records. Never blocks: a backlog
    /// larger than the topic's capacity is admitted above it, and
    /// publishers stay blocked until consumers work the excess off.
    pub async fn requeue(&self, task: Task) -> Result<(), PublishError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed);
        }
        let state = self.topic_state(&task.topic);

        match state.slots.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(TryAcquireError::NoPermits) => {
                state.unmetered.fetch_add(1, Ordering::AcqRel);
            }
            Err(TryAcquireError::Closed) => return Err(PublishError::Closed),
        }

        let depth = self.enqueue(&state, task);
        state.notify.notify_one();
        debug!(topic = %state.topic, depth, "task requeued");
        Ok(())
    }

    fn enqueue(&self, state: &TopicState, task: Task) -> usize {
        let seq = self.seq.fetch_add(1, Ordering::AcqRel);
        let mut queue = state.queue.lock();
        queue.push(task, seq);
        queue.depth()
    }

    /// Registers a competing consumer on a topic.
    ///
    /// The topic is created if it does not exist yet. Each queued task is
    /// delivered to exactly one of the topic's subscribers.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        let state = self.topic_state(topic);
        state.subscribers.fetch_add(1, Ordering::AcqRel);
        debug!(topic = %state.topic, "subscription registered");
        Subscription::new(state)
    }

    /// Cancels a subscription obtained from [`subscribe`](Self::subscribe).
    ///
    /// Equivalent to [`Subscription::cancel`]; a consumer blocked on the
    /// handle wakes up and stops receiving tasks.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.cancel();
    }

    /// Current number of queued tasks on a topic. Unknown topics report 0.
    pub fn depth(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|state| state.queue.lock().depth())
            .unwrap_or(0)
    }

    /// Depth snapshot across every known topic, sorted by topic name.
    pub fn depths(&self) -> Vec<(String, usize)> {
        let mut depths: Vec<(String, usize)> = self
            .topics
            .read()
            .values()
            .map(|state| (state.topic.clone(), state.queue.lock().depth()))
            .collect();
        depths.sort_by(|a, b| a.0.cmp(&b.0));
        depths
    }

    /// Names of every topic the bus has seen, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.topics.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Number of live subscriptions on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|state| state.subscribers.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Shuts the bus down.
    ///
    /// Blocked publishers fail with [`PublishError::Closed`] and blocked
    /// consumers receive `None`. Tasks still queued stay journaled and
    /// replay on the next start.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for state in self.topics.read().values() {
            state.closed.store(true, Ordering::Release);
            state.slots.close();
            state.notify.notify_waiters();
        }
        info!("message bus shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn topic_state(&self, topic: &str) -> Arc<TopicState> {
        if let Some(state) = self.topics.read().get(topic) {
            return Arc::clone(state);
        }
        let closed = self.closed.load(Ordering::Acquire);
        let mut topics = self.topics.write();
        Arc::clone(
            topics
                .entry(topic.to_string())
                .or_insert_with(|| Arc::new(TopicState::new(topic.to_string(), self.queue_capacity, closed))),
        )
    }
}
