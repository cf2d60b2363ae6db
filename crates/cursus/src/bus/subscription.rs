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

//! Subscription handle for one consumer on one topic.
//!
//! Consumers compete on the shared topic queue: each queued task is
//! delivered to exactly one subscriber. `next` blocks until a task is
//! available, the subscription is cancelled, or the bus shuts down.
//! Waiting combines a notification from the publisher side with a short
//! periodic re-check so a missed wakeup never strands a consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::TopicState;
use crate::models::Task;

/// Upper bound on how long a consumer sleeps between queue re-checks
/// when no notification arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A consumer's handle on a topic.
///
/// Obtained from [`MessageBus::subscribe`](super::MessageBus::subscribe).
/// Dropping the handle cancels it.
#[derive(Debug)]
pub struct Subscription {
    state: Arc<TopicState>,
    cancelled: AtomicBool,
}

impl Subscription {
    pub(super) fn new(state: Arc<TopicState>) -> Self {
        Self {
            state,
            cancelled: AtomicBool::new(false),
        }
    }

    /// The topic this subscription consumes from.
    pub fn topic(&self) -> &str {
        &self.state.topic
    }

    /// Waits for the next task on the topic.
    ///
    /// Returns `None` once the subscription is cancelled or the bus has
    /// shut down. Tasks still queued at that point stay in the queue for
    /// other subscribers, or replay from the journal on the next start.
    pub async fn next(&self) -> Option<Task> {
        loop {
            if self.cancelled.load(Ordering::Acquire) || self.state.closed.load(Ordering::Acquire)
            {
                return None;
            }

            let popped = self.state.queue.lock().pop();
            if let Some(task) = popped {
                // The task left the queue, so its capacity slot frees up.
                self.state.release_slot();
                return Some(task);
            }

            tokio::select! {
                _ = self.state.notify.notified() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Cancels the subscription.
    ///
    /// Idempotent. A consumer blocked in [`next`] wakes up and observes
    /// the cancellation.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.state.subscribers.fetch_sub(1, Ordering::AcqRel);
            // Wake every waiter on the topic; the others go back to sleep.
            self.state.notify.notify_waiters();
            debug!(topic = %self.state.topic, "subscription cancelled");
        }
    }

    /// Whether the subscription has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
