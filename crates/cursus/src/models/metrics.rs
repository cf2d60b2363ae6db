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

//! Throughput Metrics Model
//!
//! Read-only snapshots produced by the performance monitor for health
//! queries, and the advisory bottleneck reports raised when a topic's
//! queue depth or wait time crosses a configured threshold. Neither type
//! is persisted; both are rebuildable from live state.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rolling statistics for one topic.
///
/// `samples` counts every completion recorded since startup; the mean and
/// percentile figures are computed over the bounded sliding window of the
/// most recent samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMetrics {
    /// Topic these statistics describe.
    pub topic: String,
    /// Total completions recorded since startup.
    pub samples: u64,
    /// Mean queue wait over the sample window.
    pub mean_queue_wait: Duration,
    /// 95th percentile queue wait over the sample window.
    pub p95_queue_wait: Duration,
    /// 99th percentile queue wait over the sample window.
    pub p99_queue_wait: Duration,
    /// Mean execution time over the sample window.
    pub mean_exec_time: Duration,
    /// Number of tasks currently queued for this topic.
    pub queue_depth: usize,
}

impl TopicMetrics {
    /// A snapshot for a topic with no recorded samples.
    pub fn empty(topic: impl Into<String>, queue_depth: usize) -> Self {
        Self {
            topic: topic.into(),
            samples: 0,
            mean_queue_wait: Duration::ZERO,
            p95_queue_wait: Duration::ZERO,
            p99_queue_wait: Duration::ZERO,
            mean_exec_time: Duration::ZERO,
            queue_depth,
        }
    }
}

/// Why a bottleneck report was raised, with the measured value and the
/// threshold it crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum BottleneckReason {
    /// The topic's queue depth exceeded the configured absolute threshold.
    QueueDepthExceeded {
        /// Observed queue depth.
        depth: usize,
        /// Configured depth ceiling.
        threshold: usize,
    },
    /// The topic's p95 queue wait exceeded the configured duration.
    QueueWaitExceeded {
        /// Observed p95 queue wait.
        p95: Duration,
        /// Configured wait ceiling.
        threshold: Duration,
    },
}

impl fmt::Display for BottleneckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BottleneckReason::QueueDepthExceeded { depth, threshold } => {
                write!(f, "queue depth {} exceeds threshold {}", depth, threshold)
            }
            BottleneckReason::QueueWaitExceeded { p95, threshold } => {
                write!(
                    f,
                    "p95 queue wait {:?} exceeds threshold {:?}",
                    p95, threshold
                )
            }
        }
    }
}

/// Point-in-time diagnostic for one topic.
///
/// Advisory only: detection never blocks or throttles producers. Callers
/// decide whether to act (scale workers, reprioritize).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BottleneckReport {
    /// Topic the report concerns.
    pub topic: String,
    /// Which rule fired, with the measured value and crossed threshold.
    pub reason: BottleneckReason,
    /// When the crossing was observed.
    pub detected_at: DateTime<Utc>,
}

impl BottleneckReport {
    /// Creates a report stamped with the current time.
    pub fn new(topic: impl Into<String>, reason: BottleneckReason) -> Self {
        Self {
            topic: topic.into(),
            reason,
            detected_at: Utc::now(),
        }
    }
}

impl fmt::Display for BottleneckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topic '{}': {}", self.topic, self.reason)
    }
}
