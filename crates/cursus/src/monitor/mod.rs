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

//! Performance Monitor
//!
//! Per-topic rolling statistics and advisory bottleneck detection. Each
//! topic keeps a bounded sliding window of recent queue waits and
//! execution times; means and percentiles are computed over the window
//! while `samples` counts completions since startup.
//!
//! Queue waits arrive through [`PerformanceMonitor::record_dispatch`]
//! and execution times through
//! [`PerformanceMonitor::record_completion`]. The two feeds are
//! independent so a delivery that never reports back still leaves its
//! wait on the record.
//!
//! Queue depth is not tracked here. The bus owns depth, and callers pass
//! a depth snapshot into [`PerformanceMonitor::snapshot`] and
//! [`PerformanceMonitor::detect_bottlenecks`]. That keeps the depth rule
//! working for topics that have never completed a task, which is exactly
//! the situation a stuck queue produces.
//!
//! Detection is advisory. Reports are returned and logged; nothing is
//! throttled or blocked on their account.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use tracing::warn;

use crate::models::{BottleneckReason, BottleneckReport, TopicMetrics};

/// Sliding windows and the lifetime completion count for one topic.
#[derive(Debug, Default)]
struct TopicWindow {
    queue_waits: VecDeque<Duration>,
    exec_times: VecDeque<Duration>,
    completed: u64,
}

/// Rolling per-topic statistics with threshold-based bottleneck checks.
#[derive(Debug)]
pub struct PerformanceMonitor {
    /// Maximum samples retained per topic window.
    sample_window: usize,
    /// Depth above which the depth rule fires.
    max_queue_depth: usize,
    /// p95 queue wait above which the wait rule fires.
    max_queue_wait: Duration,
    topics: RwLock<HashMap<String, TopicWindow>>,
}

impl PerformanceMonitor {
    /// Creates a monitor with the given window size and thresholds.
    ///
    /// `sample_window` must be at least 1; configuration validation
    /// enforces that before a monitor is built.
    pub fn new(sample_window: usize, max_queue_depth: usize, max_queue_wait: Duration) -> Self {
        Self {
            sample_window,
            max_queue_depth,
            max_queue_wait,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Records how long a delivered task sat in `topic`'s queue.
    ///
    /// The oldest wait falls out of the window once it is full.
    pub fn record_dispatch(&self, topic: &str, queue_wait: Duration) {
        let mut topics = self.topics.write();
        let window = topics.entry(topic.to_string()).or_default();
        window.queue_waits.push_back(queue_wait);
        while window.queue_waits.len() > self.sample_window {
            window.queue_waits.pop_front();
        }
    }

    /// Records a completed task's measured execution time.
    ///
    /// The oldest sample falls out of the window once it is full; the
    /// lifetime completion count keeps growing.
    pub fn record_completion(&self, topic: &str, exec_time: Duration) {
        let mut topics = self.topics.write();
        let window = topics.entry(topic.to_string()).or_default();
        window.completed += 1;
        window.exec_times.push_back(exec_time);
        while window.exec_times.len() > self.sample_window {
            window.exec_times.pop_front();
        }
    }

    /// Every topic with at least one recorded sample.
    pub fn topics(&self) -> Vec<String> {
        self.topics.read().keys().cloned().collect()
    }

    /// Statistics for one topic at the given queue depth.
    ///
    /// Topics with no recorded samples report zeroed durations.
    pub fn snapshot(&self, topic: &str, queue_depth: usize) -> TopicMetrics {
        let topics = self.topics.read();
        let Some(window) = topics.get(topic) else {
            return TopicMetrics::empty(topic, queue_depth);
        };

        let mut waits: Vec<Duration> = window.queue_waits.iter().copied().collect();
        waits.sort_unstable();
        let execs: Vec<Duration> = window.exec_times.iter().copied().collect();

        TopicMetrics {
            topic: topic.to_string(),
            samples: window.completed,
            mean_queue_wait: mean(&waits),
            p95_queue_wait: percentile(&waits, 0.95),
            p99_queue_wait: percentile(&waits, 0.99),
            mean_exec_time: mean(&execs),
            queue_depth,
        }
    }

    /// Evaluates both bottleneck rules against every topic in the depth
    /// snapshot.
    ///
    /// The depth rule compares the passed depth to the configured
    /// ceiling and needs no samples. The wait rule compares the window's
    /// p95 queue wait to the configured ceiling and is skipped for
    /// topics without wait samples. A topic can raise both.
    pub fn detect_bottlenecks(&self, depths: &[(String, usize)]) -> Vec<BottleneckReport> {
        let topics = self.topics.read();
        let mut reports = Vec::new();

        for (topic, depth) in depths {
            if *depth > self.max_queue_depth {
                let reason = BottleneckReason::QueueDepthExceeded {
                    depth: *depth,
                    threshold: self.max_queue_depth,
                };
                warn!(topic = %topic, depth, threshold = self.max_queue_depth, "bottleneck: queue depth over threshold");
                reports.push(BottleneckReport::new(topic.clone(), reason));
            }

            if let Some(window) = topics.get(topic) {
                if window.queue_waits.is_empty() {
                    continue;
                }
                let mut waits: Vec<Duration> = window.queue_waits.iter().copied().collect();
                waits.sort_unstable();
                let p95 = percentile(&waits, 0.95);
                if p95 > self.max_queue_wait {
                    let reason = BottleneckReason::QueueWaitExceeded {
                        p95,
                        threshold: self.max_queue_wait,
                    };
                    warn!(topic = %topic, p95_ms = p95.as_millis() as u64, threshold_ms = self.max_queue_wait.as_millis() as u64, "bottleneck: queue wait over threshold");
                    reports.push(BottleneckReport::new(topic.clone(), reason));
                }
            }
        }

        reports
    }
}

/// Mean of a sample slice; zero when empty.
fn mean(samples: &[Duration]) -> Duration {
    if samples.is_empty() {
        return Duration::ZERO;
    }
    samples.iter().sum::<Duration>() / samples.len() as u32
}

/// Nearest-rank percentile of an ascending-sorted slice; zero when empty.
///
/// With a single sample, every percentile is that sample.
fn percentile(sorted: &[Duration], q: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (q * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
