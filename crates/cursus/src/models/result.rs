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

//! Task Outcome Model
//!
//! Terminal outcomes reported by consumers. A failed task is business
//! outcome data, not a core error: it drives the fail-fast workflow policy
//! but is never raised as an `Err` by the core itself.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::task::TaskId;

/// Terminal status of a task.
///
/// Workers report `Succeeded` or `Failed`; `Skipped` is assigned only by
/// the orchestrator when a dependency failed or the workflow was cancelled
/// before dispatch. Matched exhaustively wherever status drives control
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// The consumer completed the task.
    Succeeded,
    /// The consumer reported a failure.
    Failed,
    /// Never dispatched: a dependency failed or the workflow was cancelled.
    Skipped,
}

impl TaskStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
        }
    }

    /// Parses a status from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "succeeded" => Some(TaskStatus::Succeeded),
            "failed" => Some(TaskStatus::Failed),
            "skipped" => Some(TaskStatus::Skipped),
            _ => None,
        }
    }

    /// Returns true if this status satisfies a dependency edge.
    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Succeeded)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of a reported task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The worker hit its own execution deadline.
    Timeout,
    /// A resource the worker needed was unavailable or exhausted.
    Resource,
    /// The work itself failed (bad input, assertion, domain error).
    Application,
    /// The worker was told to stop before finishing.
    Cancelled,
}

impl FailureKind {
    /// Returns the string representation of the failure kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Resource => "resource",
            FailureKind::Application => "application",
            FailureKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Details attached to a failed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    /// What class of failure occurred.
    pub kind: FailureKind,
    /// Human-readable description from the worker.
    pub message: String,
}

impl TaskFailure {
    /// Creates a failure record.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one task, reported by the consuming worker.
///
/// Immutable once written. Queue wait is measured by the worker on receipt
/// (see [`Task::queue_wait`](super::task::Task::queue_wait)); execution
/// time covers the worker's own processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: TaskId,
    /// Terminal status.
    pub status: TaskStatus,
    /// How long the task sat queued before delivery.
    pub queue_wait: Duration,
    /// How long the worker spent executing.
    pub exec_time: Duration,
    /// Present when `status` is `Failed`.
    pub failure: Option<TaskFailure>,
}

impl TaskResult {
    /// Builds a successful result.
    pub fn success(task_id: TaskId, queue_wait: Duration, exec_time: Duration) -> Self {
        Self {
            task_id,
            status: TaskStatus::Succeeded,
            queue_wait,
            exec_time,
            failure: None,
        }
    }

    /// Builds a failed result with its classification.
    pub fn failure(
        task_id: TaskId,
        queue_wait: Duration,
        exec_time: Duration,
        failure: TaskFailure,
    ) -> Self {
        Self {
            task_id,
            status: TaskStatus::Failed,
            queue_wait,
            exec_time,
            failure: Some(failure),
        }
    }
}
