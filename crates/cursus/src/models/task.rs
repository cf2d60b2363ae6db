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

//! Task Model
//!
//! Core identifiers and records for units of work flowing through the
//! dispatch core: typed ids, the ordered priority enum, the submission
//! spec built by callers, and the accepted task record that is queued,
//! journaled, and delivered to consumers.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifier for a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a workflow submission (a batch of related tasks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(Uuid);

impl WorkflowId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dispatch priority of a task.
///
/// A closed, ordered set: `Critical` outranks `High`, which outranks
/// `Medium`, which outranks `Low`. Queues order by [`TaskPriority::rank`]
/// first and submission time second, so two tasks of equal priority are
/// always dispatched in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Dispatched before everything else.
    Critical,
    /// Elevated priority.
    High,
    /// Default priority.
    Medium,
    /// Dispatched only when nothing above it is pending.
    Low,
}

impl TaskPriority {
    /// Numeric ordering key: lower ranks dispatch first (Critical = 0,
    /// Low = 3).
    pub fn rank(&self) -> u8 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 3,
        }
    }

    /// Returns the string representation of the priority.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
        }
    }
}

impl Default for TaskPriority {
    fn default() -> Self {
        TaskPriority::Medium
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TaskPriority {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(TaskPriority::Critical),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            other => Err(ValidationError::InvalidPriority {
                value: other.to_string(),
            }),
        }
    }
}

/// A unit of work as described by the submitting caller.
///
/// Specs carry a caller-visible id so that tasks within one workflow
/// submission can reference each other before the submission is accepted.
/// The payload is opaque to the core and handed to the consumer verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Identifier assigned at spec creation; echoed back on acceptance.
    pub id: TaskId,
    /// Routing key selecting the worker class that will consume this task.
    pub topic: String,
    /// Dispatch priority.
    pub priority: TaskPriority,
    /// Opaque payload, not interpreted by the core.
    pub payload: serde_json::Value,
    /// Ids of tasks that must succeed before this task may be published.
    pub depends_on: BTreeSet<TaskId>,
    /// Planning hint for workflow completion estimates; the configured
    /// default applies when absent.
    pub estimated_duration: Option<Duration>,
}

impl TaskSpec {
    /// Creates a spec for the given topic and priority with a null payload
    /// and no dependencies.
    pub fn new(topic: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            id: TaskId::new(),
            topic: topic.into(),
            priority,
            payload: serde_json::Value::Null,
            depends_on: BTreeSet::new(),
            estimated_duration: None,
        }
    }

    /// Sets the opaque payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Declares a dependency on another task.
    pub fn depends_on(mut self, id: TaskId) -> Self {
        self.depends_on.insert(id);
        self
    }

    /// Sets the estimated execution duration used for plan estimates.
    pub fn with_estimate(mut self, estimate: Duration) -> Self {
        self.estimated_duration = Some(estimate);
        self
    }
}

/// An accepted unit of work.
///
/// Created when a submission passes validation; queued, journaled, and
/// eventually delivered to exactly one consumer. A task with a non-empty
/// dependency set is never published until every dependency has a
/// successful terminal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// Routing key selecting the worker class that will consume this task.
    pub topic: String,
    /// Dispatch priority.
    pub priority: TaskPriority,
    /// Opaque payload, not interpreted by the core.
    pub payload: serde_json::Value,
    /// When the submission was accepted.
    pub submitted_at: DateTime<Utc>,
    /// Ids of tasks this task depends on.
    pub depends_on: BTreeSet<TaskId>,
    /// The workflow this task was submitted as part of, if any.
    pub workflow_id: Option<WorkflowId>,
}

impl Task {
    /// Builds an accepted task from a spec, stamping the submission time.
    pub fn from_spec(spec: TaskSpec, workflow_id: Option<WorkflowId>) -> Self {
        Self {
            id: spec.id,
            topic: spec.topic,
            priority: spec.priority,
            payload: spec.payload,
            submitted_at: Utc::now(),
            depends_on: spec.depends_on,
            workflow_id,
        }
    }

    /// Time this task has spent since submission, saturating at zero.
    ///
    /// Consumers call this on receipt to obtain the queue-wait figure they
    /// report back with the result.
    pub fn queue_wait(&self) -> Duration {
        (Utc::now() - self.submitted_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}
