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

//! Error Types
//!
//! The error taxonomy of the dispatch core. Structural errors (validation,
//! cycles, persistence) are returned synchronously to the submitting caller
//! and never silently swallowed. Worker failures are not represented here:
//! they are outcome data on [`TaskResult`](crate::models::TaskResult) and
//! drive workflow state, not `Err` returns. Backpressure is likewise not an
//! error; `publish` blocks until capacity frees up.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{TaskId, WorkflowId};

/// A malformed submission or report, rejected before any persistence.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The task named an empty topic.
    #[error("Task {task_id} has an empty topic")]
    EmptyTopic { task_id: TaskId },

    /// A priority string did not name one of the four defined levels.
    #[error("Invalid priority: {value} (must be one of: critical, high, medium, low)")]
    InvalidPriority { value: String },

    /// A declared dependency id is neither in this submission nor known to
    /// the core.
    #[error("Task {task_id} depends on unknown task {dependency}")]
    UnknownDependency { task_id: TaskId, dependency: TaskId },

    /// A declared dependency exists but has not terminated successfully.
    #[error("Task {task_id} depends on task {dependency}, which has not succeeded")]
    DependencyNotSatisfied { task_id: TaskId, dependency: TaskId },

    /// The same task id appeared more than once in one submission.
    #[error("Duplicate task id in submission: {task_id}")]
    DuplicateTask { task_id: TaskId },

    /// A workflow submission contained no tasks.
    #[error("Workflow submission contains no tasks")]
    EmptyWorkflow,

    /// A result was reported for a task the core never accepted.
    #[error("Unknown task: {task_id}")]
    UnknownTask { task_id: TaskId },

    /// A query or cancellation named a workflow the core does not track.
    #[error("Unknown workflow: {workflow_id}")]
    UnknownWorkflow { workflow_id: WorkflowId },
}

/// A workflow submission that could not be turned into a plan.
///
/// Planning is atomic: on any error the whole submission is rejected and
/// nothing is persisted or published.
#[derive(Error, Debug)]
pub enum PlanError {
    /// The dependency graph contains a cycle.
    #[error("Workflow contains a dependency cycle: {cycle}")]
    Cycle { cycle: String },

    /// A task in the submission failed validation.
    #[error("Workflow validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// A durable log operation failed.
///
/// Fatal to the specific submit or report call that triggered it; the task
/// in question is not considered accepted (or marked).
#[derive(Error, Debug)]
pub enum JournalError {
    /// The underlying file operation failed.
    #[error("Journal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded or decoded.
    #[error("Journal record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Publishing a task onto the bus failed.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The durable append failed; the task was not accepted.
    #[error("Durable append failed: {0}")]
    Journal(#[from] JournalError),

    /// The bus was shut down while the publish was in flight.
    #[error("Message bus is shut down")]
    Closed,
}

/// A task or workflow submission failed.
#[derive(Error, Debug)]
pub enum SubmitError {
    /// The submission was malformed.
    #[error("Submission rejected: {0}")]
    Validation(#[from] ValidationError),

    /// The workflow could not be planned.
    #[error("Workflow rejected: {0}")]
    Plan(#[from] PlanError),

    /// The task could not be durably published.
    #[error("Submission not accepted: {0}")]
    Publish(#[from] PublishError),
}

/// Recording a task result failed.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The report referenced an unknown task.
    #[error("Report rejected: {0}")]
    Validation(#[from] ValidationError),

    /// The terminal mark could not be written; the report is not recorded.
    #[error("Terminal mark failed: {0}")]
    Journal(#[from] JournalError),

    /// Advancing the owning workflow failed while dispatching the next
    /// stage. The workflow has already transitioned to failed.
    #[error("Stage dispatch failed: {0}")]
    Publish(#[from] PublishError),
}

/// The orchestrator could not be built or recovered.
#[derive(Error, Debug)]
pub enum StartupError {
    /// The configuration failed validation.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The journal could not be opened or replayed.
    #[error("Journal unavailable: {0}")]
    Journal(#[from] JournalError),

    /// A recovered task could not be requeued.
    #[error("Recovery requeue failed: {0}")]
    Requeue(#[from] PublishError),
}

/// Invalid configuration, from the builder, a TOML file, or environment
/// variables.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Queue capacity must admit at least one task.
    #[error("Invalid queue capacity: {value} (must be at least 1)")]
    InvalidQueueCapacity { value: usize },

    /// The sample window must hold at least one sample.
    #[error("Invalid sample window: {value} (must be at least 1)")]
    InvalidSampleWindow { value: usize },

    /// An interval or duration knob was set to zero.
    #[error("Invalid value for {field}: must be a positive duration")]
    InvalidDuration { field: &'static str },

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// An environment variable held an unparseable value.
    #[error("Invalid value for {var}: {value}")]
    EnvParse { var: String, value: String },
}
