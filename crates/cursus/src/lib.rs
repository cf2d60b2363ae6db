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

//! # Cursus
//!
//! Cursus is an embedded task dispatch core: a priority message bus, a
//! crash-safe journal, workflow staging and throughput monitoring behind
//! one [`Orchestrator`] facade. It coordinates work between submitters and
//! worker processes without requiring an external broker or database.
//!
//! ## Key Features
//!
//! - **Priority topic queues**: four priority levels with stable FIFO
//!   ordering inside each level, one queue per topic
//! - **Competing consumers**: any number of subscribers per topic, each
//!   queued task delivered to exactly one of them
//! - **Backpressure**: bounded queues that block publishers instead of
//!   dropping or buffering without limit
//! - **Durability**: every accepted task is journaled before it becomes
//!   visible, and unfinished work is requeued on restart
//! - **Workflow staging**: dependency DAGs are planned into parallel
//!   stages, released one stage at a time, failing fast on errors
//! - **Bottleneck detection**: rolling queue-wait percentiles and depth
//!   thresholds surfaced per topic
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cursus::{Orchestrator, TaskPriority, TaskResult, TaskSpec};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::builder()
//!     .journal_path("/var/lib/cursus/journal.log")
//!     .build()
//!     .await?;
//!
//! // A two-task pipeline: "report" runs after "ingest" succeeds.
//! let ingest = TaskSpec::new("etl", TaskPriority::High);
//! let report = TaskSpec::new("etl", TaskPriority::Medium).depends_on(ingest.id);
//! let plan = orchestrator.submit_workflow(vec![ingest, report]).await?;
//! println!("{} stages planned", plan.stage_count());
//!
//! // A worker loop: take a task, execute it, report the outcome.
//! let subscription = orchestrator.subscribe("etl");
//! while let Some(task) = subscription.next().await {
//!     let wait = task.queue_wait();
//!     let started = std::time::Instant::now();
//!     // ... execute the task ...
//!     orchestrator
//!         .report_result(TaskResult::success(task.id, wait, started.elapsed()))
//!         .await?;
//! }
//!
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized around a small set of cooperating modules:
//!
//! - [`models`]: tasks, results, priorities and metric types
//! - [`journal`]: the append-only durable log and its replay
//! - [`bus`]: per-topic priority queues with bounded capacity
//! - [`monitor`]: rolling per-topic performance windows
//! - [`workflow`]: dependency graphs and stage planning
//! - [`orchestrator`]: the facade that wires everything together
//!
//! Tasks flow through one pipeline: a submission is validated, journaled,
//! then queued; a worker pops it, executes, and reports a result; the
//! result is journaled, folded into the metrics window, and used to
//! advance the owning workflow. Everything in between is observable
//! through [`Orchestrator::health`] and [`Orchestrator::bottlenecks`].

pub mod bus;
pub mod error;
pub mod journal;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod workflow;

pub use bus::{MessageBus, Subscription};
pub use error::{
    ConfigError, JournalError, PlanError, PublishError, ReportError, StartupError, SubmitError,
    ValidationError,
};
pub use journal::{FileJournal, MemoryJournal, TaskJournal};
pub use models::{
    BottleneckReason, BottleneckReport, FailureKind, Task, TaskFailure, TaskId, TaskPriority,
    TaskResult, TaskSpec, TaskStatus, TopicMetrics, WorkflowId,
};
pub use monitor::PerformanceMonitor;
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorConfig, OrchestratorConfigBuilder,
    RunTaskState, WorkflowRunStatus, WorkflowState,
};
pub use workflow::{DependencyGraph, WorkflowPlan, WorkflowPlanner};

use tracing_subscriber::EnvFilter;

/// Initializes a global tracing subscriber for embedders that do not
/// install their own.
///
/// `filter` overrides the `RUST_LOG` environment variable; with neither
/// set, the level defaults to `info`. Later calls are ignored, so tests
/// and embedding applications can both call this unconditionally.
pub fn init_logging(filter: Option<&str>) {
    let env_filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init();
}
