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

//! The orchestrator: the single entry point that wires the journal, the
//! message bus, the performance monitor and the workflow planner into one
//! coordinated dispatch core.
//!
//! # Responsibilities
//!
//! - **Submissions**: validate and accept standalone tasks and whole
//!   workflows. A workflow is planned up front; only its first stage is
//!   published, later stages are released as results arrive.
//! - **Results**: accept worker reports, persist the terminal mark before
//!   acknowledging, feed the monitor, and advance (or fail) the owning
//!   workflow run.
//! - **Recovery**: on startup, replay the journal and requeue every task
//!   that never reached a terminal state.
//! - **Background services**: a periodic bottleneck sweep and periodic
//!   journal compaction, both stopped by [`Orchestrator::shutdown`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use cursus::orchestrator::Orchestrator;
//! use cursus::models::{TaskPriority, TaskResult, TaskSpec};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::builder().build().await?;
//!
//! orchestrator
//!     .submit_task(TaskSpec::new("emails", TaskPriority::High))
//!     .await?;
//!
//! let subscription = orchestrator.subscribe("emails");
//! if let Some(task) = subscription.next().await {
//!     let wait = task.queue_wait();
//!     // ... execute the task, then report back ...
//!     orchestrator
//!         .report_result(TaskResult::success(task.id, wait, Duration::from_millis(42)))
//!         .await?;
//! }
//!
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod run;

pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use run::{RunTaskState, WorkflowRunStatus, WorkflowState};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bus::{MessageBus, Subscription};
use crate::error::{
    PublishError, ReportError, StartupError, SubmitError, ValidationError,
};
use crate::journal::{FileJournal, MemoryJournal, TaskJournal};
use crate::models::{
    BottleneckReport, Task, TaskId, TaskResult, TaskSpec, TaskStatus, TopicMetrics, WorkflowId,
};
use crate::monitor::PerformanceMonitor;
use crate::workflow::{WorkflowPlan, WorkflowPlanner};

use run::{StageAdvance, WorkflowRun};

/// Bookkeeping for a task that has been published but not yet reported.
#[derive(Debug, Clone)]
struct PendingTask {
    topic: String,
    workflow_id: Option<WorkflowId>,
}

/// Handles for the background loops, taken during shutdown.
#[derive(Debug, Default)]
struct RuntimeHandles {
    health_handle: Option<JoinHandle<()>>,
    compaction_handle: Option<JoinHandle<()>>,
    shutdown_sender: Option<broadcast::Sender<()>>,
}

/// Builder for [`Orchestrator`].
///
/// Without an explicit journal the orchestrator runs on a
/// [`MemoryJournal`], which does not survive a restart. Point it at a
/// file with [`journal_path`](Self::journal_path) for durability.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    journal: Option<Arc<dyn TaskJournal>>,
    journal_path: Option<PathBuf>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            journal: None,
            journal_path: None,
        }
    }

    /// Replaces the default configuration.
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the given journal instead of the in-memory default.
    ///
    /// Takes precedence over [`journal_path`](Self::journal_path).
    pub fn journal(mut self, journal: Arc<dyn TaskJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Backs the orchestrator with a [`FileJournal`] at `path`.
    pub fn journal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    /// Validates the configuration, opens the journal, replays it when
    /// recovery is enabled, and starts the background services.
    pub async fn build(self) -> Result<Orchestrator, StartupError> {
        self.config.validate()?;

        let journal: Arc<dyn TaskJournal> = match (self.journal, self.journal_path) {
            (Some(journal), _) => journal,
            (None, Some(path)) => Arc::new(FileJournal::new(path).await?),
            (None, None) => Arc::new(MemoryJournal::new()),
        };

        let bus = Arc::new(MessageBus::new(
            Arc::clone(&journal),
            self.config.queue_capacity(),
        ));
        let monitor = Arc::new(PerformanceMonitor::new(
            self.config.sample_window(),
            self.config.max_queue_depth(),
            self.config.max_queue_wait(),
        ));
        let planner = WorkflowPlanner::new(self.config.default_task_estimate());

        let orchestrator = Orchestrator {
            config: self.config,
            journal,
            bus,
            monitor,
            planner,
            runs: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            terminal: Mutex::new(HashMap::new()),
            runtime_handles: RwLock::new(RuntimeHandles::default()),
        };

        if orchestrator.config.recover_on_start() {
            orchestrator.recover().await?;
        }
        orchestrator.start_background_services().await;

        Ok(orchestrator)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The coordinated dispatch core.
///
/// All methods take `&self`; the orchestrator is designed to sit behind an
/// `Arc` and be shared between submitters, workers and operators.
pub struct Orchestrator {
    config: OrchestratorConfig,
    journal: Arc<dyn TaskJournal>,
    bus: Arc<MessageBus>,
    monitor: Arc<PerformanceMonitor>,
    planner: WorkflowPlanner,
    /// Every tracked workflow run, terminal ones included so status
    /// queries keep answering after completion.
    runs: Mutex<HashMap<WorkflowId, WorkflowRun>>,
    /// Tasks published to the bus whose result has not been reported.
    pending: Mutex<HashMap<TaskId, PendingTask>>,
    /// Terminal status of every reported task, for dependency checks.
    terminal: Mutex<HashMap<TaskId, TaskStatus>>,
    runtime_handles: RwLock<RuntimeHandles>,
}

impl Orchestrator {
    /// Starts building an orchestrator with default configuration.
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validates and publishes a standalone task.
    ///
    /// Dependencies of a standalone task must already have succeeded.
    /// The call blocks while the target topic is at capacity and returns
    /// once the task is journaled and queued.
    pub async fn submit_task(&self, spec: TaskSpec) -> Result<TaskId, SubmitError> {
        if spec.topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic { task_id: spec.id }.into());
        }
        self.check_known(spec.id)?;
        self.check_dependencies(&spec)?;

        let task = Task::from_spec(spec, None);
        let task_id = task.id;
        let topic = task.topic.clone();

        // Registered before publish so a racing report cannot miss it.
        self.pending.lock().insert(
            task_id,
            PendingTask {
                topic: topic.clone(),
                workflow_id: None,
            },
        );
        if let Err(error) = self.bus.publish(task).await {
            self.pending.lock().remove(&task_id);
            return Err(error.into());
        }

        info!(%task_id, topic = %topic, "task accepted");
        Ok(task_id)
    }

    /// Plans a workflow and publishes its first stage.
    ///
    /// Planning is atomic: any validation or cycle error rejects the whole
    /// submission before anything is journaled. On success the returned
    /// plan lists the stages in dispatch order.
    pub async fn submit_workflow(&self, specs: Vec<TaskSpec>) -> Result<WorkflowPlan, SubmitError> {
        let workflow_id = WorkflowId::new();
        let plan = self.planner.plan(workflow_id, &specs)?;
        for spec in &specs {
            self.check_known(spec.id)?;
        }

        let tasks = specs
            .into_iter()
            .map(|spec| Task::from_spec(spec, Some(workflow_id)))
            .collect();
        let mut workflow_run = WorkflowRun::new(plan.clone(), tasks);
        let first_stage = workflow_run.start();
        self.runs.lock().insert(workflow_id, workflow_run);

        info!(
            %workflow_id,
            tasks = plan.task_count(),
            stages = plan.stage_count(),
            "workflow accepted"
        );

        if let Err((error, unpublished)) = self.dispatch_stage(first_stage).await {
            error!(%workflow_id, %error, "first stage dispatch failed, aborting workflow");
            if let Some(run) = self.runs.lock().get_mut(&workflow_id) {
                run.abort(&unpublished);
            }
            return Err(error.into());
        }
        Ok(plan)
    }

    /// Records a worker's result for a previously published task.
    ///
    /// The terminal mark is journaled before anything else changes; if the
    /// journal write fails the task stays pending and the report can be
    /// retried. For workflow members a successful stage releases the next
    /// one, a failure fails the run and skips everything not yet
    /// dispatched.
    pub async fn report_result(&self, result: TaskResult) -> Result<(), ReportError> {
        let Some(entry) = self.pending.lock().remove(&result.task_id) else {
            return Err(ValidationError::UnknownTask {
                task_id: result.task_id,
            }
            .into());
        };

        if let Err(error) = self
            .journal
            .mark_terminal(result.task_id, result.status, result.failure.clone())
            .await
        {
            // Keep the task pending so the report can be retried.
            self.pending.lock().insert(result.task_id, entry);
            return Err(error.into());
        }

        self.terminal.lock().insert(result.task_id, result.status);
        self.monitor.record_dispatch(&entry.topic, result.queue_wait);
        self.monitor.record_completion(&entry.topic, result.exec_time);
        debug!(
            task_id = %result.task_id,
            status = %result.status,
            topic = %entry.topic,
            "result recorded"
        );

        if let Some(workflow_id) = entry.workflow_id {
            self.advance_workflow(workflow_id, result.task_id, result.status)
                .await?;
        }
        Ok(())
    }

    /// Registers a competing consumer on `topic`.
    pub fn subscribe(&self, topic: &str) -> Subscription {
        self.bus.subscribe(topic)
    }

    /// Detaches a consumer; equivalent to dropping the subscription.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        self.bus.unsubscribe(subscription);
    }

    /// Per-topic metrics over the recent sample window, keyed by topic.
    ///
    /// Covers every topic the bus or the monitor has seen.
    pub fn health(&self) -> HashMap<String, TopicMetrics> {
        let mut depths: HashMap<String, usize> = self.bus.depths().into_iter().collect();
        for topic in self.monitor.topics() {
            depths.entry(topic).or_insert(0);
        }
        depths
            .into_iter()
            .map(|(topic, depth)| {
                let metrics = self.monitor.snapshot(&topic, depth);
                (topic, metrics)
            })
            .collect()
    }

    /// Runs the bottleneck rules against the current queue depths.
    pub fn bottlenecks(&self) -> Vec<BottleneckReport> {
        self.monitor.detect_bottlenecks(&self.bus.depths())
    }

    /// Number of tasks currently queued on `topic`.
    pub fn queue_depth(&self, topic: &str) -> usize {
        self.bus.depth(topic)
    }

    /// Every topic the bus has seen, sorted by name.
    pub fn topics(&self) -> Vec<String> {
        self.bus.topics()
    }

    /// Progress snapshot of a tracked workflow.
    pub fn workflow_status(&self, workflow_id: WorkflowId) -> Result<WorkflowRunStatus, ValidationError> {
        self.runs
            .lock()
            .get(&workflow_id)
            .map(WorkflowRun::status)
            .ok_or(ValidationError::UnknownWorkflow { workflow_id })
    }

    /// Cancels a running workflow.
    ///
    /// Tasks not yet dispatched are skipped and never published; tasks
    /// already handed to workers keep running and their late results are
    /// recorded without reviving the run. Returns how many tasks were
    /// skipped; cancelling an already finished run returns zero.
    pub fn cancel_workflow(&self, workflow_id: WorkflowId) -> Result<usize, ValidationError> {
        let skipped = {
            let mut runs = self.runs.lock();
            let run = runs
                .get_mut(&workflow_id)
                .ok_or(ValidationError::UnknownWorkflow { workflow_id })?;
            run.cancel()
        };
        match skipped {
            Some(skipped) => {
                info!(%workflow_id, skipped, "workflow cancelled");
                Ok(skipped)
            }
            None => Ok(0),
        }
    }

    /// Stops the background loops and closes the bus.
    ///
    /// Blocked publishers and waiting consumers are released immediately;
    /// journaled tasks stay on disk for the next start. Safe to call more
    /// than once.
    pub async fn shutdown(&self) {
        let mut handles = self.runtime_handles.write().await;
        let Some(sender) = handles.shutdown_sender.take() else {
            return;
        };
        info!("orchestrator shutting down");
        let _ = sender.send(());
        self.bus.shutdown();

        let loops: Vec<_> = [handles.health_handle.take(), handles.compaction_handle.take()]
            .into_iter()
            .flatten()
            .collect();
        let _ = futures::future::join_all(loops).await;
        info!("orchestrator shut down");
    }

    /// Rejects ids the core is already tracking in any capacity.
    fn check_known(&self, task_id: TaskId) -> Result<(), ValidationError> {
        if self.pending.lock().contains_key(&task_id) {
            return Err(ValidationError::DuplicateTask { task_id });
        }
        if self.terminal.lock().contains_key(&task_id) {
            return Err(ValidationError::DuplicateTask { task_id });
        }
        if self.runs.lock().values().any(|run| run.contains(&task_id)) {
            return Err(ValidationError::DuplicateTask { task_id });
        }
        Ok(())
    }

    /// Standalone dependency rule: every named task must have succeeded.
    fn check_dependencies(&self, spec: &TaskSpec) -> Result<(), ValidationError> {
        for dependency in &spec.depends_on {
            let status = self.terminal.lock().get(dependency).copied();
            match status {
                Some(TaskStatus::Succeeded) => continue,
                Some(_) => {
                    return Err(ValidationError::DependencyNotSatisfied {
                        task_id: spec.id,
                        dependency: *dependency,
                    });
                }
                None => {}
            }
            let known = self.pending.lock().contains_key(dependency)
                || self.runs.lock().values().any(|run| run.contains(dependency));
            return Err(if known {
                ValidationError::DependencyNotSatisfied {
                    task_id: spec.id,
                    dependency: *dependency,
                }
            } else {
                ValidationError::UnknownDependency {
                    task_id: spec.id,
                    dependency: *dependency,
                }
            });
        }
        Ok(())
    }

    /// Publishes one stage of a workflow, registering each task first.
    ///
    /// On failure the error comes back with every id that never reached
    /// the bus (the failed task included) so the caller can skip them.
    async fn dispatch_stage(
        &self,
        tasks: Vec<Task>,
    ) -> Result<(), (PublishError, Vec<TaskId>)> {
        let ids: Vec<TaskId> = tasks.iter().map(|task| task.id).collect();
        for (position, task) in tasks.into_iter().enumerate() {
            let task_id = task.id;
            self.pending.lock().insert(
                task_id,
                PendingTask {
                    topic: task.topic.clone(),
                    workflow_id: task.workflow_id,
                },
            );
            if let Err(error) = self.bus.publish(task).await {
                self.pending.lock().remove(&task_id);
                return Err((error, ids[position..].to_vec()));
            }
        }
        Ok(())
    }

    /// Applies one result to the owning run and dispatches whatever the
    /// state machine releases.
    async fn advance_workflow(
        &self,
        workflow_id: WorkflowId,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<(), ReportError> {
        // The run lock is not held across publishes.
        let advance = self
            .runs
            .lock()
            .get_mut(&workflow_id)
            .map(|run| run.record_result(task_id, status));
        match advance {
            Some(StageAdvance::NextStage(tasks)) => {
                debug!(%workflow_id, released = tasks.len(), "stage complete, dispatching next");
                if let Err((error, unpublished)) = self.dispatch_stage(tasks).await {
                    error!(%workflow_id, %error, "stage dispatch failed, aborting workflow");
                    if let Some(run) = self.runs.lock().get_mut(&workflow_id) {
                        run.abort(&unpublished);
                    }
                    return Err(error.into());
                }
            }
            Some(StageAdvance::Finished(state)) => {
                let skipped = self
                    .runs
                    .lock()
                    .get(&workflow_id)
                    .map(WorkflowRun::skipped_count)
                    .unwrap_or(0);
                info!(%workflow_id, state = %state, skipped, "workflow finished");
            }
            // Recovered tasks can outlive their run; nothing to advance.
            Some(StageAdvance::Pending) | None => {}
        }
        Ok(())
    }

    /// Replays the journal: terminal marks seed the dependency index,
    /// unfinished tasks go back on their queues.
    ///
    /// Requeues are admitted above the configured capacity so recovery
    /// never deadlocks on a backlog; the excess drains as consumers pop.
    async fn recover(&self) -> Result<usize, StartupError> {
        let replay = self.journal.replay().await?;
        self.terminal.lock().extend(replay.terminal);

        let mut requeued = 0usize;
        for task in replay.pending {
            self.pending.lock().insert(
                task.id,
                PendingTask {
                    topic: task.topic.clone(),
                    workflow_id: task.workflow_id,
                },
            );
            self.bus.requeue(task).await?;
            requeued += 1;
        }
        if requeued > 0 {
            info!(requeued, "recovered unfinished tasks from the journal");
        }
        Ok(requeued)
    }

    /// Spawns the bottleneck sweep and journal compaction loops.
    async fn start_background_services(&self) {
        let mut handles = self.runtime_handles.write().await;
        let (shutdown_sender, mut health_shutdown) = broadcast::channel(1);
        let mut compaction_shutdown = shutdown_sender.subscribe();

        let monitor = Arc::clone(&self.monitor);
        let bus = Arc::clone(&self.bus);
        let health_interval = self.config.health_check_interval();
        let health_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(health_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reports = monitor.detect_bottlenecks(&bus.depths());
                        if !reports.is_empty() {
                            debug!(reports = reports.len(), "bottleneck sweep raised reports");
                        }
                    }
                    _ = health_shutdown.recv() => {
                        debug!("health loop stopping");
                        break;
                    }
                }
            }
        });

        let journal = Arc::clone(&self.journal);
        let compaction_interval = self.config.compaction_interval();
        let retention = self.config.journal_retention();
        let compaction_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(compaction_interval);
            // The first tick fires immediately; compacting a journal that
            // was just replayed is pointless.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match journal.compact(retention).await {
                            Ok(removed) if removed > 0 => {
                                info!(removed, "journal compacted");
                            }
                            Ok(_) => {}
                            Err(error) => {
                                error!(%error, "journal compaction failed");
                            }
                        }
                    }
                    _ = compaction_shutdown.recv() => {
                        debug!("compaction loop stopping");
                        break;
                    }
                }
            }
        });

        handles.health_handle = Some(health_handle);
        handles.compaction_handle = Some(compaction_handle);
        handles.shutdown_sender = Some(shutdown_sender);
        debug!("background services started");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Ok(handles) = self.runtime_handles.try_read() {
            if handles.shutdown_sender.is_some() {
                warn!("orchestrator dropped without shutdown, background loops left detached");
            }
        }
    }
}
