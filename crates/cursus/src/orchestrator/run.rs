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

//! Workflow run state machine.
//!
//! Tracks one accepted workflow from first dispatch to a terminal state.
//! Stages execute strictly in plan order: stage `n + 1` is not dispatched
//! until every task of stage `n` reached a terminal status. The first
//! non-success result fails the run and skips every task not yet
//! dispatched; tasks already in flight keep running and their late
//! results are still recorded against the run.
//!
//! The state machine is pure bookkeeping. Publishing the tasks it hands
//! out, journaling, and metrics are the orchestrator's job, which is what
//! keeps these transitions unit-testable without any I/O.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Task, TaskId, TaskStatus, WorkflowId};
use crate::workflow::WorkflowPlan;

/// Lifecycle state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Stages are still being dispatched and awaited.
    Running,
    /// Every task in the run succeeded.
    Completed,
    /// A task did not succeed; undispatched tasks were skipped.
    Failed,
    /// The caller cancelled the run; undispatched tasks were skipped.
    Cancelled,
}

impl WorkflowState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowState::Running => "running",
            WorkflowState::Completed => "completed",
            WorkflowState::Failed => "failed",
            WorkflowState::Cancelled => "cancelled",
        }
    }

    /// Whether the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowState::Running)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-task progress within a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTaskState {
    /// Waiting for its stage to be dispatched.
    Pending,
    /// Published to the bus; no result yet.
    Dispatched,
    /// Reported successful.
    Succeeded,
    /// Reported unsuccessful.
    Failed,
    /// Never dispatched; dropped when the run failed or was cancelled.
    Skipped,
}

impl RunTaskState {
    /// Returns the string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTaskState::Pending => "pending",
            RunTaskState::Dispatched => "dispatched",
            RunTaskState::Succeeded => "succeeded",
            RunTaskState::Failed => "failed",
            RunTaskState::Skipped => "skipped",
        }
    }

    /// Whether the task can no longer change state within the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunTaskState::Succeeded | RunTaskState::Failed | RunTaskState::Skipped
        )
    }
}

impl fmt::Display for RunTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the orchestrator must do after a result is recorded.
#[derive(Debug)]
pub enum StageAdvance {
    /// The current stage is still in flight; nothing to dispatch.
    Pending,
    /// The stage settled successfully; publish these tasks next.
    NextStage(Vec<Task>),
    /// The run reached a terminal state.
    Finished(WorkflowState),
}

/// Read-only snapshot of a run, as returned by status queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRunStatus {
    /// The run's workflow id.
    pub workflow_id: WorkflowId,
    /// Current lifecycle state.
    pub state: WorkflowState,
    /// Index of the executing stage; equals `total_stages` once every
    /// stage has settled.
    pub current_stage: usize,
    /// Number of stages in the plan.
    pub total_stages: usize,
    /// Progress of every task in the submission.
    pub task_states: BTreeMap<TaskId, RunTaskState>,
    /// Plan-time completion estimate.
    pub estimated_completion: Duration,
    /// When the run was accepted.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal state, if it has.
    pub finished_at: Option<DateTime<Utc>>,
}

/// One workflow submission moving through its plan.
#[derive(Debug)]
pub struct WorkflowRun {
    plan: WorkflowPlan,
    /// Materialized tasks not yet dispatched, keyed by id.
    tasks: HashMap<TaskId, Task>,
    task_states: BTreeMap<TaskId, RunTaskState>,
    current_stage: usize,
    state: WorkflowState,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Creates a run for a plan and its materialized tasks.
    ///
    /// The task list must cover exactly the ids the plan schedules; the
    /// orchestrator derives both from the same validated submission.
    pub fn new(plan: WorkflowPlan, tasks: Vec<Task>) -> Self {
        let task_states = tasks
            .iter()
            .map(|task| (task.id, RunTaskState::Pending))
            .collect();
        let tasks = tasks.into_iter().map(|task| (task.id, task)).collect();
        Self {
            plan,
            tasks,
            task_states,
            current_stage: 0,
            state: WorkflowState::Running,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// The run's workflow id.
    pub fn workflow_id(&self) -> WorkflowId {
        self.plan.workflow_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// The plan this run executes.
    pub fn plan(&self) -> &WorkflowPlan {
        &self.plan
    }

    /// Whether `task` belongs to this run.
    pub fn contains(&self, task: &TaskId) -> bool {
        self.task_states.contains_key(task)
    }

    /// Marks the first stage dispatched and returns its tasks.
    ///
    /// Idempotent: a second call finds nothing left to hand out.
    pub fn start(&mut self) -> Vec<Task> {
        self.take_stage(self.current_stage)
    }

    /// Records a terminal result for one of the run's tasks and decides
    /// what happens next.
    ///
    /// A non-success result fails the run immediately and skips every
    /// task still pending. Results arriving after the run already
    /// reached a terminal state are recorded against the task but no
    /// longer move the run.
    pub fn record_result(&mut self, task_id: TaskId, status: TaskStatus) -> StageAdvance {
        let Some(entry) = self.task_states.get_mut(&task_id) else {
            return StageAdvance::Pending;
        };
        *entry = match status {
            TaskStatus::Succeeded => RunTaskState::Succeeded,
            TaskStatus::Failed => RunTaskState::Failed,
            TaskStatus::Skipped => RunTaskState::Skipped,
        };

        if self.state.is_terminal() {
            return StageAdvance::Pending;
        }

        if !status.is_success() {
            self.skip_pending();
            self.finish(WorkflowState::Failed);
            return StageAdvance::Finished(WorkflowState::Failed);
        }

        if !self.stage_settled(self.current_stage) {
            return StageAdvance::Pending;
        }

        self.current_stage += 1;
        if self.current_stage >= self.plan.stages.len() {
            self.finish(WorkflowState::Completed);
            return StageAdvance::Finished(WorkflowState::Completed);
        }
        StageAdvance::NextStage(self.take_stage(self.current_stage))
    }

    /// Cancels the run, skipping every task not yet dispatched.
    ///
    /// Returns how many tasks were skipped, or `None` when the run had
    /// already reached a terminal state.
    pub fn cancel(&mut self) -> Option<usize> {
        if self.state.is_terminal() {
            return None;
        }
        let skipped = self.skip_pending();
        self.finish(WorkflowState::Cancelled);
        Some(skipped)
    }

    /// Fails the run without a task result.
    ///
    /// Used when a stage could not be dispatched. `unpublished` names the
    /// stage members that never reached the bus; they are skipped along
    /// with every still-pending task, exactly as for a reported failure.
    pub fn abort(&mut self, unpublished: &[TaskId]) -> Option<usize> {
        if self.state.is_terminal() {
            return None;
        }
        let mut skipped = 0;
        for id in unpublished {
            if let Some(state) = self.task_states.get_mut(id) {
                if !state.is_terminal() {
                    *state = RunTaskState::Skipped;
                    self.tasks.remove(id);
                    skipped += 1;
                }
            }
        }
        skipped += self.skip_pending();
        self.finish(WorkflowState::Failed);
        Some(skipped)
    }

    /// Number of tasks currently marked skipped.
    pub fn skipped_count(&self) -> usize {
        self.task_states
            .values()
            .filter(|state| **state == RunTaskState::Skipped)
            .count()
    }

    /// Read-only snapshot for status queries.
    pub fn status(&self) -> WorkflowRunStatus {
        WorkflowRunStatus {
            workflow_id: self.plan.workflow_id,
            state: self.state,
            current_stage: self.current_stage,
            total_stages: self.plan.stages.len(),
            task_states: self.task_states.clone(),
            estimated_completion: self.plan.estimated_completion,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    fn take_stage(&mut self, stage: usize) -> Vec<Task> {
        let mut out = Vec::new();
        if self.state.is_terminal() {
            return out;
        }
        if let Some(members) = self.plan.stages.get(stage) {
            for id in members {
                if let Some(task) = self.tasks.remove(id) {
                    self.task_states.insert(*id, RunTaskState::Dispatched);
                    out.push(task);
                }
            }
        }
        out
    }

    fn stage_settled(&self, stage: usize) -> bool {
        self.plan
            .stages
            .get(stage)
            .map(|members| {
                members.iter().all(|id| {
                    self.task_states
                        .get(id)
                        .map(RunTaskState::is_terminal)
                        .unwrap_or(false)
                })
            })
            .unwrap_or(true)
    }

    fn skip_pending(&mut self) -> usize {
        let mut skipped = 0;
        for (id, state) in self.task_states.iter_mut() {
            if *state == RunTaskState::Pending {
                *state = RunTaskState::Skipped;
                self.tasks.remove(id);
                skipped += 1;
            }
        }
        skipped
    }

    fn finish(&mut self, state: WorkflowState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}
