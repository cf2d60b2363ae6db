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

//! Workflow planning.
//!
//! Turns a validated set of task specs into an ordered list of parallel
//! stages. Every task lands in the earliest stage that still respects its
//! dependencies; tasks sharing a stage are mutually independent. The plan
//! also carries a completion estimate: stages run sequentially and a
//! stage takes as long as its slowest task, so the estimate is the sum of
//! per-stage maxima.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::graph::DependencyGraph;
use crate::error::{PlanError, ValidationError};
use crate::models::{TaskId, TaskSpec, WorkflowId};

/// Execution plan for one workflow submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPlan {
    /// Workflow this plan belongs to.
    pub workflow_id: WorkflowId,
    /// Stages in execution order. Stage `n + 1` starts only after every
    /// task in stage `n` reached a terminal status.
    pub stages: Vec<Vec<TaskId>>,
    /// Sum over stages of the largest per-task estimate in the stage.
    pub estimated_completion: Duration,
}

impl WorkflowPlan {
    /// Number of stages in the plan.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total number of tasks across all stages.
    pub fn task_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Index of the stage containing `task`, if the plan includes it.
    pub fn stage_of(&self, task: &TaskId) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.contains(task))
    }
}

/// Plans workflow submissions into parallel stages.
#[derive(Debug, Clone)]
pub struct WorkflowPlanner {
    /// Estimate applied to tasks that carry none of their own.
    default_task_estimate: Duration,
}

impl WorkflowPlanner {
    /// Creates a planner with the given fallback task estimate.
    pub fn new(default_task_estimate: Duration) -> Self {
        Self {
            default_task_estimate,
        }
    }

    /// Validates the task set and lays it out into stages.
    ///
    /// Rejects empty sets, duplicate task ids, empty topics, dependencies
    /// on tasks outside the set, and cyclic dependency relations. The
    /// returned stages order tasks by priority then submission order, so
    /// a stage's listing starts with its most urgent work.
    pub fn plan(
        &self,
        workflow_id: WorkflowId,
        specs: &[TaskSpec],
    ) -> Result<WorkflowPlan, PlanError> {
        validate_specs(specs)?;

        let mut graph = DependencyGraph::new();
        for spec in specs {
            graph.add_node(spec.id);
            for dep in &spec.depends_on {
                graph.add_edge(spec.id, *dep);
            }
        }
        let levels = graph.execution_levels()?;

        // Position in the submission breaks priority ties, so equal-rank
        // tasks keep the order the caller wrote them in.
        let order: HashMap<TaskId, (u8, usize)> = specs
            .iter()
            .enumerate()
            .map(|(position, spec)| (spec.id, (spec.priority.rank(), position)))
            .collect();
        let estimates: HashMap<TaskId, Duration> = specs
            .iter()
            .map(|spec| {
                (
                    spec.id,
                    spec.estimated_duration.unwrap_or(self.default_task_estimate),
                )
            })
            .collect();

        let mut stages = Vec::with_capacity(levels.len());
        let mut estimated_completion = Duration::ZERO;
        for mut stage in levels {
            stage.sort_by_key(|id| order.get(id).copied().unwrap_or((u8::MAX, usize::MAX)));
            estimated_completion += stage
                .iter()
                .map(|id| estimates.get(id).copied().unwrap_or(self.default_task_estimate))
                .max()
                .unwrap_or(Duration::ZERO);
            stages.push(stage);
        }

        debug!(
            workflow_id = %workflow_id,
            tasks = specs.len(),
            stages = stages.len(),
            estimated_ms = estimated_completion.as_millis() as u64,
            "workflow planned"
        );

        Ok(WorkflowPlan {
            workflow_id,
            stages,
            estimated_completion,
        })
    }
}

fn validate_specs(specs: &[TaskSpec]) -> Result<(), ValidationError> {
    if specs.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    let mut ids = HashSet::with_capacity(specs.len());
    for spec in specs {
        if spec.topic.trim().is_empty() {
            return Err(ValidationError::EmptyTopic { task_id: spec.id });
        }
        if !ids.insert(spec.id) {
            return Err(ValidationError::DuplicateTask { task_id: spec.id });
        }
    }
    for spec in specs {
        for dep in &spec.depends_on {
            if !ids.contains(dep) {
                return Err(ValidationError::UnknownDependency {
                    task_id: spec.id,
                    dependency: *dep,
                });
            }
        }
    }
    Ok(())
}
