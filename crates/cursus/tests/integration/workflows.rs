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

//! Workflow lifecycle through the facade: staged release, fail-fast,
//! cancellation, plan estimates, and atomic rejection.

use std::time::Duration;

use cursus::{
    PlanError, RunTaskState, SubmitError, TaskFailure, TaskPriority, TaskResult, TaskSpec,
    ValidationError, WorkflowId, WorkflowState,
};

use crate::fixtures::{quick_success, quiet_orchestrator};

fn app_failure(task_id: cursus::TaskId) -> TaskResult {
    TaskResult::failure(
        task_id,
        Duration::from_millis(2),
        Duration::from_millis(5),
        TaskFailure::new(cursus::FailureKind::Application, "step rejected its input"),
    )
}

#[tokio::test]
async fn a_diamond_runs_stage_by_stage() {
    let orchestrator = quiet_orchestrator().await;

    let extract = TaskSpec::new("etl", TaskPriority::High);
    let clean = TaskSpec::new("etl", TaskPriority::Medium).depends_on(extract.id);
    let enrich = TaskSpec::new("etl", TaskPriority::High).depends_on(extract.id);
    let load = TaskSpec::new("etl", TaskPriority::Medium)
        .depends_on(clean.id)
        .depends_on(enrich.id);
    let (extract_id, clean_id, enrich_id, load_id) = (extract.id, clean.id, enrich.id, load.id);

    let plan = orchestrator
        .submit_workflow(vec![extract, clean, enrich, load])
        .await
        .unwrap();
    assert_eq!(plan.stages[0], vec![extract_id]);
    // Within a stage, higher priority dispatches first.
    assert_eq!(plan.stages[1], vec![enrich_id, clean_id]);
    assert_eq!(plan.stages[2], vec![load_id]);
    assert_eq!(orchestrator.queue_depth("etl"), 1);

    let subscription = orchestrator.subscribe("etl");
    let task = subscription.next().await.unwrap();
    assert_eq!(task.id, extract_id);
    orchestrator
        .report_result(quick_success(extract_id))
        .await
        .unwrap();

    // The whole middle stage is released at once.
    assert_eq!(orchestrator.queue_depth("etl"), 2);
    let first = subscription.next().await.unwrap();
    let second = subscription.next().await.unwrap();
    assert_eq!(first.id, enrich_id);
    assert_eq!(second.id, clean_id);
    orchestrator.report_result(quick_success(first.id)).await.unwrap();
    // One result is not enough to open the next stage.
    assert_eq!(orchestrator.queue_depth("etl"), 0);
    orchestrator.report_result(quick_success(second.id)).await.unwrap();

    let task = subscription.next().await.unwrap();
    assert_eq!(task.id, load_id);
    orchestrator.report_result(quick_success(load_id)).await.unwrap();

    let status = orchestrator.workflow_status(plan.workflow_id).unwrap();
    assert_eq!(status.state, WorkflowState::Completed);
    assert!(status
        .task_states
        .values()
        .all(|state| *state == RunTaskState::Succeeded));
    assert!(status.finished_at.is_some());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn a_failure_fails_fast_and_keeps_in_flight_results() {
    let orchestrator = quiet_orchestrator().await;

    let ingest = TaskSpec::new("etl", TaskPriority::High);
    let left = TaskSpec::new("etl", TaskPriority::Medium).depends_on(ingest.id);
    let right = TaskSpec::new("etl", TaskPriority::Medium).depends_on(ingest.id);
    let publish = TaskSpec::new("etl", TaskPriority::Medium)
        .depends_on(left.id)
        .depends_on(right.id);
    let (ingest_id, left_id, right_id, publish_id) = (ingest.id, left.id, right.id, publish.id);

    let plan = orchestrator
        .submit_workflow(vec![ingest, left, right, publish])
        .await
        .unwrap();

    let subscription = orchestrator.subscribe("etl");
    let task = subscription.next().await.unwrap();
    orchestrator.report_result(quick_success(task.id)).await.unwrap();

    // Both middle tasks are in flight when one of them fails.
    let first = subscription.next().await.unwrap();
    let second = subscription.next().await.unwrap();
    orchestrator
        .report_result(app_failure(left_id))
        .await
        .unwrap();

    let status = orchestrator.workflow_status(plan.workflow_id).unwrap();
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(status.task_states[&publish_id], RunTaskState::Skipped);
    // The final stage never reached the queue.
    assert_eq!(orchestrator.queue_depth("etl"), 0);

    // The sibling still in flight reports normally without reviving the run.
    let sibling = if first.id == left_id { second.id } else { first.id };
    assert_eq!(sibling, right_id);
    orchestrator.report_result(quick_success(sibling)).await.unwrap();
    let status = orchestrator.workflow_status(plan.workflow_id).unwrap();
    assert_eq!(status.state, WorkflowState::Failed);
    assert_eq!(status.task_states[&ingest_id], RunTaskState::Succeeded);
    assert_eq!(status.task_states[&left_id], RunTaskState::Failed);
    assert_eq!(status.task_states[&right_id], RunTaskState::Succeeded);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn plan_estimates_sum_the_slowest_member_of_each_stage() {
    let orchestrator = quiet_orchestrator().await;

    let fetch_a = TaskSpec::new("sync", TaskPriority::Medium)
        .with_estimate(Duration::from_secs(10));
    let fetch_b = TaskSpec::new("sync", TaskPriority::Medium)
        .with_estimate(Duration::from_secs(20));
    let fetch_c = TaskSpec::new("sync", TaskPriority::Medium)
        .with_estimate(Duration::from_secs(5));
    let merge = TaskSpec::new("sync", TaskPriority::High)
        .depends_on(fetch_a.id)
        .depends_on(fetch_b.id)
        .depends_on(fetch_c.id)
        .with_estimate(Duration::from_secs(30));

    let plan = orchestrator
        .submit_workflow(vec![fetch_a, fetch_b, fetch_c, merge])
        .await
        .unwrap();
    assert_eq!(plan.stage_count(), 2);
    assert_eq!(plan.stages[0].len(), 3);
    // 20s for the parallel fetches, 30s for the merge.
    assert_eq!(plan.estimated_completion, Duration::from_secs(50));

    let status = orchestrator.workflow_status(plan.workflow_id).unwrap();
    assert_eq!(status.estimated_completion, Duration::from_secs(50));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn cancellation_skips_the_undispatched_tail() {
    let orchestrator = quiet_orchestrator().await;

    let ingest = TaskSpec::new("etl", TaskPriority::Medium);
    let publish = TaskSpec::new("etl", TaskPriority::Medium).depends_on(ingest.id);
    let (ingest_id, publish_id) = (ingest.id, publish.id);

    let plan = orchestrator
        .submit_workflow(vec![ingest, publish])
        .await
        .unwrap();
    let subscription = orchestrator.subscribe("etl");
    let in_flight = subscription.next().await.unwrap();
    assert_eq!(in_flight.id, ingest_id);

    assert_eq!(orchestrator.cancel_workflow(plan.workflow_id).unwrap(), 1);
    assert_eq!(orchestrator.cancel_workflow(plan.workflow_id).unwrap(), 0);

    // The in-flight task can still report; the run stays cancelled.
    orchestrator
        .report_result(quick_success(ingest_id))
        .await
        .unwrap();
    let status = orchestrator.workflow_status(plan.workflow_id).unwrap();
    assert_eq!(status.state, WorkflowState::Cancelled);
    assert_eq!(status.task_states[&ingest_id], RunTaskState::Succeeded);
    assert_eq!(status.task_states[&publish_id], RunTaskState::Skipped);
    assert_eq!(orchestrator.queue_depth("etl"), 0);

    assert!(matches!(
        orchestrator.workflow_status(WorkflowId::new()),
        Err(ValidationError::UnknownWorkflow { .. })
    ));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn a_cycle_rejects_the_whole_submission() {
    let orchestrator = quiet_orchestrator().await;

    let seed = TaskSpec::new("etl", TaskPriority::Medium);
    let follower = TaskSpec::new("etl", TaskPriority::Medium).depends_on(seed.id);
    let seed = seed.depends_on(follower.id);

    match orchestrator.submit_workflow(vec![seed, follower]).await {
        Err(SubmitError::Plan(PlanError::Cycle { cycle })) => {
            assert!(cycle.contains("->"));
        }
        other => panic!("expected a cycle rejection, got {other:?}"),
    }
    // Nothing was journaled or queued.
    assert!(orchestrator.topics().is_empty());
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn known_ids_cannot_be_resubmitted_in_a_workflow() {
    let orchestrator = quiet_orchestrator().await;

    let spec = TaskSpec::new("etl", TaskPriority::Medium);
    orchestrator.submit_task(spec.clone()).await.unwrap();

    match orchestrator.submit_workflow(vec![spec]).await {
        Err(SubmitError::Validation(ValidationError::DuplicateTask { .. })) => {}
        other => panic!("expected a duplicate rejection, got {other:?}"),
    }
    orchestrator.shutdown().await;
}
