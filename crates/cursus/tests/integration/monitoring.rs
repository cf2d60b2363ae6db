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

//! Health and bottleneck reporting through the facade. Worker-reported
//! timings drive the rolling windows, so tests control every duration.

use std::time::Duration;

use cursus::{
    BottleneckReason, Orchestrator, OrchestratorConfig, OrchestratorConfigBuilder, TaskPriority,
    TaskResult, TaskSpec,
};

use crate::fixtures::init_test_logging;

/// Thresholds vary per test; the background intervals stay quiet.
fn quiet_builder() -> OrchestratorConfigBuilder {
    OrchestratorConfig::builder()
        .health_check_interval(Duration::from_secs(3600))
        .compaction_interval(Duration::from_secs(3600))
}

async fn orchestrator_with(config: OrchestratorConfig) -> Orchestrator {
    init_test_logging();
    match Orchestrator::builder().config(config).build().await {
        Ok(orchestrator) => orchestrator,
        Err(error) => panic!("orchestrator failed to build: {error}"),
    }
}

/// Submits, consumes, and reports one task with the given timings.
async fn complete_one(orchestrator: &Orchestrator, topic: &str, wait: Duration, exec: Duration) {
    let id = orchestrator
        .submit_task(TaskSpec::new(topic, TaskPriority::Medium))
        .await
        .unwrap();
    let subscription = orchestrator.subscribe(topic);
    subscription.next().await.unwrap();
    orchestrator
        .report_result(TaskResult::success(id, wait, exec))
        .await
        .unwrap();
}

#[tokio::test]
async fn health_reflects_reported_timings() {
    let orchestrator = orchestrator_with(quiet_builder().build()).await;

    for wait_ms in [10, 20, 30, 40] {
        complete_one(
            &orchestrator,
            "etl",
            Duration::from_millis(wait_ms),
            Duration::from_millis(5),
        )
        .await;
    }

    let health = orchestrator.health();
    let etl = health.get("etl").unwrap();
    assert_eq!(etl.samples, 4);
    assert_eq!(etl.queue_depth, 0);
    assert_eq!(etl.mean_queue_wait, Duration::from_millis(25));
    assert_eq!(etl.p95_queue_wait, Duration::from_millis(40));
    assert_eq!(etl.p99_queue_wait, Duration::from_millis(40));
    assert_eq!(etl.mean_exec_time, Duration::from_millis(5));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn the_window_bounds_the_statistics_but_not_the_count() {
    let config = quiet_builder().sample_window(3).build();
    let orchestrator = orchestrator_with(config).await;

    for wait_ms in [10, 20, 30, 40, 50] {
        complete_one(
            &orchestrator,
            "etl",
            Duration::from_millis(wait_ms),
            Duration::from_millis(5),
        )
        .await;
    }

    let health = orchestrator.health();
    let etl = health.get("etl").unwrap();
    // Lifetime count, window-scoped mean over the last three waits.
    assert_eq!(etl.samples, 5);
    assert_eq!(etl.mean_queue_wait, Duration::from_millis(40));
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn a_deep_queue_raises_a_bottleneck() {
    let config = quiet_builder().max_queue_depth(3).build();
    let orchestrator = orchestrator_with(config).await;

    for _ in 0..5 {
        orchestrator
            .submit_task(TaskSpec::new("ingest", TaskPriority::Medium))
            .await
            .unwrap();
    }

    let reports = orchestrator.bottlenecks();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].topic, "ingest");
    assert_eq!(
        reports[0].reason,
        BottleneckReason::QueueDepthExceeded {
            depth: 5,
            threshold: 3
        }
    );
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn slow_waits_raise_a_bottleneck() {
    let config = quiet_builder().max_queue_wait(Duration::from_millis(50)).build();
    let orchestrator = orchestrator_with(config).await;

    for _ in 0..3 {
        complete_one(
            &orchestrator,
            "ingest",
            Duration::from_millis(200),
            Duration::from_millis(5),
        )
        .await;
    }

    let reports = orchestrator.bottlenecks();
    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].reason,
        BottleneckReason::QueueWaitExceeded {
            p95: Duration::from_millis(200),
            threshold: Duration::from_millis(50)
        }
    );
    orchestrator.shutdown().await;
}
