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

//! Dispatch behavior through the orchestrator facade: priority ordering,
//! backpressure, and competing consumers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use cursus::{Orchestrator, OrchestratorConfig, TaskPriority, TaskSpec};

use crate::fixtures::{init_test_logging, quiet_orchestrator, work_one};

#[tokio::test]
async fn a_burst_drains_in_priority_order() {
    let orchestrator = quiet_orchestrator().await;

    let low = orchestrator
        .submit_task(TaskSpec::new("render", TaskPriority::Low))
        .await
        .unwrap();
    let medium_first = orchestrator
        .submit_task(TaskSpec::new("render", TaskPriority::Medium))
        .await
        .unwrap();
    let critical = orchestrator
        .submit_task(TaskSpec::new("render", TaskPriority::Critical))
        .await
        .unwrap();
    let medium_second = orchestrator
        .submit_task(TaskSpec::new("render", TaskPriority::Medium))
        .await
        .unwrap();

    let subscription = orchestrator.subscribe("render");
    let mut delivered = Vec::new();
    for _ in 0..4 {
        delivered.push(subscription.next().await.unwrap().id);
    }
    // Priority first, then submission order within a level.
    assert_eq!(delivered, vec![critical, medium_first, medium_second, low]);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn submission_blocks_at_capacity_until_a_worker_pops() {
    init_test_logging();
    let config = OrchestratorConfig::builder()
        .queue_capacity(2)
        .health_check_interval(Duration::from_secs(3600))
        .compaction_interval(Duration::from_secs(3600))
        .build();
    let orchestrator = Arc::new(Orchestrator::builder().config(config).build().await.unwrap());

    orchestrator
        .submit_task(TaskSpec::new("render", TaskPriority::Medium))
        .await
        .unwrap();
    orchestrator
        .submit_task(TaskSpec::new("render", TaskPriority::Medium))
        .await
        .unwrap();

    let publisher = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .submit_task(TaskSpec::new("render", TaskPriority::Medium))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!publisher.is_finished());
    assert_eq!(orchestrator.queue_depth("render"), 2);

    // One pop frees one slot and unblocks the submitter.
    let subscription = orchestrator.subscribe("render");
    subscription.next().await.unwrap();
    let submitted = timeout(Duration::from_secs(1), publisher)
        .await
        .unwrap()
        .unwrap();
    assert!(submitted.is_ok());
    assert_eq!(orchestrator.queue_depth("render"), 2);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn competing_workers_each_report_once() {
    let orchestrator = Arc::new(quiet_orchestrator().await);

    let mut submitted = HashSet::new();
    for _ in 0..12 {
        let id = orchestrator
            .submit_task(TaskSpec::new("work", TaskPriority::Medium))
            .await
            .unwrap();
        submitted.insert(id);
    }

    // Three workers drain the topic; a double delivery would make the
    // second report fail as unknown and panic the worker.
    let mut workers = Vec::new();
    for _ in 0..3 {
        let orchestrator = Arc::clone(&orchestrator);
        workers.push(tokio::spawn(async move {
            let subscription = orchestrator.subscribe("work");
            let mut seen = Vec::new();
            while let Ok(id) =
                timeout(Duration::from_millis(300), work_one(&orchestrator, &subscription)).await
            {
                seen.push(id);
            }
            seen
        }));
    }

    let mut reported = HashSet::new();
    for worker in workers {
        for id in worker.await.unwrap() {
            assert!(reported.insert(id), "task delivered to two workers");
        }
    }
    assert_eq!(reported, submitted);

    let health = orchestrator.health();
    let work = health.get("work").unwrap();
    assert_eq!(work.samples, 12);
    assert_eq!(work.queue_depth, 0);
    orchestrator.shutdown().await;
}

#[tokio::test]
async fn depths_and_topics_are_observable() {
    let orchestrator = quiet_orchestrator().await;
    for _ in 0..2 {
        orchestrator
            .submit_task(TaskSpec::new("alpha", TaskPriority::Medium))
            .await
            .unwrap();
    }
    orchestrator
        .submit_task(TaskSpec::new("beta", TaskPriority::High))
        .await
        .unwrap();

    assert_eq!(orchestrator.queue_depth("alpha"), 2);
    assert_eq!(orchestrator.queue_depth("beta"), 1);
    assert_eq!(orchestrator.queue_depth("unseen"), 0);
    assert_eq!(orchestrator.topics(), vec!["alpha", "beta"]);

    let health = orchestrator.health();
    assert_eq!(health.len(), 2);
    let alpha = health.get("alpha").unwrap();
    assert_eq!(alpha.samples, 0);
    assert_eq!(alpha.queue_depth, 2);
    orchestrator.shutdown().await;
}
