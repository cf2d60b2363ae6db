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

//! Crash and restart behavior backed by the file journal: replay of
//! unfinished work, preserved ordering, over-capacity backlogs, and
//! compaction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use cursus::{
    FileJournal, Orchestrator, OrchestratorConfig, Task, TaskJournal, TaskPriority, TaskSpec,
};

use crate::fixtures::{
    assert_succeeded, init_test_logging, quick_success, quiet_config, work_one,
};

async fn orchestrator_at(path: &std::path::Path) -> anyhow::Result<Orchestrator> {
    init_test_logging();
    Ok(Orchestrator::builder()
        .config(quiet_config())
        .journal_path(path)
        .build()
        .await?)
}

#[tokio::test]
async fn unfinished_tasks_survive_a_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("journal.log");

    let first = orchestrator_at(&path).await?;
    let reported = first
        .submit_task(TaskSpec::new("emails", TaskPriority::High))
        .await?;
    let interrupted = first
        .submit_task(TaskSpec::new("emails", TaskPriority::Medium))
        .await?;
    let untouched = first
        .submit_task(TaskSpec::new("billing", TaskPriority::Medium))
        .await?;

    let subscription = first.subscribe("emails");
    let task = subscription.next().await.unwrap();
    assert_eq!(task.id, reported);
    first.report_result(quick_success(reported)).await?;
    // Delivered but never reported; the journal still owes it a restart.
    let task = subscription.next().await.unwrap();
    assert_eq!(task.id, interrupted);
    first.shutdown().await;
    drop(first);

    let second = orchestrator_at(&path).await?;
    assert_eq!(second.queue_depth("emails"), 1);
    assert_eq!(second.queue_depth("billing"), 1);

    let emails = second.subscribe("emails");
    assert_eq!(emails.next().await.unwrap().id, interrupted);
    let billing = second.subscribe("billing");
    assert_eq!(billing.next().await.unwrap().id, untouched);

    // The success recorded before the restart still satisfies dependents.
    assert_succeeded(&second, reported).await;
    second.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn replay_preserves_priority_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("journal.log");

    let first = orchestrator_at(&path).await?;
    let low = first
        .submit_task(TaskSpec::new("render", TaskPriority::Low))
        .await?;
    let critical = first
        .submit_task(TaskSpec::new("render", TaskPriority::Critical))
        .await?;
    first.shutdown().await;
    drop(first);

    let second = orchestrator_at(&path).await?;
    let subscription = second.subscribe("render");
    assert_eq!(subscription.next().await.unwrap().id, critical);
    assert_eq!(subscription.next().await.unwrap().id, low);
    second.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn a_backlog_beyond_capacity_is_recovered_whole() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("journal.log");

    // Seed a journal with more unfinished tasks than one queue slot.
    let seed = FileJournal::new(&path).await?;
    let mut ids = Vec::new();
    for _ in 0..3 {
        let task = Task::from_spec(TaskSpec::new("imports", TaskPriority::Medium), None);
        ids.push(task.id);
        seed.append(&task).await?;
    }
    drop(seed);

    init_test_logging();
    let config = OrchestratorConfig::builder()
        .queue_capacity(1)
        .health_check_interval(Duration::from_secs(3600))
        .compaction_interval(Duration::from_secs(3600))
        .build();
    // Startup must not block on the full queue.
    let orchestrator = timeout(
        Duration::from_secs(5),
        Orchestrator::builder().config(config).journal_path(&path).build(),
    )
    .await??;
    assert_eq!(orchestrator.queue_depth("imports"), 3);

    let subscription = orchestrator.subscribe("imports");
    for expected in &ids {
        assert_eq!(work_one(&orchestrator, &subscription).await, *expected);
    }

    // Draining the backlog restores the capacity budget.
    timeout(
        Duration::from_secs(1),
        orchestrator.submit_task(TaskSpec::new("imports", TaskPriority::Medium)),
    )
    .await??;
    assert_eq!(orchestrator.queue_depth("imports"), 1);
    orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn compaction_prunes_finished_work() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("journal.log");
    init_test_logging();

    let journal = Arc::new(FileJournal::new(&path).await?);
    let orchestrator = Orchestrator::builder()
        .config(quiet_config())
        .journal(journal.clone() as Arc<dyn TaskJournal>)
        .build()
        .await?;

    let subscription = orchestrator.subscribe("emails");
    for _ in 0..2 {
        orchestrator
            .submit_task(TaskSpec::new("emails", TaskPriority::Medium))
            .await?;
        work_one(&orchestrator, &subscription).await;
    }

    tokio::time::sleep(Duration::from_millis(5)).await;
    // Two submissions plus two terminal marks, all older than the window.
    let removed = journal.compact(Duration::ZERO).await?;
    assert_eq!(removed, 4);

    let replay = journal.replay().await?;
    assert!(replay.pending.is_empty());
    assert!(replay.terminal.is_empty());
    orchestrator.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn background_compaction_prunes_on_its_interval() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("journal.log");
    init_test_logging();

    let journal = Arc::new(FileJournal::new(&path).await?);
    let config = OrchestratorConfig::builder()
        .compaction_interval(Duration::from_secs(1))
        .journal_retention(Duration::ZERO)
        .health_check_interval(Duration::from_secs(3600))
        .build();
    let orchestrator = Orchestrator::builder()
        .config(config)
        .journal(journal.clone() as Arc<dyn TaskJournal>)
        .build()
        .await?;

    let subscription = orchestrator.subscribe("emails");
    orchestrator
        .submit_task(TaskSpec::new("emails", TaskPriority::Medium))
        .await?;
    work_one(&orchestrator, &subscription).await;

    // One interval is enough for the loop to run a sweep.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    let replay = journal.replay().await?;
    assert!(replay.pending.is_empty());
    assert!(replay.terminal.is_empty());
    orchestrator.shutdown().await;
    Ok(())
}
