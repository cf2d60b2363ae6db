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

//! Durable Log
//!
//! Append-only, crash-survivable record of every published task and its
//! terminal outcome. The journal is the at-least-once durability boundary:
//! an append must complete before the caller is told the task is accepted,
//! and on restart replay returns every task that was appended but never
//! marked terminal so the orchestrator can re-publish it. It is used only
//! for recovery, never on the hot read path.
//!
//! Two implementations are provided: [`FileJournal`], a JSON Lines file
//! for real deployments, and [`MemoryJournal`] for tests and embedding.

mod file;
mod memory;
mod record;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::JournalError;
use crate::models::{Task, TaskFailure, TaskId, TaskStatus};

pub use file::FileJournal;
pub use memory::MemoryJournal;
pub use record::{compact_records, JournalRecord, JournalReplay};

/// Storage seam for the durable log.
///
/// Injected into the orchestrator at construction so tests can substitute
/// [`MemoryJournal`]. Implementations serialize their own writes; callers
/// may append concurrently.
#[async_trait]
pub trait TaskJournal: Send + Sync {
    /// Durably records an accepted task. Completes (or fails) before the
    /// submission is acknowledged; never partially applied from the
    /// reader's point of view.
    async fn append(&self, task: &Task) -> Result<(), JournalError>;

    /// Durably records a task's terminal outcome, excluding it from
    /// future replays.
    async fn mark_terminal(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        failure: Option<TaskFailure>,
    ) -> Result<(), JournalError>;

    /// Reconstructs the pending set and the terminal map from the
    /// persisted records alone.
    async fn replay(&self) -> Result<JournalReplay, JournalError>;

    /// Drops terminal record pairs older than `retention`, keeping every
    /// record of a still-pending task. Returns the number of records
    /// removed.
    async fn compact(&self, retention: Duration) -> Result<usize, JournalError>;

    /// Every task that was appended but never marked terminal, ordered by
    /// submission time.
    async fn replay_pending(&self) -> Result<Vec<Task>, JournalError> {
        Ok(self.replay().await?.pending)
    }
}
