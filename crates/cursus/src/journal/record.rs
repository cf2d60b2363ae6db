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

//! Journal Records
//!
//! The persisted record format: one self-describing, tagged JSON record
//! per line. Two record kinds cover the full durability contract — a
//! `submitted` record for every accepted task and a `terminal` record for
//! its outcome. Replay reconstructs every non-terminal task from these
//! records alone.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Task, TaskFailure, TaskId, TaskStatus};

/// One line of the durable log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalRecord {
    /// A task was accepted and published.
    Submitted {
        /// The accepted task, in full.
        task: Task,
    },
    /// A previously submitted task reached a terminal status.
    Terminal {
        /// The task this mark belongs to.
        task_id: TaskId,
        /// Terminal status.
        status: TaskStatus,
        /// Failure details when the status is `failed`.
        failure: Option<TaskFailure>,
        /// When the mark was written.
        recorded_at: DateTime<Utc>,
    },
}

impl JournalRecord {
    /// Builds a submission record.
    pub fn submitted(task: &Task) -> Self {
        JournalRecord::Submitted { task: task.clone() }
    }

    /// Builds a terminal record stamped with the current time.
    pub fn terminal(task_id: TaskId, status: TaskStatus, failure: Option<TaskFailure>) -> Self {
        JournalRecord::Terminal {
            task_id,
            status,
            failure,
            recorded_at: Utc::now(),
        }
    }
}

/// Everything replay reconstructs from the journal records.
#[derive(Debug, Clone, Default)]
pub struct JournalReplay {
    /// Tasks that were submitted but never marked terminal, ordered by
    /// submission time. These are re-published after a restart.
    pub pending: Vec<Task>,
    /// Terminal status of every marked task still present in the journal.
    /// Used to re-validate cross-submission dependencies after a restart.
    pub terminal: HashMap<TaskId, TaskStatus>,
}

impl JournalReplay {
    /// Folds an ordered record stream into the replay view.
    ///
    /// Terminal marks without a matching submission record are tolerated,
    /// since the submission line can be lost to a torn write; they are
    /// logged and surface in `terminal` only.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = JournalRecord>,
    {
        let mut submitted: HashMap<TaskId, Task> = HashMap::new();
        let mut terminal: HashMap<TaskId, TaskStatus> = HashMap::new();

        for record in records {
            match record {
                JournalRecord::Submitted { task } => {
                    submitted.insert(task.id, task);
                }
                JournalRecord::Terminal {
                    task_id, status, ..
                } => {
                    terminal.insert(task_id, status);
                }
            }
        }

        for task_id in terminal.keys() {
            if !submitted.contains_key(task_id) {
                warn!(%task_id, "terminal mark without a submission record");
            }
        }

        let mut pending: Vec<Task> = submitted
            .into_values()
            .filter(|task| !terminal.contains_key(&task.id))
            .collect();
        pending.sort_by(|a, b| {
            a.submitted_at
                .cmp(&b.submitted_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        JournalReplay { pending, terminal }
    }
}

/// Applies the retention policy to a full record listing.
///
/// Keeps every record of a still-pending task. Submitted/terminal pairs
/// whose terminal time is at or after `cutoff` are kept; older pairs are
/// dropped, as are terminal marks that never had a submission record.
/// Returns the retained records and the number dropped.
pub fn compact_records(
    records: Vec<JournalRecord>,
    cutoff: DateTime<Utc>,
) -> (Vec<JournalRecord>, usize) {
    let mut terminal_at: HashMap<TaskId, DateTime<Utc>> = HashMap::new();
    let mut has_submission: HashMap<TaskId, bool> = HashMap::new();

    for record in &records {
        match record {
            JournalRecord::Submitted { task } => {
                has_submission.insert(task.id, true);
            }
            JournalRecord::Terminal {
                task_id,
                recorded_at,
                ..
            } => {
                terminal_at.insert(*task_id, *recorded_at);
            }
        }
    }

    let total = records.len();
    let retained: Vec<JournalRecord> = records
        .into_iter()
        .filter(|record| match record {
            JournalRecord::Submitted { task } => match terminal_at.get(&task.id) {
                Some(recorded_at) => *recorded_at >= cutoff,
                None => true,
            },
            JournalRecord::Terminal {
                task_id,
                recorded_at,
                ..
            } => has_submission.contains_key(task_id) && *recorded_at >= cutoff,
        })
        .collect();

    let removed = total - retained.len();
    (retained, removed)
}
