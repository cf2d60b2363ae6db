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

//! In-Memory Journal
//!
//! A [`TaskJournal`] kept entirely in memory. Provides the same contract
//! as the file journal without touching disk, for tests and embedded use.
//! `fail_next_append` injects a one-shot write failure so persistence
//! error paths can be exercised.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use super::record::{compact_records, JournalRecord, JournalReplay};
use super::TaskJournal;
use crate::error::JournalError;
use crate::models::{Task, TaskFailure, TaskId, TaskStatus};

/// Durable-log contract over an in-memory record list.
#[derive(Default)]
pub struct MemoryJournal {
    records: Mutex<Vec<JournalRecord>>,
    fail_next: AtomicBool,
}

impl MemoryJournal {
    /// Creates an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next append fail with an I/O error.
    pub fn fail_next_append(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the journal holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    fn push(&self, record: JournalRecord) -> Result<(), JournalError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(JournalError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected append failure",
            )));
        }
        self.records.lock().push(record);
        Ok(())
    }
}

#[async_trait]
impl TaskJournal for MemoryJournal {
    async fn append(&self, task: &Task) -> Result<(), JournalError> {
        self.push(JournalRecord::submitted(task))
    }

    async fn mark_terminal(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        failure: Option<TaskFailure>,
    ) -> Result<(), JournalError> {
        self.push(JournalRecord::terminal(task_id, status, failure))
    }

    async fn replay(&self) -> Result<JournalReplay, JournalError> {
        let records = self.records.lock().clone();
        Ok(JournalReplay::from_records(records))
    }

    async fn compact(&self, retention: Duration) -> Result<usize, JournalError> {
        let cutoff = match chrono::Duration::from_std(retention) {
            Ok(window) => Utc::now() - window,
            Err(_) => return Ok(0),
        };
        let mut records = self.records.lock();
        let (retained, removed) = compact_records(std::mem::take(&mut *records), cutoff);
        *records = retained;
        Ok(removed)
    }
}
