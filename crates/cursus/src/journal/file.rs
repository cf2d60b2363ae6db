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

//! File-Backed Journal
//!
//! JSON Lines storage for the durable log: one record per line, appended
//! and flushed under a single writer lock. Replay is line-tolerant — a
//! torn trailing line left by a crash mid-write is skipped with a warning
//! rather than failing recovery. Compaction rewrites the file through a
//! sibling temp file and an atomic rename.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::record::{compact_records, JournalRecord, JournalReplay};
use super::TaskJournal;
use crate::error::JournalError;
use crate::models::{Task, TaskFailure, TaskId, TaskStatus};

/// Durable log stored as a JSON Lines file.
pub struct FileJournal {
    path: PathBuf,
    /// Serializes appends and compaction; the log is single-writer.
    writer: Mutex<()>,
}

impl FileJournal {
    /// Opens (or creates) a journal at the given path, creating parent
    /// directories as needed.
    pub async fn new(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            writer: Mutex::new(()),
        })
    }

    /// The file this journal writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append_record(&self, record: &JournalRecord) -> Result<(), JournalError> {
        let _guard = self.writer.lock().await;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Reads every parseable record in file order. Unparseable lines are
    /// skipped with a warning; a torn final line is the expected artifact
    /// of a crash between write and flush.
    async fn read_records(&self) -> Result<Vec<JournalRecord>, JournalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        let mut records = Vec::new();
        for (line_no, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<JournalRecord>(line) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        %error,
                        "Skipping unreadable journal record"
                    );
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl TaskJournal for FileJournal {
    async fn append(&self, task: &Task) -> Result<(), JournalError> {
        self.append_record(&JournalRecord::submitted(task)).await?;
        debug!(task_id = %task.id, topic = %task.topic, "Journaled task submission");
        Ok(())
    }

    async fn mark_terminal(
        &self,
        task_id: TaskId,
        status: TaskStatus,
        failure: Option<TaskFailure>,
    ) -> Result<(), JournalError> {
        self.append_record(&JournalRecord::terminal(task_id, status, failure))
            .await?;
        debug!(%task_id, %status, "Journaled terminal mark");
        Ok(())
    }

    async fn replay(&self) -> Result<JournalReplay, JournalError> {
        let _guard = self.writer.lock().await;
        let records = self.read_records().await?;
        Ok(JournalReplay::from_records(records))
    }

    async fn compact(&self, retention: Duration) -> Result<usize, JournalError> {
        let cutoff = match chrono::Duration::from_std(retention) {
            Ok(window) => Utc::now() - window,
            // A retention window beyond chrono's range keeps everything.
            Err(_) => return Ok(0),
        };

        let _guard = self.writer.lock().await;
        let records = self.read_records().await?;
        let (retained, removed) = compact_records(records, cutoff);
        if removed == 0 {
            return Ok(0);
        }

        let tmp = self.path.with_extension("compact");
        let mut out = String::new();
        for record in &retained {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        tokio::fs::write(&tmp, out.as_bytes()).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(
            path = %self.path.display(),
            removed,
            retained = retained.len(),
            "Compacted journal"
        );
        Ok(removed)
    }
}
