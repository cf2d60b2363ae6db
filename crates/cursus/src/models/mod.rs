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

//! Domain Models
//!
//! Data types shared across the dispatch core. These are API-level types;
//! storage encodings live with the journal.

pub mod metrics;
pub mod result;
pub mod task;

pub use metrics::{BottleneckReason, BottleneckReport, TopicMetrics};
pub use result::{FailureKind, TaskFailure, TaskResult, TaskStatus};
pub use task::{Task, TaskId, TaskPriority, TaskSpec, WorkflowId};
