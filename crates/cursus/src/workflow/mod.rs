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

//! Workflow Optimizer
//!
//! Validation and planning for dependency-structured task submissions.
//! [`DependencyGraph`] holds the directed relation and answers cycle and
//! ordering questions; [`WorkflowPlanner`] turns a task set into a
//! [`WorkflowPlan`] of parallel stages with a completion estimate.

mod graph;
mod plan;

pub use graph::DependencyGraph;
pub use plan::{WorkflowPlan, WorkflowPlanner};
