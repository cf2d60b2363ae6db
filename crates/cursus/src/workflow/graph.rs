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

//! Dependency graph over task identifiers.
//!
//! Directed graph where an edge runs from a dependent task to the task it
//! depends on. Cycle detection and topological ordering are delegated to
//! petgraph; when a cycle exists, a depth-first walk recovers one concrete
//! cycle path so the error can name it.

use std::collections::{HashMap, HashSet};

use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::{Directed, Graph};

use crate::error::PlanError;
use crate::models::TaskId;

/// Dependency relationships for one workflow submission.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashSet<TaskId>,
    /// Task to the tasks it depends on.
    edges: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task to the graph.
    pub fn add_node(&mut self, task: TaskId) {
        self.nodes.insert(task);
        self.edges.entry(task).or_default();
    }

    /// Records that `task` depends on `dependency`.
    pub fn add_edge(&mut self, task: TaskId, dependency: TaskId) {
        self.nodes.insert(task);
        self.nodes.insert(dependency);
        self.edges.entry(task).or_default().push(dependency);
    }

    /// Number of tasks in the graph.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dependencies recorded for a task.
    pub fn dependencies_of(&self, task: &TaskId) -> Option<&Vec<TaskId>> {
        self.edges.get(task)
    }

    /// Whether the dependency relation contains a cycle.
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.to_petgraph())
    }

    /// Tasks in dependency order: every task appears after all of its
    /// dependencies.
    pub fn topological_sort(&self) -> Result<Vec<TaskId>, PlanError> {
        let graph = self.to_petgraph();
        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|idx| graph[idx]).collect()),
            Err(_) => Err(PlanError::Cycle {
                cycle: self.rendered_cycle(),
            }),
        }
    }

    /// Tasks grouped into stages, where every task in a stage has all of
    /// its dependencies in earlier stages. Tasks within a stage are
    /// mutually independent and can run in parallel.
    pub fn execution_levels(&self) -> Result<Vec<Vec<TaskId>>, PlanError> {
        if self.has_cycles() {
            return Err(PlanError::Cycle {
                cycle: self.rendered_cycle(),
            });
        }

        let mut levels = Vec::new();
        let mut remaining: HashSet<TaskId> = self.nodes.iter().copied().collect();
        let mut completed: HashSet<TaskId> = HashSet::new();

        while !remaining.is_empty() {
            let mut current: Vec<TaskId> = remaining
                .iter()
                .filter(|task| {
                    self.edges
                        .get(task)
                        .map(|deps| deps.iter().all(|dep| completed.contains(dep)))
                        .unwrap_or(true)
                })
                .copied()
                .collect();
            // Acyclic graphs always yield at least one ready task per pass.
            current.sort();

            for task in &current {
                remaining.remove(task);
                completed.insert(*task);
            }
            levels.push(current);
        }

        Ok(levels)
    }

    /// One concrete cycle rendered as `a -> b -> a`, or an empty string
    /// when the graph is acyclic.
    fn rendered_cycle(&self) -> String {
        self.find_cycle()
            .map(|path| {
                path.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            })
            .unwrap_or_default()
    }

    fn find_cycle(&self) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                if let Some(cycle) = self.dfs_cycle(*node, &mut visited, &mut rec_stack, &mut path)
                {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        node: TaskId,
        visited: &mut HashSet<TaskId>,
        rec_stack: &mut HashSet<TaskId>,
        path: &mut Vec<TaskId>,
    ) -> Option<Vec<TaskId>> {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(deps) = self.edges.get(&node) {
            for dep in deps {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle(*dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let start = path.iter().position(|id| id == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(*dep);
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(&node);
        path.pop();
        None
    }

    fn to_petgraph(&self) -> Graph<TaskId, (), Directed> {
        let mut graph = Graph::<TaskId, (), Directed>::new();
        let mut indices = HashMap::new();

        for node in &self.nodes {
            let index = graph.add_node(*node);
            indices.insert(*node, index);
        }
        // Edges run dependency to dependent so toposort yields
        // dependencies first.
        for (from, deps) in &self.edges {
            if let Some(&from_index) = indices.get(from) {
                for dep in deps {
                    if let Some(&dep_index) = indices.get(dep) {
                        graph.add_edge(dep_index, from_index, ());
                    }
                }
            }
        }

        graph
    }
}
