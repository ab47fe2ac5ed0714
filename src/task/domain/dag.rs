//! Dependency graph traversal for cancellation cascades.

use super::TaskId;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

/// The dependency graph reachable from a task contains a cycle.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("task dependency cycle detected at task {0}")]
pub struct TaskDagCycle(pub TaskId);

/// Adjacency list of the dependency edges reachable from one root task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: HashMap<TaskId, Vec<TaskId>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the downstream tasks of `from`.
    pub fn insert(&mut self, from: TaskId, to: impl IntoIterator<Item = TaskId>) {
        self.edges.entry(from).or_default().extend(to);
    }

    /// Returns the downstream tasks of `from`.
    #[must_use]
    pub fn downstream(&self, from: TaskId) -> &[TaskId] {
        self.edges.get(&from).map_or(&[], Vec::as_slice)
    }

    /// Returns whether the downstream tasks of `from` have been recorded.
    #[must_use]
    pub fn contains(&self, from: TaskId) -> bool {
        self.edges.contains_key(&from)
    }

    /// Returns every task transitively downstream of `root`, in
    /// breadth-first order and excluding `root`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskDagCycle`] when a cycle is reachable from `root`.
    pub fn dependents_of(&self, root: TaskId) -> Result<Vec<TaskId>, TaskDagCycle> {
        self.ensure_acyclic(root)?;

        let mut seen = HashSet::from([root]);
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(current) = queue.pop_front() {
            for &next in self.downstream(current) {
                if seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        Ok(order)
    }

    fn ensure_acyclic(&self, root: TaskId) -> Result<(), TaskDagCycle> {
        // Iterative three-colour DFS; `on_path` holds the grey nodes.
        let mut done = BTreeSet::new();
        let mut on_path = HashSet::new();
        let mut stack = vec![(root, 0_usize)];
        on_path.insert(root);

        while let Some((node, index)) = stack.pop() {
            if let Some(&next) = self.downstream(node).get(index) {
                stack.push((node, index + 1));
                if on_path.contains(&next) {
                    return Err(TaskDagCycle(next));
                }
                if !done.contains(&next) {
                    on_path.insert(next);
                    stack.push((next, 0));
                }
            } else {
                on_path.remove(&node);
                done.insert(node);
            }
        }
        Ok(())
    }
}
