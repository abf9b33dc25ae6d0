//! Index view of a sprint's tree and dependency relation.
//!
//! Resolves id-based links to arena positions once per run so the rule loops
//! use direct indexing. Relations naming unknown tasks are collected instead
//! of resolved.

use crate::models::{Task, TaskId};
use crate::sprint::Sprint;

/// Arena position of a task inside its sprint.
pub type TaskIdx = usize;

/// Resolved parent/children/predecessor links, indexed by [`TaskIdx`].
#[derive(Debug, Clone)]
pub struct TaskGraph {
    parent: Vec<Option<TaskIdx>>,
    children: Vec<Vec<TaskIdx>>,
    predecessors: Vec<Vec<TaskIdx>>,
    /// `(successor, missing predecessor id)` pairs.
    unresolved: Vec<(TaskIdx, TaskId)>,
}

impl TaskGraph {
    pub fn build(sprint: &Sprint) -> Self {
        let n = sprint.len();
        let mut parent = Vec::with_capacity(n);
        let mut children = Vec::with_capacity(n);
        let mut predecessors = Vec::with_capacity(n);
        let mut unresolved = Vec::new();

        for (idx, task) in sprint.tasks().iter().enumerate() {
            parent.push(task.parent.and_then(|p| sprint.index_of(p)));
            children.push(
                task.children
                    .iter()
                    .filter_map(|&c| sprint.index_of(c))
                    .collect(),
            );
            let mut preds: Vec<TaskIdx> = Vec::with_capacity(task.predecessors.len());
            for relation in &task.predecessors {
                match sprint.index_of(relation.predecessor_id) {
                    Some(p) if p != idx => {
                        if !preds.contains(&p) {
                            preds.push(p);
                        }
                    }
                    Some(_) => {}
                    None => unresolved.push((idx, relation.predecessor_id)),
                }
            }
            predecessors.push(preds);
        }

        Self {
            parent,
            children,
            predecessors,
            unresolved,
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    #[inline]
    pub fn parent(&self, idx: TaskIdx) -> Option<TaskIdx> {
        self.parent[idx]
    }

    #[inline]
    pub fn children(&self, idx: TaskIdx) -> &[TaskIdx] {
        &self.children[idx]
    }

    #[inline]
    pub fn predecessors(&self, idx: TaskIdx) -> &[TaskIdx] {
        &self.predecessors[idx]
    }

    pub fn unresolved(&self) -> &[(TaskIdx, TaskId)] {
        &self.unresolved
    }

    #[inline]
    pub fn is_leaf(&self, idx: TaskIdx) -> bool {
        self.children[idx].is_empty()
    }

    #[inline]
    pub fn has_direct_dependencies(&self, idx: TaskIdx) -> bool {
        !self.predecessors[idx].is_empty()
    }

    /// Ancestors of `idx`, nearest first. Stops after `len()` steps so a
    /// corrupted parent chain cannot loop.
    pub fn ancestors(&self, idx: TaskIdx) -> impl Iterator<Item = TaskIdx> + '_ {
        let mut cursor = self.parent[idx];
        let mut remaining = self.len();
        std::iter::from_fn(move || {
            let current = cursor?;
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            cursor = self.parent[current];
            Some(current)
        })
    }

    /// Whether the task or any of its ancestors has a dependency.
    pub fn has_hierarchical_dependencies(&self, idx: TaskIdx) -> bool {
        self.has_direct_dependencies(idx) || self.dependent_ancestor(idx).is_some()
    }

    /// Nearest ancestor with a direct dependency.
    pub fn dependent_ancestor(&self, idx: TaskIdx) -> Option<TaskIdx> {
        self.ancestors(idx).find(|&a| self.has_direct_dependencies(a))
    }

    /// Whether either task directly depends on the other.
    pub fn has_dependency_between(&self, a: TaskIdx, b: TaskIdx) -> bool {
        self.predecessors[a].contains(&b) || self.predecessors[b].contains(&a)
    }

    /// Record a new relation. Returns false if it already existed.
    pub fn add_predecessor(&mut self, successor: TaskIdx, predecessor: TaskIdx) -> bool {
        if successor == predecessor || self.predecessors[successor].contains(&predecessor) {
            return false;
        }
        self.predecessors[successor].push(predecessor);
        true
    }

    /// Latest predecessor finish, raised to the parent's start when that is later.
    pub fn last_start_constraint(
        &self,
        tasks: &[Task],
        idx: TaskIdx,
    ) -> Option<chrono::NaiveDateTime> {
        let finish = self.predecessors[idx]
            .iter()
            .filter_map(|&p| tasks[p].finish)
            .max()?;
        let parent_start = self.parent[idx].and_then(|p| tasks[p].start);
        Some(match parent_start {
            Some(start) if start > finish => start,
            _ => finish,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;
    use chrono::NaiveDate;

    fn sample() -> Sprint {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(10, "root").with_predecessor(40)).unwrap();
        sprint.add_task(Task::new(20, "group").with_parent(10)).unwrap();
        sprint.add_task(Task::new(30, "leaf").with_parent(20)).unwrap();
        sprint
            .add_task(Task::new(40, "other").with_predecessor(99))
            .unwrap();
        sprint
    }

    #[test]
    fn test_build_resolves_links() {
        let graph = TaskGraph::build(&sample());
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.parent(2), Some(1));
        assert_eq!(graph.children(0), &[1]);
        assert_eq!(graph.predecessors(0), &[3]);
        assert!(graph.is_leaf(2));
        assert_eq!(graph.unresolved(), &[(3, 99)]);
        assert!(!graph.has_direct_dependencies(3));
    }

    #[test]
    fn test_hierarchical_dependencies() {
        let graph = TaskGraph::build(&sample());
        assert_eq!(graph.ancestors(2).collect::<Vec<_>>(), vec![1, 0]);
        assert!(graph.has_hierarchical_dependencies(2));
        assert_eq!(graph.dependent_ancestor(2), Some(0));
        assert!(!graph.has_hierarchical_dependencies(3));
        assert!(graph.has_dependency_between(3, 0));
    }

    #[test]
    fn test_add_predecessor_ignores_duplicates() {
        let mut graph = TaskGraph::build(&sample());
        assert!(graph.add_predecessor(2, 3));
        assert!(!graph.add_predecessor(2, 3));
        assert!(!graph.add_predecessor(2, 2));
        assert_eq!(graph.predecessors(2), &[3]);
    }

    #[test]
    fn test_last_start_constraint_clamps_to_parent() {
        let at = |h| {
            NaiveDate::from_ymd_opt(2025, 1, 6)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap()
        };
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "a").with_finish(at(9))).unwrap();
        sprint.add_task(Task::new(2, "b").with_finish(at(11))).unwrap();
        sprint.add_task(Task::new(3, "parent").with_start(at(14))).unwrap();
        sprint
            .add_task(Task::new(4, "c").with_predecessor(1).with_predecessor(2))
            .unwrap();
        let graph = TaskGraph::build(&sprint);
        assert_eq!(graph.last_start_constraint(sprint.tasks(), 3), Some(at(11)));

        sprint.set_parent(4, 3).unwrap();
        let graph = TaskGraph::build(&sprint);
        assert_eq!(graph.last_start_constraint(sprint.tasks(), 3), Some(at(14)));
        assert_eq!(graph.last_start_constraint(sprint.tasks(), 0), None);
    }
}
