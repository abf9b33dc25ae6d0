//! Post-condition checks on a leveled sprint.
//!
//! Findings are returned as [`Diagnostic`]s rather than errors so a schedule
//! with problems can still be inspected.

use crate::diagnostics::{Diagnostic, TaskRef};
use crate::graph::TaskGraph;
use crate::sprint::Sprint;

/// Relations whose predecessor id is not in the sprint.
pub fn unresolved_predecessors(sprint: &Sprint, graph: &TaskGraph) -> Vec<Diagnostic> {
    graph
        .unresolved()
        .iter()
        .map(|&(idx, predecessor_id)| Diagnostic::UnresolvedPredecessor {
            task: TaskRef::from(sprint.task_at(idx)),
            predecessor_id,
        })
        .collect()
}

/// Every task must have a start, a finish and a duration.
pub fn check_missing_values(sprint: &Sprint) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for task in sprint.tasks() {
        if task.start.is_none() {
            diagnostics.push(Diagnostic::MissingStart { task: task.into() });
        }
        if task.finish.is_none() {
            diagnostics.push(Diagnostic::MissingFinish { task: task.into() });
        }
        if task.duration.is_none() {
            diagnostics.push(Diagnostic::MissingDuration { task: task.into() });
        }
    }
    diagnostics
}

/// Every successor must start at or after its predecessors' finish.
///
/// Relations with a missing start or finish are skipped; those are reported
/// by [`check_missing_values`].
pub fn check_relations(sprint: &Sprint, graph: &TaskGraph) -> Vec<Diagnostic> {
    let tasks = sprint.tasks();
    let mut diagnostics = Vec::new();
    for (idx, task) in tasks.iter().enumerate() {
        let Some(start) = task.start else {
            continue;
        };
        let calendar = sprint.calendar_for(task);
        for &p in graph.predecessors(idx) {
            let predecessor = &tasks[p];
            let Some(finish) = predecessor.finish else {
                continue;
            };
            if start > finish || calendar.equivalent(Some(start), Some(finish)) {
                continue;
            }
            diagnostics.push(if task.is_manual() {
                Diagnostic::ManualDependencyViolation {
                    task: task.into(),
                    predecessor: predecessor.into(),
                }
            } else {
                Diagnostic::DependencyViolation {
                    task: task.into(),
                    predecessor: predecessor.into(),
                    start,
                    finish,
                }
            });
        }
    }
    diagnostics
}
