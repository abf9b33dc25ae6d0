//! Serializes tasks that share a resource.
//!
//! When two tasks assigned to the same resource overlap in time and are not
//! yet ordered, the higher-id task is made to depend on the lower-id one.
//! One relation is added per call; the caller re-levels and calls again until
//! nothing is added. Relations are never removed, so this happens at most
//! once per task pair.

use crate::diagnostics::SynthesizedRelation;
use crate::graph::{TaskGraph, TaskIdx};
use crate::log_changes;
use crate::models::{Relation, Task};
use crate::sprint::Sprint;

/// Whether the `[start, finish)` windows of two tasks intersect.
///
/// Tasks without both bounds, and zero-width windows, never overlap.
pub fn overlaps(a: &Task, b: &Task) -> bool {
    match (a.start, a.finish, b.start, b.finish) {
        (Some(s1), Some(f1), Some(s2), Some(f2)) => s1 < f1 && s2 < f2 && s1 < f2 && s2 < f1,
        _ => false,
    }
}

/// First unordered overlapping same-resource pair, as `(earlier id, later id)` indices.
fn find_conflict(sprint: &Sprint, graph: &TaskGraph) -> Option<(TaskIdx, TaskIdx)> {
    let tasks = sprint.tasks();
    for (i, first) in tasks.iter().enumerate() {
        let Some(resource) = first.resource else {
            continue;
        };
        for (j, second) in tasks.iter().enumerate() {
            if first.id < second.id
                && second.resource == Some(resource)
                && overlaps(first, second)
                && !graph.has_dependency_between(i, j)
            {
                return Some((i, j));
            }
        }
    }
    None
}

/// Add one relation between overlapping tasks of the same resource.
///
/// Returns the relation added, or `None` when no such pair is left.
pub fn synthesize_resource_dependency(
    sprint: &mut Sprint,
    graph: &mut TaskGraph,
    verbosity: u8,
) -> Option<SynthesizedRelation> {
    let (predecessor_idx, successor_idx) = find_conflict(sprint, graph)?;
    let predecessor = sprint.task_at(predecessor_idx).id;

    graph.add_predecessor(successor_idx, predecessor_idx);
    let successor = sprint.task_at_mut(successor_idx);
    successor.predecessors.push(Relation::resource(predecessor));

    log_changes!(
        verbosity,
        "[R ] [{:>3}] now depends on [{:>3}] (shared resource)",
        successor.id,
        predecessor
    );
    Some(SynthesizedRelation {
        successor: successor.id,
        predecessor,
    })
}
