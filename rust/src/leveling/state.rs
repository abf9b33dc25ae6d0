//! Per-call leveling state.

use chrono::NaiveDateTime;
use rustc_hash::FxHashSet;

use crate::diagnostics::TaskRef;
use crate::graph::TaskIdx;
use crate::sprint::Sprint;

/// Counters and change tracking for one fixed-point loop.
///
/// Lives on the stack of a single `level` call, so independent sprints can
/// be leveled concurrently.
#[derive(Debug)]
pub(crate) struct LevelingState {
    /// Where independent leaves are anchored.
    pub current_start: NaiveDateTime,
    /// Completed passes over all rules and tasks.
    pub passes: usize,
    /// Rule evaluations so far.
    pub checks: u64,
    /// Tasks changed during the current pass.
    pub changed: FxHashSet<TaskIdx>,
}

impl LevelingState {
    pub fn new(current_start: NaiveDateTime) -> Self {
        Self {
            current_start,
            passes: 0,
            checks: 0,
            changed: FxHashSet::default(),
        }
    }

    pub fn begin_pass(&mut self) {
        self.changed.clear();
    }

    pub fn record(&mut self, idx: TaskIdx, changed: bool) {
        self.checks += 1;
        if changed {
            self.changed.insert(idx);
        }
    }

    pub fn is_stable(&self) -> bool {
        self.changed.is_empty()
    }

    /// Tasks changed in the current pass, in sprint order.
    pub fn changed_tasks(&self, sprint: &Sprint) -> Vec<TaskRef> {
        let mut indices: Vec<TaskIdx> = self.changed.iter().copied().collect();
        indices.sort_unstable();
        indices
            .into_iter()
            .map(|idx| TaskRef::from(sprint.task_at(idx)))
            .collect()
    }
}
