//! Reachability sets for critical path propagation.

use rustc_hash::FxHashSet;

use crate::graph::TaskIdx;

/// Tasks reached so far by each kind of propagation.
///
/// Created per marking call; sets only ever grow.
#[derive(Debug, Clone, Default)]
pub struct CriticalSets {
    /// Start pinned to the project start, directly or through a chain.
    pub start: FxHashSet<TaskIdx>,
    /// Start pinned through a chain from a manual task.
    pub manual: FxHashSet<TaskIdx>,
    /// Finish pinned to the project end, directly or through a chain.
    pub finish: FxHashSet<TaskIdx>,
}

impl CriticalSets {
    pub fn len(&self) -> usize {
        self.start.len() + self.manual.len() + self.finish.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a leaf at `idx` would be critical.
    pub fn is_critical(&self, idx: TaskIdx) -> bool {
        self.finish.contains(&idx) && (self.start.contains(&idx) || self.manual.contains(&idx))
    }
}
