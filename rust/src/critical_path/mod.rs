//! Critical path marking.
//!
//! After leveling, a leaf task is critical when its finish is pinned to the
//! project's latest finish through a chain of equal finish/start points, and
//! its start is pinned either to the project's earliest start or to a manual
//! task on such a chain.

mod marker;
mod state;

pub(crate) use marker::mark_with_graph;
pub use marker::{mark_critical_path, CriticalPathReport};
pub use state::CriticalSets;
