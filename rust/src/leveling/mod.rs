//! Leveling engine.
//!
//! Assigns start, finish and duration to every task of a sprint by applying a
//! fixed set of local rules until no task changes, serializing same-resource
//! overlaps between fixed points, then validating the result and marking the
//! critical path.

mod core;
mod rules;
mod state;

pub use self::core::{level, LoopPhase, ResourceLeveler, SchedulingError};
pub use rules::Rule;
