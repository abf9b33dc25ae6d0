//! Resource leveling and critical-path marking for sprint task trees.
//!
//! A [`Sprint`] holds a tree of tasks with finish-to-start dependencies and
//! resource assignments. [`ResourceLeveler::level`] schedules it on working
//! calendars, serializes tasks that compete for a resource, and flags the
//! leaves on the critical path.

pub mod calendar;
mod config;
pub mod critical_path;
mod diagnostics;
mod graph;
pub mod leveling;
pub mod logging;
mod models;
mod resource_dependencies;
mod sprint;
mod validation;

#[cfg(feature = "python")]
mod python;

pub use calendar::{Calendar, CalendarError, SharedCalendar, WorkCalendar, WorkCalendarConfig};
pub use config::LevelingConfig;
pub use critical_path::{mark_critical_path, CriticalPathReport, CriticalSets};
pub use diagnostics::{Diagnostic, LevelingReport, SynthesizedRelation, TaskRef};
pub use leveling::{level, LoopPhase, ResourceLeveler, Rule, SchedulingError};
pub use models::{
    Availability, Relation, RelationKind, Resource, ResourceId, Task, TaskId, TaskMode,
};
pub use sprint::{GraphError, Sprint};
