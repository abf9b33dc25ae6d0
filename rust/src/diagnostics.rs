//! Recoverable findings and the summary of a leveling run.

use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;

use crate::models::{Task, TaskId};

/// Id and name of a task, for messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskRef {
    pub id: TaskId,
    pub name: String,
}

impl TaskRef {
    /// Comma-separated `[id]'name'` list.
    pub fn list(tasks: &[TaskRef]) -> String {
        tasks
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            name: task.name.clone(),
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]'{}'", self.id, self.name)
    }
}

/// A problem found in a leveled schedule that does not abort the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("Error #030: Task {task} has no start.")]
    MissingStart { task: TaskRef },
    #[error("Error #031: Task {task} has no finish.")]
    MissingFinish { task: TaskRef },
    #[error("Error #032: Task {task} has no duration.")]
    MissingDuration { task: TaskRef },
    #[error("Error #103: Task {task} is manually scheduled and cannot fulfill its dependency to task {predecessor}.")]
    ManualDependencyViolation { task: TaskRef, predecessor: TaskRef },
    #[error("Error #104: Task {task} start {start} cannot fulfill its dependency to task {predecessor} finish {finish}.")]
    DependencyViolation {
        task: TaskRef,
        predecessor: TaskRef,
        start: NaiveDateTime,
        finish: NaiveDateTime,
    },
    #[error("Task {task} depends on unknown task [{predecessor_id}].")]
    UnresolvedPredecessor { task: TaskRef, predecessor_id: TaskId },
}

impl Diagnostic {
    /// The task the finding is about.
    pub fn task(&self) -> &TaskRef {
        match self {
            Diagnostic::MissingStart { task }
            | Diagnostic::MissingFinish { task }
            | Diagnostic::MissingDuration { task }
            | Diagnostic::ManualDependencyViolation { task, .. }
            | Diagnostic::DependencyViolation { task, .. }
            | Diagnostic::UnresolvedPredecessor { task, .. } => task,
        }
    }
}

/// Relation added between two tasks sharing a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SynthesizedRelation {
    /// The higher-id task, now starting after `predecessor`.
    pub successor: TaskId,
    pub predecessor: TaskId,
}

/// Outcome of a successful leveling run.
#[derive(Clone, Debug, Default)]
pub struct LevelingReport {
    /// Findings from the validators, in detection order.
    pub diagnostics: Vec<Diagnostic>,
    /// Leveling passes over all cascades.
    pub passes: usize,
    /// Times leveling restarted after a resource relation was added.
    pub cascades: usize,
    /// Resource relations added, oldest first.
    pub synthesized: Vec<SynthesizedRelation>,
    /// Ids of the leaves marked critical, in sprint order.
    pub critical: Vec<TaskId>,
    /// Rule evaluations, for profiling.
    pub checks: u64,
}

impl LevelingReport {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}
