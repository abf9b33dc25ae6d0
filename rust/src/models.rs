//! Core data types for the task graph.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::calendar::SharedCalendar;

/// Stable task identity.
pub type TaskId = i64;
/// Stable resource identity.
pub type ResourceId = i64;

/// Whether a task is positioned by the engine or by its owner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TaskMode {
    /// Start and duration are supplied by the user and never moved.
    Manual,
    /// Start, finish and duration are computed by the engine.
    #[default]
    Automatic,
}

/// Where a relation came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Declared by the user.
    #[default]
    Declared,
    /// Synthesized to serialize two tasks sharing a resource.
    Resource,
}

/// Finish-to-start dependency on another task of the same sprint.
///
/// Only the predecessor id is stored; it is resolved against the sprint on
/// use and may name a task that does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Relation {
    pub predecessor_id: TaskId,
    pub kind: RelationKind,
}

impl Relation {
    pub fn new(predecessor_id: TaskId) -> Self {
        Self {
            predecessor_id,
            kind: RelationKind::Declared,
        }
    }

    pub fn resource(predecessor_id: TaskId) -> Self {
        Self {
            predecessor_id,
            kind: RelationKind::Resource,
        }
    }
}

/// Fraction of a working day a resource is available from `start` on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Availability {
    pub start: NaiveDate,
    pub fraction: f64,
}

/// Someone tasks are assigned to.
#[derive(Clone, Debug)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    /// Availability history, ordered by start date.
    pub availabilities: Vec<Availability>,
    /// Overrides the sprint calendar for tasks assigned to this resource.
    pub calendar: Option<SharedCalendar>,
}

impl Resource {
    pub fn new(id: ResourceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            availabilities: Vec::new(),
            calendar: None,
        }
    }

    pub fn with_availability(mut self, start: NaiveDate, fraction: f64) -> Self {
        self.availabilities.push(Availability { start, fraction });
        self.availabilities.sort_by_key(|a| a.start);
        self
    }

    pub fn with_calendar(mut self, calendar: SharedCalendar) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Availability in effect on `date`, 1.0 when nothing is recorded.
    pub fn availability_at(&self, date: NaiveDate) -> f64 {
        self.availabilities
            .iter()
            .rev()
            .find(|a| a.start <= date)
            .or_else(|| self.availabilities.first())
            .map_or(1.0, |a| a.fraction)
    }

    /// Most recent availability, the one the engine schedules with.
    pub fn current_availability(&self) -> f64 {
        self.availabilities.last().map_or(1.0, |a| a.fraction)
    }
}

/// A node of the task tree.
///
/// `parent` and `children` are maintained by [`crate::Sprint`]; `duration`,
/// `start`, `finish` and `critical` are written by the engine except for
/// manual leaves, whose start and duration are authoritative.
#[derive(Clone, Debug, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    /// Owning summary task, if any.
    pub parent: Option<TaskId>,
    /// Direct children in insertion order. Non-empty makes this a parent task.
    pub children: Vec<TaskId>,
    /// Tasks that must finish before this one starts.
    pub predecessors: Vec<Relation>,
    pub mode: TaskMode,
    /// Zero-length marker: duration is always zero and finish equals start.
    pub milestone: bool,
    /// Assigned resource; its availability scales `work` into `duration`.
    pub resource: Option<ResourceId>,
    /// Effort at full availability.
    pub work: Duration,
    /// Working time between start and finish on the task's calendar.
    pub duration: Option<Duration>,
    pub start: Option<NaiveDateTime>,
    pub finish: Option<NaiveDateTime>,
    /// Set on leaves lying on the critical path after a leveling run.
    pub critical: bool,
}

impl Task {
    /// An automatic task without work, dependencies or parent.
    pub fn new(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            predecessors: Vec::new(),
            mode: TaskMode::Automatic,
            milestone: false,
            resource: None,
            work: Duration::zero(),
            duration: None,
            start: None,
            finish: None,
            critical: false,
        }
    }

    pub fn milestone(id: TaskId, name: impl Into<String>) -> Self {
        Self {
            milestone: true,
            ..Self::new(id, name)
        }
    }

    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn with_resource(mut self, resource: ResourceId) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_predecessor(mut self, predecessor: TaskId) -> Self {
        self.predecessors.push(Relation::new(predecessor));
        self
    }

    /// Pin the task: the engine keeps `start` and derives the rest from work.
    pub fn pinned_at(mut self, start: NaiveDateTime) -> Self {
        self.mode = TaskMode::Manual;
        self.start = Some(start);
        self
    }

    pub fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = Some(start);
        self
    }

    pub fn with_finish(mut self, finish: NaiveDateTime) -> Self {
        self.finish = Some(finish);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn is_manual(&self) -> bool {
        self.mode == TaskMode::Manual
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn depends_on(&self, id: TaskId) -> bool {
        self.predecessors.iter().any(|r| r.predecessor_id == id)
    }
}
