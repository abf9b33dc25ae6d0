//! Task collection owning the task tree, resources and default calendar.
//!
//! Tasks live in an arena addressed through an id index. Relations refer to
//! predecessors by id only, so lookups return `Option` and unknown ids are a
//! normal outcome.

use chrono::{Duration, NaiveDateTime};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::calendar::{Calendar, SharedCalendar, WorkCalendar};
use crate::models::{Relation, Resource, ResourceId, Task, TaskId};

/// Errors raised while building a sprint.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Task [{0}] already exists")]
    DuplicateTask(TaskId),
    #[error("Task [{0}] not found")]
    UnknownTask(TaskId),
    #[error("Resource [{0}] already exists")]
    DuplicateResource(ResourceId),
    #[error("Resource [{0}] not found")]
    UnknownResource(ResourceId),
    #[error("Making [{parent}] the parent of [{child}] would create a cycle")]
    ParentCycle { child: TaskId, parent: TaskId },
    #[error("Task [{0}] cannot depend on itself")]
    SelfDependency(TaskId),
    #[error("Resource [{resource}] has invalid availability {fraction}")]
    InvalidAvailability { resource: ResourceId, fraction: f64 },
}

/// A collection of tasks scheduled together.
#[derive(Debug)]
pub struct Sprint {
    pub name: String,
    tasks: Vec<Task>,
    index: FxHashMap<TaskId, usize>,
    resources: FxHashMap<ResourceId, Resource>,
    calendar: SharedCalendar,
    /// Earliest task start, set by a successful leveling run.
    pub start: Option<NaiveDateTime>,
    /// Latest task finish, set by a successful leveling run.
    pub end: Option<NaiveDateTime>,
}

impl Sprint {
    pub fn new(name: impl Into<String>, calendar: SharedCalendar) -> Self {
        Self {
            name: name.into(),
            tasks: Vec::new(),
            index: FxHashMap::default(),
            resources: FxHashMap::default(),
            calendar,
            start: None,
            end: None,
        }
    }

    /// A sprint on the default working-week calendar.
    pub fn with_default_calendar(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(WorkCalendar::default()))
    }

    /// Add a task, attaching it to `task.parent` when set.
    ///
    /// The parent must already be in the sprint. Predecessor ids are stored
    /// as given and are not required to resolve.
    pub fn add_task(&mut self, mut task: Task) -> Result<(), GraphError> {
        if self.index.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        if task.depends_on(task.id) {
            return Err(GraphError::SelfDependency(task.id));
        }
        if let Some(resource) = task.resource {
            if !self.resources.contains_key(&resource) {
                return Err(GraphError::UnknownResource(resource));
            }
        }
        let parent_idx = match task.parent {
            Some(parent) => Some(self.index_of(parent).ok_or(GraphError::UnknownTask(parent))?),
            None => None,
        };

        // children are wired as they are added
        task.children.clear();
        let id = task.id;
        self.index.insert(id, self.tasks.len());
        self.tasks.push(task);
        if let Some(p) = parent_idx {
            self.tasks[p].children.push(id);
        }
        Ok(())
    }

    /// Move `child` under `parent`, detaching it from its previous parent.
    pub fn set_parent(&mut self, child: TaskId, parent: TaskId) -> Result<(), GraphError> {
        let child_idx = self.index_of(child).ok_or(GraphError::UnknownTask(child))?;
        let parent_idx = self.index_of(parent).ok_or(GraphError::UnknownTask(parent))?;

        let mut cursor = Some(parent_idx);
        while let Some(idx) = cursor {
            if idx == child_idx {
                return Err(GraphError::ParentCycle { child, parent });
            }
            cursor = self.tasks[idx].parent.and_then(|p| self.index_of(p));
        }

        if let Some(old) = self.tasks[child_idx].parent.and_then(|p| self.index_of(p)) {
            self.tasks[old].children.retain(|&c| c != child);
        }
        self.tasks[child_idx].parent = Some(parent);
        self.tasks[parent_idx].children.push(child);
        Ok(())
    }

    /// Declare that `successor` starts after `predecessor` finishes.
    pub fn add_predecessor(
        &mut self,
        successor: TaskId,
        predecessor: TaskId,
    ) -> Result<(), GraphError> {
        if successor == predecessor {
            return Err(GraphError::SelfDependency(successor));
        }
        if !self.index.contains_key(&predecessor) {
            return Err(GraphError::UnknownTask(predecessor));
        }
        let task = self
            .task_mut(successor)
            .ok_or(GraphError::UnknownTask(successor))?;
        if !task.depends_on(predecessor) {
            task.predecessors.push(Relation::new(predecessor));
        }
        Ok(())
    }

    pub fn add_resource(&mut self, resource: Resource) -> Result<(), GraphError> {
        if self.resources.contains_key(&resource.id) {
            return Err(GraphError::DuplicateResource(resource.id));
        }
        if let Some(bad) = resource
            .availabilities
            .iter()
            .find(|a| !a.fraction.is_finite() || a.fraction <= 0.0)
        {
            return Err(GraphError::InvalidAvailability {
                resource: resource.id,
                fraction: bad.fraction,
            });
        }
        self.resources.insert(resource.id, resource);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks in insertion order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    #[inline]
    pub fn index_of(&self, id: TaskId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.index_of(id).map(|idx| &self.tasks[idx])
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.index_of(id).map(move |idx| &mut self.tasks[idx])
    }

    pub(crate) fn task_at(&self, idx: usize) -> &Task {
        &self.tasks[idx]
    }

    pub(crate) fn task_at_mut(&mut self, idx: usize) -> &mut Task {
        &mut self.tasks[idx]
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn calendar(&self) -> &SharedCalendar {
        &self.calendar
    }

    /// Calendar of the task's resource, else the sprint calendar.
    pub fn calendar_for(&self, task: &Task) -> &dyn Calendar {
        task.resource
            .and_then(|r| self.resources.get(&r))
            .and_then(|r| r.calendar.as_deref())
            .unwrap_or(self.calendar.as_ref())
    }

    /// Working duration needed to complete the task's work.
    ///
    /// Work is divided by the resource's current availability (1.0 when
    /// unassigned) and rounded to a whole number of `tick`s, at least one
    /// when there is any work. Milestones take no time.
    pub fn duration_from_work(&self, task: &Task, tick: Duration) -> Duration {
        if task.milestone || task.work <= Duration::zero() {
            return Duration::zero();
        }
        let availability = task
            .resource
            .and_then(|r| self.resources.get(&r))
            .map_or(1.0, Resource::current_availability);
        let tick_ms = tick.num_milliseconds().max(1);
        let raw_ms = task.work.num_milliseconds() as f64 / availability;
        // float to int casts saturate
        let ticks = ((raw_ms / tick_ms as f64).round() as i64).max(1);
        let limit_ms = Duration::max_value().num_milliseconds();
        let ms = ticks
            .checked_mul(tick_ms)
            .map_or(limit_ms, |ms| ms.min(limit_ms));
        Duration::milliseconds(ms)
    }

    /// Earliest start among non-milestone leaf tasks.
    pub fn earliest_start(&self) -> Option<NaiveDateTime> {
        self.tasks
            .iter()
            .filter(|t| t.is_leaf() && !t.milestone)
            .filter_map(|t| t.start)
            .min()
    }

    /// Latest finish among leaf tasks.
    pub fn latest_finish(&self) -> Option<NaiveDateTime> {
        self.tasks
            .iter()
            .filter(|t| t.is_leaf())
            .filter_map(|t| t.finish)
            .max()
    }

    pub fn critical_tasks(&self) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| t.critical)
            .map(|t| t.id)
            .collect()
    }
}
