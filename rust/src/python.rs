//! Python bindings.

// Allow clippy warning triggered by PyO3 macro expansion
#![allow(clippy::useless_conversion)]

use chrono::{Duration, NaiveDateTime};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::config::LevelingConfig;
use crate::leveling::ResourceLeveler;
use crate::models::{Resource, Task, TaskMode};
use crate::sprint::Sprint;

/// A task record exchanged with Python.
#[pyclass(name = "Task")]
#[derive(Clone, Debug)]
pub struct PyTask {
    #[pyo3(get, set)]
    pub id: i64,
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub parent_id: Option<i64>,
    #[pyo3(get, set)]
    pub predecessor_ids: Vec<i64>,
    #[pyo3(get, set)]
    pub manual: bool,
    #[pyo3(get, set)]
    pub milestone: bool,
    #[pyo3(get, set)]
    pub resource_id: Option<i64>,
    #[pyo3(get, set)]
    pub work: Duration,
    #[pyo3(get, set)]
    pub duration: Option<Duration>,
    #[pyo3(get, set)]
    pub start: Option<NaiveDateTime>,
    #[pyo3(get, set)]
    pub finish: Option<NaiveDateTime>,
    #[pyo3(get, set)]
    pub critical: bool,
}

#[pymethods]
impl PyTask {
    #[new]
    #[pyo3(signature = (
        id,
        name,
        work=None,
        parent_id=None,
        predecessor_ids=Vec::new(),
        manual=false,
        milestone=false,
        resource_id=None,
        start=None,
        duration=None
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: i64,
        name: String,
        work: Option<Duration>,
        parent_id: Option<i64>,
        predecessor_ids: Vec<i64>,
        manual: bool,
        milestone: bool,
        resource_id: Option<i64>,
        start: Option<NaiveDateTime>,
        duration: Option<Duration>,
    ) -> Self {
        Self {
            id,
            name,
            parent_id,
            predecessor_ids,
            manual,
            milestone,
            resource_id,
            work: work.unwrap_or_else(Duration::zero),
            duration,
            start,
            finish: None,
            critical: false,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Task(id={}, name={:?}, start={:?}, finish={:?}, critical={})",
            self.id, self.name, self.start, self.finish, self.critical
        )
    }
}

impl PyTask {
    fn to_task(&self) -> Task {
        let mut task = Task::new(self.id, self.name.clone()).with_work(self.work);
        for &predecessor in &self.predecessor_ids {
            task = task.with_predecessor(predecessor);
        }
        task.mode = if self.manual {
            TaskMode::Manual
        } else {
            TaskMode::Automatic
        };
        task.milestone = self.milestone;
        task.resource = self.resource_id;
        task.duration = self.duration;
        task.start = self.start;
        task
    }

    fn update_from(&mut self, task: &Task) {
        self.predecessor_ids = task.predecessors.iter().map(|r| r.predecessor_id).collect();
        self.duration = task.duration;
        self.start = task.start;
        self.finish = task.finish;
        self.critical = task.critical;
    }
}

/// A resource with a single availability fraction.
#[pyclass(name = "Resource")]
#[derive(Clone, Debug)]
pub struct PyResource {
    #[pyo3(get, set)]
    pub id: i64,
    #[pyo3(get, set)]
    pub name: String,
    #[pyo3(get, set)]
    pub availability: f64,
}

#[pymethods]
impl PyResource {
    #[new]
    #[pyo3(signature = (id, name, availability=1.0))]
    fn new(id: i64, name: String, availability: f64) -> Self {
        Self {
            id,
            name,
            availability,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Resource(id={}, name={:?}, availability={})",
            self.id, self.name, self.availability
        )
    }
}

/// Scheduled tasks plus the run's findings.
#[pyclass(name = "LevelingResult")]
#[derive(Clone, Debug)]
pub struct PyLevelingResult {
    #[pyo3(get)]
    pub tasks: Vec<PyTask>,
    #[pyo3(get)]
    pub diagnostics: Vec<String>,
    #[pyo3(get)]
    pub critical: Vec<i64>,
    #[pyo3(get)]
    pub start: Option<NaiveDateTime>,
    #[pyo3(get)]
    pub end: Option<NaiveDateTime>,
    #[pyo3(get)]
    pub passes: usize,
}

#[pymethods]
impl PyLevelingResult {
    fn __repr__(&self) -> String {
        format!(
            "LevelingResult(tasks={}, diagnostics={}, start={:?}, end={:?})",
            self.tasks.len(),
            self.diagnostics.len(),
            self.start,
            self.end
        )
    }
}

fn build_sprint(
    tasks: &[PyTask],
    resources: &[PyResource],
    current_start: NaiveDateTime,
) -> PyResult<Sprint> {
    let invalid = |e: crate::sprint::GraphError| PyValueError::new_err(e.to_string());
    let mut sprint = Sprint::with_default_calendar("python");
    for resource in resources {
        sprint
            .add_resource(
                Resource::new(resource.id, resource.name.clone())
                    .with_availability(current_start.date(), resource.availability),
            )
            .map_err(invalid)?;
    }
    // parents may come after their children, so wire the tree in a second step
    for task in tasks {
        sprint.add_task(task.to_task()).map_err(invalid)?;
    }
    for task in tasks {
        if let Some(parent) = task.parent_id {
            sprint.set_parent(task.id, parent).map_err(invalid)?;
        }
    }
    Ok(sprint)
}

/// Level tasks and mark the critical path.
///
/// # Raises
/// * ValueError if the task tree is malformed
/// * RuntimeError if a dependency loop is detected
#[pyfunction]
#[pyo3(signature = (tasks, resources, current_start, verbosity=0))]
fn level_tasks(
    mut tasks: Vec<PyTask>,
    resources: Vec<PyResource>,
    current_start: NaiveDateTime,
    verbosity: u8,
) -> PyResult<PyLevelingResult> {
    let mut sprint = build_sprint(&tasks, &resources, current_start)?;
    let leveler = ResourceLeveler::new(LevelingConfig::default().with_verbosity(verbosity));
    let report = leveler
        .level(&mut sprint, current_start)
        .map_err(|e| PyRuntimeError::new_err(e.to_string()))?;

    for task in tasks.iter_mut() {
        if let Some(leveled) = sprint.task(task.id) {
            task.update_from(leveled);
        }
    }
    Ok(PyLevelingResult {
        tasks,
        diagnostics: report.diagnostics.iter().map(ToString::to_string).collect(),
        critical: report.critical,
        start: sprint.start,
        end: sprint.end,
        passes: report.passes,
    })
}

/// The sprint_leveler Python module.
#[pymodule]
fn sprint_leveler(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTask>()?;
    m.add_class::<PyResource>()?;
    m.add_class::<PyLevelingResult>()?;
    m.add_function(wrap_pyfunction!(level_tasks, m)?)?;
    Ok(())
}
