//! Fixed-point propagation of the critical sets over a leveled sprint.

use chrono::NaiveDateTime;
use rustc_hash::FxHashSet;

use crate::config::LevelingConfig;
use crate::diagnostics::TaskRef;
use crate::graph::{TaskGraph, TaskIdx};
use crate::leveling::{LoopPhase, SchedulingError};
use crate::log_debug;
use crate::models::TaskId;
use crate::sprint::Sprint;

use super::state::CriticalSets;

/// Outcome of a marking run.
#[derive(Debug, Clone, Default)]
pub struct CriticalPathReport {
    /// Ids of the tasks marked critical, in sprint order.
    pub critical: Vec<TaskId>,
    pub passes: usize,
    /// Task visits over all passes.
    pub checks: u64,
    pub sets: CriticalSets,
}

#[derive(Debug, Clone, Copy)]
struct ProjectBounds {
    start: Option<NaiveDateTime>,
    finish: Option<NaiveDateTime>,
}

/// Recompute the `critical` flag of every task of a leveled sprint.
///
/// Every task is re-tested, and its predecessors after it, until a full pass
/// adds nothing to any set. Only leaves are ever marked.
pub fn mark_critical_path(
    sprint: &mut Sprint,
    config: &LevelingConfig,
) -> Result<CriticalPathReport, SchedulingError> {
    let graph = TaskGraph::build(sprint);
    mark_with_graph(sprint, &graph, config)
}

/// [`mark_critical_path`] over a graph already built from `sprint`.
pub(crate) fn mark_with_graph(
    sprint: &mut Sprint,
    graph: &TaskGraph,
    config: &LevelingConfig,
) -> Result<CriticalPathReport, SchedulingError> {
    for idx in 0..sprint.len() {
        sprint.task_at_mut(idx).critical = false;
    }

    let n = sprint.len();
    let budget = config.critical_pass_budget(n);
    let bounds = ProjectBounds {
        start: sprint.earliest_start(),
        finish: sprint.latest_finish(),
    };
    let mut propagation = Propagation {
        sprint: &*sprint,
        graph,
        bounds,
        sets: CriticalSets::default(),
        grown: Vec::new(),
        visits: 0,
        visit_budget: config.critical_visit_budget(n),
    };

    let mut passes = 0;
    let mut checks = 0u64;
    loop {
        let grew = propagation.run_pass()?;
        passes += 1;
        checks += propagation.visits as u64;
        log_debug!(
            config.verbosity,
            "Critical pass {}: start={} manual={} finish={}",
            passes,
            propagation.sets.start.len(),
            propagation.sets.manual.len(),
            propagation.sets.finish.len()
        );
        if !grew {
            break;
        }
        if passes >= budget {
            return Err(SchedulingError::DependencyLoop {
                phase: LoopPhase::CriticalPath,
                iterations: passes,
                budget,
                tasks: propagation.grown_tasks(),
            });
        }
    }

    let sets = propagation.sets;
    let mut critical = Vec::new();
    for idx in 0..n {
        if graph.is_leaf(idx) && sets.is_critical(idx) {
            let task = sprint.task_at_mut(idx);
            task.critical = true;
            critical.push(task.id);
        }
    }

    Ok(CriticalPathReport {
        critical,
        passes,
        checks,
        sets,
    })
}

/// State of one marking run.
struct Propagation<'a> {
    sprint: &'a Sprint,
    graph: &'a TaskGraph,
    bounds: ProjectBounds,
    sets: CriticalSets,
    /// Tasks whose test added something during the current pass.
    grown: Vec<TaskIdx>,
    /// Task visits during the current pass.
    visits: usize,
    visit_budget: usize,
}

impl Propagation<'_> {
    /// Test every task and, recursively, its predecessors. Returns whether
    /// any set grew.
    fn run_pass(&mut self) -> Result<bool, SchedulingError> {
        self.grown.clear();
        self.visits = 0;
        for root in 0..self.sprint.len() {
            self.propagate_from(root)?;
        }
        Ok(!self.grown.is_empty())
    }

    /// Depth-first walk from `root` through predecessors, each task once.
    fn propagate_from(&mut self, root: TaskIdx) -> Result<(), SchedulingError> {
        let graph = self.graph;
        let mut visited: FxHashSet<TaskIdx> = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            self.visits += 1;
            if self.visits > self.visit_budget {
                return Err(SchedulingError::DependencyLoop {
                    phase: LoopPhase::CriticalPath,
                    iterations: self.visits,
                    budget: self.visit_budget,
                    tasks: vec![TaskRef::from(self.sprint.task_at(idx))],
                });
            }
            if self.test_critical(idx) {
                self.grown.push(idx);
            }
            stack.extend(
                graph
                    .predecessors(idx)
                    .iter()
                    .rev()
                    .filter(|p| !visited.contains(p))
                    .copied(),
            );
        }
        Ok(())
    }

    /// Apply the set rules to one task. Returns whether any set grew.
    fn test_critical(&mut self, idx: TaskIdx) -> bool {
        let sprint = self.sprint;
        let graph = self.graph;
        let tasks = sprint.tasks();
        let task = &tasks[idx];
        let calendar = sprint.calendar_for(task);
        let same = |a: Option<NaiveDateTime>, b: Option<NaiveDateTime>| {
            a.is_some() && b.is_some() && calendar.equivalent(a, b)
        };
        let predecessors = graph.predecessors(idx);
        let parent = graph.parent(idx);
        let children = graph.children(idx);
        let bounds = self.bounds;
        let sets = &mut self.sets;
        let mut grew = false;

        // start chained to a member's finish (predecessor) or start (parent, child)
        let start_linked = |set: &FxHashSet<TaskIdx>| {
            predecessors
                .iter()
                .any(|&p| set.contains(&p) && same(task.start, tasks[p].finish))
                || parent.is_some_and(|p| set.contains(&p) && same(task.start, tasks[p].start))
                || children
                    .iter()
                    .any(|&c| set.contains(&c) && same(task.start, tasks[c].start))
        };

        if !sets.start.contains(&idx)
            && (same(task.start, bounds.start) || start_linked(&sets.start))
        {
            sets.start.insert(idx);
            grew = true;
        }
        if !sets.manual.contains(&idx) && start_linked(&sets.manual) {
            sets.manual.insert(idx);
            grew = true;
        }

        if !sets.finish.contains(&idx) {
            let reached = same(task.finish, bounds.finish)
                || parent.is_some_and(|p| {
                    sets.finish.contains(&p) && same(task.finish, tasks[p].finish)
                })
                || children
                    .iter()
                    .any(|&c| sets.finish.contains(&c) && same(task.finish, tasks[c].finish));
            if reached {
                sets.finish.insert(idx);
                grew = true;
            }
        }

        if sets.finish.contains(&idx) {
            for &p in predecessors {
                if !sets.finish.contains(&p) && same(tasks[p].finish, task.start) {
                    sets.finish.insert(p);
                    grew = true;
                }
            }
            if task.is_manual() && sets.manual.insert(idx) {
                grew = true;
            }
        }
        grew
    }

    fn grown_tasks(&self) -> Vec<TaskRef> {
        self.grown
            .iter()
            .map(|&idx| TaskRef::from(self.sprint.task_at(idx)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leveling::level;
    use crate::models::Task;
    use chrono::{Duration, NaiveDate};

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn make_task(id: i64, name: &str, hours: i64) -> Task {
        Task::new(id, name).with_work(Duration::hours(hours))
    }

    fn critical_names(sprint: &Sprint) -> Vec<&str> {
        sprint
            .tasks()
            .iter()
            .filter(|t| t.critical)
            .map(|t| t.name.as_str())
            .collect()
    }

    #[test]
    fn test_single_chain_with_parallel_slack() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::milestone(1, "start")).unwrap();
        sprint
            .add_task(make_task(2, "task1", 2).with_predecessor(1))
            .unwrap();
        sprint
            .add_task(make_task(3, "task2", 3).with_predecessor(2))
            .unwrap();
        sprint
            .add_task(Task::milestone(4, "end").with_predecessor(3))
            .unwrap();
        sprint.add_task(make_task(5, "parallel", 1)).unwrap();

        let report = level(&mut sprint, dt(6, 8)).unwrap();
        assert_eq!(sprint.task(3).unwrap().finish, Some(dt(6, 14)));
        assert!(sprint.task(2).unwrap().critical);
        assert!(sprint.task(3).unwrap().critical);
        assert!(!sprint.task(5).unwrap().critical);
        assert_eq!(report.critical, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_manual_task_anchors_chain() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint
            .add_task(make_task(1, "pinned", 1).pinned_at(dt(6, 13)))
            .unwrap();
        sprint
            .add_task(make_task(2, "follow", 2).with_predecessor(1))
            .unwrap();
        sprint.add_task(make_task(3, "early", 3)).unwrap();

        level(&mut sprint, dt(6, 8)).unwrap();
        assert_eq!(sprint.task(2).unwrap().finish, Some(dt(6, 16)));
        assert_eq!(critical_names(&sprint), vec!["pinned", "follow"]);
    }

    #[test]
    fn test_parents_are_never_marked() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "group")).unwrap();
        sprint
            .add_task(make_task(2, "first", 2).with_parent(1))
            .unwrap();
        sprint
            .add_task(make_task(3, "second", 3).with_parent(1).with_predecessor(2))
            .unwrap();

        let report = level(&mut sprint, dt(6, 8)).unwrap();
        assert_eq!(critical_names(&sprint), vec!["first", "second"]);
        assert!(!sprint.task(1).unwrap().critical);
        assert_eq!(report.critical, vec![2, 3]);
    }

    #[test]
    fn test_flags_are_recomputed() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(make_task(1, "long", 4)).unwrap();
        sprint.add_task(make_task(2, "short", 1)).unwrap();
        level(&mut sprint, dt(6, 8)).unwrap();
        sprint.task_mut(2).unwrap().critical = true;

        let report = mark_critical_path(&mut sprint, &LevelingConfig::default()).unwrap();
        assert_eq!(critical_names(&sprint), vec!["long"]);
        assert_eq!(report.passes, 2);
        assert!(report.sets.start.contains(&1));
        assert!(!report.sets.finish.contains(&1));
    }

    #[test]
    fn test_unscheduled_sprint_marks_nothing() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "a")).unwrap();

        let report = mark_critical_path(&mut sprint, &LevelingConfig::default()).unwrap();
        assert!(report.critical.is_empty());
        assert_eq!(report.passes, 1);
        assert!(report.sets.is_empty());
    }

    #[test]
    fn test_critical_path_budget_exceeded() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(make_task(1, "only", 2)).unwrap();
        level(&mut sprint, dt(6, 8)).unwrap();

        // the first pass always grows the sets, so one pass is never enough
        let config = LevelingConfig {
            max_critical_passes: Some(1),
            ..LevelingConfig::default()
        };
        let err = mark_critical_path(&mut sprint, &config).unwrap_err();
        match err {
            SchedulingError::DependencyLoop {
                phase,
                iterations,
                budget,
                tasks,
            } => {
                assert_eq!(phase, LoopPhase::CriticalPath);
                assert_eq!((iterations, budget), (1, 1));
                assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!sprint.task(1).unwrap().critical);
    }

    #[test]
    fn test_critical_path_visit_budget_exceeded() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(make_task(1, "first", 1)).unwrap();
        sprint
            .add_task(make_task(2, "second", 1).with_predecessor(1))
            .unwrap();
        level(&mut sprint, dt(6, 8)).unwrap();

        let config = LevelingConfig {
            critical_budget_multiplier: 0,
            ..LevelingConfig::default()
        };
        let err = mark_critical_path(&mut sprint, &config).unwrap_err();
        assert!(matches!(
            &err,
            SchedulingError::DependencyLoop {
                phase: LoopPhase::CriticalPath,
                iterations: 1,
                budget: 0,
                tasks,
            } if tasks.len() == 1 && tasks[0].id == 1
        ));
    }
}
