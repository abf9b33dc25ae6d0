//! Local leveling rules.
//!
//! Each rule looks at one task and its immediate neighbourhood (predecessors,
//! parent, children, dependent ancestor) and may move it. Preconditions make
//! the rules mutually exclusive per task kind:
//!
//! | rule | mode      | shape  | dependencies                      |
//! |------|-----------|--------|-----------------------------------|
//! | 1    | manual    | leaf   | -                                 |
//! | 2    | automatic | leaf   | none on task or ancestors         |
//! | 3    | automatic | leaf   | direct, with predecessor finishes |
//! | 4    | automatic | parent | no direct dependency              |
//! | 5    | automatic | parent | direct dependency                 |
//! | 6    | automatic | leaf   | none direct, some ancestor has    |
//!
//! Rule 2 also seeds any automatic leaf that has no start yet, so every
//! automatic leaf enters the loop with a position and cycles keep moving
//! until the pass budget runs out.

use chrono::{Duration, NaiveDateTime};

use crate::config::LevelingConfig;
use crate::graph::{TaskGraph, TaskIdx};
use crate::log_changes;
use crate::logging::case_row;
use crate::models::Task;
use crate::sprint::Sprint;

/// The leveling rules, in application order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rule {
    /// Manual leaf without duration gets one from its work.
    ManualDuration,
    /// Independent automatic leaf starts at the current start time.
    RootStart,
    /// Automatic leaf starts after its latest predecessor.
    DependencyStart,
    /// Parent without dependency spans its children.
    Aggregate,
    /// Parent with dependency reconciles it with its children.
    MixedAggregate,
    /// Leaf under a dependent ancestor starts with that ancestor.
    InheritedStart,
}

impl Rule {
    pub const ORDER: [Rule; 6] = [
        Rule::ManualDuration,
        Rule::RootStart,
        Rule::DependencyStart,
        Rule::Aggregate,
        Rule::MixedAggregate,
        Rule::InheritedStart,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Rule::ManualDuration => "1",
            Rule::RootStart => "2",
            Rule::DependencyStart => "3",
            Rule::Aggregate => "4",
            Rule::MixedAggregate => "5",
            Rule::InheritedStart => "6",
        }
    }
}

/// Read-only inputs shared by all rule applications of a run.
pub(crate) struct RuleContext<'a> {
    pub graph: &'a TaskGraph,
    pub config: &'a LevelingConfig,
    pub current_start: NaiveDateTime,
}

impl RuleContext<'_> {
    /// Apply `rule` to the task at `idx`. Returns whether the task changed.
    pub fn apply(&self, rule: Rule, sprint: &mut Sprint, idx: TaskIdx) -> bool {
        let changed = match rule {
            Rule::ManualDuration => self.manual_duration(sprint, idx),
            Rule::RootStart => self.root_start(sprint, idx),
            Rule::DependencyStart => self.dependency_start(sprint, idx),
            Rule::Aggregate => self.aggregate(sprint, idx, false),
            Rule::MixedAggregate => self.aggregate(sprint, idx, true),
            Rule::InheritedStart => self.inherited_start(sprint, idx),
        };
        if changed {
            log_changes!(
                self.config.verbosity,
                "{}",
                case_row(rule.label(), "apply", sprint.task_at(idx))
            );
        }
        changed
    }

    fn is_automatic_leaf(&self, task: &Task, idx: TaskIdx) -> bool {
        !task.is_manual() && self.graph.is_leaf(idx)
    }

    fn manual_duration(&self, sprint: &mut Sprint, idx: TaskIdx) -> bool {
        let task = sprint.task_at(idx);
        if !task.is_manual() || !self.graph.is_leaf(idx) {
            return false;
        }
        let calendar = sprint.calendar_for(task);
        let needs_duration = match task.duration {
            None => true,
            Some(d) => d == Duration::zero() && !task.milestone,
        };
        let duration = if task.milestone {
            Some(Duration::zero())
        } else if needs_duration {
            Some(sprint.duration_from_work(task, self.config.duration_tick))
        } else {
            task.duration
        };
        let finish = match (task.start, duration) {
            (Some(start), _) if task.milestone => Some(start),
            (Some(start), Some(d)) if needs_duration || task.finish.is_none() => {
                Some(calendar.finish(start, d))
            }
            _ => task.finish,
        };
        if duration == task.duration && finish == task.finish {
            return false;
        }

        let task = sprint.task_at_mut(idx);
        task.duration = duration;
        task.finish = finish;
        true
    }

    fn root_start(&self, sprint: &mut Sprint, idx: TaskIdx) -> bool {
        let task = sprint.task_at(idx);
        if !self.is_automatic_leaf(task, idx) {
            return false;
        }
        let independent = !self.graph.has_hierarchical_dependencies(idx)
            && self
                .graph
                .parent(idx)
                .map_or(true, |p| sprint.task_at(p).start.is_none());
        if !independent && task.start.is_some() {
            return false;
        }
        if sprint
            .calendar_for(task)
            .equivalent(Some(self.current_start), task.start)
        {
            return false;
        }
        self.set_start(sprint, idx, self.current_start);
        true
    }

    fn dependency_start(&self, sprint: &mut Sprint, idx: TaskIdx) -> bool {
        let task = sprint.task_at(idx);
        if !self.is_automatic_leaf(task, idx) {
            return false;
        }
        let Some(constraint) = self.graph.last_start_constraint(sprint.tasks(), idx) else {
            return false;
        };
        let calendar = sprint.calendar_for(task);
        let start = calendar.next_work_start(constraint);
        if calendar.equivalent(Some(start), task.start) {
            return false;
        }
        self.set_start(sprint, idx, start);
        true
    }

    /// Rules 4 (`with_dependency == false`) and 5.
    fn aggregate(&self, sprint: &mut Sprint, idx: TaskIdx, with_dependency: bool) -> bool {
        let task = sprint.task_at(idx);
        if task.is_manual()
            || self.graph.is_leaf(idx)
            || self.graph.has_direct_dependencies(idx) != with_dependency
        {
            return false;
        }

        let tasks = sprint.tasks();
        let children = self.graph.children(idx);
        let first_child_start = children.iter().filter_map(|&c| tasks[c].start).min();
        let last_child_finish = children.iter().filter_map(|&c| tasks[c].finish).max();
        let start = if with_dependency {
            let constraint = self.graph.last_start_constraint(tasks, idx);
            let first_manual_start = children
                .iter()
                .filter(|&&c| tasks[c].is_manual())
                .filter_map(|&c| tasks[c].start)
                .min();
            // start no earlier than the dependency, but not after the children
            match (first_child_start, constraint) {
                (Some(first), Some(c)) if c <= first => Some(first),
                _ => first_manual_start.or(constraint),
            }
        } else {
            first_child_start
        };

        let calendar = sprint.calendar_for(task);
        let start = start.map(|s| calendar.next_work_start(s));
        let move_start = start.filter(|&s| !calendar.equivalent(Some(s), task.start));
        let move_finish = last_child_finish.filter(|&f| !calendar.equivalent(Some(f), task.finish));

        if let Some(start) = move_start {
            self.set_start(sprint, idx, start);
        }
        if let Some(finish) = move_finish {
            self.set_finish(sprint, idx, finish);
        }
        move_start.is_some() || move_finish.is_some()
    }

    fn inherited_start(&self, sprint: &mut Sprint, idx: TaskIdx) -> bool {
        let task = sprint.task_at(idx);
        if !self.is_automatic_leaf(task, idx) || self.graph.has_direct_dependencies(idx) {
            return false;
        }
        let Some(anchor_start) = self
            .graph
            .dependent_ancestor(idx)
            .and_then(|a| sprint.task_at(a).start)
        else {
            return false;
        };
        let calendar = sprint.calendar_for(task);
        let start = calendar.next_work_start(anchor_start);
        if calendar.equivalent(Some(start), task.start) {
            return false;
        }
        self.set_start(sprint, idx, start);
        true
    }

    /// Move a task's start to the next working instant at or after `at`.
    ///
    /// Milestones collapse to zero length, leaves re-derive duration and
    /// finish from work, parents keep their finish and re-derive duration.
    fn set_start(&self, sprint: &mut Sprint, idx: TaskIdx, at: NaiveDateTime) {
        let task = sprint.task_at(idx);
        let calendar = sprint.calendar_for(task);
        let start = calendar.next_work_start(at);
        let (duration, finish) = if task.milestone {
            (Some(Duration::zero()), Some(start))
        } else if self.graph.is_leaf(idx) {
            let duration = sprint.duration_from_work(task, self.config.duration_tick);
            (Some(duration), Some(calendar.finish(start, duration)))
        } else {
            match task.finish {
                Some(finish) => (Some(calendar.working_duration(start, finish)), Some(finish)),
                None => (task.duration, None),
            }
        };

        let task = sprint.task_at_mut(idx);
        task.start = Some(start);
        task.duration = duration;
        task.finish = finish;
    }

    /// Set a task's finish; parents re-derive their duration.
    fn set_finish(&self, sprint: &mut Sprint, idx: TaskIdx, finish: NaiveDateTime) {
        let task = sprint.task_at(idx);
        let duration = match task.start {
            Some(start) if !self.graph.is_leaf(idx) => {
                Some(sprint.calendar_for(task).working_duration(start, finish))
            }
            _ => task.duration,
        };

        let task = sprint.task_at_mut(idx);
        task.finish = Some(finish);
        task.duration = duration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Resource;
    use chrono::NaiveDate;

    fn dt(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn apply(sprint: &mut Sprint, rule: Rule, id: i64) -> bool {
        let graph = TaskGraph::build(sprint);
        let config = LevelingConfig::default();
        let ctx = RuleContext {
            graph: &graph,
            config: &config,
            current_start: dt(6, 8, 0),
        };
        let idx = sprint.index_of(id).unwrap();
        ctx.apply(rule, sprint, idx)
    }

    #[test]
    fn test_manual_duration_from_work() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint
            .add_resource(
                Resource::new(1, "half")
                    .with_availability(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), 0.5),
            )
            .unwrap();
        sprint
            .add_task(
                Task::new(1, "manual")
                    .with_work(Duration::hours(2))
                    .with_resource(1)
                    .pinned_at(dt(6, 10, 0)),
            )
            .unwrap();

        assert!(apply(&mut sprint, Rule::ManualDuration, 1));
        let task = sprint.task(1).unwrap();
        assert_eq!(task.duration, Some(Duration::hours(4)));
        assert_eq!(task.finish, Some(dt(6, 15, 0)));
        assert_eq!(task.start, Some(dt(6, 10, 0)));

        assert!(!apply(&mut sprint, Rule::ManualDuration, 1));
    }

    #[test]
    fn test_manual_supplied_duration_is_kept() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint
            .add_task(
                Task::new(1, "manual")
                    .with_work(Duration::hours(8))
                    .with_duration(Duration::hours(1))
                    .pinned_at(dt(6, 8, 0)),
            )
            .unwrap();

        assert!(apply(&mut sprint, Rule::ManualDuration, 1));
        let task = sprint.task(1).unwrap();
        assert_eq!(task.duration, Some(Duration::hours(1)));
        assert_eq!(task.finish, Some(dt(6, 9, 0)));
    }

    #[test]
    fn test_manual_zero_work_settles() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint
            .add_task(Task::new(1, "manual").pinned_at(dt(6, 8, 0)))
            .unwrap();

        assert!(apply(&mut sprint, Rule::ManualDuration, 1));
        assert!(!apply(&mut sprint, Rule::ManualDuration, 1));
        assert_eq!(sprint.task(1).unwrap().finish, Some(dt(6, 8, 0)));
    }

    #[test]
    fn test_root_start_anchors_independent_leaf() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint
            .add_task(Task::new(1, "a").with_work(Duration::hours(3)))
            .unwrap();

        assert!(apply(&mut sprint, Rule::RootStart, 1));
        let task = sprint.task(1).unwrap();
        assert_eq!(task.start, Some(dt(6, 8, 0)));
        assert_eq!(task.finish, Some(dt(6, 11, 0)));
        assert_eq!(task.duration, Some(Duration::hours(3)));
        assert!(!apply(&mut sprint, Rule::RootStart, 1));
    }

    #[test]
    fn test_root_start_leaves_positioned_dependent_alone() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "a")).unwrap();
        sprint
            .add_task(Task::new(2, "b").with_predecessor(1).with_start(dt(7, 9, 0)))
            .unwrap();

        assert!(!apply(&mut sprint, Rule::RootStart, 2));
        assert_eq!(sprint.task(2).unwrap().start, Some(dt(7, 9, 0)));
    }

    #[test]
    fn test_dependency_start_follows_latest_predecessor() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "a").with_finish(dt(6, 10, 0))).unwrap();
        sprint.add_task(Task::new(2, "b").with_finish(dt(6, 16, 30))).unwrap();
        sprint
            .add_task(
                Task::new(3, "c")
                    .with_work(Duration::hours(1))
                    .with_predecessor(1)
                    .with_predecessor(2),
            )
            .unwrap();

        assert!(apply(&mut sprint, Rule::DependencyStart, 3));
        let task = sprint.task(3).unwrap();
        assert_eq!(task.start, Some(dt(7, 8, 0)));
        assert_eq!(task.finish, Some(dt(7, 9, 0)));
    }

    #[test]
    fn test_milestone_collapses() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "a").with_finish(dt(6, 12, 0))).unwrap();
        sprint
            .add_task(
                Task::milestone(2, "m")
                    .with_work(Duration::hours(5))
                    .with_predecessor(1),
            )
            .unwrap();

        assert!(apply(&mut sprint, Rule::DependencyStart, 2));
        let task = sprint.task(2).unwrap();
        assert_eq!(task.start, Some(dt(6, 13, 0)));
        assert_eq!(task.finish, task.start);
        assert_eq!(task.duration, Some(Duration::zero()));
    }

    #[test]
    fn test_aggregate_spans_children() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "parent")).unwrap();
        sprint
            .add_task(
                Task::new(2, "a")
                    .with_parent(1)
                    .with_start(dt(6, 9, 0))
                    .with_finish(dt(6, 11, 0)),
            )
            .unwrap();
        sprint
            .add_task(
                Task::new(3, "b")
                    .with_parent(1)
                    .with_start(dt(6, 8, 0))
                    .with_finish(dt(7, 10, 0)),
            )
            .unwrap();

        assert!(apply(&mut sprint, Rule::Aggregate, 1));
        let parent = sprint.task(1).unwrap();
        assert_eq!(parent.start, Some(dt(6, 8, 0)));
        assert_eq!(parent.finish, Some(dt(7, 10, 0)));
        assert_eq!(parent.duration, Some(Duration::minutes(450 + 120)));
        assert!(!apply(&mut sprint, Rule::MixedAggregate, 1));
    }

    #[test]
    fn test_mixed_aggregate_prefers_later_of_dependency_and_children() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "dep").with_finish(dt(6, 14, 0))).unwrap();
        sprint.add_task(Task::new(2, "parent").with_predecessor(1)).unwrap();
        sprint
            .add_task(
                Task::new(3, "child")
                    .with_parent(2)
                    .with_start(dt(6, 8, 0))
                    .with_finish(dt(6, 9, 0)),
            )
            .unwrap();

        // children start before the dependency: the dependency wins
        assert!(apply(&mut sprint, Rule::MixedAggregate, 2));
        assert_eq!(sprint.task(2).unwrap().start, Some(dt(6, 14, 0)));
        assert!(!apply(&mut sprint, Rule::Aggregate, 2));

        // children start after the dependency: the children win
        let child = sprint.task_mut(3).unwrap();
        child.start = Some(dt(7, 8, 0));
        child.finish = Some(dt(7, 9, 0));
        assert!(apply(&mut sprint, Rule::MixedAggregate, 2));
        let parent = sprint.task(2).unwrap();
        assert_eq!(parent.start, Some(dt(7, 8, 0)));
        assert_eq!(parent.finish, Some(dt(7, 9, 0)));
    }

    #[test]
    fn test_mixed_aggregate_manual_child_priority() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "dep").with_finish(dt(7, 8, 0))).unwrap();
        sprint.add_task(Task::new(2, "parent").with_predecessor(1)).unwrap();
        sprint
            .add_task(
                Task::new(3, "manual child")
                    .with_parent(2)
                    .pinned_at(dt(6, 10, 0))
                    .with_finish(dt(6, 11, 0)),
            )
            .unwrap();

        assert!(apply(&mut sprint, Rule::MixedAggregate, 2));
        assert_eq!(sprint.task(2).unwrap().start, Some(dt(6, 10, 0)));
    }

    #[test]
    fn test_inherited_start_uses_dependent_ancestor() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "dep")).unwrap();
        sprint
            .add_task(Task::new(2, "outer").with_predecessor(1).with_start(dt(8, 13, 0)))
            .unwrap();
        sprint.add_task(Task::new(3, "inner").with_parent(2)).unwrap();
        sprint
            .add_task(Task::new(4, "leaf").with_parent(3).with_work(Duration::hours(1)))
            .unwrap();

        assert!(apply(&mut sprint, Rule::InheritedStart, 4));
        let leaf = sprint.task(4).unwrap();
        assert_eq!(leaf.start, Some(dt(8, 13, 0)));
        assert_eq!(leaf.finish, Some(dt(8, 14, 0)));
        assert!(!apply(&mut sprint, Rule::InheritedStart, 4));
    }

    #[test]
    fn test_rules_skip_manual_tasks() {
        let mut sprint = Sprint::with_default_calendar("s");
        sprint.add_task(Task::new(1, "dep").with_finish(dt(9, 8, 0))).unwrap();
        sprint
            .add_task(Task::new(2, "manual").with_predecessor(1).pinned_at(dt(6, 8, 0)))
            .unwrap();

        for rule in [Rule::RootStart, Rule::DependencyStart, Rule::InheritedStart] {
            assert!(!apply(&mut sprint, rule, 2));
        }
        assert_eq!(sprint.task(2).unwrap().start, Some(dt(6, 8, 0)));
    }
}
