//! Leveling driver.

use chrono::NaiveDateTime;
use std::fmt;
use thiserror::Error;

use crate::config::LevelingConfig;
use crate::critical_path::mark_with_graph;
use crate::diagnostics::{LevelingReport, TaskRef};
use crate::graph::TaskGraph;
use crate::logging::case_header;
use crate::resource_dependencies::synthesize_resource_dependency;
use crate::sprint::Sprint;
use crate::validation;
use crate::{log_changes, log_checks, log_debug};

use super::rules::{Rule, RuleContext};
use super::state::LevelingState;

/// Which bounded loop gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Leveling,
    ResourceSynthesis,
    CriticalPath,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopPhase::Leveling => "leveling",
            LoopPhase::ResourceSynthesis => "resource synthesis",
            LoopPhase::CriticalPath => "critical path",
        };
        f.write_str(name)
    }
}

/// Errors that abort a leveling run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulingError {
    #[error("Could not finish {phase} after {iterations} iterations (budget {budget}), assuming dependency loop involving {}", TaskRef::list(.tasks))]
    DependencyLoop {
        phase: LoopPhase,
        iterations: usize,
        budget: usize,
        /// Tasks still changing when the budget ran out.
        tasks: Vec<TaskRef>,
    },
    #[error("Project span of {span_days} days exceeds the limit of {limit_days} days, assuming dependency loop involving {}", TaskRef::list(.tasks))]
    ProjectSpanExceeded {
        span_days: i64,
        limit_days: i64,
        tasks: Vec<TaskRef>,
    },
}

/// Level a sprint with the default configuration.
pub fn level(
    sprint: &mut Sprint,
    current_start: NaiveDateTime,
) -> Result<LevelingReport, SchedulingError> {
    ResourceLeveler::default().level(sprint, current_start)
}

/// Fixed-point scheduler for a sprint.
///
/// Holds configuration only; all run state is created per call.
#[derive(Clone, Debug, Default)]
pub struct ResourceLeveler {
    config: LevelingConfig,
}

impl ResourceLeveler {
    pub fn new(config: LevelingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LevelingConfig {
        &self.config
    }

    /// Schedule every task of `sprint`.
    ///
    /// 1. apply the leveling rules until no task changes
    /// 2. add one relation between overlapping same-resource tasks; if one
    ///    was added, go back to 1
    /// 3. collect diagnostics for missing values and violated relations
    /// 4. mark the critical path
    /// 5. set the sprint's start and end
    ///
    /// On error the graph keeps whatever values the aborted loop reached and
    /// the sprint bounds are left untouched.
    pub fn level(
        &self,
        sprint: &mut Sprint,
        current_start: NaiveDateTime,
    ) -> Result<LevelingReport, SchedulingError> {
        let verbosity = self.config.verbosity;
        let mut graph = TaskGraph::build(sprint);
        let mut report = LevelingReport {
            diagnostics: validation::unresolved_predecessors(sprint, &graph),
            ..LevelingReport::default()
        };

        log_changes!(verbosity, "Leveling {} tasks from {}", sprint.len(), current_start);
        log_changes!(verbosity, "{}", case_header());

        let cascade_budget = self.config.cascade_budget(sprint.len());
        loop {
            let state = self.level_until_stable(sprint, &graph, current_start)?;
            report.passes += state.passes;
            report.checks += state.checks;

            let Some(relation) = synthesize_resource_dependency(sprint, &mut graph, verbosity)
            else {
                break;
            };
            report.synthesized.push(relation);
            report.cascades += 1;
            if report.cascades > cascade_budget {
                let tasks = [relation.successor, relation.predecessor]
                    .iter()
                    .filter_map(|&id| sprint.task(id))
                    .map(TaskRef::from)
                    .collect();
                return Err(SchedulingError::DependencyLoop {
                    phase: LoopPhase::ResourceSynthesis,
                    iterations: report.cascades,
                    budget: cascade_budget,
                    tasks,
                });
            }
        }

        report
            .diagnostics
            .extend(validation::check_missing_values(sprint));
        report
            .diagnostics
            .extend(validation::check_relations(sprint, &graph));
        for diagnostic in &report.diagnostics {
            log_checks!(verbosity, "{}", diagnostic);
        }

        let critical = mark_with_graph(sprint, &graph, &self.config)?;
        report.checks += critical.checks;
        report.critical = critical.critical;

        sprint.start = sprint.earliest_start();
        sprint.end = sprint.latest_finish();
        log_changes!(
            verbosity,
            "Sprint '{}' start {:?} end {:?} after {} passes, {} resource relations",
            sprint.name,
            sprint.start,
            sprint.end,
            report.passes,
            report.synthesized.len()
        );
        Ok(report)
    }

    /// Apply all rules to all tasks until a pass changes nothing.
    fn level_until_stable(
        &self,
        sprint: &mut Sprint,
        graph: &TaskGraph,
        current_start: NaiveDateTime,
    ) -> Result<LevelingState, SchedulingError> {
        let verbosity = self.config.verbosity;
        let budget = self.config.iteration_budget(sprint.len());
        let mut state = LevelingState::new(current_start);
        let ctx = RuleContext {
            graph,
            config: &self.config,
            current_start: state.current_start,
        };

        loop {
            state.begin_pass();
            for rule in Rule::ORDER {
                for idx in 0..sprint.len() {
                    let changed = ctx.apply(rule, sprint, idx);
                    state.record(idx, changed);
                }
            }
            state.passes += 1;
            log_debug!(
                verbosity,
                "Iteration {}/{}: {} task(s) changed",
                state.passes,
                budget,
                state.changed.len()
            );

            if state.is_stable() {
                return Ok(state);
            }
            self.check_project_span(sprint, &state)?;
            if state.passes >= budget {
                return Err(SchedulingError::DependencyLoop {
                    phase: LoopPhase::Leveling,
                    iterations: state.passes,
                    budget,
                    tasks: state.changed_tasks(sprint),
                });
            }
        }
    }

    fn check_project_span(
        &self,
        sprint: &Sprint,
        state: &LevelingState,
    ) -> Result<(), SchedulingError> {
        let Some(limit) = self.config.max_project_span else {
            return Ok(());
        };
        if let (Some(start), Some(end)) = (sprint.earliest_start(), sprint.latest_finish()) {
            let span = end - start;
            if span > limit {
                return Err(SchedulingError::ProjectSpanExceeded {
                    span_days: span.num_days(),
                    limit_days: limit.num_days(),
                    tasks: state.changed_tasks(sprint),
                });
            }
        }
        Ok(())
    }
}
