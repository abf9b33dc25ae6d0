//! Configuration for the leveling engine.

use chrono::Duration;

use crate::logging::VERBOSITY_SILENT;

/// Tunables for a leveling run.
#[derive(Clone, Debug)]
pub struct LevelingConfig {
    /// Logging verbosity (0-3, see [`crate::logging`]).
    pub verbosity: u8,
    /// Granularity of durations derived from work and availability.
    pub duration_tick: Duration,
    /// Pass budget is `max(n², n * loop_factor)` for `n` tasks.
    pub loop_factor: usize,
    /// Critical path visits per pass are bounded by the pass budget times this.
    pub critical_budget_multiplier: usize,
    /// Overrides the critical path pass budget, which defaults to the leveling one.
    pub max_critical_passes: Option<usize>,
    /// Overrides the resource synthesis cascade budget.
    pub max_cascades: Option<usize>,
    /// Abort when the scheduled span grows past this while leveling.
    pub max_project_span: Option<Duration>,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            verbosity: VERBOSITY_SILENT,
            duration_tick: Duration::seconds(6),
            loop_factor: 10,
            critical_budget_multiplier: 10,
            max_critical_passes: None,
            max_cascades: None,
            max_project_span: None,
        }
    }
}

impl LevelingConfig {
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_max_project_span(mut self, span: Duration) -> Self {
        self.max_project_span = Some(span);
        self
    }

    /// Maximum number of leveling passes for `task_count` tasks.
    pub fn iteration_budget(&self, task_count: usize) -> usize {
        let n = task_count.max(1);
        (n * n).max(n * self.loop_factor)
    }

    /// Maximum number of critical path passes.
    pub fn critical_pass_budget(&self, task_count: usize) -> usize {
        self.max_critical_passes
            .unwrap_or_else(|| self.iteration_budget(task_count))
    }

    /// Maximum number of tasks visited in one critical path pass.
    pub fn critical_visit_budget(&self, task_count: usize) -> usize {
        self.critical_pass_budget(task_count)
            .saturating_mul(self.critical_budget_multiplier)
    }

    /// Maximum number of synthesize-and-relevel cascades: one per possible pair, plus one.
    pub fn cascade_budget(&self, task_count: usize) -> usize {
        self.max_cascades
            .unwrap_or(task_count * task_count.saturating_sub(1) / 2 + 1)
    }
}
