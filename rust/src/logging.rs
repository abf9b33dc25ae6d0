//! Logging macros with verbosity level control.
//!
//! Provides zero-cost logging when disabled (verbosity=0):
//! - 0: SILENT (only errors)
//! - 1: CHANGES (rule applications, synthesized relations, sprint bounds)
//! - 2: CHECKS (validator findings, pass summaries)
//! - 3: DEBUG (iteration counters, critical path sets)

use crate::models::Task;

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log at CHANGES level (verbosity >= 1).
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!($($arg)*);
        }
    };
}

fn format_case(
    rule: &str,
    id: &str,
    name: &str,
    method: &str,
    start: &str,
    finish: &str,
    duration: &str,
) -> String {
    format!(
        "[{:<2}] [{:>3}][{:<20}][{:<9}][{:>19}][{:>19}][{:>12}]",
        rule, id, name, method, start, finish, duration
    )
}

/// Header row matching [`case_row`].
pub fn case_header() -> String {
    format_case("#", "ID", "Task Name", "Method", "Start", "Finish", "Duration")
}

/// One table row describing a rule applied to a task.
pub fn case_row(rule: &str, method: &str, task: &Task) -> String {
    let stamp = |t: Option<chrono::NaiveDateTime>| {
        t.map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string())
    };
    let duration = task.duration.map_or_else(
        || "-".to_string(),
        |d| format!("{}h{:02}m{:02}s", d.num_hours(), d.num_minutes() % 60, d.num_seconds() % 60),
    );
    format_case(
        rule,
        &task.id.to_string(),
        &task.name,
        method,
        &stamp(task.start),
        &stamp(task.finish),
        &duration,
    )
}
