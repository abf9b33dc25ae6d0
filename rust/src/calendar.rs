//! Working-time calendars.
//!
//! The leveling engine only depends on the [`Calendar`] contract. [`WorkCalendar`]
//! is the concrete working-week implementation: a set of working weekdays, a
//! list of working periods per day and a set of holidays.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// How many days `WorkCalendar` scans forward looking for working time.
const MAX_SCAN_DAYS: u32 = 3660;

/// Working-day/working-hour oracle consumed by the engine.
pub trait Calendar: fmt::Debug + Send + Sync {
    /// Smallest working instant at or after `t`.
    fn next_work_start(&self, t: NaiveDateTime) -> NaiveDateTime;

    /// Instant reached after accumulating `duration` of working time from `start`.
    fn finish(&self, start: NaiveDateTime, duration: Duration) -> NaiveDateTime;

    /// Working time elapsed between `start` and `finish`, zero if `finish <= start`.
    fn working_duration(&self, start: NaiveDateTime, finish: NaiveDateTime) -> Duration;

    /// Whether two timestamps denote the same scheduling point.
    ///
    /// The end of a working period is the same point as the start of the next
    /// one. Two `None`s are equivalent, `None` and `Some` never are.
    fn equivalent(&self, a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a == b || self.next_work_start(a) == b || a == self.next_work_start(b)
            }
            _ => false,
        }
    }
}

/// Calendar handle shared between the sprint and its resources.
pub type SharedCalendar = Arc<dyn Calendar>;

/// Errors raised when building a [`WorkCalendar`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    #[error("Calendar requires at least one working day")]
    NoWorkingDays,
    #[error("Calendar requires at least one working period")]
    NoWorkingPeriods,
    #[error("Invalid working period {start}-{end}: periods must be non-empty, sorted and disjoint")]
    InvalidPeriod { start: NaiveTime, end: NaiveTime },
}

/// Serializable description of a [`WorkCalendar`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkCalendarConfig {
    pub working_days: Vec<Weekday>,
    /// Working periods of a working day, as `[start, end)` wall-clock times.
    pub periods: Vec<(NaiveTime, NaiveTime)>,
    pub holidays: Vec<NaiveDate>,
}

impl Default for WorkCalendarConfig {
    fn default() -> Self {
        Self {
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            periods: vec![(hm(8, 0), hm(12, 0)), (hm(13, 0), hm(16, 30))],
            holidays: Vec::new(),
        }
    }
}

impl WorkCalendarConfig {
    pub fn new<I, J>(working_days: I, holidays: J) -> Self
    where
        I: IntoIterator<Item = Weekday>,
        J: IntoIterator<Item = NaiveDate>,
    {
        Self {
            working_days: working_days.into_iter().collect(),
            holidays: holidays.into_iter().collect(),
            ..Self::default()
        }
    }
}

/// Wall-clock time from hours and minutes.
fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::default() + Duration::minutes(i64::from(hour * 60 + minute))
}

/// Working-week calendar.
///
/// Working time is half-open inside each period, so the end of a period is not
/// itself a working instant: `next_work_start(12:00)` is `13:00` with the
/// default periods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkCalendar {
    working_days: FxHashSet<Weekday>,
    periods: Vec<(NaiveTime, NaiveTime)>,
    holidays: FxHashSet<NaiveDate>,
}

impl Default for WorkCalendar {
    /// Monday to Friday, 08:00-12:00 and 13:00-16:30, no holidays.
    fn default() -> Self {
        let config = WorkCalendarConfig::default();
        Self {
            working_days: config.working_days.into_iter().collect(),
            periods: config.periods,
            holidays: FxHashSet::default(),
        }
    }
}

impl WorkCalendar {
    pub fn from_config(config: &WorkCalendarConfig) -> Result<Self, CalendarError> {
        if config.working_days.is_empty() {
            return Err(CalendarError::NoWorkingDays);
        }
        if config.periods.is_empty() {
            return Err(CalendarError::NoWorkingPeriods);
        }
        let mut previous_end: Option<NaiveTime> = None;
        for &(start, end) in &config.periods {
            if start >= end || previous_end.is_some_and(|prev| start < prev) {
                return Err(CalendarError::InvalidPeriod { start, end });
            }
            previous_end = Some(end);
        }

        Ok(Self {
            working_days: config.working_days.iter().copied().collect(),
            periods: config.periods.clone(),
            holidays: config.holidays.iter().copied().collect(),
        })
    }

    /// Default working periods with custom working days and holidays.
    pub fn custom<I, J>(working_days: I, holidays: J) -> Result<Self, CalendarError>
    where
        I: IntoIterator<Item = Weekday>,
        J: IntoIterator<Item = NaiveDate>,
    {
        Self::from_config(&WorkCalendarConfig::new(working_days, holidays))
    }

    pub fn to_config(&self) -> WorkCalendarConfig {
        const WEEK: [Weekday; 7] = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let mut holidays: Vec<NaiveDate> = self.holidays.iter().copied().collect();
        holidays.sort_unstable();
        WorkCalendarConfig {
            working_days: WEEK
                .into_iter()
                .filter(|day| self.working_days.contains(day))
                .collect(),
            periods: self.periods.clone(),
            holidays,
        }
    }

    pub fn add_holiday(&mut self, date: NaiveDate) {
        self.holidays.insert(date);
    }

    pub fn add_holidays<I>(&mut self, dates: I)
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.holidays.extend(dates);
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    pub fn periods(&self) -> &[(NaiveTime, NaiveTime)] {
        &self.periods
    }

    /// Working time in one full working day.
    pub fn daily_working_time(&self) -> Duration {
        self.periods
            .iter()
            .fold(Duration::zero(), |acc, &(start, end)| acc + (end - start))
    }

    /// The working period containing `t`, or the first one after it.
    ///
    /// Returns `(from, until)` where `from = max(t, period start)`.
    fn period_at_or_after(&self, t: NaiveDateTime) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let mut date = t.date();
        let mut time = t.time();
        for _ in 0..MAX_SCAN_DAYS {
            if self.is_working_day(date) {
                for &(start, end) in &self.periods {
                    if time < end {
                        return Some((date.and_time(start.max(time)), date.and_time(end)));
                    }
                }
            }
            date = date.succ_opt()?;
            time = NaiveTime::default();
        }
        None
    }
}

impl Calendar for WorkCalendar {
    fn next_work_start(&self, t: NaiveDateTime) -> NaiveDateTime {
        self.period_at_or_after(t).map_or(t, |(from, _)| from)
    }

    fn finish(&self, start: NaiveDateTime, duration: Duration) -> NaiveDateTime {
        if duration <= Duration::zero() {
            return start;
        }
        let mut remaining = duration;
        let mut cursor = start;
        while let Some((from, until)) = self.period_at_or_after(cursor) {
            let available = until - from;
            if remaining <= available {
                return from + remaining;
            }
            remaining = remaining - available;
            cursor = until;
        }
        cursor
            .checked_add_signed(remaining)
            .unwrap_or(NaiveDateTime::MAX)
    }

    fn working_duration(&self, start: NaiveDateTime, finish: NaiveDateTime) -> Duration {
        let mut total = Duration::zero();
        let mut cursor = start;
        while cursor < finish {
            let Some((from, until)) = self.period_at_or_after(cursor) else {
                break;
            };
            if from >= finish {
                break;
            }
            total = total + (until.min(finish) - from);
            cursor = until;
        }
        total
    }
}
