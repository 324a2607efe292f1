//! # Schedule Expressions
//!
//! Parses the `sync_interval` setting into something a background executor
//! can loop on. Two families of expressions are accepted:
//!
//! - Five-field cron: `minute hour day-of-month month day-of-week`, each
//!   field `*`, `*/n`, `a`, `a-b`, `a-b/n`, `a/n` or a comma list of those.
//!   Day-of-week runs 0-6 from Sunday; 7 is accepted as Sunday too.
//! - Fixed intervals: `every 2 hours`, `every minute`, `30m`, `2h`, `1d`, `45s`.
//!
//! All evaluation happens in UTC.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use core_runtime::schedule::Schedule;
//!
//! let schedule = Schedule::parse("0 */2 * * *").unwrap();
//! let after = Utc.with_ymd_and_hms(2024, 5, 1, 9, 15, 0).unwrap();
//! assert_eq!(
//!     schedule.next_after(after),
//!     Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
//! );
//! ```

use std::fmt;

use bridge_traits::TaskSchedule;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};

use crate::error::{Error, Result};

/// Cron searches give up after this many days without a match.
const SEARCH_HORIZON_DAYS: i64 = 366 * 4 + 1;

/// A parsed recurring schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    expression: String,
    kind: ScheduleKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScheduleKind {
    Cron(CronFields),
    Every(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CronFields {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl Schedule {
    /// Parse a cron or interval expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(invalid(expression, "expression is empty"));
        }

        let kind = if trimmed.split_whitespace().count() == 5 {
            ScheduleKind::Cron(CronFields::parse(trimmed)?)
        } else {
            ScheduleKind::Every(parse_interval(trimmed)?)
        };

        Ok(Self {
            expression: trimmed.to_string(),
            kind,
        })
    }

    /// The expression this schedule was parsed from.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Fixed period for interval schedules, `None` for cron.
    pub fn interval(&self) -> Option<Duration> {
        match &self.kind {
            ScheduleKind::Every(period) => Some(*period),
            ScheduleKind::Cron(_) => None,
        }
    }

    /// Next fire time strictly after `after`.
    ///
    /// Returns `None` when a cron expression names a date that never occurs
    /// (for example `0 0 31 2 *`).
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Every(period) => after.checked_add_signed(*period),
            ScheduleKind::Cron(fields) => fields.next_after(after),
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl std::str::FromStr for Schedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TaskSchedule for Schedule {
    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Schedule::next_after(self, after)
    }

    fn describe(&self) -> String {
        self.expression.clone()
    }
}

impl CronFields {
    fn parse(expression: &str) -> Result<Self> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = parts.as_slice() else {
            return Err(invalid(expression, "cron expressions need five fields"));
        };

        let mut days_of_week = parse_field(expression, dow, 0, 7, "day-of-week")?;
        // 7 is an alias for Sunday
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes: parse_field(expression, minute, 0, 59, "minute")?,
            hours: parse_field(expression, hour, 0, 23, "hour")?,
            days_of_month: parse_field(expression, dom, 1, 31, "day-of-month")?,
            months: parse_field(expression, month, 1, 12, "month")?,
            days_of_week,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        let dom = has_bit(self.days_of_month, date.day());
        let dow = has_bit(self.days_of_week, date.weekday().num_days_from_sunday());

        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.naive_utc().with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let limit = start + Duration::days(SEARCH_HORIZON_DAYS);
        let mut candidate = start;

        while candidate <= limit {
            let date = candidate.date();

            if !has_bit(self.months, date.month()) {
                candidate = first_of_next_month(date)?;
                continue;
            }

            if !self.matches_day(date) {
                candidate = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            if !has_bit(self.hours, candidate.hour()) {
                candidate = start_of_hour(candidate)? + Duration::hours(1);
                continue;
            }

            if !has_bit(self.minutes, candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            return Some(candidate.and_utc());
        }

        None
    }
}

fn has_bit(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn start_of_hour(at: NaiveDateTime) -> Option<NaiveDateTime> {
    at.with_minute(0)?.with_second(0)
}

fn parse_field(expression: &str, field: &str, min: u32, max: u32, name: &str) -> Result<u64> {
    let mut mask = 0u64;

    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(expression, format!("bad {name} step '{step}'")))?;
                if step == 0 {
                    return Err(invalid(expression, format!("{name} step must be positive")));
                }
                (range, Some(step))
            }
            None => (part, None),
        };

        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (
                parse_value(expression, low, name)?,
                parse_value(expression, high, name)?,
            )
        } else {
            let value = parse_value(expression, range, name)?;
            // `5/15` runs from 5 to the end of the range
            if step.is_some() {
                (value, max)
            } else {
                (value, value)
            }
        };

        if low < min || high > max || low > high {
            return Err(invalid(
                expression,
                format!("{name} range {low}-{high} outside {min}-{max}"),
            ));
        }

        let step = step.unwrap_or(1) as usize;
        for value in (low..=high).step_by(step) {
            mask |= 1u64 << value;
        }
    }

    Ok(mask)
}

fn parse_value(expression: &str, value: &str, name: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| invalid(expression, format!("bad {name} value '{value}'")))
}

fn parse_interval(expression: &str) -> Result<Duration> {
    let lowered = expression.to_ascii_lowercase();
    let body = lowered
        .strip_prefix("every ")
        .map(str::trim)
        .unwrap_or(lowered.as_str());

    let tokens: Vec<&str> = body.split_whitespace().collect();
    let (count, unit) = match tokens.as_slice() {
        [count, unit] => {
            let count: i64 = count
                .parse()
                .map_err(|_| invalid(expression, format!("bad interval count '{count}'")))?;
            (count, *unit)
        }
        [single] if lowered.starts_with("every ") && single.chars().all(char::is_alphabetic) => {
            (1, *single)
        }
        [single] => {
            let split = single
                .find(|c: char| !c.is_ascii_digit())
                .ok_or_else(|| invalid(expression, "interval is missing a unit"))?;
            let (count, unit) = single.split_at(split);
            let count: i64 = count
                .parse()
                .map_err(|_| invalid(expression, format!("bad interval count '{count}'")))?;
            (count, unit)
        }
        _ => return Err(invalid(expression, "unrecognized schedule expression")),
    };

    if count <= 0 {
        return Err(invalid(expression, "interval must be positive"));
    }

    let period = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::seconds(count),
        "m" | "min" | "mins" | "minute" | "minutes" => Duration::minutes(count),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::hours(count),
        "d" | "day" | "days" => Duration::days(count),
        other => return Err(invalid(expression, format!("unknown interval unit '{other}'"))),
    };

    Ok(period)
}

fn invalid(expression: &str, message: impl Into<String>) -> Error {
    Error::InvalidSchedule {
        expression: expression.to_string(),
        message: message.into(),
    }
}
