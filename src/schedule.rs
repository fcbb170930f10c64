//! Cron schedules for the daily digest
//!
//! Expressions have six fields: `second minute hour day-of-month month day-of-week`.
//! Each field accepts `*`, `?` (same as `*`), single values, lists (`1,15`),
//! ranges (`MON-FRI`), and steps (`*/15`, `10-40/10`, `5/20`). Months and
//! weekdays also take three-letter names; day-of-week `7` is Sunday like `0`.
//! The shorthands `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//! `@midnight` and `@hourly` are accepted too.
//!
//! When both day-of-month and day-of-week are restricted, a day matches if
//! either does (classic cron behavior).
//!
//! # Example
//!
//! ```rust
//! use hn_digest::schedule::CronSchedule;
//! use chrono::{TimeZone, Utc};
//!
//! let schedule = CronSchedule::parse("0 30 9 * * MON-FRI").unwrap();
//! // Saturday morning
//! let now = Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap();
//! let next = schedule.next_after(&now).unwrap();
//! assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 11, 9, 30, 0).unwrap());
//! ```

use crate::error::{Error, Result};
use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Timelike,
};
use std::fmt;
use std::str::FromStr;

const CONFIG_KEY: &str = "scheduler.cron";

/// Search horizon for [`CronSchedule::next_after`]
const MAX_YEARS_AHEAD: i32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

#[derive(Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of `names[0]`
    names_base: u32,
}

const SECONDS: FieldSpec = FieldSpec {
    name: "second",
    min: 0,
    max: 59,
    names: &[],
    names_base: 0,
};
const MINUTES: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: &[],
    names_base: 0,
};
const HOURS: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: &[],
    names_base: 0,
};
const DAYS_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
    names_base: 0,
};
const MONTHS: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: &MONTH_NAMES,
    names_base: 1,
};
// 7 is accepted and folded onto Sunday after parsing
const DAYS_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &WEEKDAY_NAMES,
    names_base: 0,
};

/// A parsed six-field cron expression
#[derive(Clone, PartialEq, Eq)]
pub struct CronSchedule {
    expression: String,
    seconds: u64,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    /// Parse a cron expression
    ///
    /// # Errors
    /// Returns [`Error::Config`] keyed `scheduler.cron` if the expression is malformed
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        let expanded = match trimmed.to_ascii_lowercase().as_str() {
            "@yearly" | "@annually" => "0 0 0 1 1 *",
            "@monthly" => "0 0 0 1 * *",
            "@weekly" => "0 0 0 * * 0",
            "@daily" | "@midnight" => "0 0 0 * * *",
            "@hourly" => "0 0 * * * *",
            _ => trimmed,
        };

        let fields: Vec<&str> = expanded.split_whitespace().collect();
        if fields.len() != 6 {
            return Err(Error::config(
                format!(
                    "cron expression '{}' has {} fields, expected 6 (sec min hour dom month dow)",
                    trimmed,
                    fields.len()
                ),
                CONFIG_KEY,
            ));
        }

        let mut days_of_week = parse_field(fields[5], DAYS_OF_WEEK)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            expression: trimmed.to_string(),
            seconds: parse_field(fields[0], SECONDS)?,
            minutes: parse_field(fields[1], MINUTES)?,
            hours: parse_field(fields[2], HOURS)?,
            days_of_month: parse_field(fields[3], DAYS_OF_MONTH)?,
            months: parse_field(fields[4], MONTHS)?,
            days_of_week,
            day_of_month_restricted: !is_wildcard(fields[3]),
            day_of_week_restricted: !is_wildcard(fields[5]),
        })
    }

    /// The expression as written
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First matching instant strictly after `after`, in `after`'s time zone
    ///
    /// Local times that fall into a DST gap are skipped; for repeated local
    /// times the earliest instant later than `after` wins. Returns `None` if
    /// nothing matches within five years (e.g. `0 0 0 30 2 *`).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let start = after.naive_local().with_nanosecond(0)? + TimeDelta::seconds(1);
        let horizon = start.year() + MAX_YEARS_AHEAD;
        let mut candidate = start;

        while candidate.year() <= horizon {
            if !bit(self.months, candidate.month()) {
                candidate = first_of_next_month(candidate.date())?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = candidate.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !bit(self.hours, candidate.hour()) {
                candidate = candidate.with_minute(0)?.with_second(0)? + TimeDelta::hours(1);
                continue;
            }
            if !bit(self.minutes, candidate.minute()) {
                candidate = candidate.with_second(0)? + TimeDelta::minutes(1);
                continue;
            }
            if !bit(self.seconds, candidate.second()) {
                candidate += TimeDelta::seconds(1);
                continue;
            }

            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(instant) if instant > *after => return Some(instant),
                LocalResult::Ambiguous(earliest, latest) => {
                    if earliest > *after {
                        return Some(earliest);
                    }
                    if latest > *after {
                        return Some(latest);
                    }
                }
                _ => {}
            }
            candidate += TimeDelta::seconds(1);
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = bit(self.days_of_month, date.day());
        let dow = bit(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.day_of_month_restricted && self.day_of_week_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for CronSchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn bit(mask: u64, value: u32) -> bool {
    mask & (1u64 << value) != 0
}

fn is_wildcard(field: &str) -> bool {
    field == "*" || field == "?"
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

fn field_error(field: &str, spec: FieldSpec, detail: &str) -> Error {
    Error::config(
        format!("invalid {} field '{}': {}", spec.name, field, detail),
        CONFIG_KEY,
    )
}

fn parse_field(field: &str, spec: FieldSpec) -> Result<u64> {
    let mut mask = 0u64;
    for part in field.split(',') {
        mask |= parse_part(part, spec).map_err(|detail| field_error(field, spec, &detail))?;
    }
    Ok(mask)
}

fn parse_part(part: &str, spec: FieldSpec) -> std::result::Result<u64, String> {
    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step
                .parse()
                .map_err(|_| format!("step '{}' is not a number", step))?;
            if step == 0 {
                return Err("step must be at least 1".to_string());
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (low, high) = if is_wildcard(range) {
        (spec.min, spec.max)
    } else if let Some((low, high)) = range.split_once('-') {
        (parse_value(low, spec)?, parse_value(high, spec)?)
    } else {
        let value = parse_value(range, spec)?;
        // `5/20` runs from 5 to the field maximum
        if step.is_some() { (value, spec.max) } else { (value, value) }
    };

    if low > high {
        return Err(format!("range {}-{} is reversed", low, high));
    }

    let step = step.unwrap_or(1);
    let mut mask = 0u64;
    let mut value = low;
    while value <= high {
        mask |= 1u64 << value;
        value += step;
    }
    Ok(mask)
}

fn parse_value(token: &str, spec: FieldSpec) -> std::result::Result<u32, String> {
    if token.is_empty() {
        return Err("empty value".to_string());
    }

    let value = match token.parse::<u32>() {
        Ok(value) => value,
        Err(_) => spec
            .names
            .iter()
            .position(|name| name.eq_ignore_ascii_case(token))
            .map(|index| index as u32 + spec.names_base)
            .ok_or_else(|| format!("'{}' is not a number or name", token))?,
    };

    if value < spec.min || value > spec.max {
        return Err(format!(
            "{} is outside {}-{}",
            value, spec.min, spec.max
        ));
    }
    Ok(value)
}
