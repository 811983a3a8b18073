//! Cron trigger — evaluates a six-field expression into a lazy ascending
//! stream of firing instants.
//!
//! Occurrence generation walks the civil time of the base instant's offset:
//! years out to 9999, then months, days, hours, minutes, and seconds, each
//! value set in ascending order. Weekday numbering is Sunday = 1 through
//! Saturday = 7. Odd/even week qualifiers count 14-day cycles from Monday
//! 2001-01-01, which opens week 1 (odd); the cycle extends symmetrically
//! backwards. When a target time zone is set, accepted instants are
//! converted to it (same absolute time) before being yielded.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use chrono_tz::Tz;

use crate::error::ParseError;
use crate::trigger::expression::CronExpression;
use crate::trigger::{Trigger, UpcomingIter};

/// Occurrence generation stops after this year.
const MAX_YEAR: i32 = 9999;

/// Days from 0001-01-01 (day 1) to 2001-01-01, the Monday opening the odd
/// half of the 14-day week-parity cycle.
const PARITY_REFERENCE_CE_DAYS: i32 = 730_486;

/// Trigger firing on the schedule of a six-field cron expression.
pub struct CronTrigger {
    raw: String,
    expression: CronExpression,
    time_zone: Option<Tz>,
}

impl CronTrigger {
    /// Parse `expression`; occurrences keep the offset of the base instant
    /// they are generated from.
    pub fn new(expression: &str) -> Result<Self, ParseError> {
        Ok(Self {
            raw: expression.trim().to_string(),
            expression: CronExpression::parse(expression)?,
            time_zone: None,
        })
    }

    /// Parse `expression` and convert every occurrence to `time_zone`.
    pub fn with_time_zone(expression: &str, time_zone: Tz) -> Result<Self, ParseError> {
        let mut trigger = Self::new(expression)?;
        trigger.time_zone = Some(time_zone);
        Ok(trigger)
    }

    /// The first `n` occurrences at or after `base`.
    pub fn upcoming_n(&self, base: DateTime<FixedOffset>, n: usize) -> Vec<DateTime<FixedOffset>> {
        self.upcoming(base).take(n).collect()
    }
}

impl Trigger for CronTrigger {
    fn expression(&self) -> &str {
        &self.raw
    }

    fn upcoming(&self, base: DateTime<FixedOffset>) -> UpcomingIter<'_> {
        let naive = base.naive_local();
        let mut origin = naive.with_nanosecond(0).unwrap_or(naive);
        if naive.nanosecond() > 0 {
            // Sub-second bases round up so every yield is >= base.
            origin = origin
                .checked_add_signed(TimeDelta::seconds(1))
                .unwrap_or(origin);
        }
        Box::new(Upcoming {
            expression: &self.expression,
            offset: *base.offset(),
            time_zone: self.time_zone,
            cursor: Some(origin),
        })
    }
}

impl FromStr for CronTrigger {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for CronTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CronTrigger")
            .field("expression", &self.raw)
            .field("time_zone", &self.time_zone)
            .finish()
    }
}

struct Upcoming<'a> {
    expression: &'a CronExpression,
    offset: FixedOffset,
    time_zone: Option<Tz>,
    cursor: Option<NaiveDateTime>,
}

impl Iterator for Upcoming<'_> {
    type Item = DateTime<FixedOffset>;

    fn next(&mut self) -> Option<Self::Item> {
        let from = self.cursor?;
        let hit = first_at_or_after(self.expression, from)?;
        self.cursor = hit.checked_add_signed(TimeDelta::seconds(1));
        let instant = hit.and_local_timezone(self.offset).single()?;
        Some(match self.time_zone {
            Some(tz) => instant.with_timezone(&tz).fixed_offset(),
            None => instant,
        })
    }
}

/// Smallest civil datetime >= `from` whose fields all sit in the
/// expression's value sets and whose date passes the weekday filter.
fn first_at_or_after(expr: &CronExpression, from: NaiveDateTime) -> Option<NaiveDateTime> {
    let base_year = from.year();
    let base_month = from.month() as u8;
    let base_day = from.day() as u8;
    let base_hour = from.hour() as u8;
    let base_minute = from.minute() as u8;
    let base_second = from.second() as u8;

    for year in base_year..=MAX_YEAR {
        let on_base_year = year == base_year;
        for &month in &expr.months {
            // A field value below the base is skipped only while every outer
            // field still equals the base's; after a rollover it is valid.
            if on_base_year && month < base_month {
                continue;
            }
            let on_base_month = on_base_year && month == base_month;
            for &day in &expr.days {
                if on_base_month && day < base_day {
                    continue;
                }
                let Some(date) = NaiveDate::from_ymd_opt(year, u32::from(month), u32::from(day))
                else {
                    continue;
                };
                if !weekday_matches(expr, date) {
                    continue;
                }
                let on_base_day = on_base_month && day == base_day;
                for &hour in &expr.hours {
                    if on_base_day && hour < base_hour {
                        continue;
                    }
                    let on_base_hour = on_base_day && hour == base_hour;
                    for &minute in &expr.minutes {
                        if on_base_hour && minute < base_minute {
                            continue;
                        }
                        let on_base_minute = on_base_hour && minute == base_minute;
                        for &second in &expr.seconds {
                            if on_base_minute && second < base_second {
                                continue;
                            }
                            if let Some(hit) = date.and_hms_opt(
                                u32::from(hour),
                                u32::from(minute),
                                u32::from(second),
                            ) {
                                return Some(hit);
                            }
                        }
                    }
                }
            }
        }
    }
    None
}

fn weekday_matches(expr: &CronExpression, date: NaiveDate) -> bool {
    let weekday = date.weekday().num_days_from_sunday() as u8 + 1; // Sunday = 1
    let set = &expr.weekdays;
    if set.contains(&weekday) {
        return true;
    }
    if set.contains(&(10 + weekday)) && date.day() <= 7 {
        return true;
    }
    if set.contains(&(20 + weekday)) && date.day() > days_in_month(date.year(), date.month()) - 7 {
        return true;
    }
    if set.contains(&(30 + weekday)) && odd_week(date) {
        return true;
    }
    if set.contains(&(40 + weekday)) && !odd_week(date) {
        return true;
    }
    false
}

fn odd_week(date: NaiveDate) -> bool {
    let days = i64::from(date.num_days_from_ce() - PARITY_REFERENCE_CE_DAYS);
    days.rem_euclid(14) < 7
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(31, |last| last.day())
}
