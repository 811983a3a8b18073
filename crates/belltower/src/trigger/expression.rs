//! Six-field cron expression parsing.
//!
//! Field order is `seconds minutes hours day-of-month month day-of-week`.
//! Each field is a comma-separated list of items; an item is `*`, `?` (only
//! in the day fields, same as `*`), a value, a range `a-b`, or a step
//! `base/k`. Month names `JAN..DEC` and weekday names `SUN..SAT` are
//! accepted in their fields (uppercase). Day-of-week values run Sunday = 1
//! through Saturday = 7 and take an optional qualifier suffix:
//!
//! - `F` — first such weekday of the month (stored as value + 10)
//! - `L` — last such weekday of the month (+ 20)
//! - `O` — only in odd weeks (+ 30)
//! - `E` — only in even weeks (+ 40)
//!
//! Values outside a field's legal range are filtered out; a field whose set
//! ends up empty fails the parse.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ParseError;

/// Fast shape gate: six fields of cron-safe characters.
static SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([*?\-,/0-9A-Za-z]+( +|$)){6}$").expect("cron shape pattern is valid")
});

const MONTH_NAMES: [(&str, &str); 12] = [
    ("JAN", "1"),
    ("FEB", "2"),
    ("MAR", "3"),
    ("APR", "4"),
    ("MAY", "5"),
    ("JUN", "6"),
    ("JUL", "7"),
    ("AUG", "8"),
    ("SEP", "9"),
    ("OCT", "10"),
    ("NOV", "11"),
    ("DEC", "12"),
];

const WEEKDAY_NAMES: [(&str, &str); 7] = [
    ("SUN", "1"),
    ("MON", "2"),
    ("TUE", "3"),
    ("WED", "4"),
    ("THU", "5"),
    ("FRI", "6"),
    ("SAT", "7"),
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Seconds,
    Minutes,
    Hours,
    DayOfMonth,
    Month,
    DayOfWeek,
}

struct FieldSpec {
    name: &'static str,
    min: u8,
    max: u8,
    kind: FieldKind,
}

const FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        name: "seconds",
        min: 0,
        max: 59,
        kind: FieldKind::Seconds,
    },
    FieldSpec {
        name: "minutes",
        min: 0,
        max: 59,
        kind: FieldKind::Minutes,
    },
    FieldSpec {
        name: "hours",
        min: 0,
        max: 23,
        kind: FieldKind::Hours,
    },
    FieldSpec {
        name: "day-of-month",
        min: 1,
        max: 31,
        kind: FieldKind::DayOfMonth,
    },
    FieldSpec {
        name: "month",
        min: 1,
        max: 12,
        kind: FieldKind::Month,
    },
    FieldSpec {
        name: "day-of-week",
        min: 1,
        max: 7,
        kind: FieldKind::DayOfWeek,
    },
];

/// Parsed cron expression: one sorted, deduplicated value set per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CronExpression {
    pub(crate) seconds: Vec<u8>,
    pub(crate) minutes: Vec<u8>,
    pub(crate) hours: Vec<u8>,
    pub(crate) days: Vec<u8>,
    pub(crate) months: Vec<u8>,
    pub(crate) weekdays: Vec<u8>,
}

impl CronExpression {
    pub(crate) fn parse(input: &str) -> Result<Self, ParseError> {
        let input = input.trim();
        if !SHAPE.is_match(input) {
            return Err(ParseError::MalformedExpression(input.to_string()));
        }
        let fields: Vec<&str> = input.split_whitespace().collect();
        Ok(Self {
            seconds: parse_field(&FIELDS[0], fields[0])?,
            minutes: parse_field(&FIELDS[1], fields[1])?,
            hours: parse_field(&FIELDS[2], fields[2])?,
            days: parse_field(&FIELDS[3], fields[3])?,
            months: parse_field(&FIELDS[4], fields[4])?,
            weekdays: parse_field(&FIELDS[5], fields[5])?,
        })
    }
}

impl FromStr for CronExpression {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {}",
            join_values(&self.seconds),
            join_values(&self.minutes),
            join_values(&self.hours),
            join_values(&self.days),
            join_values(&self.months),
            join_weekdays(&self.weekdays),
        )
    }
}

fn join_values(values: &[u8]) -> String {
    values
        .iter()
        .map(u8::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn join_weekdays(values: &[u8]) -> String {
    values
        .iter()
        .map(|&v| match v {
            11..=17 => format!("{}F", v - 10),
            21..=27 => format!("{}L", v - 20),
            31..=37 => format!("{}O", v - 30),
            41..=47 => format!("{}E", v - 40),
            _ => v.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_field(spec: &FieldSpec, raw: &str) -> Result<Vec<u8>, ParseError> {
    let mut text = raw.to_string();
    if text.starts_with('/') {
        text.insert(0, '*');
    }
    if matches!(spec.kind, FieldKind::DayOfMonth | FieldKind::DayOfWeek) {
        text = text.replace('?', "*");
    }
    text = text.replace('*', &format!("{}-{}", spec.min, spec.max));
    match spec.kind {
        FieldKind::Month => {
            for (name, value) in MONTH_NAMES {
                text = text.replace(name, value);
            }
        }
        FieldKind::DayOfWeek => {
            for (name, value) in WEEKDAY_NAMES {
                text = text.replace(name, value);
            }
        }
        _ => {}
    }

    let mut values = Vec::new();
    for item in text.split(',') {
        expand_item(spec, item, &mut values)?;
    }
    values.retain(|&v| in_domain(spec, v));
    values.sort_unstable();
    values.dedup();
    if values.is_empty() {
        return Err(ParseError::EmptyField { field: spec.name });
    }
    Ok(values)
}

/// Expand one list item (value, range, step, or suffixed weekday) into `out`.
fn expand_item(spec: &FieldSpec, item: &str, out: &mut Vec<u8>) -> Result<(), ParseError> {
    let token_err = || ParseError::InvalidToken {
        field: spec.name,
        token: item.to_string(),
    };

    let (base, step) = match item.split_once('/') {
        Some((base, step)) => {
            let step: u8 = step.parse().map_err(|_| token_err())?;
            if step == 0 {
                return Err(ParseError::InvalidStep { field: spec.name });
            }
            (base, Some(step))
        }
        None => (item, None),
    };

    let expanded: Vec<u8> = if let Some((start, end)) = base.split_once('-') {
        let start: u8 = start.parse().map_err(|_| token_err())?;
        let end: u8 = end.parse().map_err(|_| token_err())?;
        if start > end {
            return Err(ParseError::InvalidRange {
                field: spec.name,
                start,
                end,
            });
        }
        (start..=end).collect()
    } else if let Ok(value) = base.parse::<u8>() {
        vec![value]
    } else if spec.kind == FieldKind::DayOfWeek && step.is_none() {
        // Single weekday with a qualifier suffix, e.g. "6L" or "2F".
        let (digits, suffix) = base.split_at(base.len().saturating_sub(1));
        let offset = match suffix {
            "F" => 10,
            "L" => 20,
            "O" => 30,
            "E" => 40,
            _ => return Err(token_err()),
        };
        let value: u8 = digits.parse().map_err(|_| token_err())?;
        out.push(value + offset);
        return Ok(());
    } else {
        return Err(token_err());
    };

    match step {
        Some(step) => {
            // A one-element base steps over min..=59 regardless of field; the
            // domain filter trims the overshoot afterwards.
            let Some(&min) = expanded.first() else {
                return Ok(());
            };
            let max = if expanded.len() == 1 {
                59
            } else {
                *expanded.last().unwrap_or(&min)
            };
            out.extend((min..=max).step_by(usize::from(step)));
        }
        None => out.extend(expanded),
    }
    Ok(())
}

fn in_domain(spec: &FieldSpec, value: u8) -> bool {
    match spec.kind {
        FieldKind::DayOfWeek => {
            matches!(value, 1..=7 | 11..=17 | 21..=27 | 31..=37 | 41..=47)
        }
        _ => (spec.min..=spec.max).contains(&value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_cover_full_ranges() {
        let expr = CronExpression::parse("* * * * * *").unwrap();
        assert_eq!(expr.seconds, (0..=59).collect::<Vec<u8>>());
        assert_eq!(expr.minutes, (0..=59).collect::<Vec<u8>>());
        assert_eq!(expr.hours, (0..=23).collect::<Vec<u8>>());
        assert_eq!(expr.days, (1..=31).collect::<Vec<u8>>());
        assert_eq!(expr.months, (1..=12).collect::<Vec<u8>>());
        assert_eq!(expr.weekdays, (1..=7).collect::<Vec<u8>>());
    }

    #[test]
    fn question_mark_is_wildcard_in_day_fields() {
        let expr = CronExpression::parse("0 0 0 ? * ?").unwrap();
        assert_eq!(expr.days, (1..=31).collect::<Vec<u8>>());
        assert_eq!(expr.weekdays, (1..=7).collect::<Vec<u8>>());
    }

    #[test]
    fn question_mark_rejected_elsewhere() {
        assert!(matches!(
            CronExpression::parse("? 0 0 * * *"),
            Err(ParseError::InvalidToken { field: "seconds", .. })
        ));
    }

    #[test]
    fn step_from_single_value_runs_to_59() {
        let expr = CronExpression::parse("0 0/15 * * * ?").unwrap();
        assert_eq!(expr.minutes, vec![0, 15, 30, 45]);
    }

    #[test]
    fn step_from_range_stays_inside_it() {
        let expr = CronExpression::parse("0 10-40/10 * * * ?").unwrap();
        assert_eq!(expr.minutes, vec![10, 20, 30, 40]);
    }

    #[test]
    fn leading_slash_implies_wildcard_base() {
        let expr = CronExpression::parse("/20 * * * * ?").unwrap();
        assert_eq!(expr.seconds, vec![0, 20, 40]);
    }

    #[test]
    fn single_value_step_overshoot_is_domain_filtered() {
        // 22/2 expands over 22..=59; only 22 survives the hours domain.
        let expr = CronExpression::parse("0 0 22/2 * * ?").unwrap();
        assert_eq!(expr.hours, vec![22]);
    }

    #[test]
    fn month_names_map_to_numbers() {
        let expr = CronExpression::parse("0 0 0 1 JAN,JUL ?").unwrap();
        assert_eq!(expr.months, vec![1, 7]);
    }

    #[test]
    fn weekday_names_map_to_numbers() {
        let expr = CronExpression::parse("0 0 9 ? * MON-FRI").unwrap();
        assert_eq!(expr.weekdays, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn weekday_suffixes_offset_the_value() {
        let expr = CronExpression::parse("0 0 9 ? * 6L").unwrap();
        assert_eq!(expr.weekdays, vec![26]);
        let expr = CronExpression::parse("0 0 9 ? * 2F").unwrap();
        assert_eq!(expr.weekdays, vec![12]);
        let expr = CronExpression::parse("0 0 9 ? * 2O,5E").unwrap();
        assert_eq!(expr.weekdays, vec![32, 45]);
    }

    #[test]
    fn suffix_outside_day_of_week_is_rejected() {
        assert!(matches!(
            CronExpression::parse("5F * * * * ?"),
            Err(ParseError::InvalidToken { field: "seconds", .. })
        ));
    }

    #[test]
    fn out_of_range_values_empty_the_field() {
        assert_eq!(
            CronExpression::parse("61 * * * * ?"),
            Err(ParseError::EmptyField { field: "seconds" })
        );
        assert_eq!(
            CronExpression::parse("0 0 0 * 13 ?"),
            Err(ParseError::EmptyField { field: "month" })
        );
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert!(matches!(
            CronExpression::parse("* * * * *"),
            Err(ParseError::MalformedExpression(_))
        ));
        assert!(matches!(
            CronExpression::parse("* * * * * * *"),
            Err(ParseError::MalformedExpression(_))
        ));
        assert!(matches!(
            CronExpression::parse(""),
            Err(ParseError::MalformedExpression(_))
        ));
    }

    #[test]
    fn unknown_names_are_invalid_tokens() {
        assert!(matches!(
            CronExpression::parse("0 0 0 1 FOO ?"),
            Err(ParseError::InvalidToken { field: "month", .. })
        ));
    }

    #[test]
    fn reversed_range_is_rejected() {
        assert_eq!(
            CronExpression::parse("30-10 * * * * ?"),
            Err(ParseError::InvalidRange {
                field: "seconds",
                start: 30,
                end: 10
            })
        );
    }

    #[test]
    fn zero_step_is_rejected() {
        assert_eq!(
            CronExpression::parse("*/0 * * * * ?"),
            Err(ParseError::InvalidStep { field: "seconds" })
        );
    }

    #[test]
    fn duplicates_collapse_and_sort() {
        let expr = CronExpression::parse("30,5,30,5 * * * * ?").unwrap();
        assert_eq!(expr.seconds, vec![5, 30]);
    }

    #[test]
    fn extra_spaces_between_fields_are_fine() {
        let expr = CronExpression::parse("0  0   9 *  * ?").unwrap();
        assert_eq!(expr.hours, vec![9]);
    }

    #[test]
    fn display_round_trips_to_the_same_sets() {
        for input in [
            "* * * * * *",
            "0 0/15 * * * ?",
            "0 0 9 ? * 6L",
            "0 0 9 ? * 2F,4,2O",
            "0 0 0 1 JAN,JUL ?",
            "15,45 30 9-17 1,15 * MON-FRI",
        ] {
            let parsed = CronExpression::parse(input).unwrap();
            let rendered = parsed.to_string();
            let reparsed = CronExpression::parse(&rendered).unwrap();
            assert_eq!(parsed, reparsed, "round-trip of '{input}' via '{rendered}'");
        }
    }
}
