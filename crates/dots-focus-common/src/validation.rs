// Rule validation
//
// Turns user input into rules that are safe to hand to the decision and
// transition functions. Every check fails fast with a typed error the UI
// can render precisely.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::types::{Rule, TimeRange, WeekDay};

pub const MIN_NAME_LENGTH: usize = 3;
pub const MAX_NAME_LENGTH: usize = 50;
pub const MIN_DAYS: usize = 1;
pub const MAX_DAYS: usize = 7;
pub const MIN_TIME_RANGES: usize = 1;
pub const MAX_TIME_RANGES: usize = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    #[error("All-day range must have all bounds set to zero")]
    AllDayInconsistent,

    #[error("{field} must be within {min}..={max}, got {actual}")]
    InvalidValue { field: &'static str, min: u8, max: u8, actual: u8 },

    #[error("Range start ({start_minutes} min) must be before its end ({end_minutes} min)")]
    InversedRange { start_minutes: u16, end_minutes: u16 },

    #[error("Expected between {min} and {max} entries, got {actual}")]
    OutOfRange { min: usize, max: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Name must not be blank")]
    BlankName,

    #[error("Name must be between {min} and {max} characters, got {actual}")]
    OutOfRange { min: usize, max: usize, actual: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("Invalid name: {0}")]
    Name(#[from] NameError),

    #[error("Invalid range: {0}")]
    Range(#[from] RangeError),

    #[error("Expected between {min} and {max} time ranges, got {actual}")]
    OutOfRange { min: usize, max: usize, actual: usize },

    #[error("Time ranges {a} and {b} are duplicates")]
    DuplicateRange { a: TimeRange, b: TimeRange },

    #[error("Time ranges {a} and {b} overlap")]
    IntersectedRange { a: TimeRange, b: TimeRange },
}

/// Validates the internal consistency of a single [`TimeRange`].
pub struct RangeValidator;

impl RangeValidator {
    pub fn validate(range: &TimeRange) -> Result<TimeRange, RangeError> {
        if range.all_day {
            let zeroed = range.start_hour == 0
                && range.start_minute == 0
                && range.end_hour == 0
                && range.end_minute == 0;
            return if zeroed { Ok(range.clone()) } else { Err(RangeError::AllDayInconsistent) };
        }

        check_bound("start_hour", range.start_hour, 23)?;
        check_bound("start_minute", range.start_minute, 59)?;
        check_bound("end_hour", range.end_hour, 23)?;
        check_bound("end_minute", range.end_minute, 59)?;

        let start_minutes = range.start_minutes();
        let end_minutes = range.end_minutes();
        if start_minutes >= end_minutes {
            return Err(RangeError::InversedRange { start_minutes, end_minutes });
        }

        Ok(range.clone())
    }
}

fn check_bound(field: &'static str, actual: u8, max: u8) -> Result<(), RangeError> {
    if actual > max {
        return Err(RangeError::InvalidValue { field, min: 0, max, actual });
    }
    Ok(())
}

/// Validates a rule's name, day set and time ranges.
pub struct RuleValidator;

impl RuleValidator {
    /// Normalizes a rule name: trimmed, inner whitespace collapsed, each word
    /// capitalized.
    ///
    /// Empty input passes through unchanged so the UI can validate while the
    /// user is still typing.
    pub fn validate_name(raw: &str) -> Result<String, NameError> {
        if raw.is_empty() {
            return Ok(String::new());
        }

        let normalized = raw.split_whitespace().map(capitalize).collect::<Vec<_>>().join(" ");
        if normalized.is_empty() {
            return Err(NameError::BlankName);
        }

        let actual = normalized.chars().count();
        if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&actual) {
            return Err(NameError::OutOfRange {
                min: MIN_NAME_LENGTH,
                max: MAX_NAME_LENGTH,
                actual,
            });
        }

        Ok(normalized)
    }

    pub fn validate_days(days: &[WeekDay]) -> Result<BTreeSet<WeekDay>, RangeError> {
        let actual = days.len();
        if !(MIN_DAYS..=MAX_DAYS).contains(&actual) {
            return Err(RangeError::OutOfRange { min: MIN_DAYS, max: MAX_DAYS, actual });
        }
        Ok(days.iter().copied().collect())
    }

    pub fn validate_time_ranges(ranges: &[TimeRange]) -> Result<Vec<TimeRange>, RuleError> {
        let actual = ranges.len();
        if !(MIN_TIME_RANGES..=MAX_TIME_RANGES).contains(&actual) {
            return Err(RuleError::OutOfRange {
                min: MIN_TIME_RANGES,
                max: MAX_TIME_RANGES,
                actual,
            });
        }

        for (i, a) in ranges.iter().enumerate() {
            if let Some(b) = ranges[i + 1..].iter().find(|b| a.same_bounds(b)) {
                return Err(RuleError::DuplicateRange { a: a.clone(), b: b.clone() });
            }
        }

        // Latest start first; ties broken by end and all-day so the reported
        // pair does not depend on input order.
        let mut sorted: Vec<&TimeRange> = ranges.iter().collect();
        sorted.sort_by(|a, b| {
            (b.start_minutes(), b.end_minutes(), b.all_day).cmp(&(
                a.start_minutes(),
                a.end_minutes(),
                a.all_day,
            ))
        });
        for (i, a) in sorted.iter().enumerate() {
            if let Some(b) = sorted[i + 1..].iter().find(|b| a.intersects(b)) {
                return Err(RuleError::IntersectedRange { a: (*a).clone(), b: (*b).clone() });
            }
        }

        ranges.iter().map(|range| RangeValidator::validate(range).map_err(RuleError::from)).collect()
    }

    /// Validates the whole rule, short-circuiting on the first failure, and
    /// returns it with a normalized name.
    pub fn validate(rule: &Rule) -> Result<Rule, RuleError> {
        let name = Self::validate_name(&rule.name)?;
        if name.is_empty() {
            return Err(NameError::BlankName.into());
        }

        let days: Vec<WeekDay> = rule.days.iter().copied().collect();
        let days = Self::validate_days(&days)?;
        let time_ranges = Self::validate_time_ranges(&rule.time_ranges)?;

        Ok(Rule { id: rule.id, name, days, time_ranges, rule_type: rule.rule_type })
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
