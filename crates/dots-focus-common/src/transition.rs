// Next-transition calculation
//
// Walks the rule's days in chronological order starting today and returns
// the first instant at which the block state actually flips.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::time_window::{local_midnight, resolve_local, BlockDecisionEngine};
use crate::types::{Rule, RuleType, TimeRange, WeekDay};

/// When a rule next changes between blocking and allowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum NextTransition {
    At(DateTime<Utc>),
    /// The rule never changes state under its own definition
    Never,
}

impl NextTransition {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            NextTransition::At(instant) => Some(*instant),
            NextTransition::Never => None,
        }
    }

    pub fn as_millis(&self) -> Option<i64> {
        self.instant().map(|instant| instant.timestamp_millis())
    }
}

pub struct TransitionCalculator;

impl TransitionCalculator {
    /// Finds the next instant strictly after `now` at which the rule's block
    /// state flips.
    ///
    /// For restrictive rules the candidates are the unlock instants (one
    /// minute after each range's inclusive end); for permissive rules they are
    /// the starts of the allowed windows. A candidate only counts when the
    /// state one minute earlier differs, so back-to-back ranges and
    /// consecutive all-day days merge into a single block.
    pub fn next_transition<Tz: TimeZone>(rule: &Rule, now: &DateTime<Tz>) -> NextTransition {
        let today = WeekDay::of(now);
        let midnight = local_midnight(now);
        let tz = now.timezone();

        let mut candidate_minutes: Vec<i64> =
            rule.time_ranges.iter().map(|range| edge_minutes(range, rule.rule_type)).collect();
        candidate_minutes.sort_unstable();

        for offset in day_offsets(rule, today) {
            let anchor = midnight + Duration::days(offset);
            for minutes in &candidate_minutes {
                let Some(edge) = resolve_local(&tz, anchor + Duration::minutes(*minutes)) else {
                    continue;
                };
                if edge <= *now {
                    continue;
                }
                if is_flip(rule, &edge) {
                    return NextTransition::At(edge.with_timezone(&Utc));
                }
            }
        }

        NextTransition::Never
    }
}

/// Minutes after the day's midnight at which a range's relevant edge falls.
fn edge_minutes(range: &TimeRange, rule_type: RuleType) -> i64 {
    match rule_type {
        RuleType::Restrictive => i64::from(range.end_minutes()) + 1,
        RuleType::Permissive => i64::from(range.start_minutes()),
    }
}

/// Day offsets from today, in chronological order, for every rule day.
///
/// The sorted day list is rotated so it starts at the first day on or after
/// today; earlier days wrap to the end. When today is a rule day it is
/// visited again one week later, so edges already behind us today are still
/// found.
fn day_offsets(rule: &Rule, today: WeekDay) -> Vec<i64> {
    let days: Vec<WeekDay> = rule.days.iter().copied().collect();
    let pivot = days.iter().position(|day| *day >= today).unwrap_or(0);

    let mut offsets: Vec<i64> = days[pivot..]
        .iter()
        .chain(days[..pivot].iter())
        .map(|day| today.days_until(*day))
        .collect();

    if rule.days.contains(&today) {
        offsets.push(7);
    }

    offsets
}

fn is_flip<Tz: TimeZone>(rule: &Rule, edge: &DateTime<Tz>) -> bool {
    let before = edge.clone() - Duration::minutes(1);
    BlockDecisionEngine::is_blocked(rule, &before) != BlockDecisionEngine::is_blocked(rule, edge)
}
