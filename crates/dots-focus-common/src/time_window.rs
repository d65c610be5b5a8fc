// Time Window Decisions
//
// Point-in-time evaluation of a rule: is it holding notifications back right
// now? Everything here is pure; "now" is always passed in.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use uuid::Uuid;

use crate::types::{Rule, RuleType, WeekDay};

/// Detailed outcome of evaluating a rule at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockVerdict {
    pub blocked: bool,
    pub day_matched: bool,
    pub time_matched: bool,
    /// First range covering the evaluated minute, if any
    pub matched_range: Option<Uuid>,
}

/// Decides whether a rule blocks notifications at a given instant.
pub struct BlockDecisionEngine;

impl BlockDecisionEngine {
    pub fn is_blocked<Tz: TimeZone>(rule: &Rule, now: &DateTime<Tz>) -> bool {
        Self::evaluate(rule, now).blocked
    }

    pub fn evaluate<Tz: TimeZone>(rule: &Rule, now: &DateTime<Tz>) -> BlockVerdict {
        let day_matched = rule.days.contains(&WeekDay::of(now));
        let minute = minute_of_day(now);
        let matched_range =
            rule.time_ranges.iter().find(|range| range.contains_minute(minute)).map(|r| r.id);
        let time_matched = matched_range.is_some();

        let blocked = match rule.rule_type {
            RuleType::Restrictive => day_matched && time_matched,
            RuleType::Permissive => !day_matched || !time_matched,
        };

        BlockVerdict { blocked, day_matched, time_matched, matched_range }
    }
}

/// Minutes elapsed since local midnight of `instant`, ignoring seconds.
pub fn minute_of_day<Tz: TimeZone>(instant: &DateTime<Tz>) -> u16 {
    // hour() <= 23 and minute() <= 59, so the sum always fits
    (instant.hour() * 60 + instant.minute()) as u16
}

/// Local midnight of the day containing `instant`, as a wall-clock time.
pub(crate) fn local_midnight<Tz: TimeZone>(instant: &DateTime<Tz>) -> NaiveDateTime {
    instant.date_naive().and_time(NaiveTime::MIN)
}

/// Maps a wall-clock time back to an instant in `tz`.
///
/// Ambiguous times resolve to the earlier instant. A time skipped by a DST
/// gap resolves to the first instant after the gap.
pub(crate) fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Tz>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=MAX_GAP_MINUTES)
            .find_map(|minutes| tz.from_local_datetime(&(local + Duration::minutes(minutes))).earliest()),
    }
}

// Zones have skipped at most a whole day
const MAX_GAP_MINUTES: i64 = 24 * 60;

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{FixedOffset, Utc};

    use super::*;
    use crate::types::TimeRange;

    fn rule(rule_type: RuleType, days: &[WeekDay], ranges: Vec<TimeRange>) -> Rule {
        Rule {
            id: Uuid::new_v4(),
            name: "Test Rule".to_string(),
            days: days.iter().copied().collect::<BTreeSet<_>>(),
            time_ranges: ranges,
            rule_type,
        }
    }

    // 2026-10-13 is a Tuesday
    fn tuesday_at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 13, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_minute_of_day() {
        assert_eq!(minute_of_day(&tuesday_at(0, 0)), 0);
        assert_eq!(minute_of_day(&tuesday_at(12, 20)), 740);
        assert_eq!(minute_of_day(&tuesday_at(23, 59)), 1439);
    }

    #[test]
    fn test_restrictive_blocks_inside_range_on_matched_day() {
        let rule = rule(RuleType::Restrictive, &[WeekDay::Tuesday], vec![TimeRange::new(8, 0, 18, 0)]);

        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(12, 20)));
        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(8, 0)));
        // End minute is inclusive
        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(18, 0)));
        assert!(!BlockDecisionEngine::is_blocked(&rule, &tuesday_at(18, 1)));
        assert!(!BlockDecisionEngine::is_blocked(&rule, &tuesday_at(7, 59)));
    }

    #[test]
    fn test_restrictive_allows_unmatched_day() {
        let rule = rule(RuleType::Restrictive, &[WeekDay::Sunday], vec![TimeRange::new(8, 0, 18, 0)]);
        assert!(!BlockDecisionEngine::is_blocked(&rule, &tuesday_at(12, 20)));
    }

    #[test]
    fn test_permissive_blocks_unmatched_day() {
        let rule = rule(RuleType::Permissive, &[WeekDay::Sunday], vec![TimeRange::new(8, 0, 18, 0)]);
        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(12, 20)));
    }

    #[test]
    fn test_permissive_allows_only_inside_window() {
        let rule = rule(RuleType::Permissive, &[WeekDay::Tuesday], vec![TimeRange::new(8, 0, 18, 0)]);
        assert!(!BlockDecisionEngine::is_blocked(&rule, &tuesday_at(12, 20)));
        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(19, 0)));
    }

    #[test]
    fn test_rule_types_complement_on_matched_day() {
        let ranges = vec![TimeRange::new(8, 0, 12, 0), TimeRange::new(13, 0, 18, 0)];
        let restrictive = rule(RuleType::Restrictive, &[WeekDay::Tuesday], ranges.clone());
        let permissive = rule(RuleType::Permissive, &[WeekDay::Tuesday], ranges);

        for hour in 0..24 {
            for minute in [0, 15, 30, 59] {
                let now = tuesday_at(hour, minute);
                assert_ne!(
                    BlockDecisionEngine::is_blocked(&restrictive, &now),
                    BlockDecisionEngine::is_blocked(&permissive, &now),
                    "rule types should disagree at {}",
                    now
                );
            }
        }
    }

    #[test]
    fn test_all_day_range_matches_every_minute() {
        let rule = rule(RuleType::Restrictive, &[WeekDay::Tuesday], vec![TimeRange::all_day()]);
        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(0, 0)));
        assert!(BlockDecisionEngine::is_blocked(&rule, &tuesday_at(23, 59)));
    }

    #[test]
    fn test_evaluation_uses_the_instant_time_zone() {
        let rule = rule(RuleType::Restrictive, &[WeekDay::Wednesday], vec![TimeRange::new(1, 0, 3, 0)]);
        // Tuesday 23:30 UTC is Wednesday 01:30 at UTC+2
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = tuesday_at(23, 30).with_timezone(&offset);

        assert!(BlockDecisionEngine::is_blocked(&rule, &now));
        assert!(!BlockDecisionEngine::is_blocked(&rule, &tuesday_at(23, 30)));
    }

    #[test]
    fn test_verdict_reports_matched_range() {
        let afternoon = TimeRange::new(13, 0, 18, 0);
        let rule = rule(
            RuleType::Restrictive,
            &[WeekDay::Tuesday],
            vec![TimeRange::new(8, 0, 12, 0), afternoon.clone()],
        );

        let verdict = BlockDecisionEngine::evaluate(&rule, &tuesday_at(14, 0));
        assert!(verdict.blocked);
        assert!(verdict.day_matched);
        assert_eq!(verdict.matched_range, Some(afternoon.id));

        let verdict = BlockDecisionEngine::evaluate(&rule, &tuesday_at(12, 30));
        assert!(!verdict.time_matched);
        assert_eq!(verdict.matched_range, None);
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let rule = rule(RuleType::Permissive, &[WeekDay::Monday], vec![TimeRange::new(9, 0, 10, 0)]);
        let now = tuesday_at(9, 30);
        let first = BlockDecisionEngine::evaluate(&rule, &now);
        for _ in 0..10 {
            assert_eq!(BlockDecisionEngine::evaluate(&rule, &now), first);
        }
    }

    #[test]
    fn test_resolve_local_in_fixed_offset() {
        let offset = FixedOffset::east_opt(3600).unwrap();
        let midnight = local_midnight(&tuesday_at(12, 0).with_timezone(&offset));
        let resolved = resolve_local(&offset, midnight).unwrap();
        assert_eq!(resolved.hour(), 0);
        assert_eq!(resolved.with_timezone(&Utc), Utc.with_ymd_and_hms(2026, 10, 12, 23, 0, 0).unwrap());
    }

    #[test]
    fn test_resolve_local_across_dst_changes() {
        use chrono::NaiveDate;
        use chrono_tz::Europe::Berlin;

        // Clocks jump from 02:00 to 03:00 on 2026-03-29
        let skipped = NaiveDate::from_ymd_opt(2026, 3, 29).unwrap().and_hms_opt(2, 30, 0).unwrap();
        let resolved = resolve_local(&Berlin, skipped).unwrap();
        assert_eq!(resolved.with_timezone(&Utc), Utc.with_ymd_and_hms(2026, 3, 29, 1, 0, 0).unwrap());
        assert_eq!((resolved.hour(), resolved.minute()), (3, 0));

        // 02:30 happens twice on 2026-10-25
        let repeated = NaiveDate::from_ymd_opt(2026, 10, 25).unwrap().and_hms_opt(2, 30, 0).unwrap();
        let resolved = resolve_local(&Berlin, repeated).unwrap();
        assert_eq!(resolved.with_timezone(&Utc), Utc.with_ymd_and_hms(2026, 10, 25, 0, 30, 0).unwrap());
    }
}
