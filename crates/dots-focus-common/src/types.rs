use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Minutes in a day; the exclusive upper bound of minute-of-day values.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Last minute of the day (23:59), the inclusive end of an all-day range.
pub const LAST_MINUTE_OF_DAY: u16 = MINUTES_PER_DAY - 1;

/// Day of the week with a canonical index: Sunday = 0 through Saturday = 6.
///
/// This is the only day numbering used inside the crate. Conversions from
/// and to [`chrono::Weekday`] are the single boundary to the platform
/// calendar; persistence stores the variant name, never the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeekDay {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl WeekDay {
    pub const ALL: [WeekDay; 7] = [
        WeekDay::Sunday,
        WeekDay::Monday,
        WeekDay::Tuesday,
        WeekDay::Wednesday,
        WeekDay::Thursday,
        WeekDay::Friday,
        WeekDay::Saturday,
    ];

    /// Canonical index, 0 (Sunday) to 6 (Saturday).
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> crate::Result<Self> {
        Self::ALL.get(usize::from(index)).copied().ok_or(Error::WeekDayIndex(index))
    }

    /// Day of the week of `instant` in its own time zone.
    pub fn of<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        instant.weekday().into()
    }

    /// Number of days from `self` forward to `other`, in `0..7`.
    pub fn days_until(self, other: WeekDay) -> i64 {
        i64::from((other.index() + 7 - self.index()) % 7)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeekDay::Sunday => "SUNDAY",
            WeekDay::Monday => "MONDAY",
            WeekDay::Tuesday => "TUESDAY",
            WeekDay::Wednesday => "WEDNESDAY",
            WeekDay::Thursday => "THURSDAY",
            WeekDay::Friday => "FRIDAY",
            WeekDay::Saturday => "SATURDAY",
        }
    }
}

impl From<Weekday> for WeekDay {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Sun => WeekDay::Sunday,
            Weekday::Mon => WeekDay::Monday,
            Weekday::Tue => WeekDay::Tuesday,
            Weekday::Wed => WeekDay::Wednesday,
            Weekday::Thu => WeekDay::Thursday,
            Weekday::Fri => WeekDay::Friday,
            Weekday::Sat => WeekDay::Saturday,
        }
    }
}

impl From<WeekDay> for Weekday {
    fn from(day: WeekDay) -> Self {
        match day {
            WeekDay::Sunday => Weekday::Sun,
            WeekDay::Monday => Weekday::Mon,
            WeekDay::Tuesday => Weekday::Tue,
            WeekDay::Wednesday => Weekday::Wed,
            WeekDay::Thursday => Weekday::Thu,
            WeekDay::Friday => Weekday::Fri,
            WeekDay::Saturday => Weekday::Sat,
        }
    }
}

impl FromStr for WeekDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|day| day.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownWeekDay(s.to_string()))
    }
}

impl fmt::Display for WeekDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A daily time window.
///
/// Bounds are inclusive at minute resolution: `08:00-12:00` covers every
/// instant from 08:00:00 through 12:00:59. An all-day range carries zeroed
/// bounds and covers the whole day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    /// Stable identifier used to diff edits; not a business key
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub start_hour: u8,
    pub start_minute: u8,
    pub end_hour: u8,
    pub end_minute: u8,
    #[serde(default)]
    pub all_day: bool,
}

impl TimeRange {
    pub fn new(start_hour: u8, start_minute: u8, end_hour: u8, end_minute: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            all_day: false,
        }
    }

    pub fn all_day() -> Self {
        Self {
            id: Uuid::new_v4(),
            start_hour: 0,
            start_minute: 0,
            end_hour: 0,
            end_minute: 0,
            all_day: true,
        }
    }

    /// First covered minute of the day.
    pub fn start_minutes(&self) -> u16 {
        if self.all_day {
            0
        } else {
            u16::from(self.start_hour) * 60 + u16::from(self.start_minute)
        }
    }

    /// Last covered minute of the day (inclusive).
    pub fn end_minutes(&self) -> u16 {
        if self.all_day {
            LAST_MINUTE_OF_DAY
        } else {
            u16::from(self.end_hour) * 60 + u16::from(self.end_minute)
        }
    }

    pub fn contains_minute(&self, minute_of_day: u16) -> bool {
        self.all_day
            || (self.start_minutes() <= minute_of_day && minute_of_day <= self.end_minutes())
    }

    /// Whether either range has an edge inside the other.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        other.contains_minute(self.start_minutes())
            || other.contains_minute(self.end_minutes())
            || self.contains_minute(other.start_minutes())
            || self.contains_minute(other.end_minutes())
    }

    /// Same four numeric bounds, ignoring `id` and `all_day`.
    pub fn same_bounds(&self, other: &TimeRange) -> bool {
        self.bounds() == other.bounds()
    }

    fn bounds(&self) -> (u8, u8, u8, u8) {
        (self.start_hour, self.start_minute, self.end_hour, self.end_minute)
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all_day {
            return f.write_str("all day");
        }
        write!(
            f,
            "{:02}:{:02}-{:02}:{:02}",
            self.start_hour, self.start_minute, self.end_hour, self.end_minute
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Notifications are blocked inside the matched days and ranges
    Restrictive,
    /// Notifications are only allowed inside the matched days and ranges
    Permissive,
}

impl RuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleType::Restrictive => "RESTRICTIVE",
            RuleType::Permissive => "PERMISSIVE",
        }
    }
}

impl FromStr for RuleType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTRICTIVE" => Ok(RuleType::Restrictive),
            "PERMISSIVE" => Ok(RuleType::Permissive),
            _ => Err(Error::UnknownRuleType(s.to_string())),
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named weekly schedule deciding when notifications of the apps bound to
/// it are held back.
///
/// Construct through [`crate::RuleValidator::validate`] before handing a rule
/// to the decision or transition functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    pub days: BTreeSet<WeekDay>,
    pub time_ranges: Vec<TimeRange>,
    pub rule_type: RuleType,
}

// ============================================================================
// Entities owned by collaborators
// ============================================================================

/// Binding of an installed package to the rule that governs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedApp {
    pub package_id: String,
    pub rule_id: Uuid,
}

/// A notification posted by a package, as recorded in the history store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppNotification {
    pub package_id: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl AppNotification {
    pub fn new(
        package_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            package_id: package_id.into(),
            title: title.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Durable record of a pending deferred report alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub package_id: String,
    pub scheduled_at_millis: i64,
}

impl ScheduleEntry {
    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.scheduled_at_millis).single()
    }
}
