use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use dots_focus_common::{AppNotification, ManagedApp, Rule, TimeRange, WeekDay};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{DbError, Result};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbRule {
    pub id: String,
    pub name: String,
    /// Comma-separated week day names, e.g. `MONDAY,FRIDAY`
    pub days: String,
    pub rule_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbRule {
    pub fn into_rule(self, ranges: Vec<DbTimeRange>) -> Result<Rule> {
        let days = self
            .days
            .split(',')
            .filter(|day| !day.trim().is_empty())
            .map(|day| day.parse::<WeekDay>())
            .collect::<std::result::Result<BTreeSet<_>, _>>()?;

        let time_ranges =
            ranges.into_iter().map(DbTimeRange::into_time_range).collect::<Result<Vec<_>>>()?;

        Ok(Rule {
            id: Uuid::parse_str(&self.id)?,
            name: self.name,
            days,
            time_ranges,
            rule_type: self.rule_type.parse()?,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbTimeRange {
    pub id: String,
    pub rule_id: String,
    pub position: i64,
    pub start_hour: i64,
    pub start_minute: i64,
    pub end_hour: i64,
    pub end_minute: i64,
    pub all_day: bool,
}

impl DbTimeRange {
    pub fn into_time_range(self) -> Result<TimeRange> {
        Ok(TimeRange {
            id: Uuid::parse_str(&self.id)?,
            start_hour: to_u8("start_hour", self.start_hour)?,
            start_minute: to_u8("start_minute", self.start_minute)?,
            end_hour: to_u8("end_hour", self.end_hour)?,
            end_minute: to_u8("end_minute", self.end_minute)?,
            all_day: self.all_day,
        })
    }
}

fn to_u8(field: &str, value: i64) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| DbError::InvalidData(format!("{} out of range: {}", field, value)))
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbManagedApp {
    pub package_id: String,
    pub rule_id: String,
    pub created_at: DateTime<Utc>,
}

impl DbManagedApp {
    pub fn into_managed_app(self) -> Result<ManagedApp> {
        Ok(ManagedApp { package_id: self.package_id, rule_id: Uuid::parse_str(&self.rule_id)? })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbAppNotification {
    pub id: i64,
    pub package_id: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<DbAppNotification> for AppNotification {
    fn from(row: DbAppNotification) -> Self {
        AppNotification {
            package_id: row.package_id,
            title: row.title,
            content: row.content,
            timestamp: row.timestamp,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DbKeyValue {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

/// Serializes a day set the way `rules.days` stores it.
pub fn days_to_column(days: &BTreeSet<WeekDay>) -> String {
    days.iter().map(|day| day.as_str()).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dots_focus_common::RuleType;

    #[test]
    fn test_days_column_round_trip() {
        let days: BTreeSet<WeekDay> = [WeekDay::Friday, WeekDay::Monday].into_iter().collect();
        assert_eq!(days_to_column(&days), "MONDAY,FRIDAY");

        let row = DbRule {
            id: Uuid::new_v4().to_string(),
            name: "Work".to_string(),
            days: days_to_column(&days),
            rule_type: "PERMISSIVE".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let rule = row.into_rule(Vec::new()).unwrap();
        assert_eq!(rule.days, days);
        assert_eq!(rule.rule_type, RuleType::Permissive);
    }

    #[test]
    fn test_unknown_day_is_rejected() {
        let row = DbRule {
            id: Uuid::new_v4().to_string(),
            name: "Work".to_string(),
            days: "MONDAY,FUNDAY".to_string(),
            rule_type: "RESTRICTIVE".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(row.into_rule(Vec::new()), Err(DbError::Model(_))));
    }

    #[test]
    fn test_out_of_range_column_is_rejected() {
        let row = DbTimeRange {
            id: Uuid::new_v4().to_string(),
            rule_id: Uuid::new_v4().to_string(),
            position: 0,
            start_hour: 300,
            start_minute: 0,
            end_hour: 1,
            end_minute: 0,
            all_day: false,
        };
        assert!(matches!(row.into_time_range(), Err(DbError::InvalidData(_))));
    }
}
