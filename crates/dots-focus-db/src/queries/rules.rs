use crate::connection::Database;
use crate::error::{DbError, Result};
use crate::models::{days_to_column, DbRule, DbTimeRange};
use chrono::Utc;
use dots_focus_common::Rule;
use uuid::Uuid;

pub struct RuleQueries;

impl RuleQueries {
    /// Inserts or replaces a rule together with its time ranges.
    pub async fn upsert(db: &Database, rule: &Rule) -> Result<()> {
        let pool = db.pool()?;
        let now = Utc::now();
        let rule_id = rule.id.to_string();

        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rules (id, name, days, rule_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                days = excluded.days,
                rule_type = excluded.rule_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rule_id)
        .bind(&rule.name)
        .bind(days_to_column(&rule.days))
        .bind(rule.rule_type.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM time_ranges WHERE rule_id = ?")
            .bind(&rule_id)
            .execute(&mut *tx)
            .await?;

        for (position, range) in rule.time_ranges.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO time_ranges
                (id, rule_id, position, start_hour, start_minute, end_hour, end_minute, all_day)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(range.id.to_string())
            .bind(&rule_id)
            .bind(position as i64)
            .bind(i64::from(range.start_hour))
            .bind(i64::from(range.start_minute))
            .bind(i64::from(range.end_hour))
            .bind(i64::from(range.end_minute))
            .bind(range.all_day)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(db: &Database, id: Uuid) -> Result<Option<Rule>> {
        let pool = db.pool()?;
        let rule_id = id.to_string();

        let row = sqlx::query_as::<_, DbRule>("SELECT * FROM rules WHERE id = ?")
            .bind(&rule_id)
            .fetch_optional(pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let ranges = Self::ranges_for(db, &rule_id).await?;
        row.into_rule(ranges).map(Some)
    }

    pub async fn list_all(db: &Database) -> Result<Vec<Rule>> {
        let pool = db.pool()?;

        let rows = sqlx::query_as::<_, DbRule>("SELECT * FROM rules ORDER BY name")
            .fetch_all(pool)
            .await?;

        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            let ranges = Self::ranges_for(db, &row.id).await?;
            rules.push(row.into_rule(ranges)?);
        }
        Ok(rules)
    }

    pub async fn delete(db: &Database, id: Uuid) -> Result<()> {
        let pool = db.pool()?;

        let result =
            sqlx::query("DELETE FROM rules WHERE id = ?").bind(id.to_string()).execute(pool).await?;

        if result.rows_affected() == 0 {
            Err(DbError::NotFound(format!("Rule {} not found", id)))
        } else {
            Ok(())
        }
    }

    async fn ranges_for(db: &Database, rule_id: &str) -> Result<Vec<DbTimeRange>> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbTimeRange>(
            "SELECT * FROM time_ranges WHERE rule_id = ? ORDER BY position",
        )
        .bind(rule_id)
        .fetch_all(pool)
        .await
        .map_err(DbError::Sqlx)
    }
}
