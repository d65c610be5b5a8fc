use crate::connection::Database;
use crate::error::{DbError, Result};
use chrono::Utc;

pub struct KeyValueQueries;

impl KeyValueQueries {
    pub async fn get(db: &Database, key: &str) -> Result<Option<String>> {
        let pool = db.pool()?;

        sqlx::query_scalar::<_, String>("SELECT value FROM key_value WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(DbError::Sqlx)
    }

    pub async fn set(db: &Database, key: &str, value: &str) -> Result<()> {
        let pool = db.pool()?;

        sqlx::query(
            r#"
            INSERT INTO key_value (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Removes a key. Returns whether a record existed.
    pub async fn delete(db: &Database, key: &str) -> Result<bool> {
        let pool = db.pool()?;

        let result = sqlx::query("DELETE FROM key_value WHERE key = ?").bind(key).execute(pool).await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn keys_with_prefix(db: &Database, prefix: &str) -> Result<Vec<String>> {
        let pool = db.pool()?;

        // substr() rather than LIKE so '%' and '_' in package ids match literally
        sqlx::query_scalar::<_, String>(
            "SELECT key FROM key_value WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(pool)
        .await
        .map_err(DbError::Sqlx)
    }
}
