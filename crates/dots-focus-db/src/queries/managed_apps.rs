use crate::connection::Database;
use crate::error::{DbError, Result};
use crate::models::DbManagedApp;
use chrono::Utc;
use dots_focus_common::ManagedApp;
use uuid::Uuid;

pub struct ManagedAppQueries;

impl ManagedAppQueries {
    /// Binds a package to a rule, replacing any previous binding.
    pub async fn upsert(db: &Database, app: &ManagedApp) -> Result<()> {
        let pool = db.pool()?;

        sqlx::query(
            r#"
            INSERT INTO managed_apps (package_id, rule_id, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT (package_id) DO UPDATE SET rule_id = excluded.rule_id
            "#,
        )
        .bind(&app.package_id)
        .bind(app.rule_id.to_string())
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_package(db: &Database, package_id: &str) -> Result<Option<ManagedApp>> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbManagedApp>("SELECT * FROM managed_apps WHERE package_id = ?")
            .bind(package_id)
            .fetch_optional(pool)
            .await?
            .map(DbManagedApp::into_managed_app)
            .transpose()
    }

    pub async fn list_by_rule(db: &Database, rule_id: Uuid) -> Result<Vec<ManagedApp>> {
        let pool = db.pool()?;

        sqlx::query_as::<_, DbManagedApp>(
            "SELECT * FROM managed_apps WHERE rule_id = ? ORDER BY package_id",
        )
        .bind(rule_id.to_string())
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(DbManagedApp::into_managed_app)
        .collect()
    }

    pub async fn delete(db: &Database, package_id: &str) -> Result<()> {
        let pool = db.pool()?;

        let result = sqlx::query("DELETE FROM managed_apps WHERE package_id = ?")
            .bind(package_id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            Err(DbError::NotFound(format!("Managed app {} not found", package_id)))
        } else {
            Ok(())
        }
    }
}
