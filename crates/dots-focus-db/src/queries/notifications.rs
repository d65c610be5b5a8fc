use crate::connection::Database;
use crate::error::Result;
use dots_focus_common::AppNotification;

pub struct NotificationQueries;

impl NotificationQueries {
    /// Appends a suppressed notification to the history.
    pub async fn insert(db: &Database, notification: &AppNotification) -> Result<i64> {
        let pool = db.pool()?;

        let result = sqlx::query(
            "INSERT INTO app_notifications (package_id, title, content, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(&notification.package_id)
        .bind(&notification.title)
        .bind(&notification.content)
        .bind(notification.timestamp)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}
