use crate::error::{DbError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// How long a connection waits for another writer before failing with
/// `SQLITE_BUSY`. Reconciliation writes alarm records from several
/// connections at once.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "focus.db".to_string(), max_connections: 5 }
    }
}

pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connects without touching the schema.
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let pool = Self::create_pool(&config).await?;

        Ok(Self { pool })
    }

    /// Connects and brings the schema up to date.
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let database = Self::new(config).await?;
        database.run_migrations().await?;
        Ok(database)
    }

    async fn create_pool(config: &DatabaseConfig) -> Result<Pool<Sqlite>> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created database directory: {}", parent.display());
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let max_connections = config.max_connections.max(1);
        let pool =
            SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;

        info!("Opened database {} ({} connections max)", config.path, max_connections);

        Ok(pool)
    }

    pub fn pool(&self) -> Result<&Pool<Sqlite>> {
        if self.pool.is_closed() {
            return Err(DbError::Closed);
        }
        Ok(&self.pool)
    }

    /// Waits for in-flight queries, then closes every connection. Later
    /// queries fail with [`DbError::Closed`].
    pub async fn close(&self) {
        if self.pool.is_closed() {
            debug!("Database already closed");
            return;
        }
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn config_in(dir: &Path, file: &str) -> DatabaseConfig {
        DatabaseConfig { path: dir.join(file).to_str().unwrap().to_string(), max_connections: 2 }
    }

    #[tokio::test]
    async fn test_database_connects() {
        let dir = tempdir().unwrap();
        let db = Database::new(config_in(dir.path(), "test.db")).await.unwrap();

        let pool = db.pool().unwrap();
        let result: i32 = sqlx::query_scalar("SELECT 1").fetch_one(pool).await.unwrap();

        assert_eq!(result, 1);
    }

    #[tokio::test]
    async fn test_database_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let config = config_in(&dir.path().join("nested"), "focus.db");
        let expected = config.path.clone();

        Database::new(config).await.unwrap();
        assert!(Path::new(&expected).exists());
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let dir = tempdir().unwrap();
        let db = Database::open(config_in(dir.path(), "test.db")).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO time_ranges (id, rule_id, position, start_hour, start_minute, end_hour, end_minute) VALUES ('r', 'missing', 0, 8, 0, 9, 0)",
        )
        .execute(db.pool().unwrap())
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_closed_database_rejects_queries() {
        let dir = tempdir().unwrap();
        let db = Database::open(config_in(dir.path(), "test.db")).await.unwrap();

        db.close().await;
        db.close().await;

        assert!(matches!(db.pool(), Err(DbError::Closed)));
    }
}
