use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("UUID error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Model error: {0}")]
    Model(#[from] dots_focus_common::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database is closed")]
    Closed,

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
