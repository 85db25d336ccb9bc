use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record changed between read and write; the caller's copy is stale.
    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

#[derive(Debug, Error)]
#[error("invalid {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl From<ParseEnumError> for StoreError {
    fn from(err: ParseEnumError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
