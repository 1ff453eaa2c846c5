use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness or foreign-key constraint rejected the write.
    #[error("Constraint violated: {constraint}")]
    Conflict { constraint: String },

    /// A row targeted by an update does not exist.
    #[error("{entity} not found: {id}")]
    RowNotFound { entity: &'static str, id: String },

    /// A stored row could not be mapped onto the data model.
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow { table: &'static str, reason: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
