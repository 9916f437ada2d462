//! Error types for the stocktake-db crate.

use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),

    /// A database query failed to execute.
    #[error("Query failed: {0}")]
    QueryFailed(#[source] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failed_display() {
        let err = DbError::QueryFailed(sqlx::Error::RowNotFound);
        assert!(err.to_string().starts_with("Query failed"));
    }

    #[test]
    fn test_is_std_error() {
        let err = DbError::QueryFailed(sqlx::Error::RowNotFound);
        let _: &dyn std::error::Error = &err;
    }
}
