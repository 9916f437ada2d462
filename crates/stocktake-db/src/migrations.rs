//! Database migration management.
//!
//! Migrations are embedded at compile time from the `migrations/` directory
//! and run in order based on their filename prefix.

use sqlx::PgPool;

use crate::error::DbError;

/// Run all pending database migrations.
///
/// # Errors
///
/// Returns `DbError::MigrationFailed` if any migration fails to apply.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(DbError::MigrationFailed)?;
    tracing::info!("database migrations applied");
    Ok(())
}

/// Connect to the database and run migrations.
///
/// # Errors
///
/// Returns `DbError::ConnectionFailed` if the pool cannot be built, or
/// `DbError::MigrationFailed` if a migration fails.
pub async fn connect_and_migrate(database_url: &str) -> Result<PgPool, DbError> {
    let pool = PgPool::connect(database_url)
        .await
        .map_err(DbError::ConnectionFailed)?;
    run_migrations(&pool).await?;
    Ok(pool)
}
