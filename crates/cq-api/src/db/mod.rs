//! Database access layer for PostgreSQL.
//!
//! Only the audit log is persisted; the dataset itself lives behind the
//! engine's `DataSource`.

pub mod audit;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

pub use audit::PgAuditLog;

/// Connect to PostgreSQL and run migrations.
pub async fn connect(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    tracing::info!("running database migrations");
    sqlx::raw_sql(include_str!("../../migrations/001_audit.sql"))
        .execute(&pool)
        .await?;
    tracing::info!("migrations complete");

    Ok(pool)
}
