// SQLite connection pool setup and schema initialization

use crate::config::DatabaseConfig;
use crate::db::migration;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};
use tracing::info;

pub async fn establish_connection(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let database_url = config.url.as_str();

    // Create database if it doesn't exist
    if !Sqlite::database_exists(database_url).await.unwrap_or(false) {
        Sqlite::create_database(database_url).await?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect(database_url)
        .await?;

    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

    migration::run_migrations(&pool).await?;
    info!("Database connection established: {}", database_url);

    Ok(pool)
}

/// A single-connection in-memory database with the schema applied.
///
/// The pool never recycles its connection, since closing it would discard
/// the database.
pub async fn in_memory() -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    migration::run_migrations(&pool).await?;
    Ok(pool)
}
