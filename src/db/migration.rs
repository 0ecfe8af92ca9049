use sqlx::SqlitePool;
use tracing::info;

const TABLES: [&str; 3] = ["blocks", "transactions", "accounts"];

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Running database migrations...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS blocks (
            number INTEGER PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            parent_hash TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            miner TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            total_difficulty TEXT NOT NULL,
            size INTEGER NOT NULL,
            gas_used INTEGER NOT NULL,
            gas_limit INTEGER NOT NULL,
            nonce TEXT NOT NULL,
            extra_data TEXT NOT NULL,
            transaction_count INTEGER NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS transactions (
            hash TEXT PRIMARY KEY,
            block_hash TEXT NOT NULL,
            from_address TEXT NOT NULL,
            to_address TEXT NOT NULL,
            value TEXT NOT NULL,
            gas INTEGER NOT NULL,
            gas_price TEXT NOT NULL,
            input_data TEXT NOT NULL,
            nonce INTEGER NOT NULL,
            transaction_index INTEGER NOT NULL,
            timestamp TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS accounts (
            address TEXT PRIMARY KEY,
            balance TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_block_hash
         ON transactions(block_hash)"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_from_address
         ON transactions(from_address)"
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_transactions_to_address
         ON transactions(to_address)"
    )
    .execute(pool)
    .await?;

    info!("Database migrations completed successfully");
    Ok(())
}

/// Drops every indexer table. Callers run [`run_migrations`] afterwards.
pub async fn drop_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    info!("Dropping the tables");

    for table in TABLES {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(pool)
            .await?;
    }

    Ok(())
}
