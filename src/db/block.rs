use crate::models::Block;
use sqlx::{Executor, Sqlite};

/// Existence check by count, without loading the row.
pub async fn block_exists<'e, E>(executor: E, number: i64) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blocks WHERE number = ?")
        .bind(number)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}

pub async fn insert_block<'e, E>(executor: E, block: &Block) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO blocks
        (number, hash, parent_hash, timestamp, miner, difficulty, total_difficulty,
         size, gas_used, gas_limit, nonce, extra_data, transaction_count)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(block.number)
    .bind(&block.hash)
    .bind(&block.parent_hash)
    .bind(block.timestamp)
    .bind(&block.miner)
    .bind(&block.difficulty)
    .bind(&block.total_difficulty)
    .bind(block.size)
    .bind(block.gas_used)
    .bind(block.gas_limit)
    .bind(&block.nonce)
    .bind(&block.extra_data)
    .bind(block.transaction_count)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn latest_block_number<'e, E>(executor: E) -> Result<Option<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT MAX(number) FROM blocks")
        .fetch_one(executor)
        .await
}

/// Key-column projection over an inclusive range, ascending.
pub async fn block_numbers_in_range<'e, E>(
    executor: E,
    start: i64,
    end: i64,
) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT number FROM blocks WHERE number >= ? AND number <= ? ORDER BY number")
        .bind(start)
        .bind(end)
        .fetch_all(executor)
        .await
}

pub async fn all_block_numbers<'e, E>(executor: E) -> Result<Vec<i64>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT number FROM blocks ORDER BY number")
        .fetch_all(executor)
        .await
}

pub async fn get_block<'e, E>(executor: E, number: i64) -> Result<Option<Block>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Block>(
        r#"SELECT number, hash, parent_hash, timestamp, miner, difficulty, total_difficulty,
                  size, gas_used, gas_limit, nonce, extra_data, transaction_count
           FROM blocks WHERE number = ?"#,
    )
    .bind(number)
    .fetch_optional(executor)
    .await
}

pub async fn count_blocks<'e, E>(executor: E) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM blocks")
        .fetch_one(executor)
        .await
}
