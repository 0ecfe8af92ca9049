use crate::models::Transaction;
use sqlx::{Executor, Sqlite};

pub async fn insert_transaction<'e, E>(
    executor: E,
    transaction: &Transaction,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO transactions
        (hash, block_hash, from_address, to_address, value, gas, gas_price,
         input_data, nonce, transaction_index, timestamp)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(hash) DO NOTHING
        "#,
    )
    .bind(&transaction.hash)
    .bind(&transaction.block_hash)
    .bind(&transaction.from_address)
    .bind(&transaction.to_address)
    .bind(&transaction.value)
    .bind(transaction.gas)
    .bind(&transaction.gas_price)
    .bind(&transaction.input_data)
    .bind(transaction.nonce)
    .bind(transaction.transaction_index)
    .bind(transaction.timestamp)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn transaction_exists<'e, E>(executor: E, hash: &str) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE hash = ?")
        .bind(hash)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}

pub async fn get_transaction<'e, E>(
    executor: E,
    hash: &str,
) -> Result<Option<Transaction>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Transaction>(
        r#"SELECT hash, block_hash, from_address, to_address, value, gas, gas_price,
                  input_data, nonce, transaction_index, timestamp
           FROM transactions WHERE hash = ?"#,
    )
    .bind(hash)
    .fetch_optional(executor)
    .await
}

pub async fn get_transactions_for_block<'e, E>(
    executor: E,
    block_hash: &str,
) -> Result<Vec<Transaction>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Transaction>(
        r#"SELECT hash, block_hash, from_address, to_address, value, gas, gas_price,
                  input_data, nonce, transaction_index, timestamp
           FROM transactions
           WHERE block_hash = ?
           ORDER BY transaction_index ASC"#,
    )
    .bind(block_hash)
    .fetch_all(executor)
    .await
}

pub async fn count_transactions<'e, E>(executor: E) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
        .fetch_one(executor)
        .await
}
