use crate::models::Account;
use sqlx::{Executor, Sqlite};

/// First write wins: an address that is already stored keeps its balance.
/// Returns whether a row was inserted.
pub async fn insert_account<'e, E>(executor: E, account: &Account) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        "INSERT INTO accounts (address, balance) VALUES (?, ?)
         ON CONFLICT(address) DO NOTHING",
    )
    .bind(&account.address)
    .bind(&account.balance)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn get_account<'e, E>(executor: E, address: &str) -> Result<Option<Account>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Account>("SELECT address, balance FROM accounts WHERE address = ?")
        .bind(address)
        .fetch_optional(executor)
        .await
}

pub async fn count_accounts<'e, E>(executor: E) -> Result<i64, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(executor)
        .await
}
