use crate::db::{account, block, migration, transaction};
use crate::models::{Account, Block, Transaction};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Collapses ascending block numbers into inclusive `(first, last)` runs.
pub fn gap_ranges(blocks: &[u64]) -> Vec<(u64, u64)> {
    let mut ranges: Vec<(u64, u64)> = Vec::new();
    for &block in blocks {
        match ranges.last_mut() {
            Some((_, last)) if last.checked_add(1) == Some(block) => *last = block,
            _ => ranges.push((block, block)),
        }
    }
    ranges
}

/// Block numbers above `i64::MAX` cannot be stored and map to `None`.
fn sql_block_number(number: u64) -> Option<i64> {
    i64::try_from(number).ok()
}

/// Result of [`BlockchainStore::save_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    /// The block row already existed; nothing was written.
    AlreadyPresent,
}

/// Higher-level block, transaction and account persistence.
///
/// A block row is written last, inside the same database transaction as its
/// transactions and accounts, so a stored block is proof that everything it
/// references was stored too.
#[derive(Clone)]
pub struct BlockchainStore {
    pool: SqlitePool,
    // SQLite admits one writer at a time.
    write_lock: Arc<Mutex<()>>,
}

impl BlockchainStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drops and recreates every table.
    pub async fn clean(&self) -> Result<(), sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        migration::drop_tables(&self.pool).await?;
        migration::run_migrations(&self.pool).await
    }

    /// Saves a block with its transactions and accounts as one unit of work.
    ///
    /// Saving a block number that is already stored is a successful no-op.
    /// The stored transaction count is taken from `transactions`.
    pub async fn save_block(
        &self,
        block: &Block,
        transactions: &[Transaction],
        accounts: &[Account],
    ) -> Result<SaveOutcome, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        if block::block_exists(&mut *tx, block.number).await? {
            debug!("Block {} already stored, skipping", block.number);
            tx.rollback().await?;
            return Ok(SaveOutcome::AlreadyPresent);
        }

        for txn in transactions {
            transaction::insert_transaction(&mut *tx, txn).await?;
        }

        for acc in accounts {
            account::insert_account(&mut *tx, acc).await?;
        }

        let row = Block {
            transaction_count: transactions.len() as i64,
            ..block.clone()
        };
        block::insert_block(&mut *tx, &row).await?;

        tx.commit().await?;
        Ok(SaveOutcome::Saved)
    }

    /// Saves a single transaction unless its hash is already stored.
    pub async fn save_transaction(&self, txn: &Transaction) -> Result<bool, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        if transaction::transaction_exists(&self.pool, &txn.hash).await? {
            return Ok(false);
        }
        transaction::insert_transaction(&self.pool, txn).await?;
        Ok(true)
    }

    /// Saves an account unless the address is already stored; an existing
    /// balance is never overwritten. Returns whether a row was inserted.
    pub async fn save_account(&self, acc: &Account) -> Result<bool, sqlx::Error> {
        let _guard = self.write_lock.lock().await;
        account::insert_account(&self.pool, acc).await
    }

    pub async fn block_exists(&self, number: u64) -> Result<bool, sqlx::Error> {
        match sql_block_number(number) {
            Some(number) => block::block_exists(&self.pool, number).await,
            None => Ok(false),
        }
    }

    /// Highest stored block number, `None` when no block is stored.
    pub async fn latest_saved_block(&self) -> Result<Option<u64>, sqlx::Error> {
        Ok(block::latest_block_number(&self.pool)
            .await?
            .map(|number| number as u64))
    }

    /// Highest stored block number, or 0 when no block is stored.
    pub async fn get_latest_saved_block(&self) -> Result<u64, sqlx::Error> {
        Ok(self.latest_saved_block().await?.unwrap_or(0))
    }

    pub async fn get_block_numbers_in_range(
        &self,
        start: u64,
        end: u64,
    ) -> Result<HashSet<u64>, sqlx::Error> {
        let Some(start) = sql_block_number(start) else {
            return Ok(HashSet::new());
        };
        let end = sql_block_number(end).unwrap_or(i64::MAX);
        if start > end {
            return Ok(HashSet::new());
        }
        let numbers = block::block_numbers_in_range(&self.pool, start, end).await?;
        Ok(numbers.into_iter().map(|n| n as u64).collect())
    }

    pub async fn get_all_block_numbers(&self) -> Result<Vec<u64>, sqlx::Error> {
        let numbers = block::all_block_numbers(&self.pool).await?;
        Ok(numbers.into_iter().map(|n| n as u64).collect())
    }

    /// Block numbers in `[start, end]` that are not stored, ascending.
    pub async fn identify_missing_blocks(
        &self,
        start: u64,
        end: u64,
    ) -> Result<Vec<u64>, sqlx::Error> {
        info!("Identifying missing blocks between {} and {}", start, end);
        let stored = self.get_block_numbers_in_range(start, end).await?;

        let missing: Vec<u64> = if start > end {
            Vec::new()
        } else {
            (start..=end).filter(|n| !stored.contains(n)).collect()
        };

        info!("Found {} missing blocks", missing.len());
        Ok(missing)
    }

    pub async fn get_block(&self, number: u64) -> Result<Option<Block>, sqlx::Error> {
        match sql_block_number(number) {
            Some(number) => block::get_block(&self.pool, number).await,
            None => Ok(None),
        }
    }

    pub async fn get_transaction(&self, hash: &str) -> Result<Option<Transaction>, sqlx::Error> {
        transaction::get_transaction(&self.pool, hash).await
    }

    pub async fn get_transactions_for_block(
        &self,
        block_hash: &str,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        transaction::get_transactions_for_block(&self.pool, block_hash).await
    }

    pub async fn get_account(&self, address: &str) -> Result<Option<Account>, sqlx::Error> {
        account::get_account(&self.pool, address).await
    }

    pub async fn count_blocks(&self) -> Result<i64, sqlx::Error> {
        block::count_blocks(&self.pool).await
    }

    pub async fn count_transactions(&self) -> Result<i64, sqlx::Error> {
        transaction::count_transactions(&self.pool).await
    }

    pub async fn count_accounts(&self) -> Result<i64, sqlx::Error> {
        account::count_accounts(&self.pool).await
    }
}
