use crate::blockchain::client::RpcClient;
use crate::blockchain::indexer::IndexerError;
use crate::blockchain::models::{extract_account, extract_block, extract_transactions};
use crate::blockchain::node::{LedgerBlock, NodeConnector};
use crate::cache::AccountCache;
use crate::db::{BlockchainStore, SaveOutcome};
use crate::models::Account;
use alloy_primitives::{Address, U256};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// Fetches, extracts and persists single blocks.
pub struct BlockProcessor<C: NodeConnector> {
    client: Arc<RpcClient<C>>,
    store: BlockchainStore,
    known_accounts: Option<AccountCache>,
    // Balance requests in flight per block.
    balance_concurrency: usize,
}

impl<C: NodeConnector> BlockProcessor<C> {
    pub fn new(
        client: Arc<RpcClient<C>>,
        store: BlockchainStore,
        known_accounts: Option<AccountCache>,
        balance_concurrency: usize,
    ) -> Self {
        Self {
            client,
            store,
            known_accounts,
            balance_concurrency: balance_concurrency.max(1),
        }
    }

    /// Indexes one block: fetch it, recover its transactions, snapshot the
    /// balances of the addresses it touches and save everything at once.
    pub async fn process_block(&self, number: u64) -> Result<SaveOutcome, IndexerError> {
        if self.store.block_exists(number).await? {
            return Ok(SaveOutcome::AlreadyPresent);
        }

        let block = self.client.fetch_block_by_number(number).await?;
        let contents = extract_transactions(&block)?;
        debug!(
            "Block {}: {} transactions, {} addresses",
            number,
            contents.transactions.len(),
            contents.addresses.len()
        );

        let total_difficulty = self.total_difficulty(&block).await?;
        let accounts = self.fetch_accounts(&contents.addresses).await?;

        let record = extract_block(&block, total_difficulty);
        let outcome = self
            .store
            .save_block(&record, &contents.transactions, &accounts)
            .await?;

        if let Some(cache) = &self.known_accounts {
            for address in &contents.addresses {
                cache.mark_stored(*address).await;
            }
        }

        Ok(outcome)
    }

    /// Nodes that omit total difficulty from the by-number response are asked
    /// for the same block by hash. Falls back to the block difficulty.
    async fn total_difficulty(&self, block: &LedgerBlock) -> Result<U256, IndexerError> {
        if let Some(total) = block.total_difficulty {
            return Ok(total);
        }

        let by_hash = self.client.fetch_block_by_hash(block.hash).await?;
        Ok(by_hash.total_difficulty.unwrap_or(block.difficulty))
    }

    async fn fetch_accounts(&self, addresses: &[Address]) -> Result<Vec<Account>, IndexerError> {
        let pending: Vec<Address> = addresses
            .iter()
            .filter(|address| {
                self.known_accounts
                    .as_ref()
                    .map_or(true, |cache| !cache.contains(address))
            })
            .copied()
            .collect();

        // `buffered` yields in input order, so balances line up with `pending`.
        let balances: Vec<U256> = stream::iter(pending.iter().copied())
            .map(|address| self.client.fetch_balance(address))
            .buffered(self.balance_concurrency)
            .try_collect()
            .await?;

        Ok(pending
            .iter()
            .zip(balances)
            .map(|(address, balance)| extract_account(address, balance))
            .collect())
    }
}
