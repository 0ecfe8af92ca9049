use crate::blockchain::node::LedgerBlock;
use crate::models::{Account, Block, Transaction};
use alloy_consensus::transaction::SignerRecoverable;
use alloy_consensus::Transaction as _;
use alloy_primitives::{hex, Address, B256, U256};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to recover sender of transaction {hash}: {reason}")]
    SenderRecovery { hash: String, reason: String },
}

/// Transactions of one block plus the addresses they touch.
#[derive(Debug, Default)]
pub struct BlockContents {
    pub transactions: Vec<Transaction>,
    /// Senders and recipients, de-duplicated, in first-seen order.
    pub addresses: Vec<Address>,
}

pub fn format_hash(hash: &B256) -> String {
    hex::encode_prefixed(hash)
}

pub fn format_address(address: &Address) -> String {
    address.to_checksum(None)
}

fn block_time(timestamp: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp as i64, 0).unwrap_or_default()
}

/// The block record. `transaction_count` is filled in by the store.
pub fn extract_block(block: &LedgerBlock, total_difficulty: U256) -> Block {
    Block {
        number: block.number as i64,
        hash: format_hash(&block.hash),
        parent_hash: format_hash(&block.parent_hash),
        timestamp: block_time(block.timestamp),
        miner: format_address(&block.miner),
        difficulty: block.difficulty.to_string(),
        total_difficulty: total_difficulty.to_string(),
        size: block.size as i64,
        gas_used: block.gas_used as i64,
        gas_limit: block.gas_limit as i64,
        nonce: u64::from_be_bytes(block.nonce.0).to_string(),
        extra_data: hex::encode_prefixed(&block.extra_data),
        transaction_count: block.transactions.len() as i64,
    }
}

/// Builds transaction records, recovering each sender from its signature.
///
/// Contract creations are recorded with the zero address as recipient and
/// contribute no recipient to the touched addresses.
pub fn extract_transactions(block: &LedgerBlock) -> Result<BlockContents, ExtractError> {
    let block_hash = format_hash(&block.hash);
    let timestamp = block_time(block.timestamp);

    let mut contents = BlockContents::default();
    let mut seen = HashSet::new();

    for (index, tx) in block.transactions.iter().enumerate() {
        let hash = format_hash(tx.tx_hash());

        let from = tx
            .recover_signer()
            .map_err(|e| ExtractError::SenderRecovery {
                hash: hash.clone(),
                reason: e.to_string(),
            })?;
        let to = tx.to();

        for address in std::iter::once(from).chain(to) {
            if seen.insert(address) {
                contents.addresses.push(address);
            }
        }

        contents.transactions.push(Transaction {
            hash,
            block_hash: block_hash.clone(),
            from_address: format_address(&from),
            to_address: format_address(&to.unwrap_or(Address::ZERO)),
            value: tx.value().to_string(),
            gas: tx.gas_limit() as i64,
            gas_price: tx
                .gas_price()
                .unwrap_or_else(|| tx.max_fee_per_gas())
                .to_string(),
            input_data: hex::encode_prefixed(tx.input()),
            nonce: tx.nonce() as i64,
            transaction_index: index as i64,
            timestamp,
        });
    }

    Ok(contents)
}

pub fn extract_account(address: &Address, balance: U256) -> Account {
    Account {
        address: format_address(address),
        balance: balance.to_string(),
    }
}
