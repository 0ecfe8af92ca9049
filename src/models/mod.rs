// Persisted records for blocks, transactions and accounts.
// Hashes and addresses are 0x-prefixed hex; big integers are decimal strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Block {
    pub number: i64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: DateTime<Utc>,
    pub miner: String,
    pub difficulty: String,
    pub total_difficulty: String,
    pub size: i64,
    pub gas_used: i64,
    pub gas_limit: i64,
    pub nonce: String,
    pub extra_data: String,
    pub transaction_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub hash: String,
    pub block_hash: String,
    pub from_address: String,
    /// Zero address for contract creation.
    pub to_address: String,
    pub value: String,
    pub gas: i64,
    pub gas_price: String,
    pub input_data: String,
    pub nonce: i64,
    pub transaction_index: i64,
    pub timestamp: DateTime<Utc>,
}

/// Balance snapshot taken the first time the address was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub address: String,
    pub balance: String,
}
