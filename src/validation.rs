use crate::config::{ChainConfig, IndexerConfig};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No RPC endpoints configured")]
    NoEndpoints,

    #[error("Invalid RPC endpoint URL: {0}. Must start with http:// or https://")]
    InvalidEndpoint(String),

    #[error("Invalid block range: start {start} is greater than end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Block {0} exceeds the highest storable block number {max}", max = MAX_BLOCK_NUMBER)]
    BlockTooHigh(u64),

    #[error("Invalid parameter: {0} must be at least 1")]
    Zero(&'static str),
}

/// Block numbers are stored as SQLite `INTEGER`, a signed 64-bit value.
pub const MAX_BLOCK_NUMBER: u64 = i64::MAX as u64;

pub fn validate_endpoint_url(url: &str) -> Result<(), ValidationError> {
    let url = url.trim();
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));

    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ValidationError::InvalidEndpoint(url.to_string())),
    }
}

pub fn validate_block_range(start: u64, end: u64) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::InvalidRange { start, end });
    }
    if end > MAX_BLOCK_NUMBER {
        return Err(ValidationError::BlockTooHigh(end));
    }
    Ok(())
}

pub fn validate_chain_config(chain: &ChainConfig) -> Result<(), ValidationError> {
    if chain.rpcs.is_empty() {
        return Err(ValidationError::NoEndpoints);
    }

    for rpc in &chain.rpcs {
        validate_endpoint_url(&rpc.url)?;
    }

    Ok(())
}

pub fn validate_indexer_config(indexer: &IndexerConfig) -> Result<(), ValidationError> {
    validate_block_range(indexer.start_block, indexer.end_block)?;

    if indexer.max_workers == 0 {
        return Err(ValidationError::Zero("max_workers"));
    }
    if indexer.max_retries == 0 {
        return Err(ValidationError::Zero("max_retries"));
    }
    if indexer.block_attempts == 0 {
        return Err(ValidationError::Zero("block_attempts"));
    }
    if indexer.balance_concurrency == 0 {
        return Err(ValidationError::Zero("balance_concurrency"));
    }

    Ok(())
}
