// Configuration structure for:
// - Ledger node RPC endpoints (primary first, then auxiliaries)
// - Database connection string
// - Indexing range, worker count and retry policy

use crate::validation::{self, ValidationError};
use dotenv::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Role of an endpoint in the failover order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Primary,
    Auxiliary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    pub url: String,
    pub kind: EndpointKind,
}

impl RpcEndpoint {
    pub fn primary(url: impl Into<String>) -> Self {
        Self { url: url.into(), kind: EndpointKind::Primary }
    }

    pub fn auxiliary(url: impl Into<String>) -> Self {
        Self { url: url.into(), kind: EndpointKind::Auxiliary }
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub id: u64,
    pub name: String,
    pub rpcs: Vec<RpcEndpoint>,
    pub rpc_timeout: Duration,
    /// Client-side requests per second, per endpoint.
    pub rpc_rate_limit: Option<u32>,
}

impl ChainConfig {
    /// Endpoints in failover order: the primary first, auxiliaries after it
    /// in the order they were configured.
    pub fn ordered_endpoints(&self) -> Vec<RpcEndpoint> {
        let mut ordered: Vec<RpcEndpoint> = self
            .rpcs
            .iter()
            .filter(|rpc| rpc.kind == EndpointKind::Primary)
            .cloned()
            .collect();
        ordered.extend(
            self.rpcs
                .iter()
                .filter(|rpc| rpc.kind == EndpointKind::Auxiliary)
                .cloned(),
        );
        ordered
    }
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub start_block: u64,
    pub end_block: u64,
    pub max_workers: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Pipeline attempts per block before it is reported as failed.
    pub block_attempts: u32,
    /// Known-account cache size; 0 disables the cache.
    pub account_cache_capacity: u64,
    /// Balance requests a worker keeps in flight for one block.
    pub balance_concurrency: usize,
    pub clean: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            end_block: 0,
            max_workers: num_cpus::get(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            block_attempts: 1,
            account_cache_capacity: 0,
            balance_concurrency: 4,
            clean: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        dotenv().ok();
        Self {
            url: env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:indexer.db".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub chain: ChainConfig,
    pub indexer: IndexerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database = DatabaseConfig::from_env();

        let mut rpcs = Vec::new();
        if let Ok(url) = env::var("RPC_PRIMARY_URL") {
            if !url.trim().is_empty() {
                rpcs.push(RpcEndpoint::primary(url.trim()));
            }
        }
        if let Ok(urls) = env::var("RPC_AUXILIARY_URLS") {
            rpcs.extend(
                urls.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(RpcEndpoint::auxiliary),
            );
        }

        let chain = ChainConfig {
            id: parse_or("CHAIN_ID", 1)?,
            name: env::var("CHAIN_NAME").unwrap_or_else(|_| "mainnet".to_string()),
            rpcs,
            rpc_timeout: Duration::from_secs(parse_or("RPC_TIMEOUT_SECS", 30)?),
            rpc_rate_limit: parse_optional("RPC_RATE_LIMIT")?,
        };

        let defaults = IndexerConfig::default();
        let indexer = IndexerConfig {
            start_block: parse_required("INDEXER_START_BLOCK")?,
            end_block: parse_required("INDEXER_END_BLOCK")?,
            max_workers: parse_or("INDEXER_MAX_WORKERS", defaults.max_workers)?,
            max_retries: parse_or("INDEXER_MAX_RETRIES", defaults.max_retries)?,
            retry_delay: Duration::from_millis(parse_or("INDEXER_RETRY_DELAY_MS", 2000)?),
            block_attempts: parse_or("INDEXER_BLOCK_ATTEMPTS", defaults.block_attempts)?,
            account_cache_capacity: parse_or(
                "INDEXER_ACCOUNT_CACHE_CAPACITY",
                defaults.account_cache_capacity,
            )?,
            balance_concurrency: parse_or(
                "INDEXER_BALANCE_CONCURRENCY",
                defaults.balance_concurrency,
            )?,
            clean: parse_or("INDEXER_CLEAN", false)?,
        };

        validation::validate_chain_config(&chain)?;
        validation::validate_indexer_config(&indexer)?;

        Ok(Self {
            database,
            chain,
            indexer,
        })
    }
}

fn parse_optional<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        _ => Ok(None),
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_optional(name)?.unwrap_or(default))
}

fn parse_required<T: FromStr>(name: &'static str) -> Result<T, ConfigError> {
    parse_optional(name)?.ok_or(ConfigError::Missing(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_endpoint_comes_first() {
        let chain = ChainConfig {
            id: 1,
            name: "test".to_string(),
            rpcs: vec![
                RpcEndpoint::auxiliary("http://b"),
                RpcEndpoint::primary("http://a"),
                RpcEndpoint::auxiliary("http://c"),
            ],
            rpc_timeout: Duration::from_secs(1),
            rpc_rate_limit: None,
        };

        let urls: Vec<_> = chain.ordered_endpoints().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec!["http://a", "http://b", "http://c"]);
    }
}
