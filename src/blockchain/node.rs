use crate::config::ChainConfig;
use alloy_consensus::TxEnvelope;
use alloy_primitives::{Address, Bytes, B256, B64, U256, U64};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// JSON-RPC error code some providers use for "limit exceeded".
pub const LIMIT_EXCEEDED_CODE: i64 = -32005;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("Rate limited by {url}")]
    RateLimited { url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl NodeError {
    /// Rate limiting drives endpoint failover instead of a backoff sleep.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Rpc { code, .. } => *code == LIMIT_EXCEEDED_CODE,
            _ => false,
        }
    }
}

/// A block as served by the ledger node, with its signed transactions.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerBlock {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub miner: Address,
    pub difficulty: U256,
    pub total_difficulty: Option<U256>,
    pub size: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub nonce: B64,
    pub extra_data: Bytes,
    pub transactions: Vec<TxEnvelope>,
}

/// A session with one ledger node endpoint.
///
/// Implementations are shared by every worker and called concurrently, so
/// the underlying transport must be safe for concurrent use.
#[async_trait]
pub trait LedgerNode: Send + Sync {
    fn url(&self) -> &str;

    async fn block_by_number(&self, number: u64) -> Result<LedgerBlock, NodeError>;

    async fn block_by_hash(&self, hash: B256) -> Result<LedgerBlock, NodeError>;

    /// Balance at the latest state.
    async fn balance(&self, address: Address) -> Result<U256, NodeError>;
}

/// Establishes sessions with ledger node endpoints.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    type Node: LedgerNode + 'static;

    async fn connect(&self, url: &str) -> Result<Self::Node, NodeError>;
}

/// Connects to Ethereum-style JSON-RPC endpoints over HTTP.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    rate_limit: Option<NonZeroU32>,
    expected_chain_id: u64,
}

impl HttpConnector {
    pub fn new(chain: &ChainConfig) -> Result<Self, NodeError> {
        Self::with_timeout(chain.rpc_timeout, chain.rpc_rate_limit, chain.id)
    }

    pub fn with_timeout(
        timeout: Duration,
        rate_limit: Option<u32>,
        expected_chain_id: u64,
    ) -> Result<Self, NodeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            rate_limit: rate_limit.and_then(NonZeroU32::new),
            expected_chain_id,
        })
    }
}

#[async_trait]
impl NodeConnector for HttpConnector {
    type Node = HttpNode;

    async fn connect(&self, url: &str) -> Result<HttpNode, NodeError> {
        let node = HttpNode {
            client: self.client.clone(),
            url: url.to_string(),
            limiter: self
                .rate_limit
                .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate)))),
            next_id: Arc::new(AtomicU64::new(1)),
        };

        let chain_id = node.chain_id().await?;
        if chain_id != self.expected_chain_id {
            warn!(
                "Endpoint {} reports chain id {}, expected {}",
                url, chain_id, self.expected_chain_id
            );
        } else {
            info!("Endpoint {} serves chain id {}", url, chain_id);
        }

        Ok(node)
    }
}

/// A JSON-RPC session. `reqwest::Client` is safe to share across tasks.
#[derive(Clone)]
pub struct HttpNode {
    client: reqwest::Client,
    url: String,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    next_id: Arc<AtomicU64>,
}

impl HttpNode {
    pub async fn chain_id(&self) -> Result<u64, NodeError> {
        let id: Option<U64> = self.request("eth_chainId", json!([])).await?;
        id.map(|id| id.to::<u64>()).ok_or_else(|| NodeError::Rpc {
            code: 0,
            message: "eth_chainId returned null".to_string(),
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, NodeError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("{} -> {}", method, self.url);
        let response = self.client.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        decode_response(&self.url, status, &bytes)
    }

    async fn fetch_block(
        &self,
        method: &str,
        id: Value,
        label: String,
    ) -> Result<LedgerBlock, NodeError> {
        let block: Option<RpcBlock> = self.request(method, json!([id, true])).await?;
        block
            .map(LedgerBlock::from)
            .ok_or(NodeError::BlockNotFound(label))
    }
}

#[async_trait]
impl LedgerNode for HttpNode {
    fn url(&self) -> &str {
        &self.url
    }

    async fn block_by_number(&self, number: u64) -> Result<LedgerBlock, NodeError> {
        self.fetch_block(
            "eth_getBlockByNumber",
            json!(format!("{:#x}", number)),
            number.to_string(),
        )
        .await
    }

    async fn block_by_hash(&self, hash: B256) -> Result<LedgerBlock, NodeError> {
        self.fetch_block("eth_getBlockByHash", json!(hash), hash.to_string())
            .await
    }

    async fn balance(&self, address: Address) -> Result<U256, NodeError> {
        let balance: Option<U256> = self
            .request("eth_getBalance", json!([address, "latest"]))
            .await?;
        balance.ok_or_else(|| NodeError::Rpc {
            code: 0,
            message: format!("eth_getBalance returned null for {address}"),
        })
    }
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Maps an HTTP status and JSON-RPC body to a result. A `null` result is
/// returned as `None`.
fn decode_response<T: DeserializeOwned>(
    url: &str,
    status: StatusCode,
    body: &[u8],
) -> Result<Option<T>, NodeError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(NodeError::RateLimited { url: url.to_string() });
    }
    if !status.is_success() {
        return Err(NodeError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let envelope: RpcResponse<T> = serde_json::from_slice(body)?;
    if let Some(error) = envelope.error {
        return Err(NodeError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    Ok(envelope.result)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U64,
    hash: B256,
    parent_hash: B256,
    timestamp: U64,
    miner: Address,
    difficulty: U256,
    #[serde(default)]
    total_difficulty: Option<U256>,
    #[serde(default)]
    size: Option<U64>,
    gas_used: U64,
    gas_limit: U64,
    #[serde(default)]
    nonce: Option<B64>,
    extra_data: Bytes,
    #[serde(default)]
    transactions: Vec<TxEnvelope>,
}

impl From<RpcBlock> for LedgerBlock {
    fn from(block: RpcBlock) -> Self {
        Self {
            number: block.number.to::<u64>(),
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp.to::<u64>(),
            miner: block.miner,
            difficulty: block.difficulty,
            total_difficulty: block.total_difficulty,
            size: block.size.map(|size| size.to::<u64>()).unwrap_or_default(),
            gas_used: block.gas_used.to::<u64>(),
            gas_limit: block.gas_limit.to::<u64>(),
            nonce: block.nonce.unwrap_or_default(),
            extra_data: block.extra_data,
            transactions: block.transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://node.test";

    #[test]
    fn rate_limit_classification() {
        assert!(NodeError::RateLimited { url: URL.to_string() }.is_rate_limited());
        assert!(NodeError::Rpc { code: LIMIT_EXCEEDED_CODE, message: "limit exceeded".into() }
            .is_rate_limited());
        assert!(!NodeError::Rpc { code: -32000, message: "header not found".into() }
            .is_rate_limited());
        assert!(!NodeError::BlockNotFound("7".into()).is_rate_limited());
    }

    #[test]
    fn http_429_is_rate_limited() {
        let result = decode_response::<U256>(URL, StatusCode::TOO_MANY_REQUESTS, b"");
        assert!(matches!(result, Err(NodeError::RateLimited { .. })));

        let result = decode_response::<U256>(URL, StatusCode::BAD_GATEWAY, b"");
        assert!(matches!(result, Err(NodeError::Status { status: 502, .. })));
    }

    #[test]
    fn decodes_result_null_and_error() {
        let balance: Option<U256> = decode_response(
            URL,
            StatusCode::OK,
            br#"{"jsonrpc":"2.0","id":1,"result":"0x1bc16d674ec80000"}"#,
        )
        .unwrap();
        assert_eq!(balance, Some(U256::from(2_000_000_000_000_000_000u128)));

        let missing: Option<U256> =
            decode_response(URL, StatusCode::OK, br#"{"jsonrpc":"2.0","id":1,"result":null}"#)
                .unwrap();
        assert_eq!(missing, None);

        let error = decode_response::<U256>(
            URL,
            StatusCode::OK,
            br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"limit exceeded"}}"#,
        )
        .unwrap_err();
        assert!(error.is_rate_limited());
    }

    #[test]
    fn decodes_block_without_transactions() {
        let body = br#"{"jsonrpc":"2.0","id":1,"result":{
            "number":"0x64",
            "hash":"0x1111111111111111111111111111111111111111111111111111111111111111",
            "parentHash":"0x2222222222222222222222222222222222222222222222222222222222222222",
            "timestamp":"0x5f5e100",
            "miner":"0x3333333333333333333333333333333333333333",
            "difficulty":"0x2",
            "totalDifficulty":"0xc8",
            "size":"0x220",
            "gasUsed":"0x0",
            "gasLimit":"0x1c9c380",
            "nonce":"0x0000000000000042",
            "extraData":"0xd883010203",
            "transactions":[]
        }}"#;

        let block: RpcBlock = decode_response(URL, StatusCode::OK, body).unwrap().unwrap();
        let block = LedgerBlock::from(block);

        assert_eq!(block.number, 100);
        assert_eq!(block.timestamp, 100_000_000);
        assert_eq!(block.total_difficulty, Some(U256::from(200)));
        assert_eq!(block.size, 0x220);
        assert_eq!(block.gas_limit, 30_000_000);
        assert_eq!(u64::from_be_bytes(block.nonce.0), 0x42);
        assert!(block.transactions.is_empty());
    }
}
