use crate::blockchain::client::{EndpointPool, RpcClient, RpcError};
use crate::blockchain::cursor::BlockCursor;
use crate::blockchain::models::ExtractError;
use crate::blockchain::node::{HttpConnector, NodeConnector, NodeError};
use crate::blockchain::processor::BlockProcessor;
use crate::blockchain::worker_pool::WorkerPool;
use crate::cache::AccountCache;
use crate::config::{ChainConfig, IndexerConfig, RpcEndpoint};
use crate::db::BlockchainStore;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("{} blocks failed to index: {:?}", .failed.len(), .failed)]
    Incomplete { failed: Vec<u64> },
}

/// Outcome of one indexing pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexingReport {
    /// Blocks written during this pass.
    pub indexed: usize,
    /// Blocks handed out but found already stored.
    pub already_present: usize,
    /// Blocks that exhausted their attempts, ascending.
    pub failed: Vec<u64>,
}

impl IndexingReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turns a pass with failed blocks into an error.
    pub fn ensure_complete(self) -> Result<Self, IndexerError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(IndexerError::Incomplete {
                failed: self.failed,
            })
        }
    }
}

/// Where a pass starts: the sequential cursor start and the backlog of
/// missing blocks below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexingPlan {
    pub cursor_start: u64,
    pub missing: Vec<u64>,
}

/// Resumes after the highest stored block and backfills every gap between
/// the configured start and it.
pub async fn plan_indexing(
    store: &BlockchainStore,
    config: &IndexerConfig,
) -> Result<IndexingPlan, IndexerError> {
    let start = config.start_block;
    let end = config.end_block;

    let plan = match store.latest_saved_block().await? {
        Some(latest) if latest >= start => IndexingPlan {
            cursor_start: latest.saturating_add(1),
            missing: store.identify_missing_blocks(start, latest.min(end)).await?,
        },
        _ => IndexingPlan {
            cursor_start: start,
            missing: Vec::new(),
        },
    };

    info!(
        "Starting from block {} with {} missing blocks to backfill",
        plan.cursor_start,
        plan.missing.len()
    );
    Ok(plan)
}

/// Indexes `[start_block, end_block]` from the chain's HTTP endpoints.
pub async fn start_indexing(
    chain: &ChainConfig,
    store: &BlockchainStore,
    indexer: &IndexerConfig,
) -> Result<IndexingReport, IndexerError> {
    start_indexing_with_shutdown(chain, store, indexer, CancellationToken::new()).await
}

/// Like [`start_indexing`]; cancelling `shutdown` stops workers from taking
/// new blocks while in-flight blocks finish.
pub async fn start_indexing_with_shutdown(
    chain: &ChainConfig,
    store: &BlockchainStore,
    indexer: &IndexerConfig,
    shutdown: CancellationToken,
) -> Result<IndexingReport, IndexerError> {
    let connector = HttpConnector::new(chain)?;
    run_indexer(
        connector,
        chain.ordered_endpoints(),
        store.clone(),
        indexer,
        shutdown,
    )
    .await
}

pub async fn run_indexer<C>(
    connector: C,
    endpoints: Vec<RpcEndpoint>,
    store: BlockchainStore,
    config: &IndexerConfig,
    shutdown: CancellationToken,
) -> Result<IndexingReport, IndexerError>
where
    C: NodeConnector + 'static,
{
    info!("Starting indexing process...");

    let pool = EndpointPool::new(connector, endpoints, config.max_retries, config.retry_delay);
    let client = RpcClient::connect(pool).await?;

    if config.clean {
        warn!("Wiping indexed data before the run");
        store.clean().await?;
    }

    let plan = plan_indexing(&store, config).await?;
    let cursor = Arc::new(BlockCursor::new(plan.cursor_start, config.end_block));
    cursor.add_missing(plan.missing).await;

    let known_accounts = (config.account_cache_capacity > 0)
        .then(|| AccountCache::new(config.account_cache_capacity));
    let processor = Arc::new(BlockProcessor::new(
        Arc::new(client),
        store,
        known_accounts,
        config.balance_concurrency,
    ));

    let pool = WorkerPool::new(processor, cursor, config.block_attempts, shutdown);
    let report = pool.run(config.max_workers).await?;

    info!(
        "Indexing process completed: {} indexed, {} already present, {} failed",
        report.indexed,
        report.already_present,
        report.failed.len()
    );
    Ok(report)
}
