pub mod client;
pub mod cursor;
pub mod indexer;
pub mod models;
pub mod node;
pub mod processor;
pub mod worker_pool;

// Re-exports for convenience
pub use client::{EndpointPool, RpcClient, RpcError};
pub use indexer::{
    run_indexer, start_indexing, start_indexing_with_shutdown, IndexerError, IndexingReport,
};
pub use node::{HttpConnector, LedgerBlock, LedgerNode, NodeConnector, NodeError};
