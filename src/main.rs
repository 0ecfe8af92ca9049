use evm_block_indexer::blockchain::start_indexing_with_shutdown;
use evm_block_indexer::config::Config;
use evm_block_indexer::db::{connection, BlockchainStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting evm-block-indexer");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        "Indexing {} (chain id {}) blocks {} to {} with {} workers",
        config.chain.name,
        config.chain.id,
        config.indexer.start_block,
        config.indexer.end_block,
        config.indexer.max_workers
    );

    // Setup database connection
    let pool = connection::establish_connection(&config.database).await?;
    let store = BlockchainStore::new(pool);

    // Stop handing out blocks on Ctrl-C; in-flight blocks still finish
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Shutdown requested, finishing in-flight blocks");
            signal.cancel();
        }
    });

    let result =
        start_indexing_with_shutdown(&config.chain, &store, &config.indexer, shutdown).await;

    // Checkpoint the WAL before exiting, on failure too
    store.pool().close().await;

    let report = result?.ensure_complete()?;
    tracing::info!(
        "All blocks indexed: {} new, {} already present",
        report.indexed,
        report.already_present
    );

    Ok(())
}
