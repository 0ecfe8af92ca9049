pub mod blockchain;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod validation;

#[cfg(test)]
pub mod tests;

// Re-export specific items for convenience
pub use blockchain::{start_indexing, start_indexing_with_shutdown, IndexerError, IndexingReport};
pub use config::Config;
pub use db::connection;
pub use db::migration;
pub use db::{BlockchainStore, SaveOutcome};
pub use models::{Account, Block, Transaction};
