pub mod account;
pub mod block;
pub mod connection;
pub mod migration;
pub mod store;
pub mod transaction;

pub use store::{gap_ranges, BlockchainStore, SaveOutcome};
