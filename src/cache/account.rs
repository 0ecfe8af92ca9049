//! Cross-block cache of addresses whose account row is already stored

use alloy_primitives::Address;
use moka::future::Cache;
use tracing::debug;

/// Addresses known to have an account row.
///
/// Accounts are first-write-wins, so a cached address never needs its
/// balance fetched again.
#[derive(Clone)]
pub struct AccountCache {
    cache: Cache<Address, ()>,
}

impl AccountCache {
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(capacity).build();

        Self { cache }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.cache.contains_key(address)
    }

    pub async fn mark_stored(&self, address: Address) {
        self.cache.insert(address, ()).await;
        debug!("Cached stored account {}", address);
    }
}
