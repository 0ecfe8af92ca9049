use crate::blockchain::node::{LedgerBlock, LedgerNode, NodeConnector, NodeError};
use crate::config::RpcEndpoint;
use alloy_primitives::{Address, B256, U256};
use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("No RPC endpoints configured")]
    NoEndpoints,

    #[error("Failed to connect to any RPC endpoint after {attempts} attempts")]
    NoReachableEndpoint { attempts: u32 },

    #[error("RPC call failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: NodeError,
    },
}

/// Ordered endpoint list plus the connection retry policy.
pub struct EndpointPool<C: NodeConnector> {
    connector: C,
    endpoints: Vec<RpcEndpoint>,
    max_retries: u32,
    retry_delay: Duration,
}

impl<C: NodeConnector> EndpointPool<C> {
    pub fn new(
        connector: C,
        endpoints: Vec<RpcEndpoint>,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            connector,
            endpoints,
            max_retries,
            retry_delay,
        }
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn url(&self, index: usize) -> &str {
        self.endpoints
            .get(index)
            .map(|endpoint| endpoint.url.as_str())
            .unwrap_or_default()
    }

    /// Fixed delays between the `max_retries` attempts of one loop.
    fn backoff(&self) -> ConstantBackoff {
        ConstantBuilder::default()
            .with_delay(self.retry_delay)
            .with_max_times(self.max_retries.saturating_sub(1) as usize)
            .build()
    }

    /// Connects to the first reachable endpoint, starting at `start` and
    /// wrapping around the list once.
    ///
    /// Each endpoint gets up to `max_retries` attempts with a fixed delay
    /// between them; a rate-limited endpoint is abandoned immediately.
    pub async fn establish(&self, start: usize) -> Result<(usize, C::Node), RpcError> {
        let count = self.endpoints.len();
        if count == 0 {
            return Err(RpcError::NoEndpoints);
        }

        let mut attempts = 0;
        for offset in 0..count {
            let index = (start + offset) % count;
            let url = self.url(index);
            let mut delays = self.backoff();

            loop {
                attempts += 1;
                match self.connector.connect(url).await {
                    Ok(node) => {
                        info!("Connected to RPC endpoint {}", url);
                        return Ok((index, node));
                    }
                    Err(e) if e.is_rate_limited() => {
                        warn!("RPC {} rate limited. Switching to next RPC URL.", url);
                        break;
                    }
                    Err(e) => match delays.next() {
                        Some(delay) => {
                            warn!(
                                "Failed to connect to {}: {}. Retrying ({}/{})...",
                                url, e, attempts, self.max_retries
                            );
                            sleep(delay).await;
                        }
                        None => {
                            warn!("Giving up on {}: {}", url, e);
                            break;
                        }
                    },
                }
            }
        }

        Err(RpcError::NoReachableEndpoint { attempts })
    }
}

struct ActiveEndpoint<N> {
    index: usize,
    node: Arc<N>,
}

/// Ledger node client that retries transient failures with a fixed backoff
/// and fails over to the next endpoint when rate limited.
///
/// Only the active endpoint is guarded by a lock. Calls run on a shared
/// session outside of it.
pub struct RpcClient<C: NodeConnector> {
    pool: EndpointPool<C>,
    active: RwLock<ActiveEndpoint<C::Node>>,
}

impl<C: NodeConnector> RpcClient<C> {
    /// Connects to the first reachable endpoint in list order.
    pub async fn connect(pool: EndpointPool<C>) -> Result<Self, RpcError> {
        let (index, node) = pool.establish(0).await?;

        Ok(Self {
            pool,
            active: RwLock::new(ActiveEndpoint {
                index,
                node: Arc::new(node),
            }),
        })
    }

    pub async fn active_endpoint(&self) -> String {
        let active = self.active.read().await;
        active.node.url().to_string()
    }

    pub async fn fetch_block_by_number(&self, number: u64) -> Result<LedgerBlock, RpcError> {
        self.call(|node| async move { node.block_by_number(number).await })
            .await
    }

    pub async fn fetch_block_by_hash(&self, hash: B256) -> Result<LedgerBlock, RpcError> {
        self.call(|node| async move { node.block_by_hash(hash).await })
            .await
    }

    pub async fn fetch_balance(&self, address: Address) -> Result<U256, RpcError> {
        self.call(|node| async move { node.balance(address).await })
            .await
    }

    async fn current(&self) -> (usize, Arc<C::Node>) {
        let active = self.active.read().await;
        (active.index, active.node.clone())
    }

    /// Runs `op` up to `max_retries` times. Rate limiting switches endpoint
    /// and retries without sleeping; other failures sleep the fixed delay.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, RpcError>
    where
        F: Fn(Arc<C::Node>) -> Fut,
        Fut: Future<Output = Result<T, NodeError>>,
    {
        let mut delays = self.pool.backoff();
        let mut attempts = 0;

        loop {
            attempts += 1;
            let (index, node) = self.current().await;

            let err = match op(node).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            let rate_limited = err.is_rate_limited();
            if rate_limited {
                warn!("RPC {} rate limited (429). Switching to next RPC URL.", self.pool.url(index));
                self.fail_over(index).await?;
            } else {
                warn!(
                    "RPC call on {} failed: {}. Attempt {}/{}",
                    self.pool.url(index),
                    err,
                    attempts,
                    self.pool.max_retries
                );
            }

            match delays.next() {
                Some(delay) => {
                    if !rate_limited {
                        sleep(delay).await;
                    }
                }
                None => return Err(RpcError::RetriesExhausted { attempts, source: err }),
            }
        }
    }

    /// Advances to the endpoint after `observed` and reconnects. When another
    /// caller has already moved past `observed`, the current endpoint is kept.
    async fn fail_over(&self, observed: usize) -> Result<(), RpcError> {
        let mut active = self.active.write().await;
        if active.index != observed {
            debug!("Endpoint already switched to {}", self.pool.url(active.index));
            return Ok(());
        }

        let next = (observed + 1) % self.pool.len();
        let (index, node) = self.pool.establish(next).await?;
        *active = ActiveEndpoint {
            index,
            node: Arc::new(node),
        };

        Ok(())
    }
}
