use crate::blockchain::cursor::BlockCursor;
use crate::blockchain::indexer::{IndexerError, IndexingReport};
use crate::blockchain::node::NodeConnector;
use crate::blockchain::processor::BlockProcessor;
use crate::db::SaveOutcome;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Counts pipeline failures per block and decides whether a failed block is
/// handed out again.
struct FailureTracker {
    max_attempts: u32,
    failures: Mutex<HashMap<u64, u32>>,
}

impl FailureTracker {
    fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure; true while the block still has attempts left.
    async fn record_failure(&self, block: u64) -> bool {
        let mut failures = self.failures.lock().await;
        let count = failures.entry(block).or_insert(0);
        *count += 1;
        *count < self.max_attempts
    }
}

#[derive(Debug, Default)]
struct WorkerStats {
    indexed: usize,
    already_present: usize,
    failed: Vec<u64>,
}

/// Fixed-size pool of workers draining a [`BlockCursor`].
pub struct WorkerPool<C: NodeConnector> {
    processor: Arc<BlockProcessor<C>>,
    cursor: Arc<BlockCursor>,
    failures: Arc<FailureTracker>,
    shutdown: CancellationToken,
}

impl<C: NodeConnector + 'static> WorkerPool<C> {
    pub fn new(
        processor: Arc<BlockProcessor<C>>,
        cursor: Arc<BlockCursor>,
        block_attempts: u32,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            processor,
            cursor,
            failures: Arc::new(FailureTracker::new(block_attempts)),
            shutdown,
        }
    }

    /// Spawns `worker_count` workers and waits until every one has exited.
    pub async fn run(self, worker_count: usize) -> Result<IndexingReport, IndexerError> {
        let handles: Vec<_> = (0..worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    processor: self.processor.clone(),
                    cursor: self.cursor.clone(),
                    failures: self.failures.clone(),
                    shutdown: self.shutdown.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let mut report = IndexingReport::default();
        for result in futures::future::join_all(handles).await {
            let stats = result?;
            report.indexed += stats.indexed;
            report.already_present += stats.already_present;
            report.failed.extend(stats.failed);
        }
        report.failed.sort_unstable();

        Ok(report)
    }
}

struct Worker<C: NodeConnector> {
    id: usize,
    processor: Arc<BlockProcessor<C>>,
    cursor: Arc<BlockCursor>,
    failures: Arc<FailureTracker>,
    shutdown: CancellationToken,
}

impl<C: NodeConnector> Worker<C> {
    async fn run(self) -> WorkerStats {
        info!("Worker {} started", self.id);
        let mut stats = WorkerStats::default();

        loop {
            if self.shutdown.is_cancelled() {
                info!("Worker {} stopping on shutdown", self.id);
                break;
            }

            let Some(block) = self.cursor.next().await else {
                info!("Worker {}: No more blocks to process", self.id);
                break;
            };

            info!("Worker {}: Indexing block {}", self.id, block);
            match self.processor.process_block(block).await {
                Ok(SaveOutcome::Saved) => {
                    info!("Worker {}: Successfully indexed block {}", self.id, block);
                    stats.indexed += 1;
                }
                Ok(SaveOutcome::AlreadyPresent) => {
                    info!("Worker {}: Block {} already indexed", self.id, block);
                    stats.already_present += 1;
                }
                Err(e) => {
                    error!("Worker {}: Error indexing block {}: {}", self.id, block, e);
                    if self.failures.record_failure(block).await {
                        warn!("Worker {}: Re-queueing block {}", self.id, block);
                        self.cursor.add_missing([block]).await;
                    } else {
                        stats.failed.push(block);
                    }
                }
            }
        }

        info!("Worker {} shutting down", self.id);
        stats
    }
}
