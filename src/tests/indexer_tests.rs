//! tests/indexer_tests.rs - End-to-end indexing runs against the simulated node

#[cfg(test)]
mod tests {
    use crate::blockchain::client::RpcError;
    use crate::blockchain::indexer::{
        plan_indexing, run_indexer, IndexerError, IndexingPlan, IndexingReport,
    };
    use crate::blockchain::models::{extract_block, format_address};
    use crate::config::{IndexerConfig, RpcEndpoint};
    use crate::db::{connection, BlockchainStore};
    use crate::tests::sim::{bogus_transfer, sim_block, signed_transfer, wallet, SimChain, SimConnector};
    use alloy_primitives::U256;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    const A: &str = "http://a.test";
    const B: &str = "http://b.test";
    const C: &str = "http://c.test";

    async fn setup() -> BlockchainStore {
        let pool = connection::in_memory()
            .await
            .expect("Failed to open in-memory database");
        BlockchainStore::new(pool)
    }

    fn config(start_block: u64, end_block: u64, max_workers: usize) -> IndexerConfig {
        IndexerConfig {
            start_block,
            end_block,
            max_workers,
            max_retries: 3,
            retry_delay: Duration::from_millis(1),
            block_attempts: 1,
            account_cache_capacity: 0,
            balance_concurrency: 4,
            clean: false,
        }
    }

    async fn run(
        connector: &SimConnector,
        store: &BlockchainStore,
        config: &IndexerConfig,
    ) -> Result<IndexingReport, IndexerError> {
        let endpoints = vec![
            RpcEndpoint::primary(A),
            RpcEndpoint::auxiliary(B),
            RpcEndpoint::auxiliary(C),
        ];
        run_indexer(
            connector.clone(),
            endpoints,
            store.clone(),
            config,
            CancellationToken::new(),
        )
        .await
    }

    async fn store_empty_blocks(store: &BlockchainStore, numbers: &[u64]) {
        for &number in numbers {
            let record = extract_block(&sim_block(number, Vec::new()), U256::from(1));
            store.save_block(&record, &[], &[]).await.unwrap();
        }
    }

    fn sorted(mut blocks: Vec<u64>) -> Vec<u64> {
        blocks.sort_unstable();
        blocks
    }

    #[tokio::test]
    async fn indexes_range_with_transactions_and_accounts() {
        let alice = wallet(1);
        let bob = wallet(2);
        let chain = SimChain::with_empty_blocks(100..=105)
            .with_block(sim_block(
                101,
                vec![signed_transfer(&alice, 0, Some(bob.address()), 10)],
            ))
            .with_block(sim_block(
                103,
                vec![
                    signed_transfer(&bob, 0, Some(alice.address()), 3),
                    signed_transfer(&alice, 1, Some(bob.address()), 4),
                ],
            ))
            .with_block(sim_block(105, vec![signed_transfer(&alice, 2, None, 0)]))
            .with_balance(alice.address(), 1_000)
            .with_balance(bob.address(), 500);
        let connector = SimConnector::new(chain);
        let store = setup().await;

        let report = run(&connector, &store, &config(100, 105, 2)).await.unwrap();

        assert_eq!(report.indexed, 6);
        assert!(report.is_complete());
        assert_eq!(sorted(connector.block_calls()), (100..=105).collect::<Vec<u64>>());

        assert_eq!(store.count_blocks().await.unwrap(), 6);
        assert_eq!(store.count_transactions().await.unwrap(), 4);
        assert_eq!(store.count_accounts().await.unwrap(), 2);
        assert_eq!(store.get_block(103).await.unwrap().unwrap().transaction_count, 2);
        assert_eq!(store.get_block(104).await.unwrap().unwrap().transaction_count, 0);

        let alice_account = store
            .get_account(&format_address(&alice.address()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice_account.balance, "1000");
    }

    #[tokio::test]
    async fn unreachable_endpoints_abort_before_writing() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(1..=3));
        for url in [A, B, C] {
            connector.set_unreachable(url);
        }
        let store = setup().await;
        store_empty_blocks(&store, &[1]).await;

        let mut config = config(1, 3, 2);
        config.clean = true;
        let err = run(&connector, &store, &config).await.unwrap_err();

        assert!(matches!(
            err,
            IndexerError::Rpc(RpcError::NoReachableEndpoint { attempts: 9 })
        ));
        // The wipe only happens once a connection is up.
        assert_eq!(store.count_blocks().await.unwrap(), 1);
        assert!(connector.block_calls().is_empty());
    }

    #[tokio::test]
    async fn plan_resumes_after_latest_and_backfills_gaps() {
        let store = setup().await;

        let plan = plan_indexing(&store, &config(100, 106, 1)).await.unwrap();
        assert_eq!(plan, IndexingPlan { cursor_start: 100, missing: Vec::new() });

        store_empty_blocks(&store, &[100, 102, 104]).await;
        let plan = plan_indexing(&store, &config(100, 106, 1)).await.unwrap();
        assert_eq!(plan, IndexingPlan { cursor_start: 105, missing: vec![101, 103] });

        // Stored blocks past the end only leave gaps inside the range.
        store_empty_blocks(&store, &[110]).await;
        let plan = plan_indexing(&store, &config(100, 103, 1)).await.unwrap();
        assert_eq!(plan, IndexingPlan { cursor_start: 111, missing: vec![101, 103] });

        // A range entirely above what is stored starts fresh.
        let plan = plan_indexing(&store, &config(200, 210, 1)).await.unwrap();
        assert_eq!(plan, IndexingPlan { cursor_start: 200, missing: Vec::new() });
    }

    #[tokio::test]
    async fn backfills_gaps_without_refetching_stored_blocks() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(100..=106));
        let store = setup().await;
        store_empty_blocks(&store, &[100, 102, 104]).await;

        let report = run(&connector, &store, &config(100, 106, 3)).await.unwrap();

        assert_eq!(report.indexed, 4);
        assert!(report.is_complete());
        assert_eq!(sorted(connector.block_calls()), vec![101, 103, 105, 106]);
        assert_eq!(
            store.identify_missing_blocks(100, 106).await.unwrap(),
            Vec::<u64>::new()
        );
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(100..=105));
        connector.fail_block(102, 2);
        let store = setup().await;

        let report = run(&connector, &store, &config(100, 105, 2)).await.unwrap();

        assert_eq!(report.indexed, 6);
        assert!(report.is_complete());
        let attempts = connector.block_calls().iter().filter(|&&n| n == 102).count();
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_block_is_reported_as_failed() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(100..=105));
        connector.fail_block(102, 4);
        let store = setup().await;

        let report = run(&connector, &store, &config(100, 105, 2)).await.unwrap();

        assert_eq!(report.indexed, 5);
        assert_eq!(report.failed, vec![102]);
        assert!(!store.block_exists(102).await.unwrap());
        assert_eq!(store.identify_missing_blocks(100, 105).await.unwrap(), vec![102]);
    }

    #[tokio::test]
    async fn failed_block_is_requeued_while_attempts_remain() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(100..=105));
        connector.fail_block(102, 4);
        let store = setup().await;

        let mut config = config(100, 105, 2);
        config.block_attempts = 3;
        let report = run(&connector, &store, &config).await.unwrap();

        assert_eq!(report.indexed, 6);
        assert!(report.is_complete());
        let attempts = connector.block_calls().iter().filter(|&&n| n == 102).count();
        assert_eq!(attempts, 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rate_limited_primary_fails_over_mid_run() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(1..=20));
        connector.set_rate_limited(A);
        let store = setup().await;

        let report = run(&connector, &store, &config(1, 20, 4)).await.unwrap();

        assert_eq!(report.indexed, 20);
        assert!(report.is_complete());
        assert_eq!(connector.connect_log(), vec![A, B]);
        assert!(connector.call_log().iter().all(|url| url == A || url == B));
        assert_eq!(store.count_blocks().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn cancelled_run_takes_no_blocks() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(1..=10));
        let store = setup().await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let report = run_indexer(
            connector.clone(),
            vec![RpcEndpoint::primary(A)],
            store.clone(),
            &config(1, 10, 4),
            shutdown,
        )
        .await
        .unwrap();

        assert_eq!(report, IndexingReport::default());
        assert!(connector.block_calls().is_empty());
        assert_eq!(store.count_blocks().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn clean_run_reindexes_from_scratch() {
        let connector = SimConnector::new(SimChain::with_empty_blocks(1..=3));
        let store = setup().await;
        store_empty_blocks(&store, &[1, 2, 3]).await;

        let mut config = config(1, 3, 2);
        config.clean = true;
        let report = run(&connector, &store, &config).await.unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(sorted(connector.block_calls()), vec![1, 2, 3]);
        assert_eq!(store.count_blocks().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn account_cache_skips_known_balances() {
        let alice = wallet(1);
        let bob = wallet(2);
        let chain = || {
            (1..=4).fold(SimChain::new(), |chain, n| {
                chain.with_block(sim_block(
                    n,
                    vec![signed_transfer(&alice, n, Some(bob.address()), 1)],
                ))
            })
        };

        let uncached = SimConnector::new(chain());
        let store = setup().await;
        run(&uncached, &store, &config(1, 4, 1)).await.unwrap();
        assert_eq!(uncached.balance_calls(), 8);

        let cached = SimConnector::new(chain());
        let store = setup().await;
        let mut config = config(1, 4, 1);
        config.account_cache_capacity = 100;
        let report = run(&cached, &store, &config).await.unwrap();

        assert_eq!(report.indexed, 4);
        assert_eq!(cached.balance_calls(), 2);
        assert_eq!(store.count_accounts().await.unwrap(), 2);
        assert_eq!(store.count_transactions().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn balance_fetches_are_bounded_per_worker() {
        let wallets: Vec<_> = (1..=24u8).map(wallet).collect();
        let deploys = wallets
            .iter()
            .map(|w| signed_transfer(w, 0, None, 0))
            .collect();
        let chain = wallets
            .iter()
            .zip(1u64..)
            .fold(SimChain::new().with_block(sim_block(1, deploys)), |chain, (w, i)| {
                chain.with_balance(w.address(), i * 10)
            });
        let connector = SimConnector::new(chain);
        connector.set_balance_latency(Duration::from_millis(5));
        let store = setup().await;

        let mut config = config(1, 1, 1);
        config.balance_concurrency = 3;
        let report = run(&connector, &store, &config).await.unwrap();

        assert_eq!(report.indexed, 1);
        assert_eq!(connector.balance_calls(), 24);
        assert_eq!(connector.peak_balances_in_flight(), 3);

        // Results keep the order of the addresses they were requested for.
        assert_eq!(store.count_accounts().await.unwrap(), 24);
        for (w, i) in wallets.iter().zip(1u64..) {
            let account = store
                .get_account(&format_address(&w.address()))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(account.balance, (i * 10).to_string());
        }
    }

    #[tokio::test]
    async fn balance_fetches_can_run_one_at_a_time() {
        let wallets: Vec<_> = (1..=5u8).map(wallet).collect();
        let deploys = wallets
            .iter()
            .map(|w| signed_transfer(w, 0, None, 0))
            .collect();
        let connector = SimConnector::new(SimChain::new().with_block(sim_block(1, deploys)));
        connector.set_balance_latency(Duration::from_millis(2));
        let store = setup().await;

        let mut config = config(1, 1, 1);
        config.balance_concurrency = 1;
        run(&connector, &store, &config).await.unwrap();

        assert_eq!(connector.balance_calls(), 5);
        assert_eq!(connector.peak_balances_in_flight(), 1);
    }

    #[tokio::test]
    async fn invalid_signature_fails_only_its_block() {
        let alice = wallet(1);
        let chain = SimChain::with_empty_blocks(1..=4)
            .with_block(sim_block(2, vec![signed_transfer(&alice, 0, None, 0)]))
            .with_block(sim_block(3, vec![bogus_transfer(0)]));
        let connector = SimConnector::new(chain);
        let store = setup().await;

        let report = run(&connector, &store, &config(1, 4, 2)).await.unwrap();

        assert_eq!(report.indexed, 3);
        assert_eq!(report.failed, vec![3]);
        assert!(!store.block_exists(3).await.unwrap());
        assert_eq!(store.count_transactions().await.unwrap(), 1);
        let attempts = connector.block_calls().iter().filter(|&&n| n == 3).count();
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn missing_total_difficulty_is_fetched_by_hash() {
        let chain = SimChain::with_empty_blocks(1..=2).without_total_difficulty(2);
        let connector = SimConnector::new(chain);
        let store = setup().await;

        run(&connector, &store, &config(1, 2, 1)).await.unwrap();

        assert_eq!(connector.hash_calls(), 1);
        let stored = store.get_block(2).await.unwrap().unwrap();
        assert_eq!(stored.total_difficulty, "5");
        assert_eq!(store.get_block(1).await.unwrap().unwrap().total_difficulty, "3");
    }
}
