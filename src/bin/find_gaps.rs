use evm_block_indexer::config::DatabaseConfig;
use evm_block_indexer::db::{connection, gap_ranges, BlockchainStore};

// Usage: find_gaps [START] [END]
// Defaults to the full span of stored blocks.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = DatabaseConfig::from_env();
    let pool = connection::establish_connection(&config).await?;
    let store = BlockchainStore::new(pool);

    let stored = store.get_all_block_numbers().await?;
    let (Some(&first), Some(&last)) = (stored.first(), stored.last()) else {
        println!("No blocks stored in {}", config.url);
        return Ok(());
    };

    let mut args = std::env::args().skip(1);
    let start = match args.next() {
        Some(value) => value.parse()?,
        None => first,
    };
    let end = match args.next() {
        Some(value) => value.parse()?,
        None => last,
    };

    println!("Checking blocks {} to {} ({} stored in total)", start, end, stored.len());
    let missing = store.identify_missing_blocks(start, end).await?;
    if missing.is_empty() {
        println!("✅ No gaps found");
        return Ok(());
    }

    println!("Found {} missing blocks:", missing.len());
    for (from, to) in gap_ranges(&missing) {
        if from == to {
            println!("  {}", from);
        } else {
            println!("  {}-{} ({} blocks)", from, to, to - from + 1);
        }
    }

    Ok(())
}
