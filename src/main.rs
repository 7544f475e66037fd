//! reward-indexer - weekly USDC reward leaderboard indexer
//!
//! Scans reward distributor `Transfer` events and publishes leaderboard JSON
//! files for the web layer.

use reward_indexer::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "reward_indexer=info".into()),
        )
        .init();

    if let Err(e) = cli::run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
