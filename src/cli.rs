//! CLI implementation for reward-indexer
//!
//! With no subcommand the binary performs an incremental scan. `rebuild` and
//! `status` work offline from the data directory. All commands print pretty
//! JSON to stdout.

use crate::config::Config;
use crate::indexer::Indexer;
use crate::pool::RpcPool;
use crate::records::Overview;
use crate::report::ReportBuilder;
use crate::state::AggregationState;
use crate::store::{read_json_or_default, JsonStore, OVERVIEW_FILE};
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

/// Weekly USDC reward indexer
#[derive(Parser)]
#[command(name = "reward-indexer")]
#[command(about = "Index reward distributor USDC transfers into weekly leaderboards")]
pub struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan new blocks and republish reports (default)
    Run,
    /// Regenerate all reports from the persisted all-time leaderboard, without RPC
    Rebuild,
    /// Print the checkpoint and current totals
    Status,
}

/// Parse arguments and run the selected command.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let settings = cli.config.validate()?;
            let store = JsonStore::open(&settings.data_dir)?;
            let pool = RpcPool::new(
                &settings.rpc_urls,
                settings.http_timeout,
                settings.retry.clone(),
                settings.meta.token,
                settings.meta.reward_distributor,
            )?;
            info!("RPC endpoints: {}", pool.endpoints().collect::<Vec<_>>().join(", "));
            info!("Data directory: {:?}", store.dir());

            let indexer = Indexer::new(
                pool,
                store,
                settings.scan,
                settings.meta,
                settings.calendar,
            );

            tokio::select! {
                summary = indexer.run() => serde_json::to_value(summary?)?,
                _ = tokio::signal::ctrl_c() => {
                    anyhow::bail!("Interrupted; the next run resumes from the last checkpoint");
                }
            }
        }
        Commands::Rebuild => {
            let settings = cli.config.validate()?;
            let store = JsonStore::open(&settings.data_dir)?;
            let previous = store
                .get_all_time()?
                .context("Nothing to rebuild: no all-time leaderboard in the data directory")?;

            let mut state = AggregationState::new(settings.calendar);
            state.seed_from_report(&previous)?;
            let reports = ReportBuilder::new(settings.meta).build(
                &state,
                previous.last_processed_block,
                Utc::now(),
            )?;
            store.put_reports(&reports)?;
            json!({
                "status": "ok",
                "users": reports.overview.all_time.unique_users,
                "weeks": reports.weekly.weeks.len(),
                "total_usdc": reports.overview.all_time.total_usdc,
            })
        }
        Commands::Status => {
            let store = JsonStore::open(&cli.config.data_dir)?;
            let head = store.get_head()?;
            let overview: Option<Overview> =
                read_json_or_default(&store.path(OVERVIEW_FILE), None);
            json!({
                "last_processed_block": head,
                "generated_at_utc": overview.as_ref().map(|o| o.generated_at_utc.clone()),
                "all_time": overview.as_ref().map(|o| &o.all_time),
                "latest_week": overview.as_ref().and_then(|o| o.latest_week.as_ref()).map(|w| json!({
                    "week_start_utc": w.week_start_utc,
                    "total_usdc": w.total_usdc,
                    "unique_users": w.unique_users,
                })),
            })
        }
    };

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
