//! Reward indexer - weekly USDC reward leaderboards from on-chain transfers
//!
//! Scans `Transfer` events sent by a reward distributor, aggregates them into
//! fixed 7-day reward weeks and publishes leaderboard JSON documents. Runs are
//! incremental and resumable from a checkpoint.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod indexer;
pub mod pool;
pub mod records;
pub mod report;
pub mod rpc;
pub mod state;
pub mod store;
pub mod types;
pub mod usdc;
pub mod week;

// Re-export the main types for convenience
pub use error::RpcError;
pub use indexer::{Indexer, RunSummary, ScanConfig};
pub use pool::{LogSource, RetryPolicy, RpcPool};
pub use records::{AllTimeLeaderboard, Checkpoint, LatestWeekLeaderboard, Overview, Weekly};
pub use report::{ReportBuilder, ReportMeta, Reports};
pub use state::AggregationState;
pub use store::JsonStore;
pub use week::{WeekCalendar, WeekKey};
