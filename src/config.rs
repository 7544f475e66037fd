//! Configuration loading
//!
//! Every setting can be given as a flag or an environment variable (a `.env`
//! file is loaded first by the binary). Program identity (distributor, first
//! reward block, week-1 start) has no default and must be provided.

use crate::indexer::ScanConfig;
use crate::pool::RetryPolicy;
use crate::report::ReportMeta;
use crate::week::WeekCalendar;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_RPC_URLS: &str =
    "https://mainnet.base.org,https://base.llamarpc.com,https://base-rpc.publicnode.com";

/// USDC on Base
pub const DEFAULT_TOKEN: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// RPC endpoints, comma separated, first = primary
    #[arg(long, env = "RPC_URLS", value_delimiter = ',', default_value = DEFAULT_RPC_URLS)]
    pub rpc_urls: Vec<String>,

    /// ERC-20 token contract (hex, with or without 0x prefix)
    #[arg(long, env = "TOKEN_ADDRESS", default_value = DEFAULT_TOKEN)]
    pub token: String,

    /// Address whose outgoing transfers are reward payments
    #[arg(long, env = "REWARD_DISTRIBUTOR")]
    pub reward_distributor: Option<String>,

    /// First block that can contain a reward transfer
    #[arg(long, env = "GENESIS_BLOCK")]
    pub genesis_block: Option<u64>,

    /// Week 1 start, RFC 3339 or YYYY-MM-DD (midnight UTC)
    #[arg(long, env = "WEEK_1_START_UTC")]
    pub week_1_start_utc: Option<String>,

    /// Chain name written to overview.json
    #[arg(long, env = "CHAIN_NAME", default_value = "base")]
    pub chain: String,

    /// Directory for the checkpoint and published JSON files
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "CHUNK_SIZE_BLOCKS", default_value_t = 9000)]
    pub chunk_size_blocks: u64,

    /// Smallest range a timed-out log query is split down to
    #[arg(long, env = "MIN_SPLIT_RANGE_BLOCKS", default_value_t = 500)]
    pub min_split_range_blocks: u64,

    /// Retries per endpoint before failing over
    #[arg(long, env = "RPC_RETRIES", default_value_t = 3)]
    pub rpc_retries: u32,

    #[arg(long, env = "BASE_BACKOFF_MS", default_value_t = 1000)]
    pub base_backoff_ms: u64,

    #[arg(long, env = "HTTP_TIMEOUT_MS", default_value_t = 20_000)]
    pub http_timeout_ms: u64,

    /// Pause between chunks
    #[arg(long, env = "CHUNK_PAUSE_MS", default_value_t = 250)]
    pub chunk_pause_ms: u64,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_urls: Vec<String>,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
    pub scan: ScanConfig,
    pub meta: ReportMeta,
    pub calendar: WeekCalendar,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn validate(&self) -> Result<Settings> {
        let rpc_urls: Vec<String> = self
            .rpc_urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if rpc_urls.is_empty() {
            anyhow::bail!("RPC_URLS must contain at least one endpoint");
        }
        if self.chunk_size_blocks == 0 {
            anyhow::bail!("CHUNK_SIZE_BLOCKS must be at least 1");
        }
        if self.min_split_range_blocks == 0 {
            anyhow::bail!("MIN_SPLIT_RANGE_BLOCKS must be at least 1");
        }

        let token = parse_address(&self.token).context("Invalid TOKEN_ADDRESS")?;
        let distributor = parse_address(
            self.reward_distributor
                .as_deref()
                .context("REWARD_DISTRIBUTOR must be set")?,
        )
        .context("Invalid REWARD_DISTRIBUTOR")?;
        let genesis_block = self.genesis_block.context("GENESIS_BLOCK must be set")?;
        let calendar = WeekCalendar::from_anchor_str(
            self.week_1_start_utc
                .as_deref()
                .context("WEEK_1_START_UTC must be set")?,
        )
        .context("Invalid WEEK_1_START_UTC")?;

        Ok(Settings {
            rpc_urls,
            http_timeout: Duration::from_millis(self.http_timeout_ms),
            retry: RetryPolicy {
                retries: self.rpc_retries,
                base_backoff: Duration::from_millis(self.base_backoff_ms),
            },
            scan: ScanConfig {
                genesis_block,
                chunk_size_blocks: self.chunk_size_blocks,
                min_split_range_blocks: self.min_split_range_blocks,
                chunk_pause: Duration::from_millis(self.chunk_pause_ms),
            },
            meta: ReportMeta {
                chain: self.chain.clone(),
                token,
                reward_distributor: distributor,
                first_reward_block: genesis_block,
            },
            calendar,
            data_dir: self.data_dir.clone(),
        })
    }
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix, in any letter case.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!("Address must be 20 bytes (40 hex chars), got {} bytes", bytes.len());
    }

    Ok(Address::from_slice(&bytes))
}
