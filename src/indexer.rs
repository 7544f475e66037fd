//! Indexer run
//!
//! One invocation scans every block since the last checkpoint, chunk by chunk,
//! and republishes the reports:
//!
//! `LOAD_CHECKPOINT -> RESOLVE_LATEST_BLOCK -> (NOTHING_NEW | SCANNING) ->
//! AGGREGATE -> BUILD_REPORTS -> PERSIST`
//!
//! Chunks are processed strictly in block order. After a chunk, the all-time
//! leaderboard (if the chunk paid anyone) and then the checkpoint are written,
//! so an interrupted run resumes at the first unscanned block.

use crate::fetcher::{chunk_ranges, fetch_logs_for_range, BlockRange};
use crate::pool::LogSource;
use crate::report::{all_time_leaderboard, ReportBuilder, ReportMeta};
use crate::state::AggregationState;
use crate::store::JsonStore;
use crate::types::{Log, TransferEvent};
use crate::week::WeekCalendar;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Scan tuning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Where a from-scratch scan starts
    pub genesis_block: u64,
    pub chunk_size_blocks: u64,
    pub min_split_range_blocks: u64,
    /// Politeness delay between chunks
    pub chunk_pause: Duration,
}

/// What a run did, printed as JSON by the binary.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub start_block: u64,
    pub latest_block: u64,
    pub last_processed_block: Option<u64>,
    pub chunks_processed: usize,
    pub transfers_ingested: usize,
    pub logs_skipped: usize,
    pub nothing_new: bool,
    pub all_time_total_usdc: String,
    pub unique_users: usize,
    pub weeks: usize,
}

/// Reward indexer over a log source and an output directory.
pub struct Indexer<S> {
    source: S,
    store: JsonStore,
    scan: ScanConfig,
    meta: ReportMeta,
    calendar: WeekCalendar,
}

impl<S: LogSource> Indexer<S> {
    pub fn new(
        source: S,
        store: JsonStore,
        scan: ScanConfig,
        meta: ReportMeta,
        calendar: WeekCalendar,
    ) -> Self {
        Self {
            source,
            store,
            scan,
            meta,
            calendar,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Restore aggregates and the resume point from disk.
    ///
    /// The leaderboard is written before the checkpoint, so whichever of the
    /// two is further ahead is the block the aggregates cover.
    pub fn load(&self) -> Result<(AggregationState, Option<u64>)> {
        let checkpoint = self.store.get_head()?;
        let previous = self.store.get_all_time()?;

        let mut state = AggregationState::new(self.calendar);
        let resume = match (checkpoint, previous) {
            (None, None) => {
                info!("No checkpoint found, starting from genesis block {}", self.scan.genesis_block);
                None
            }
            (Some(block), None) => {
                anyhow::bail!(
                    "Checkpoint is at block {} but {} is missing; refusing to continue without reward history",
                    block,
                    crate::store::LEADERBOARD_ALL_TIME_FILE
                );
            }
            (checkpoint, Some(report)) => {
                state
                    .seed_from_report(&report)
                    .context("Failed to seed totals from previous all-time leaderboard")?;
                let resume = match (checkpoint, report.last_processed_block) {
                    (Some(c), Some(l)) => {
                        if l > c {
                            warn!(
                                "Leaderboard covers block {} but checkpoint is {}; resuming after {}",
                                l, c, l
                            );
                        }
                        Some(c.max(l))
                    }
                    (c, l) => c.or(l),
                };
                if resume.is_none() && !report.rows.is_empty() {
                    anyhow::bail!(
                        "{} has {} rows but no checkpoint or last_processed_block records which blocks they cover; refusing to rescan from genesis on top of them",
                        crate::store::LEADERBOARD_ALL_TIME_FILE,
                        report.rows.len()
                    );
                }
                info!(
                    "Seeded {} users across {} weeks, last processed block {:?}",
                    state.users().len(),
                    state.weeks().count(),
                    resume
                );
                resume
            }
        };
        Ok((state, resume))
    }

    /// Run one incremental scan and publish the reports.
    pub async fn run(&self) -> Result<RunSummary> {
        self.store.ensure_farcaster_map()?;

        let (mut state, mut last_processed) = self.load()?;

        let latest_block = self
            .source
            .latest_block()
            .await
            .context("No RPC endpoint could report the latest block")?;

        let start_block = match last_processed {
            Some(block) => block + 1,
            None => self.scan.genesis_block,
        };

        let chunks = chunk_ranges(start_block, latest_block, self.scan.chunk_size_blocks);
        let nothing_new = chunks.is_empty();
        if nothing_new {
            info!(
                "Nothing new: next block {} is past latest block {}",
                start_block, latest_block
            );
        } else {
            info!(
                "Scanning blocks {}-{} in {} chunk(s) of up to {} blocks",
                start_block,
                latest_block,
                chunks.len(),
                self.scan.chunk_size_blocks
            );
        }

        let mut transfers_ingested = 0;
        let mut logs_skipped = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let (ingested, skipped) = self.process_chunk(&mut state, *chunk).await?;
            transfers_ingested += ingested;
            logs_skipped += skipped;

            if ingested > 0 {
                let snapshot = all_time_leaderboard(&state, Some(chunk.to), Utc::now());
                self.store
                    .put_all_time(&snapshot)
                    .with_context(|| format!("Failed to persist totals after block {}", chunk.to))?;
            }
            self.store
                .set_head(chunk.to)
                .with_context(|| format!("Failed to persist checkpoint at block {}", chunk.to))?;
            last_processed = Some(chunk.to);

            info!(
                "Chunk {}/{} done: blocks {}-{}, {} transfer(s)",
                i + 1,
                chunks.len(),
                chunk.from,
                chunk.to,
                ingested
            );

            if i + 1 < chunks.len() && !self.scan.chunk_pause.is_zero() {
                tokio::time::sleep(self.scan.chunk_pause).await;
            }
        }

        let reports = ReportBuilder::new(self.meta.clone())
            .build(&state, last_processed, Utc::now())
            .context("Failed to build reports")?;
        self.store.put_reports(&reports)?;

        Ok(RunSummary {
            start_block,
            latest_block,
            last_processed_block: last_processed,
            chunks_processed: chunks.len(),
            transfers_ingested,
            logs_skipped,
            nothing_new,
            all_time_total_usdc: reports.overview.all_time.total_usdc.clone(),
            unique_users: reports.overview.all_time.unique_users,
            weeks: reports.weekly.weeks.len(),
        })
    }

    /// Fetch, decode and ingest one chunk. Returns (ingested, skipped).
    async fn process_chunk(
        &self,
        state: &mut AggregationState,
        chunk: BlockRange,
    ) -> Result<(usize, usize)> {
        let mut logs = fetch_logs_for_range(&self.source, chunk, self.scan.min_split_range_blocks)
            .await
            .with_context(|| format!("Aborting scan at chunk {}-{}", chunk.from, chunk.to))?;
        logs.sort_by_key(|l| (l.block_number, l.log_index.unwrap_or(0)));

        // decode everything before touching the state so a failed timestamp
        // lookup leaves the chunk entirely unapplied
        let mut events = Vec::with_capacity(logs.len());
        let mut skipped = 0;
        for log in &logs {
            if !self.is_reward_log(log) {
                skipped += 1;
                continue;
            }
            let timestamp = self
                .source
                .block_timestamp(log.block_number)
                .await
                .with_context(|| format!("Failed to fetch timestamp of block {}", log.block_number))?;
            match TransferEvent::from_log(log, timestamp) {
                Ok(event) if event.from == self.meta.reward_distributor => events.push(event),
                Ok(event) => {
                    warn!(
                        "Skipping transfer from {:?} in block {} (not the distributor)",
                        event.from, event.block_number
                    );
                    skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping malformed log in block {}: {:#}", log.block_number, e);
                    skipped += 1;
                }
            }
        }

        let mut ingested = 0;
        for event in &events {
            if state.ingest(event)? {
                ingested += 1;
            } else {
                skipped += 1;
            }
        }
        Ok((ingested, skipped))
    }

    fn is_reward_log(&self, log: &Log) -> bool {
        if log.removed {
            warn!("Skipping removed log in block {}", log.block_number);
            return false;
        }
        if log.address != self.meta.token {
            warn!(
                "Skipping log from unexpected contract {:?} in block {}",
                log.address, log.block_number
            );
            return false;
        }
        true
    }
}
