//! Chunked log fetching with adaptive range splitting
//!
//! A scan range is cut into fixed-size chunks. Each chunk is fetched through a
//! [`LogSource`]; when the source times out (or rejects the range as too large)
//! the range is bisected and both halves are fetched, down to a minimum span.

use crate::pool::LogSource;
use crate::types::Log;
use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Inclusive block range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    /// Number of blocks in the range.
    pub fn span(&self) -> u64 {
        self.to - self.from + 1
    }

    /// Split at the midpoint. Both halves are non-empty when `span() >= 2`.
    pub fn bisect(&self) -> (BlockRange, BlockRange) {
        let mid = self.from + (self.to - self.from) / 2;
        (BlockRange::new(self.from, mid), BlockRange::new(mid + 1, self.to))
    }
}

/// Partition `[start, end]` into consecutive chunks of at most `size` blocks.
pub fn chunk_ranges(start: u64, end: u64, size: u64) -> Vec<BlockRange> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut from = start;
    while from <= end {
        let to = from.saturating_add(size - 1).min(end);
        chunks.push(BlockRange::new(from, to));
        if to == u64::MAX {
            break;
        }
        from = to + 1;
    }
    chunks
}

/// Fetch every distributor transfer log in `range`.
///
/// Ranges are processed from an explicit work stack so that pathological
/// all-timeout cases cannot recurse deeply. Results come back in block order.
pub async fn fetch_logs_for_range<S>(
    source: &S,
    range: BlockRange,
    min_split_blocks: u64,
) -> Result<Vec<Log>>
where
    S: LogSource + ?Sized,
{
    let mut pending = vec![range];
    let mut logs = Vec::new();

    while let Some(current) = pending.pop() {
        match source.transfer_logs(current.from, current.to).await {
            Ok(batch) => {
                debug!(
                    "Fetched {} logs for blocks {}-{}",
                    batch.len(),
                    current.from,
                    current.to
                );
                logs.extend(batch);
            }
            Err(err) if err.should_split() && current.span() > min_split_blocks.max(1) => {
                let (left, right) = current.bisect();
                warn!(
                    "Log query for blocks {}-{} failed ({}), splitting into {}-{} and {}-{}",
                    current.from, current.to, err, left.from, left.to, right.from, right.to
                );
                // left half on top so results stay in block order
                pending.push(right);
                pending.push(left);
            }
            Err(err) if err.should_split() => {
                let failure = if err.is_timeout() {
                    "timing out"
                } else {
                    "rejected as too large"
                };
                return Err(err).with_context(|| {
                    format!(
                        "Log query for blocks {}-{} still {} at minimum split size of {} blocks",
                        current.from, current.to, failure, min_split_blocks
                    )
                });
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to fetch logs for blocks {}-{}", current.from, current.to)
                });
            }
        }
    }

    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use alloy_primitives::{Address, U256};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves one log per listed block, timing out above `max_span` blocks.
    struct SpanLimitedSource {
        blocks_with_logs: Vec<u64>,
        max_span: u64,
        calls: Mutex<Vec<(u64, u64)>>,
    }

    impl SpanLimitedSource {
        fn new(blocks_with_logs: Vec<u64>, max_span: u64) -> Self {
            Self {
                blocks_with_logs,
                max_span,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LogSource for SpanLimitedSource {
        async fn latest_block(&self) -> Result<u64, RpcError> {
            Ok(u64::MAX)
        }

        async fn transfer_logs(&self, from: u64, to: u64) -> Result<Vec<Log>, RpcError> {
            self.calls.lock().unwrap().push((from, to));
            if to - from + 1 > self.max_span {
                return Err(RpcError::Timeout {
                    endpoint: "mock".into(),
                    message: "timed out".into(),
                });
            }
            Ok(self
                .blocks_with_logs
                .iter()
                .filter(|b| (from..=to).contains(b))
                .map(|&b| Log::transfer(Address::ZERO, Address::ZERO, Address::ZERO, U256::from(1u64), b, 0))
                .collect())
        }

        async fn block_timestamp(&self, block: u64) -> Result<u64, RpcError> {
            Ok(block)
        }
    }

    fn blocks(logs: &[Log]) -> Vec<u64> {
        logs.iter().map(|l| l.block_number).collect()
    }

    #[test]
    fn test_chunk_ranges() {
        let chunks = chunk_ranges(100, 350, 100);
        assert_eq!(
            chunks,
            vec![
                BlockRange::new(100, 199),
                BlockRange::new(200, 299),
                BlockRange::new(300, 350)
            ]
        );
        assert!(chunk_ranges(10, 9, 100).is_empty());
        assert_eq!(chunk_ranges(5, 5, 100), vec![BlockRange::new(5, 5)]);
    }

    #[test]
    fn test_bisect() {
        let (l, r) = BlockRange::new(1, 9000).bisect();
        assert_eq!(l, BlockRange::new(1, 4500));
        assert_eq!(r, BlockRange::new(4501, 9000));
        assert_eq!(l.span() + r.span(), 9000);
    }

    #[tokio::test]
    async fn test_timeout_bisects_into_disjoint_halves() {
        let logs_at = vec![1, 2000, 4500, 4501, 8999, 9000];
        let full = SpanLimitedSource::new(logs_at.clone(), u64::MAX);
        let limited = SpanLimitedSource::new(logs_at.clone(), 4500);
        let range = BlockRange::new(1, 9000);

        let expected = fetch_logs_for_range(&full, range, 500).await.unwrap();
        let split = fetch_logs_for_range(&limited, range, 500).await.unwrap();

        assert_eq!(blocks(&split), blocks(&expected));
        assert_eq!(blocks(&split), logs_at);

        let calls = limited.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(1, 9000), (1, 4500), (4501, 9000)]);
    }

    #[tokio::test]
    async fn test_deep_bisection_keeps_order() {
        let logs_at: Vec<u64> = (0..64).map(|i| i * 150 + 7).collect();
        let source = SpanLimitedSource::new(logs_at.clone(), 600);
        let logs = fetch_logs_for_range(&source, BlockRange::new(0, 9999), 100)
            .await
            .unwrap();
        assert_eq!(blocks(&logs), logs_at);
    }

    #[tokio::test]
    async fn test_timeout_at_minimum_span_is_fatal() {
        let source = SpanLimitedSource::new(vec![1], 0);
        let err = fetch_logs_for_range(&source, BlockRange::new(1, 1000), 500)
            .await
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("still timing out at minimum split size"), "{}", message);
    }

    #[tokio::test]
    async fn test_empty_chunk_is_valid() {
        let source = SpanLimitedSource::new(vec![], u64::MAX);
        let logs = fetch_logs_for_range(&source, BlockRange::new(1, 100), 10)
            .await
            .unwrap();
        assert!(logs.is_empty());
    }
}
