//! RPC endpoint pool
//!
//! Wraps an ordered list of endpoints (first = primary). Every call is tried
//! on each endpoint up to `retries + 1` times with exponential backoff before
//! failing over to the next one. Non-retryable errors propagate immediately.
//! Log queries that time out skip the per-endpoint retries: one attempt per
//! endpoint, then the fetcher splits the range.

use crate::cache::TimestampCache;
use crate::error::RpcError;
use crate::rpc::{LogFilter, RpcClient};
use crate::types::{address_topic, Log, TRANSFER_TOPIC};
use alloy_primitives::Address;
use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Source of reward transfer logs and block data.
///
/// Implemented by [`RpcPool`]; tests plug in scripted sources.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Latest block number known to the chain.
    async fn latest_block(&self) -> Result<u64, RpcError>;

    /// Transfer logs emitted by the distributor in `[from_block, to_block]`.
    async fn transfer_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, RpcError>;

    /// Timestamp of a block (Unix epoch seconds).
    async fn block_timestamp(&self, block: u64) -> Result<u64, RpcError>;
}

/// Retry settings for the pool.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries per endpoint (0 = one attempt per endpoint)
    pub retries: u32,
    /// Backoff before retry `n` is `base_backoff * 2^n`
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(1u32 << attempt.min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_backoff: Duration::from_secs(1),
        }
    }
}

/// Pool of JSON-RPC endpoints scanning one token for one sender.
pub struct RpcPool {
    clients: Vec<RpcClient>,
    policy: RetryPolicy,
    token: Address,
    distributor: Address,
    timestamps: Mutex<TimestampCache>,
}

impl RpcPool {
    pub fn new(
        urls: &[String],
        http_timeout: Duration,
        policy: RetryPolicy,
        token: Address,
        distributor: Address,
    ) -> Result<Self> {
        if urls.is_empty() {
            anyhow::bail!("No RPC endpoints configured");
        }
        let clients = urls
            .iter()
            .map(|url| RpcClient::new(url.clone(), http_timeout))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            clients,
            policy,
            token,
            distributor,
            timestamps: Mutex::new(TimestampCache::new()),
        })
    }

    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(RpcClient::url)
    }

    /// Run `op` against each endpoint in order with retry and backoff.
    ///
    /// With `retry_timeouts` unset a timeout moves straight to the next endpoint.
    async fn with_failover<T, F, Fut>(
        &self,
        what: &str,
        retry_timeouts: bool,
        op: F,
    ) -> Result<T, RpcError>
    where
        F: Fn(RpcClient) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let mut last_error = None;

        for (index, client) in self.clients.iter().enumerate() {
            for attempt in 0..=self.policy.retries {
                match op(client.clone()).await {
                    Ok(value) => {
                        if attempt > 0 || index > 0 {
                            info!(
                                "{} succeeded on {} (endpoint {}/{}, attempt {})",
                                what,
                                client.url(),
                                index + 1,
                                self.clients.len(),
                                attempt + 1
                            );
                        }
                        return Ok(value);
                    }
                    Err(err) if !err.is_retryable() => return Err(err),
                    Err(err) if err.is_timeout() && !retry_timeouts => {
                        warn!("{} timed out on {}: {}", what, client.url(), err);
                        last_error = Some(err);
                        break;
                    }
                    Err(err) => {
                        if attempt < self.policy.retries {
                            let delay = self.policy.backoff(attempt);
                            warn!(
                                "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                                what,
                                attempt + 1,
                                self.policy.retries + 1,
                                err,
                                delay
                            );
                            last_error = Some(err);
                            tokio::time::sleep(delay).await;
                        } else {
                            warn!("{} failed (attempt {}/{}): {}", what, attempt + 1, self.policy.retries + 1, err);
                            last_error = Some(err);
                        }
                    }
                }
            }

            if index + 1 < self.clients.len() {
                warn!("Endpoint {} exhausted for {}, failing over", client.url(), what);
            }
        }

        Err(RpcError::Exhausted {
            endpoints: self.clients.len(),
            last: Box::new(last_error.unwrap_or_else(|| RpcError::Permanent {
                endpoint: String::new(),
                message: "no RPC endpoints configured".to_string(),
            })),
        })
    }

    fn filter(&self, from_block: u64, to_block: u64) -> LogFilter {
        LogFilter {
            from_block,
            to_block,
            address: self.token,
            topics: vec![Some(TRANSFER_TOPIC), Some(address_topic(self.distributor))],
        }
    }
}

#[async_trait]
impl LogSource for RpcPool {
    async fn latest_block(&self) -> Result<u64, RpcError> {
        self.with_failover("eth_blockNumber", true, |client| async move {
            client.block_number().await
        })
        .await
    }

    async fn transfer_logs(&self, from_block: u64, to_block: u64) -> Result<Vec<Log>, RpcError> {
        let filter = self.filter(from_block, to_block);
        let what = format!("eth_getLogs [{}, {}]", from_block, to_block);
        self.with_failover(&what, false, |client| {
            let filter = filter.clone();
            async move { client.get_logs(&filter).await }
        })
        .await
    }

    async fn block_timestamp(&self, block: u64) -> Result<u64, RpcError> {
        if let Some(ts) = self.timestamps.lock().ok().and_then(|c| c.get(block)) {
            return Ok(ts);
        }

        let what = format!("eth_getBlockByNumber {}", block);
        let ts = self
            .with_failover(&what, true, |client| async move {
                client.block_timestamp(block).await
            })
            .await?;

        if let Ok(mut cache) = self.timestamps.lock() {
            cache.insert(block, ts);
            debug!("Cached timestamp of block {} ({} cached)", block, cache.len());
        }
        Ok(ts)
    }
}
