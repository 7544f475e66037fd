//! JSON-RPC client for a single Ethereum endpoint
//!
//! Provides a typed interface to the handful of calls the indexer needs.
//! Every failure is classified into an `RpcError` before it leaves this module.

use crate::error::RpcError;
use crate::types::{parse_hex_u64, Log};
use alloy_primitives::{Address, B256};
use serde_json::{json, Value};
use std::time::Duration;

/// `eth_getLogs` filter for one block range.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    pub address: Address,
    /// topic0, topic1, ... (None = wildcard)
    pub topics: Vec<Option<B256>>,
}

impl LogFilter {
    fn to_params(&self) -> Value {
        let topics: Vec<Value> = self
            .topics
            .iter()
            .map(|t| match t {
                Some(t) => Value::String(format!("0x{:x}", t)),
                None => Value::Null,
            })
            .collect();
        json!([{
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
            "address": format!("0x{:x}", self.address),
            "topics": topics,
        }])
    }
}

/// JSON-RPC client for one endpoint.
///
/// Cheap to clone; the underlying `reqwest::Client` is reference counted.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Create a new RPC client with a per-request timeout.
    pub fn new(url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::from_reqwest(&self.url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::from_status(&self.url, status.as_u16(), &body));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| RpcError::from_reqwest(&self.url, &e))?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            let code = error.get("code").and_then(Value::as_i64);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(RpcError::from_rpc_error(&self.url, code, &message));
        }

        json.get("result").cloned().ok_or_else(|| RpcError::Permanent {
            endpoint: self.url.clone(),
            message: "RPC response missing 'result' field".to_string(),
        })
    }

    /// Get the latest block number.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let number = result.as_str().ok_or_else(|| self.malformed("eth_blockNumber"))?;
        parse_hex_u64(number).map_err(|e| self.permanent(e))
    }

    /// Get the timestamp of a block.
    pub async fn block_timestamp(&self, block: u64) -> Result<u64, RpcError> {
        let params = json!([format!("0x{:x}", block), false]);
        let result = self.call("eth_getBlockByNumber", params).await?;

        // Lagging nodes return null for blocks they have not seen yet
        if result.is_null() {
            return Err(RpcError::Transient {
                endpoint: self.url.clone(),
                message: format!("block {} not found", block),
            });
        }

        let timestamp = result
            .get("timestamp")
            .and_then(Value::as_str)
            .ok_or_else(|| self.malformed("eth_getBlockByNumber"))?;
        parse_hex_u64(timestamp).map_err(|e| self.permanent(e))
    }

    /// Get logs matching a filter.
    pub async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, RpcError> {
        let result = self.call("eth_getLogs", filter.to_params()).await?;
        serde_json::from_value(result).map_err(|e| RpcError::Permanent {
            endpoint: self.url.clone(),
            message: format!("Failed to deserialize logs: {}", e),
        })
    }

    fn malformed(&self, method: &str) -> RpcError {
        RpcError::Permanent {
            endpoint: self.url.clone(),
            message: format!("Malformed {} response", method),
        }
    }

    fn permanent(&self, err: anyhow::Error) -> RpcError {
        RpcError::Permanent {
            endpoint: self.url.clone(),
            message: format!("{:#}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TRANSFER_TOPIC;
    use alloy_primitives::address;

    #[test]
    fn test_filter_params() {
        let filter = LogFilter {
            from_block: 16,
            to_block: 255,
            address: address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913"),
            topics: vec![Some(TRANSFER_TOPIC), None],
        };
        let params = filter.to_params();
        assert_eq!(params[0]["fromBlock"], "0x10");
        assert_eq!(params[0]["toBlock"], "0xff");
        assert_eq!(params[0]["address"], "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913");
        assert_eq!(
            params[0]["topics"][0],
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
        assert!(params[0]["topics"][1].is_null());
    }
}
