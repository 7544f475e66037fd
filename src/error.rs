//! RPC error taxonomy
//!
//! Every failure coming back from a JSON-RPC endpoint is classified once, at the
//! I/O boundary, so the pool and the log fetcher can decide between retrying,
//! failing over, bisecting the block range or giving up.

use thiserror::Error;

/// Error returned by a single endpoint or by the whole endpoint pool.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// HTTP-level timeout, or the node reported that the query timed out.
    #[error("request to {endpoint} timed out: {message}")]
    Timeout { endpoint: String, message: String },

    /// Rate limit, 5xx, unhealthy backend. Worth retrying.
    #[error("transient error from {endpoint}: {message}")]
    Transient { endpoint: String, message: String },

    /// The node refuses the block range or result size of an `eth_getLogs` query.
    #[error("block range rejected by {endpoint}: {message}")]
    RangeTooLarge { endpoint: String, message: String },

    /// Anything else. Never retried.
    #[error("RPC error from {endpoint}: {message}")]
    Permanent { endpoint: String, message: String },

    /// Every endpoint and every retry failed.
    #[error("all {endpoints} RPC endpoint(s) exhausted, last error: {last}")]
    Exhausted { endpoints: usize, last: Box<RpcError> },
}

impl RpcError {
    /// Whether the call should be retried (and eventually failed over).
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::Transient { .. })
    }

    /// Whether the failure was ultimately a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            RpcError::Timeout { .. } => true,
            RpcError::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// Whether a log query that failed this way should be retried on a smaller range.
    pub fn should_split(&self) -> bool {
        match self {
            RpcError::Timeout { .. } | RpcError::RangeTooLarge { .. } => true,
            RpcError::Exhausted { last, .. } => last.should_split(),
            _ => false,
        }
    }

    /// Classify an HTTP status that is not a success.
    pub fn from_status(endpoint: &str, status: u16, body: &str) -> Self {
        let endpoint = endpoint.to_string();
        let message = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            408 | 504 => RpcError::Timeout { endpoint, message },
            429 | 500..=599 => RpcError::Transient { endpoint, message },
            // Some providers answer oversized log queries with 413 or 400 plus an explanation
            _ => classify_message(&endpoint, message, None),
        }
    }

    /// Classify a JSON-RPC `error` object.
    pub fn from_rpc_error(endpoint: &str, code: Option<i64>, message: &str) -> Self {
        let text = match code {
            Some(code) => format!("{} (code {})", message, code),
            None => message.to_string(),
        };
        classify_message(endpoint, text, code)
    }

    /// Classify a transport failure reported by `reqwest`.
    pub fn from_reqwest(endpoint: &str, err: &reqwest::Error) -> Self {
        let endpoint = endpoint.to_string();
        let message = err.to_string();
        if err.is_timeout() {
            RpcError::Timeout { endpoint, message }
        } else if err.is_connect() || err.is_request() {
            RpcError::Transient { endpoint, message }
        } else if err.is_decode() || err.is_body() {
            // truncated or garbled responses from overloaded free-tier nodes
            RpcError::Transient { endpoint, message }
        } else {
            classify_message(&endpoint, message, None)
        }
    }
}

fn classify_message(endpoint: &str, message: String, code: Option<i64>) -> RpcError {
    let endpoint = endpoint.to_string();
    let lower = message.to_lowercase();

    let timeout = ["timeout", "timed out", "deadline exceeded"];
    let range = [
        "block range",
        "range is too large",
        "range too large",
        "query returned more than",
        "too many results",
        "response size exceeded",
        "exceed maximum block range",
        "max range",
    ];
    let transient = [
        "rate limit",
        "too many requests",
        "429",
        "503",
        "no backend",
        "healthy",
        "temporarily unavailable",
        "over capacity",
        "header not found",
        "internal error",
    ];

    if timeout.iter().any(|p| lower.contains(p)) {
        RpcError::Timeout { endpoint, message }
    } else if code == Some(-32005) || range.iter().any(|p| lower.contains(p)) {
        RpcError::RangeTooLarge { endpoint, message }
    } else if transient.iter().any(|p| lower.contains(p)) {
        RpcError::Transient { endpoint, message }
    } else {
        RpcError::Permanent { endpoint, message }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
