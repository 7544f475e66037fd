use alloy_primitives::{address, Address};
use reward_indexer::{LogSource, RetryPolicy, RpcError, RpcPool};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
const DISTRIBUTOR: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

fn pool(servers: &[&MockServer], retries: u32, http_timeout: Duration) -> RpcPool {
    let urls: Vec<String> = servers.iter().map(|s| s.uri()).collect();
    RpcPool::new(
        &urls,
        http_timeout,
        RetryPolicy {
            retries,
            base_backoff: Duration::from_millis(1),
        },
        TOKEN,
        DISTRIBUTOR,
    )
    .unwrap()
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result }))
}

fn rpc_error(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": code, "message": message }
    }))
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.unwrap().len()
}

#[tokio::test]
async fn test_retries_after_rate_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_blockNumber" })))
        .respond_with(rpc_result(json!("0x10")))
        .mount(&server)
        .await;

    let pool = pool(&[&server], 2, Duration::from_secs(5));
    assert_eq!(pool.latest_block().await.unwrap(), 16);
    assert_eq!(request_count(&server).await, 2);
}

#[tokio::test]
async fn test_fails_over_to_next_endpoint() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!("0x20")))
        .mount(&fallback)
        .await;

    let pool = pool(&[&primary, &fallback], 1, Duration::from_secs(5));
    assert_eq!(pool.latest_block().await.unwrap(), 32);
    assert_eq!(request_count(&primary).await, 2);
    assert_eq!(request_count(&fallback).await, 1);
}

#[tokio::test]
async fn test_exhausted_pool_reports_last_error() {
    let a = MockServer::start().await;
    let b = MockServer::start().await;
    for server in [&a, &b] {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(server)
            .await;
    }

    let pool = pool(&[&a, &b], 1, Duration::from_secs(5));
    let err = pool.latest_block().await.unwrap_err();
    match &err {
        RpcError::Exhausted { endpoints, last } => {
            assert_eq!(*endpoints, 2);
            assert!(matches!(**last, RpcError::Transient { .. }));
        }
        other => panic!("expected exhausted pool, got {other:?}"),
    }
    assert!(!err.should_split());
    assert_eq!(request_count(&a).await, 2);
    assert_eq!(request_count(&b).await, 2);
}

#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(-32602, "invalid params"))
        .mount(&primary)
        .await;

    let pool = pool(&[&primary, &fallback], 3, Duration::from_secs(5));
    let err = pool.transfer_logs(1, 100).await.unwrap_err();
    assert!(matches!(err, RpcError::Permanent { .. }));
    assert_eq!(request_count(&primary).await, 1);
    assert_eq!(request_count(&fallback).await, 0);
}

#[tokio::test]
async fn test_range_limit_is_surfaced_for_splitting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_error(-32005, "query returned more than 10000 results"))
        .mount(&server)
        .await;

    let pool = pool(&[&server], 3, Duration::from_secs(5));
    let err = pool.transfer_logs(1, 9_000).await.unwrap_err();
    assert!(matches!(err, RpcError::RangeTooLarge { .. }));
    assert!(err.should_split());
    assert_eq!(request_count(&server).await, 1);
}

#[tokio::test]
async fn test_log_query_timeout_fails_over_without_retrying() {
    let primary = MockServer::start().await;
    let fallback = MockServer::start().await;
    for server in [&primary, &fallback] {
        Mock::given(method("POST"))
            .respond_with(rpc_result(json!([])).set_delay(Duration::from_millis(500)))
            .mount(server)
            .await;
    }

    let pool = pool(&[&primary, &fallback], 3, Duration::from_millis(50));
    let err = pool.transfer_logs(1, 9_000).await.unwrap_err();
    assert!(err.is_timeout());
    assert!(err.should_split());
    assert_eq!(request_count(&primary).await, 1);
    assert_eq!(request_count(&fallback).await, 1);
}

#[tokio::test]
async fn test_block_number_timeout_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(rpc_result(json!("0x1")).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let pool = pool(&[&server], 2, Duration::from_millis(50));
    let err = pool.latest_block().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_get_logs_filters_by_token_and_sender() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "eth_getLogs",
            "params": [{
                "fromBlock": "0x64",
                "toBlock": "0xc8",
                "address": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
                "topics": [
                    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                    "0x000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266"
                ]
            }]
        })))
        .respond_with(rpc_result(json!([{
            "address": "0x833589fcd6edb6e08f4c7c32d4f71b54bda02913",
            "topics": [
                "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef",
                "0x000000000000000000000000f39fd6e51aad88f6f4ce6ab8827279cfffb92266",
                "0x00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
            ],
            "data": "0x0000000000000000000000000000000000000000000000000000000005f5e100",
            "blockNumber": "0x96",
            "logIndex": "0x3",
            "removed": false
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let pool = pool(&[&server], 0, Duration::from_secs(5));
    let logs = pool.transfer_logs(100, 200).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].block_number, 150);
    assert_eq!(logs[0].log_index, Some(3));
}

#[tokio::test]
async fn test_block_timestamps_are_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "eth_getBlockByNumber" })))
        .respond_with(rpc_result(json!({ "number": "0x96", "timestamp": "0x677b1d00" })))
        .expect(1)
        .mount(&server)
        .await;

    let pool = pool(&[&server], 0, Duration::from_secs(5));
    assert_eq!(pool.block_timestamp(150).await.unwrap(), 0x677b1d00);
    assert_eq!(pool.block_timestamp(150).await.unwrap(), 0x677b1d00);
}
