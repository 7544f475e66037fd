//! Ethereum JSON-RPC types
//!
//! Wire types for `eth_getLogs` results and the strict `TransferEvent` record
//! they are converted into. Raw responses never travel past this module.

use alloy_primitives::{b256, Address, B256, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// keccak256("Transfer(address,address,uint256)")
pub const TRANSFER_TOPIC: B256 =
    b256!("ddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef");

/// Log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    /// Address of the contract that emitted the log
    #[serde(rename = "address", deserialize_with = "deserialize_hex_address")]
    pub address: Address,

    /// Indexed topics (topic0 = event signature, topics[1..] = indexed params)
    #[serde(rename = "topics", default)]
    pub topics: Vec<String>,

    /// Non-indexed event data (hex string)
    #[serde(rename = "data", deserialize_with = "deserialize_hex_bytes")]
    pub data: Vec<u8>,

    #[serde(rename = "blockNumber", deserialize_with = "deserialize_hex_u64")]
    pub block_number: u64,

    #[serde(rename = "logIndex", default, deserialize_with = "deserialize_hex_u64_opt")]
    pub log_index: Option<u64>,

    /// Set by nodes for logs dropped in a reorg
    #[serde(rename = "removed", default)]
    pub removed: bool,
}

impl Log {
    /// Build a `Transfer(from, to, value)` log. Used by in-memory log sources.
    pub fn transfer(
        token: Address,
        from: Address,
        to: Address,
        value: U256,
        block_number: u64,
        log_index: u64,
    ) -> Self {
        Self {
            address: token,
            topics: vec![
                format!("0x{:x}", TRANSFER_TOPIC),
                format!("0x{}", hex::encode(address_topic(from))),
                format!("0x{}", hex::encode(address_topic(to))),
            ],
            data: value.to_be_bytes_vec(),
            block_number,
            log_index: Some(log_index),
            removed: false,
        }
    }
}

/// A decoded reward transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub block_number: u64,
    pub log_index: u64,
    /// Block timestamp (Unix epoch seconds)
    pub timestamp: u64,
}

impl TransferEvent {
    /// Decode a `Transfer` log. The timestamp comes from the enclosing block.
    ///
    /// topics[1] = from (indexed, padded to 32 bytes), topics[2] = to, data = value
    pub fn from_log(log: &Log, timestamp: u64) -> Result<Self> {
        if log.topics.len() < 3 {
            anyhow::bail!("Transfer log has insufficient topics");
        }
        let topic0 = parse_b256(&log.topics[0])?;
        if topic0 != TRANSFER_TOPIC {
            anyhow::bail!("Log is not a Transfer event (topic0 {:?})", topic0);
        }
        if log.data.len() < 32 {
            anyhow::bail!("Transfer data too short ({} bytes)", log.data.len());
        }

        Ok(Self {
            from: parse_address_from_topic(&log.topics[1])?,
            to: parse_address_from_topic(&log.topics[2])?,
            value: U256::from_be_slice(&log.data[0..32]),
            block_number: log.block_number,
            log_index: log.log_index.unwrap_or(0),
            timestamp,
        })
    }
}

/// Left-pad an address to a 32-byte topic.
pub fn address_topic(addr: Address) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(addr.as_slice());
    B256::from(bytes)
}

/// Parse a 32-byte hex topic into an Address (last 20 bytes).
fn parse_address_from_topic(topic: &str) -> Result<Address> {
    let s = topic.strip_prefix("0x").unwrap_or(topic);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).context("Invalid hex in topic")?;
    if bytes.len() < 20 {
        anyhow::bail!("Topic too short for address");
    }
    let start = bytes.len().saturating_sub(20);
    Ok(Address::from_slice(&bytes[start..]))
}

fn parse_b256(s: &str) -> Result<B256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(pad_hex_string(s)).context("Invalid hex in topic")?;
    if bytes.len() != 32 {
        anyhow::bail!("Expected 32 bytes for topic, got {}", bytes.len());
    }
    Ok(B256::from_slice(&bytes))
}

/// Parse a hex quantity such as `"0x1b4"`.
pub fn parse_hex_u64(s: &str) -> Result<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        anyhow::bail!("Empty hex quantity");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid hex quantity: {}", s))
}

// Hex deserialization helpers

/// Pad an odd-length hex string with a leading zero.
/// This handles cases where RPC returns hex strings without leading zeros.
fn pad_hex_string(s: &str) -> String {
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_u64(&s).map_err(serde::de::Error::custom)
}

fn deserialize_hex_u64_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(s) => parse_hex_u64(&s).map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

fn deserialize_hex_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    let bytes = hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)?;
    if bytes.len() != 20 {
        return Err(serde::de::Error::custom(format!(
            "Expected 20 bytes for address, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}

fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    if s.is_empty() {
        Ok(Vec::new())
    } else {
        hex::decode(pad_hex_string(s)).map_err(serde::de::Error::custom)
    }
}
