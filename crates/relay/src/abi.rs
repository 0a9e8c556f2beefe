//! ABI types and decoding for the source bridge contract.
//!
//! TokensLocked event. Decode from the JSON-RPC log shape (`eth_getLogs` result) into
//! [BridgeEvent]; each event is identified by its [EventKey] `(tx_hash, log_index)`.

use alloy::primitives::U256;
use serde_json::Value;
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Canonical signature of the watched event.
///
/// `TokensLocked(address indexed from, address indexed to, uint256 amount,
/// uint256 sourceChainId, uint256 destChainId, bytes32 indexed transactionId)`
pub const TOKENS_LOCKED_SIGNATURE: &str =
    "TokensLocked(address,address,uint256,uint256,uint256,bytes32)";

/// Destination-side function invoked for every relayed event.
pub const MINT_FUNCTION: &str = "mintTokens";

/// keccak256 of [TOKENS_LOCKED_SIGNATURE] (topics[0] of every TokensLocked log).
pub fn tokens_locked_topic0() -> [u8; 32] {
    Keccak256::digest(TOKENS_LOCKED_SIGNATURE.as_bytes()).into()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl DecodeError {
    fn invalid(field: &'static str, reason: impl fmt::Display) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}

/// Identity of a source event. Globally unique per log; stable across re-scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey {
    pub tx_hash: [u8; 32],
    pub log_index: u64,
}

impl EventKey {
    pub fn new(tx_hash: [u8; 32], log_index: u64) -> Self {
        Self { tx_hash, log_index }
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}:{}", hex::encode(self.tx_hash), self.log_index)
    }
}

impl FromStr for EventKey {
    type Err = DecodeError;

    /// Parses the `0x<tx_hash>:<log_index>` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hash, index) = s
            .rsplit_once(':')
            .ok_or_else(|| DecodeError::invalid("event key", "expected <tx_hash>:<log_index>"))?;
        let tx_hash = parse_hex_bytes_32("event key tx_hash", hash)?;
        let log_index = index
            .parse()
            .map_err(|e| DecodeError::invalid("event key log_index", e))?;
        Ok(Self { tx_hash, log_index })
    }
}

/// A finalized-candidate deposit observed on the source chain. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeEvent {
    pub tx_hash: [u8; 32],
    pub block_number: u64,
    pub log_index: u64,
    /// Depositor on the source chain (topics[1]).
    pub sender: [u8; 20],
    /// Recipient on the destination chain (topics[2]).
    pub recipient: [u8; 20],
    pub amount: U256,
    pub source_chain_id: U256,
    pub dest_chain_id: U256,
    /// Bridge-assigned transfer id (topics[3]); passed to the destination as `sourceTxId`.
    pub transaction_id: [u8; 32],
}

impl BridgeEvent {
    pub fn key(&self) -> EventKey {
        EventKey::new(self.tx_hash, self.log_index)
    }
}

/// topics[0] of a JSON-RPC log, if present and well-formed.
pub fn log_topic0(log: &Value) -> Option<[u8; 32]> {
    let t0 = log.get("topics")?.as_array()?.first()?.as_str()?;
    parse_hex_bytes_32("topic0", t0).ok()
}

/// True if the log's topics[0] is the TokensLocked signature hash.
pub fn is_tokens_locked(log: &Value, topic0: &[u8; 32]) -> bool {
    log_topic0(log).as_ref() == Some(topic0)
}

/// Decode a JSON-RPC log into a [BridgeEvent]. The caller is expected to have checked topic0.
pub fn decode_log_to_event(log: &Value) -> Result<BridgeEvent, DecodeError> {
    let field = |name: &'static str| {
        log.get(name)
            .and_then(|v| v.as_str())
            .ok_or(DecodeError::Missing(name))
    };
    let block_number = parse_hex_u64("blockNumber", field("blockNumber")?)?;
    let log_index = parse_hex_u64("logIndex", field("logIndex")?)?;
    let tx_hash = parse_hex_bytes_32("transactionHash", field("transactionHash")?)?;
    let data = parse_hex_bytes("data", field("data")?)?;
    let topics = log
        .get("topics")
        .and_then(|t| t.as_array())
        .ok_or(DecodeError::Missing("topics"))?;
    if topics.len() < 4 {
        return Err(DecodeError::invalid(
            "topics",
            format!("expected 4 topics, got {}", topics.len()),
        ));
    }
    let topic = |i: usize| {
        topics[i]
            .as_str()
            .ok_or_else(|| DecodeError::invalid("topics", format!("topic{} not a string", i)))
    };
    let sender = parse_hex_bytes_20("from", topic(1)?)?;
    let recipient = parse_hex_bytes_20("to", topic(2)?)?;
    let transaction_id = parse_hex_bytes_32("transactionId", topic(3)?)?;
    if data.len() < 96 {
        return Err(DecodeError::invalid(
            "data",
            format!("expected 3 words, got {} bytes", data.len()),
        ));
    }

    Ok(BridgeEvent {
        tx_hash,
        block_number,
        log_index,
        sender,
        recipient,
        amount: U256::from_be_slice(&data[0..32]),
        source_chain_id: U256::from_be_slice(&data[32..64]),
        dest_chain_id: U256::from_be_slice(&data[64..96]),
        transaction_id,
    })
}

fn parse_hex_u64(field: &'static str, s: &str) -> Result<u64, DecodeError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| DecodeError::invalid(field, e))
}

fn parse_hex_bytes(field: &'static str, s: &str) -> Result<Vec<u8>, DecodeError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(s).map_err(|e| DecodeError::invalid(field, e))
}

fn parse_hex_bytes_32(field: &'static str, s: &str) -> Result<[u8; 32], DecodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    <[u8; 32]>::try_from(bytes.as_slice())
        .map_err(|_| DecodeError::invalid(field, format!("expected 32 bytes, got {}", bytes.len())))
}

fn parse_hex_bytes_20(field: &'static str, s: &str) -> Result<[u8; 20], DecodeError> {
    let bytes = parse_hex_bytes(field, s)?;
    let tail = match bytes.len() {
        20 => &bytes[..],
        // Indexed address in EVM is a left-padded 32-byte word; take last 20.
        32 => &bytes[12..32],
        n => {
            return Err(DecodeError::invalid(
                field,
                format!("expected 20 or 32 bytes for address, got {}", n),
            ))
        }
    };
    let mut out = [0u8; 20];
    out.copy_from_slice(tail);
    Ok(out)
}
