//! Relayer configuration.

use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("invalid address {0:?}: expected 0x-prefixed 20-byte hex")]
    Address(String),
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address.
pub fn parse_address(s: &str) -> Result<[u8; 20], ConfigError> {
    let addr_hex = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(addr_hex).map_err(|_| ConfigError::Address(s.to_string()))?;
    <[u8; 20]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::Address(s.to_string()))
}

fn deserialize_address<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
    let s = String::deserialize(d)?;
    parse_address(&s).map_err(serde::de::Error::custom)
}

fn deserialize_secs<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
    Ok(Duration::from_secs(u64::deserialize(d)?))
}

/// Relayer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    /// HTTP RPC URL of the source chain (eth_blockNumber, eth_getLogs).
    pub source_rpc: String,
    /// RPC URL of the destination chain.
    pub dest_rpc: String,
    /// Source bridge contract emitting TokensLocked (20 bytes).
    #[serde(deserialize_with = "deserialize_address")]
    pub source_contract: [u8; 20],
    /// Destination bridge contract receiving mintTokens (20 bytes).
    #[serde(deserialize_with = "deserialize_address")]
    pub dest_contract: [u8; 20],
    /// Blocks required on top of a block before it is treated as final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Pause between scans (seconds in JSON).
    #[serde(default = "default_poll_interval", deserialize_with = "deserialize_secs")]
    pub poll_interval: Duration,
    /// Initial cursor when no persisted state exists.
    #[serde(default)]
    pub start_block: u64,
    /// Max block range per eth_getLogs request.
    #[serde(default = "default_getlogs_max_range")]
    pub getlogs_max_range: u64,
    /// Bound on each chain query (seconds in JSON).
    #[serde(default = "default_rpc_timeout", deserialize_with = "deserialize_secs")]
    pub rpc_timeout: Duration,
    /// Bound on each destination action (seconds in JSON).
    #[serde(default = "default_relay_timeout", deserialize_with = "deserialize_secs")]
    pub relay_timeout: Duration,
    /// Directory holding `processed.json` and `cursor.json`.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

fn default_confirmations() -> u64 {
    6
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_getlogs_max_range() -> u64 {
    1000
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_relay_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("relayer-state")
}

impl RelayerConfig {
    /// Config with defaults for everything but the endpoints and contracts.
    pub fn new(
        source_rpc: impl Into<String>,
        dest_rpc: impl Into<String>,
        source_contract: [u8; 20],
        dest_contract: [u8; 20],
    ) -> Self {
        Self {
            source_rpc: source_rpc.into(),
            dest_rpc: dest_rpc.into(),
            source_contract,
            dest_contract,
            confirmations: default_confirmations(),
            poll_interval: default_poll_interval(),
            start_block: 0,
            getlogs_max_range: default_getlogs_max_range(),
            rpc_timeout: default_rpc_timeout(),
            relay_timeout: default_relay_timeout(),
            state_dir: default_state_dir(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_rpc.trim().is_empty() {
            return Err(ConfigError::Empty("source_rpc"));
        }
        if self.dest_rpc.trim().is_empty() {
            return Err(ConfigError::Empty("dest_rpc"));
        }
        if self.getlogs_max_range == 0 {
            return Err(ConfigError::Zero("getlogs_max_range"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Zero("poll_interval"));
        }
        Ok(())
    }
}
