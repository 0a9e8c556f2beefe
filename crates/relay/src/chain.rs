//! Chain capabilities consumed by the relayer core.
//!
//! [ChainReader] supplies the source chain tip and bounded-range log queries; [ChainWriter]
//! performs the destination-side action. Both are opaque to the core so any client library
//! (or an in-process fake) can implement them.

use alloy::primitives::U256;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A raw log record in JSON-RPC shape (`eth_getLogs` result element).
pub type RawLog = serde_json::Value;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Read access to the source chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Latest block number known to the node.
    async fn latest_block_number(&self) -> Result<u64, ChainError>;

    /// Logs emitted by `contract` with topics[0] == `topic0` in `[from_block, to_block]`.
    async fn query_events(
        &self,
        contract: &[u8; 20],
        topic0: &[u8; 32],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError>;
}

/// Destination-side call derived from one source event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAction {
    pub function_name: String,
    pub recipient: [u8; 20],
    pub amount: U256,
    /// Source-side transfer id; destination contracts key their own replay protection on it.
    pub source_event_id: [u8; 32],
}

/// Opaque receipt returned by the destination once an action is confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationHandle(pub String);

#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("action rejected: {0}")]
    Rejected(String),
}

/// Write access to the destination chain.
#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Perform `action` and return once it is confirmed (or durably queued).
    async fn submit_action(&self, action: &RelayAction) -> Result<ConfirmationHandle, SubmitError>;
}

/// Bound a chain query by `limit`; an elapsed timeout becomes [ChainError::Timeout].
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, ChainError>
where
    F: Future<Output = Result<T, ChainError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ChainError::Timeout(limit))?
}
