//! RelayExecutor: performs the destination action for one event, then records it processed.
//!
//! Ordering: `is_processed` check → destination action → `mark_processed`. The event counts
//! as done only once the mark is durable. A crash between action and mark leaves the cursor
//! behind the event, so it is re-scanned and the destination's own `sourceTxId` replay
//! protection is the last line of defense.

use crate::abi::{BridgeEvent, EventKey, MINT_FUNCTION};
use crate::chain::{ChainWriter, ConfirmationHandle, RelayAction, SubmitError};
use crate::store::{ProcessedStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("destination action for {key} failed: {source}")]
    Submit {
        key: EventKey,
        #[source]
        source: SubmitError,
    },
    #[error("destination action for {key} timed out after {limit:?}")]
    Timeout { key: EventKey, limit: Duration },
    #[error("failed to record {key} as processed: {source}")]
    Store {
        key: EventKey,
        #[source]
        source: StoreError,
    },
}

impl RelayError {
    /// A relay whose mark could not be made durable must stop the relayer.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    pub fn key(&self) -> EventKey {
        match self {
            Self::Submit { key, .. } | Self::Timeout { key, .. } | Self::Store { key, .. } => *key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Key was already in the store; nothing was submitted.
    AlreadyProcessed,
    Relayed(ConfirmationHandle),
}

pub struct RelayExecutor {
    writer: Arc<dyn ChainWriter>,
    store: Arc<ProcessedStore>,
    function_name: String,
    timeout: Duration,
}

impl RelayExecutor {
    pub fn new(writer: Arc<dyn ChainWriter>, store: Arc<ProcessedStore>) -> Self {
        Self {
            writer,
            store,
            function_name: MINT_FUNCTION.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    /// Bound on each destination action.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn action_for(&self, event: &BridgeEvent) -> RelayAction {
        RelayAction {
            function_name: self.function_name.clone(),
            recipient: event.recipient,
            amount: event.amount,
            source_event_id: event.transaction_id,
        }
    }

    /// Relay `event` exactly once. Idempotent: an already-processed key is a successful no-op.
    pub async fn relay(&self, event: &BridgeEvent) -> Result<RelayOutcome, RelayError> {
        let key = event.key();
        if self.store.is_processed(&key) {
            debug!(key = %key, "already processed, skipping");
            return Ok(RelayOutcome::AlreadyProcessed);
        }

        info!(
            key = %key,
            block = event.block_number,
            amount = %event.amount,
            to = %format!("0x{}", hex::encode(event.recipient)),
            "relaying event"
        );
        let action = self.action_for(event);
        let handle = tokio::time::timeout(self.timeout, self.writer.submit_action(&action))
            .await
            .map_err(|_| RelayError::Timeout {
                key,
                limit: self.timeout,
            })?
            .map_err(|source| RelayError::Submit { key, source })?;

        self.store
            .mark_processed(key)
            .await
            .map_err(|source| RelayError::Store { key, source })?;
        info!(key = %key, handle = %handle.0, "relayed");
        Ok(RelayOutcome::Relayed(handle))
    }
}
