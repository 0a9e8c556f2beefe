//! EventScanner: walks a block range in bounded sub-queries and decodes TokensLocked logs.
//!
//! A scan attempt is atomic: any sub-query or decode failure discards everything collected so
//! far and surfaces a retryable [ScanError]. Output is ordered by `(block_number, log_index)`.
//! Cancellation is checked between sub-queries and abandons an in-flight query.

use crate::abi::{decode_log_to_event, is_tokens_locked, tokens_locked_topic0, BridgeEvent, DecodeError};
use crate::chain::{with_timeout, ChainError, ChainReader};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid scan range {from}..={to}")]
    InvalidRange { from: u64, to: u64 },
    #[error("log query {from}..={to} failed: {source}")]
    Query {
        from: u64,
        to: u64,
        #[source]
        source: ChainError,
    },
    #[error("undecodable TokensLocked log in {from}..={to}: {source}")]
    Decode {
        from: u64,
        to: u64,
        #[source]
        source: DecodeError,
    },
    #[error("scan cancelled before block {next}")]
    Cancelled { next: u64 },
}

pub struct EventScanner {
    reader: Arc<dyn ChainReader>,
    contract: [u8; 20],
    topic0: [u8; 32],
    max_range: u64,
    timeout: Duration,
}

impl EventScanner {
    /// Scanner over TokensLocked logs of `contract`; at most `max_range` blocks per query.
    pub fn new(reader: Arc<dyn ChainReader>, contract: [u8; 20], max_range: u64) -> Self {
        Self {
            reader,
            contract,
            topic0: tokens_locked_topic0(),
            max_range: max_range.max(1),
            timeout: Duration::from_secs(30),
        }
    }

    /// Bound on each sub-query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_range(&self) -> u64 {
        self.max_range
    }

    /// Events in `[from_block, to_block]`, ascending by `(block_number, log_index)`.
    /// Returns [ScanError::Cancelled] as soon as `cancel` fires; partial results are dropped.
    pub async fn scan(
        &self,
        from_block: u64,
        to_block: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<BridgeEvent>, ScanError> {
        if from_block > to_block {
            return Err(ScanError::InvalidRange {
                from: from_block,
                to: to_block,
            });
        }

        let mut events = Vec::new();
        let mut from = from_block;
        loop {
            let to = from.saturating_add(self.max_range - 1).min(to_block);
            let query = with_timeout(
                self.timeout,
                self.reader.query_events(&self.contract, &self.topic0, from, to),
            );
            let logs = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(next = from, to_block, "scan cancelled");
                    return Err(ScanError::Cancelled { next: from });
                }
                res = query => res.map_err(|source| ScanError::Query { from, to, source })?,
            };

            let raw_count = logs.len();
            for log in &logs {
                if !is_tokens_locked(log, &self.topic0) {
                    debug!(from, to, "skipping log with foreign topic0");
                    continue;
                }
                let event = decode_log_to_event(log)
                    .map_err(|source| ScanError::Decode { from, to, source })?;
                events.push(event);
            }
            if raw_count > 0 {
                debug!(count = raw_count, from, to, "scan: logs received");
            }

            if to == to_block {
                break;
            }
            from = to + 1;
        }

        events.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(events)
    }
}
