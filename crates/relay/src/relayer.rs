//! RelayerLoop: drives Scanning → Filtering → Relaying → Advancing on a poll cadence.
//!
//! The loop owns the [ScanCursor]. The cursor moves to the end of a range only when every event
//! in it was relayed or already processed; otherwise the whole range is retried next pass and
//! the store filters out what already went through. Cancellation is honored between steps,
//! between scan sub-queries, and between relays, never inside a relay.

use crate::chain::{with_timeout, ChainError, ChainReader, ChainWriter};
use crate::config::{ConfigError, RelayerConfig};
use crate::cursor::{CursorStore, ScanCursor};
use crate::executor::{RelayError, RelayExecutor, RelayOutcome};
use crate::gate::{next_range, ConfirmationPolicy};
use crate::scanner::{EventScanner, ScanError};
use crate::store::{store_file_path, ProcessedStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum RelayerError {
    #[error("source chain query failed: {0}")]
    Connection(#[from] ChainError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl RelayerError {
    /// Fatal errors stop the loop; everything else is retried on the next poll.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Scan(_) => false,
            Self::Relay(e) => e.is_fatal(),
            Self::Store(_) | Self::Config(_) => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scanning,
    Filtering,
    Relaying,
    Advancing,
    Stopped,
}

/// Result of one pass over the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No new confirmed range; nothing was scanned.
    Idle,
    /// Every event in the range resolved; cursor moved to `to`.
    Advanced {
        from: u64,
        to: u64,
        relayed: usize,
        skipped: usize,
    },
    /// At least one relay failed; cursor left in place.
    Retry {
        from: u64,
        to: u64,
        relayed: usize,
        failed: usize,
    },
    /// Cancellation observed at a step boundary.
    Cancelled,
}

pub struct RelayerLoop {
    reader: Arc<dyn ChainReader>,
    scanner: EventScanner,
    executor: RelayExecutor,
    store: Arc<ProcessedStore>,
    policy: ConfirmationPolicy,
    cursor: ScanCursor,
    cursor_store: CursorStore,
    poll_interval: Duration,
    rpc_timeout: Duration,
    state: LoopState,
}

impl RelayerLoop {
    /// Build the loop from `config`: load the processed set and the cursor from
    /// `config.state_dir`. A corrupt state file is fatal here.
    pub fn open(
        config: &RelayerConfig,
        reader: Arc<dyn ChainReader>,
        writer: Arc<dyn ChainWriter>,
    ) -> Result<Self, RelayerError> {
        config.validate()?;
        let store = Arc::new(ProcessedStore::open(store_file_path(&config.state_dir))?);
        let cursor_store = CursorStore::in_dir(&config.state_dir);
        let cursor = cursor_store.load_or(config.start_block)?;

        let scanner = EventScanner::new(
            Arc::clone(&reader),
            config.source_contract,
            config.getlogs_max_range,
        )
        .with_timeout(config.rpc_timeout);
        let executor =
            RelayExecutor::new(writer, Arc::clone(&store)).with_timeout(config.relay_timeout);

        Ok(Self {
            reader,
            scanner,
            executor,
            store,
            policy: ConfirmationPolicy::new(config.confirmations),
            cursor,
            cursor_store,
            poll_interval: config.poll_interval,
            rpc_timeout: config.rpc_timeout,
            state: LoopState::Idle,
        })
    }

    pub fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn store(&self) -> &Arc<ProcessedStore> {
        &self.store
    }

    /// Run until `cancel` fires (`Ok`) or a fatal error occurs (`Err`).
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), RelayerError> {
        info!(
            next_block = self.cursor.next_block(),
            confirmations = self.policy.required_confirmations,
            poll_interval = ?self.poll_interval,
            "relayer started"
        );
        while !cancel.is_cancelled() {
            match self.tick(&cancel).await {
                Ok(TickOutcome::Cancelled) => break,
                Ok(outcome) => debug!(?outcome, "pass complete"),
                Err(e) if e.is_fatal() => {
                    error!(reason = %e, "fatal error, stopping relayer");
                    self.state = LoopState::Stopped;
                    return Err(e);
                }
                Err(e) => warn!(reason = %e, "pass failed, retrying after poll interval"),
            }
            self.state = LoopState::Idle;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        self.state = LoopState::Stopped;
        info!(last_scanned_block = ?self.cursor.last_scanned_block, "relayer stopped");
        Ok(())
    }

    /// One pass: scan the next confirmed range, relay what is new, advance if all resolved.
    pub async fn tick(&mut self, cancel: &CancellationToken) -> Result<TickOutcome, RelayerError> {
        self.state = LoopState::Scanning;
        let latest = with_timeout(self.rpc_timeout, self.reader.latest_block_number()).await?;
        let ceiling = self.policy.confirmed_ceiling(latest);
        let Some(range) = next_range(&self.cursor, ceiling) else {
            debug!(
                latest,
                last_scanned_block = ?self.cursor.last_scanned_block,
                "no new confirmed blocks, waiting"
            );
            self.state = LoopState::Idle;
            return Ok(TickOutcome::Idle);
        };
        let (from, to) = range.into_inner();
        info!(from, to, latest, "scanning");
        let events = match self.scanner.scan(from, to, cancel).await {
            Ok(events) => events,
            Err(ScanError::Cancelled { .. }) => return Ok(TickOutcome::Cancelled),
            Err(e) => return Err(e.into()),
        };
        if cancel.is_cancelled() {
            return Ok(TickOutcome::Cancelled);
        }

        self.state = LoopState::Filtering;
        let found = events.len();
        let mut skipped = 0;
        let mut pending = Vec::with_capacity(found);
        for ev in events {
            if !(from..=to).contains(&ev.block_number) {
                // Not ours to resolve: earlier blocks were already scanned, later ones are not final.
                warn!(key = %ev.key(), block = ev.block_number, from, to, "event outside scan range, dropped");
            } else if self.store.is_processed(&ev.key()) {
                debug!(key = %ev.key(), "already processed");
                skipped += 1;
            } else {
                pending.push(ev);
            }
        }
        if found > 0 {
            info!(found, new = pending.len(), skipped, from, to, "events found");
        }
        if cancel.is_cancelled() {
            return Ok(TickOutcome::Cancelled);
        }

        self.state = LoopState::Relaying;
        let mut relayed = 0;
        let mut failed = 0;
        for ev in &pending {
            if cancel.is_cancelled() {
                return Ok(TickOutcome::Cancelled);
            }
            match self.executor.relay(ev).await {
                Ok(RelayOutcome::Relayed(_)) => relayed += 1,
                Ok(RelayOutcome::AlreadyProcessed) => skipped += 1,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(reason = %e, "relay failed, range will be retried");
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            self.state = LoopState::Idle;
            return Ok(TickOutcome::Retry {
                from,
                to,
                relayed,
                failed,
            });
        }

        self.state = LoopState::Advancing;
        let next = ScanCursor::new(Some(to));
        self.cursor_store.save(&next).await?;
        self.cursor = next;
        self.state = LoopState::Idle;
        Ok(TickOutcome::Advanced {
            from,
            to,
            relayed,
            skipped,
        })
    }
}
