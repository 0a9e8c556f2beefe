//! Common helpers for integration tests: in-process fake source chain and destination writer.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid per-binary warnings.
#![allow(dead_code)]

use async_trait::async_trait;
use relay::abi::tokens_locked_topic0;
use relay::{
    ChainError, ChainReader, ChainWriter, ConfirmationHandle, RawLog, RelayAction, RelayerConfig,
    SubmitError,
};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

pub const SOURCE_CONTRACT: [u8; 20] = [0x5a; 20];
pub const DEST_CONTRACT: [u8; 20] = [0xd5; 20];
pub const POLL_INTERVAL: Duration = Duration::from_secs(30);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

pub fn config(state_dir: &Path, confirmations: u64, start_block: u64) -> RelayerConfig {
    let mut c = RelayerConfig::new("http://source.invalid", "http://dest.invalid", SOURCE_CONTRACT, DEST_CONTRACT);
    c.confirmations = confirmations;
    c.start_block = start_block;
    c.poll_interval = POLL_INTERVAL;
    c.getlogs_max_range = 50;
    c.state_dir = state_dir.to_path_buf();
    c
}

/// Unique source transfer id for a deposit at (block, log_index).
pub fn transfer_id(block: u64, log_index: u64) -> [u8; 32] {
    let mut id = [0u8; 32];
    id[..8].copy_from_slice(&block.to_be_bytes());
    id[24..].copy_from_slice(&log_index.to_be_bytes());
    id
}

/// Source transaction hash of every deposit in `block`.
pub fn tx_hash(block: u64) -> [u8; 32] {
    let mut h = [0u8; 32];
    h[24..].copy_from_slice(&(0xfeed_0000_u64 + block).to_be_bytes());
    h
}

/// TokensLocked log in JSON-RPC shape. The tx hash is derived from the block number so
/// several deposits in one block share a transaction and differ only by log index.
pub fn deposit_log(block: u64, log_index: u64, amount: u64) -> RawLog {
    json!({
        "address": format!("0x{}", hex::encode(SOURCE_CONTRACT)),
        "blockNumber": format!("0x{:x}", block),
        "logIndex": format!("0x{:x}", log_index),
        "transactionHash": format!("0x{}", hex::encode(tx_hash(block))),
        "topics": [
            format!("0x{}", hex::encode(tokens_locked_topic0())),
            format!("0x{:064x}", 0xaa),
            format!("0x{:064x}", 0xbb),
            format!("0x{}", hex::encode(transfer_id(block, log_index))),
        ],
        "data": format!("0x{:064x}{:064x}{:064x}", amount, 1, 2),
    })
}

fn log_block(log: &RawLog) -> u64 {
    let s = log["blockNumber"].as_str().unwrap_or("0x0");
    u64::from_str_radix(s.trim_start_matches("0x"), 16).unwrap_or(0)
}

#[derive(Default)]
struct ChainState {
    latest: u64,
    logs: Vec<RawLog>,
    stray: Vec<RawLog>,
    fail_latest: usize,
    fail_queries: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Fake source chain: a settable tip, a list of logs, and injectable failures.
#[derive(Default)]
pub struct FakeChain {
    state: Mutex<ChainState>,
    pub latest_calls: AtomicUsize,
    pub queries: Mutex<Vec<(u64, u64)>>,
}

impl FakeChain {
    pub fn new(latest: u64) -> Arc<Self> {
        let chain = Self::default();
        chain.state.lock().unwrap().latest = latest;
        Arc::new(chain)
    }

    pub fn set_latest(&self, latest: u64) {
        self.state.lock().unwrap().latest = latest;
    }

    pub fn push_log(&self, log: RawLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Log returned by every query regardless of the requested range, like a misbehaving node.
    pub fn push_stray_log(&self, log: RawLog) {
        self.state.lock().unwrap().stray.push(log);
    }

    /// Cancel `token` once `n` log queries have been answered.
    pub fn cancel_after_queries(&self, n: usize, token: CancellationToken) {
        self.state.lock().unwrap().cancel_after = Some((n, token));
    }

    /// Next `n` latest-block calls fail with a connection error.
    pub fn fail_latest(&self, n: usize) {
        self.state.lock().unwrap().fail_latest = n;
    }

    /// Next `n` log queries fail with a timeout.
    pub fn fail_queries(&self, n: usize) {
        self.state.lock().unwrap().fail_queries = n;
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn max_queried_block(&self) -> Option<u64> {
        self.queries.lock().unwrap().iter().map(|(_, to)| *to).max()
    }
}

#[async_trait]
impl ChainReader for FakeChain {
    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_latest > 0 {
            state.fail_latest -= 1;
            return Err(ChainError::Connection("connection refused".into()));
        }
        Ok(state.latest)
    }

    async fn query_events(
        &self,
        _contract: &[u8; 20],
        _topic0: &[u8; 32],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let answered = {
            let mut queries = self.queries.lock().unwrap();
            queries.push((from_block, to_block));
            queries.len()
        };
        let mut state = self.state.lock().unwrap();
        if state.fail_queries > 0 {
            state.fail_queries -= 1;
            return Err(ChainError::Timeout(Duration::from_secs(30)));
        }
        if let Some((n, token)) = &state.cancel_after {
            if answered >= *n {
                token.cancel();
            }
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| (from_block..=to_block).contains(&log_block(log)))
            .chain(state.stray.iter())
            .cloned()
            .collect())
    }
}

/// Pauses a submission until the test releases it.
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

/// Fake destination: records confirmed actions, can fail chosen transfer ids once.
#[derive(Default)]
pub struct FakeWriter {
    pub attempts: AtomicUsize,
    confirmed: Mutex<Vec<[u8; 32]>>,
    fail_once: Mutex<HashSet<[u8; 32]>>,
    delay: Mutex<Option<Duration>>,
    gate: Option<Arc<Gate>>,
}

impl FakeWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated() -> (Arc<Self>, Arc<Gate>) {
        let gate = Arc::new(Gate {
            started: Notify::new(),
            release: Notify::new(),
        });
        let writer = Self {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        (Arc::new(writer), gate)
    }

    pub fn fail_once(&self, id: [u8; 32]) {
        self.fail_once.lock().unwrap().insert(id);
    }

    /// Every later submission takes `delay` (or returns at once with `None`).
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn confirmed(&self) -> Vec<[u8; 32]> {
        self.confirmed.lock().unwrap().clone()
    }

    /// How many times the destination action for `id` succeeded.
    pub fn confirmed_count(&self, id: &[u8; 32]) -> usize {
        self.confirmed.lock().unwrap().iter().filter(|c| *c == id).count()
    }
}

#[async_trait]
impl ChainWriter for FakeWriter {
    async fn submit_action(&self, action: &RelayAction) -> Result<ConfirmationHandle, SubmitError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_once.lock().unwrap().remove(&action.source_event_id) {
            return Err(SubmitError::Rejected("execution reverted".into()));
        }
        self.confirmed.lock().unwrap().push(action.source_event_id);
        Ok(ConfirmationHandle(format!("0x{}", hex::encode(action.source_event_id))))
    }
}
