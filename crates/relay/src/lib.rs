//! Cross-chain relayer core: watches a source chain for finalized TokensLocked deposits and
//! triggers exactly one destination-side mint per deposit.
//!
//! - **EventScanner**: walks confirmed block ranges in bounded `eth_getLogs` sub-queries and
//!   decodes logs into [BridgeEvent]s ordered by `(block_number, log_index)`.
//! - **ConfirmationGate**: [confirmed_ceiling] / [next_range] decide how far it is safe to scan
//!   given a [ConfirmationPolicy].
//! - **RelayExecutor**: performs the destination action, then durably marks the event in the
//!   [ProcessedStore]. Dedup key is `(tx_hash, log_index)`.
//! - **RelayerLoop**: owns the [ScanCursor] and advances it only past fully resolved ranges;
//!   stops on a [CancellationToken](tokio_util::sync::CancellationToken) or a fatal error.
//!
//! Chain access is abstracted behind [ChainReader] / [ChainWriter]; [JsonRpcReader] and
//! [SimulatedWriter] are the bundled implementations.

pub mod abi;
pub mod chain;
pub mod config;
pub mod cursor;
pub mod executor;
pub mod gate;
pub mod relayer;
pub mod rpc;
pub mod scanner;
pub mod store;

pub use abi::{BridgeEvent, EventKey};
pub use chain::{
    ChainError, ChainReader, ChainWriter, ConfirmationHandle, RawLog, RelayAction, SubmitError,
};
pub use config::{parse_address, ConfigError, RelayerConfig};
pub use cursor::{CursorStore, ScanCursor};
pub use executor::{RelayError, RelayExecutor, RelayOutcome};
pub use gate::{confirmed_ceiling, next_range, ConfirmationPolicy};
pub use relayer::{LoopState, RelayerError, RelayerLoop, TickOutcome};
pub use rpc::{JsonRpcReader, SimulatedWriter};
pub use scanner::{EventScanner, ScanError};
pub use store::{ProcessedStore, StoreError};
