//! Example: run the relayer against a source chain, relaying TokensLocked deposits to a
//! (simulated) destination mint.
//!
//! Usage:
//!
//!   cargo run -p relay --example relayer -- --source-rpc <URL> --dest-rpc <URL> \
//!       --source-contract <ADDR> --dest-contract <ADDR>
//!
//! Options:
//!   --config <path>        JSON file with the same fields as `RelayerConfig`; flags override it.
//!   --confirmations <K>    Blocks required on top of a block before it is final. Default: 6.
//!   --poll-interval <S>    Seconds between scans. Default: 30.
//!   --start-block <N>      First block to scan when no cursor is persisted. Default: 0.
//!   --state-dir <path>     Directory for processed.json and cursor.json. Default: relayer-state.
//!
//! Ctrl-C stops the loop after any in-flight relay completes. A fatal error (corrupt or
//! unwritable state) exits non-zero.

use anyhow::{Context, Result};
use relay::{parse_address, JsonRpcReader, RelayerConfig, RelayerLoop, SimulatedWriter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: relayer --source-rpc <URL> --dest-rpc <URL> --source-contract <ADDR> --dest-contract <ADDR> \
[--config <path>] [--confirmations K] [--poll-interval S] [--start-block N] [--state-dir <path>]";

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    source_rpc: Option<String>,
    dest_rpc: Option<String>,
    source_contract: Option<String>,
    dest_contract: Option<String>,
    confirmations: Option<u64>,
    poll_interval: Option<u64>,
    start_block: Option<u64>,
    state_dir: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut out = Args::default();
    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--help" || flag == "-h" {
            eprintln!("{}", USAGE);
            std::process::exit(0);
        }
        i += 1;
        let value = args
            .get(i)
            .cloned()
            .with_context(|| format!("missing value for {}", flag))?;
        match flag {
            "--config" => out.config = Some(value.into()),
            "--source-rpc" => out.source_rpc = Some(value),
            "--dest-rpc" => out.dest_rpc = Some(value),
            "--source-contract" => out.source_contract = Some(value),
            "--dest-contract" => out.dest_contract = Some(value),
            "--confirmations" => out.confirmations = Some(value.parse().context("--confirmations")?),
            "--poll-interval" => out.poll_interval = Some(value.parse().context("--poll-interval")?),
            "--start-block" => out.start_block = Some(value.parse().context("--start-block")?),
            "--state-dir" => out.state_dir = Some(value.into()),
            other => anyhow::bail!("unknown flag {}\n{}", other, USAGE),
        }
        i += 1;
    }
    Ok(out)
}

fn build_config(args: Args) -> Result<RelayerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("read config: {}", path.display()))?;
            serde_json::from_slice::<RelayerConfig>(&bytes).context("parse config")?
        }
        None => {
            let (Some(src), Some(dst), Some(sc), Some(dc)) = (
                args.source_rpc.as_deref(),
                args.dest_rpc.as_deref(),
                args.source_contract.as_deref(),
                args.dest_contract.as_deref(),
            ) else {
                anyhow::bail!("{}", USAGE);
            };
            RelayerConfig::new(src, dst, parse_address(sc)?, parse_address(dc)?)
        }
    };
    if let Some(v) = args.source_rpc {
        config.source_rpc = v;
    }
    if let Some(v) = args.dest_rpc {
        config.dest_rpc = v;
    }
    if let Some(v) = args.source_contract {
        config.source_contract = parse_address(&v)?;
    }
    if let Some(v) = args.dest_contract {
        config.dest_contract = parse_address(&v)?;
    }
    if let Some(v) = args.confirmations {
        config.confirmations = v;
    }
    if let Some(v) = args.poll_interval {
        config.poll_interval = Duration::from_secs(v);
    }
    if let Some(v) = args.start_block {
        config.start_block = v;
    }
    if let Some(v) = args.state_dir {
        config.state_dir = v;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("relay=info")),
        )
        .init();

    let config = build_config(parse_args()?)?;
    let reader = Arc::new(JsonRpcReader::new(&config.source_rpc, config.rpc_timeout)?);
    let writer = Arc::new(SimulatedWriter::new(&config.dest_rpc, config.dest_contract));
    let mut relayer = RelayerLoop::open(&config, reader, writer).context("relayer startup")?;

    let cancel = CancellationToken::new();
    let mut task = tokio::spawn({
        let cancel = cancel.clone();
        async move { relayer.run(cancel).await }
    });

    let result = tokio::select! {
        res = &mut task => res,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, finishing in-flight relay");
            cancel.cancel();
            task.await
        }
    };
    result.context("relayer task panicked")??;
    info!("relayer stopped, exiting");
    Ok(())
}
