//! JSON-RPC over HTTP implementation of [ChainReader], plus a dry-run [ChainWriter].

use crate::abi::is_tokens_locked;
use crate::chain::{
    ChainError, ChainReader, ChainWriter, ConfirmationHandle, RawLog, RelayAction, SubmitError,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

fn build_logs_filter(
    address: &[u8; 20],
    topic0: Option<&[u8; 32]>,
    from_block: u64,
    to_block: u64,
) -> Value {
    let mut filter = json!({
        "address": format!("0x{}", hex::encode(address)),
        "fromBlock": format!("0x{:x}", from_block),
        "toBlock": format!("0x{:x}", to_block),
    });
    // Single-topic filter: [topic0] only (some nodes reject [topic0, null, null, null]).
    if let Some(t0) = topic0 {
        filter["topics"] = json!([format!("0x{}", hex::encode(t0))]);
    }
    filter
}

fn classify(e: reqwest::Error, limit: Duration) -> ChainError {
    if e.is_timeout() {
        ChainError::Timeout(limit)
    } else if e.is_connect() || e.is_request() {
        ChainError::Connection(e.to_string())
    } else {
        ChainError::Rpc(e.to_string())
    }
}

/// [ChainReader] backed by `eth_blockNumber` / `eth_getLogs` on an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct JsonRpcReader {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl JsonRpcReader {
    /// Every request is bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    async fn call(&self, method: &str, params: Value, id: u64) -> Result<Value, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params
        });
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;
        let json: Value = resp.json().await.map_err(|e| classify(e, self.timeout))?;
        if let Some(err) = json.get("error") {
            return Err(ChainError::Rpc(err.to_string()));
        }
        json.get("result")
            .cloned()
            .ok_or_else(|| ChainError::Decode("missing result".into()))
    }

    async fn get_logs(&self, filter: Value) -> Result<Vec<RawLog>, ChainError> {
        match self.call("eth_getLogs", json!([filter]), 2).await? {
            Value::Array(logs) => Ok(logs),
            other => Err(ChainError::Decode(format!("getLogs not array: {}", other))),
        }
    }
}

#[async_trait]
impl ChainReader for JsonRpcReader {
    async fn latest_block_number(&self) -> Result<u64, ChainError> {
        let result = self.call("eth_blockNumber", json!([]), 1).await?;
        let s = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("blockNumber not string".into()))?;
        let s = s.strip_prefix("0x").unwrap_or(s);
        u64::from_str_radix(s, 16).map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn query_events(
        &self,
        contract: &[u8; 20],
        topic0: &[u8; 32],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, ChainError> {
        let filter = build_logs_filter(contract, Some(topic0), from_block, to_block);
        match self.get_logs(filter).await {
            Ok(logs) => Ok(logs),
            Err(ChainError::Rpc(e)) => {
                debug!(reason = %e, "eth_getLogs with topic filter failed, trying address-only");
                let fallback = build_logs_filter(contract, None, from_block, to_block);
                let raw = self.get_logs(fallback).await?;
                Ok(raw
                    .into_iter()
                    .filter(|log| is_tokens_locked(log, topic0))
                    .collect())
            }
            Err(e) => Err(e),
        }
    }
}

/// Round trip the dry-run writer pretends each action takes.
const SIMULATED_LATENCY: Duration = Duration::from_secs(1);

/// Dry-run [ChainWriter]: logs the destination call and reports it confirmed.
///
/// Stands in for transaction construction, signing, and submission, which live outside
/// the relayer core.
#[derive(Debug, Clone)]
pub struct SimulatedWriter {
    dest_rpc: String,
    contract: [u8; 20],
}

impl SimulatedWriter {
    pub fn new(dest_rpc: impl Into<String>, contract: [u8; 20]) -> Self {
        Self {
            dest_rpc: dest_rpc.into(),
            contract,
        }
    }
}

#[async_trait]
impl ChainWriter for SimulatedWriter {
    async fn submit_action(&self, action: &RelayAction) -> Result<ConfirmationHandle, SubmitError> {
        info!(
            dest_rpc = %self.dest_rpc,
            contract = %format!("0x{}", hex::encode(self.contract)),
            function = %action.function_name,
            to = %format!("0x{}", hex::encode(action.recipient)),
            amount = %action.amount,
            source_tx_id = %format!("0x{}", hex::encode(action.source_event_id)),
            "[SIMULATION] relaying to destination"
        );
        tokio::time::sleep(SIMULATED_LATENCY).await;
        Ok(ConfirmationHandle(format!(
            "simulated:0x{}",
            hex::encode(action.source_event_id)
        )))
    }
}
