//! Private bundle relay client.
//!
//! Flashbots-style JSON-RPC over HTTPS: `eth_callBundle` to simulate,
//! `eth_sendBundle` to submit for a specific target block. Payloads are
//! signed with a dedicated relay signing key and carried in the
//! `X-Flashbots-Signature` header. Behind a trait so the engine can run
//! against an in-memory relay in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Bytes, H256, U256};
use ethers::utils::keccak256;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info};

use config::RelayConfig;

use crate::error::{ExecutionError, Result};

/// Result of simulating a whole bundle.
#[derive(Debug, Clone)]
pub struct BundleSimulation {
    pub success: bool,
    /// Index of the first reverting transaction, if any.
    pub reverted_at: Option<usize>,
    /// Simulated profit delta for the bundle signer, wei.
    pub profit_wei: U256,
}

/// Relay operations the engine depends on.
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// Simulate the ordered bundle on top of the given block.
    async fn simulate(&self, raw_txs: &[Bytes], block_number: u64) -> Result<BundleSimulation>;

    /// Submit the bundle for the target block; returns the bundle hash.
    async fn submit(
        &self,
        raw_txs: &[Bytes],
        target_block: u64,
        min_timestamp: Option<u64>,
        max_timestamp: Option<u64>,
    ) -> Result<H256>;
}

/// Per-relay submission statistics.
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    pub submitted: u64,
    pub simulated: u64,
}

/// Production relay client.
pub struct BundleRelay {
    url: String,
    http: reqwest::Client,
    signer: LocalWallet,
    stats: Mutex<RelayStats>,
    /// Bundle hashes we have submitted, by target block.
    submitted: Mutex<HashMap<u64, Vec<H256>>>,
}

impl BundleRelay {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let signer = config
            .signing_key
            .parse::<LocalWallet>()
            .map_err(|e| ExecutionError::Relay(format!("invalid relay signing key: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ExecutionError::Relay(format!("failed to build relay client: {e}")))?;
        Ok(Self {
            url: config.url.clone(),
            http,
            signer,
            stats: Mutex::new(RelayStats::default()),
            submitted: Mutex::new(HashMap::new()),
        })
    }

    pub fn stats(&self) -> RelayStats {
        self.stats.lock().clone()
    }

    async fn rpc(&self, method: &str, params: Value) -> Result<Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        })
        .to_string();

        // Flashbots-style payload signature: sign the hex keccak of the
        // body with the relay identity key.
        let digest = format!("0x{}", hex::encode(keccak256(body.as_bytes())));
        let signature = self
            .signer
            .sign_message(digest.as_bytes())
            .await
            .map_err(|e| ExecutionError::Relay(format!("payload signing failed: {e}")))?;
        let header = format!("{:?}:0x{}", self.signer.address(), signature);

        let response = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .header("X-Flashbots-Signature", header)
            .body(body)
            .send()
            .await
            .map_err(|e| ExecutionError::Relay(format!("relay request failed: {e}")))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ExecutionError::Relay(format!("relay response unreadable: {e}")))?;

        if let Some(error) = payload.get("error") {
            return Err(ExecutionError::Relay(format!("relay error: {error}")));
        }
        Ok(payload.get("result").cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RelayApi for BundleRelay {
    async fn simulate(&self, raw_txs: &[Bytes], block_number: u64) -> Result<BundleSimulation> {
        let txs: Vec<String> = raw_txs.iter().map(|b| format!("0x{}", hex::encode(b))).collect();
        let result = self
            .rpc(
                "eth_callBundle",
                json!([{
                    "txs": txs,
                    "blockNumber": format!("0x{block_number:x}"),
                    "stateBlockNumber": "latest",
                }]),
            )
            .await?;
        self.stats.lock().simulated += 1;

        let mut reverted_at = None;
        let mut profit_wei = U256::zero();
        if let Some(results) = result.get("results").and_then(|r| r.as_array()) {
            for (index, tx_result) in results.iter().enumerate() {
                if tx_result.get("error").is_some() || tx_result.get("revert").is_some() {
                    reverted_at = Some(index);
                    break;
                }
            }
        }
        if let Some(profit) = result.get("coinbaseDiff").and_then(|v| v.as_str()) {
            profit_wei = U256::from_dec_str(profit).unwrap_or_default();
        }

        debug!(block_number, ?reverted_at, "bundle simulated");
        Ok(BundleSimulation {
            success: reverted_at.is_none(),
            reverted_at,
            profit_wei,
        })
    }

    async fn submit(
        &self,
        raw_txs: &[Bytes],
        target_block: u64,
        min_timestamp: Option<u64>,
        max_timestamp: Option<u64>,
    ) -> Result<H256> {
        let txs: Vec<String> = raw_txs.iter().map(|b| format!("0x{}", hex::encode(b))).collect();
        let mut params = json!({
            "txs": txs,
            "blockNumber": format!("0x{target_block:x}"),
        });
        if let Some(min) = min_timestamp {
            params["minTimestamp"] = json!(min);
        }
        if let Some(max) = max_timestamp {
            params["maxTimestamp"] = json!(max);
        }

        let result = self.rpc("eth_sendBundle", json!([params])).await?;
        let bundle_hash = result
            .get("bundleHash")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(|| {
                // Relays without a bundle hash in the response: derive a
                // stable identity from the payload.
                H256::from(keccak256(
                    raw_txs
                        .iter()
                        .flat_map(|b| b.to_vec())
                        .collect::<Vec<u8>>(),
                ))
            });

        {
            let mut stats = self.stats.lock();
            stats.submitted += 1;
        }
        self.submitted
            .lock()
            .entry(target_block)
            .or_default()
            .push(bundle_hash);

        info!(%bundle_hash, target_block, txs = raw_txs.len(), "bundle submitted");
        Ok(bundle_hash)
    }
}
