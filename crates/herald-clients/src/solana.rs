//! Solana JSON-RPC data source.

use async_trait::async_trait;
use chrono::Utc;
use herald_pipeline::{CollaboratorError, DataSource, SignalItem, Snapshot};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::warn;

use crate::http::{build_client, handle_response};
use crate::{ClientError, HttpTimeouts};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Balance {
    value: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpochInfo {
    epoch: u64,
    slot_index: u64,
    slots_in_epoch: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerformanceSample {
    num_transactions: u64,
    sample_period_secs: u64,
}

/// Reads the wallet balance and network stats from a Solana RPC node.
#[derive(Debug, Clone)]
pub struct SolanaRpcClient {
    http: Client,
    rpc_url: String,
    wallet: String,
}

impl SolanaRpcClient {
    /// `wallet` is the base58 public key whose balance gates runs.
    pub fn new(
        rpc_url: impl Into<String>,
        wallet: impl Into<String>,
        timeouts: HttpTimeouts,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            http: build_client(timeouts)?,
            rpc_url: rpc_url.into(),
            wallet: wallet.into(),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ClientError> {
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;
        let body: RpcResponse<T> = handle_response(response).await?;
        if let Some(error) = body.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        body.result
            .ok_or_else(|| ClientError::InvalidResponse(format!("{} returned no result", method)))
    }

    /// Wallet balance in SOL.
    pub async fn balance_sol(&self) -> Result<f64, ClientError> {
        let balance: Balance = self.call("getBalance", json!([self.wallet])).await?;
        Ok(balance.value as f64 / LAMPORTS_PER_SOL)
    }

    async fn epoch_item(&self) -> Result<SignalItem, ClientError> {
        let info: EpochInfo = self.call("getEpochInfo", json!([])).await?;
        let progress = if info.slots_in_epoch == 0 {
            0.0
        } else {
            info.slot_index as f64 / info.slots_in_epoch as f64 * 100.0
        };
        Ok(SignalItem {
            label: "epoch".to_string(),
            detail: format!("{} ({:.0}% complete)", info.epoch, progress),
        })
    }

    async fn throughput_item(&self) -> Result<SignalItem, ClientError> {
        let samples: Vec<PerformanceSample> =
            self.call("getRecentPerformanceSamples", json!([1])).await?;
        let sample = samples
            .into_iter()
            .next()
            .filter(|s| s.sample_period_secs > 0)
            .ok_or_else(|| ClientError::InvalidResponse("no performance sample".to_string()))?;
        Ok(SignalItem {
            label: "throughput".to_string(),
            detail: format!(
                "{:.0} transactions/s",
                sample.num_transactions as f64 / sample.sample_period_secs as f64
            ),
        })
    }
}

#[async_trait]
impl DataSource for SolanaRpcClient {
    async fn collect_snapshot(&self) -> Result<Snapshot, CollaboratorError> {
        let balance = self.balance_sol().await?;
        let mut items = vec![SignalItem {
            label: "wallet balance".to_string(),
            detail: format!("{:.4} SOL", balance),
        }];

        // Network stats are context only; a missing one does not fail the run.
        for item in [self.epoch_item().await, self.throughput_item().await] {
            match item {
                Ok(item) => items.push(item),
                Err(e) => warn!(error = %e, "skipping network stat"),
            }
        }

        Ok(Snapshot {
            collected_at: Utc::now(),
            items,
        })
    }

    async fn check_readiness(&self) -> Result<f64, CollaboratorError> {
        Ok(self.balance_sol().await?)
    }
}
