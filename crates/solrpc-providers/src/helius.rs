//! Helius provider profile.
//!
//! Standard RPC at `{cluster}.helius-rpc.com`, enhanced websockets
//! (`transactionSubscribe`) at `atlas-{cluster}.helius-rpc.com`, and the
//! `getPriorityFeeEstimate` call.
//! <https://docs.helius.dev/solana-apis/priority-fee-api>

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use solrpc_core::{Encoding, RpcTransport, TransportError};
use solrpc_http::{HttpClientConfig, HttpRpcClient};

use crate::Cluster;

pub const GET_PRIORITY_FEE_ESTIMATE: &str = "getPriorityFeeEstimate";

/// Helius serves mainnet and devnet only.
fn subdomain(cluster: Cluster) -> Option<&'static str> {
    match cluster {
        Cluster::MainnetBeta => Some("mainnet"),
        Cluster::Devnet => Some("devnet"),
        Cluster::Testnet => None,
    }
}

/// URL template for the HTTP JSON-RPC endpoint.
pub fn http_url(api_key: &str, cluster: Cluster) -> Option<String> {
    let sub = subdomain(cluster)?;
    Some(format!("https://{sub}.helius-rpc.com/?api-key={api_key}"))
}

/// URL template for the standard websocket endpoint.
pub fn ws_url(api_key: &str, cluster: Cluster) -> Option<String> {
    let sub = subdomain(cluster)?;
    Some(format!("wss://{sub}.helius-rpc.com/?api-key={api_key}"))
}

/// URL template for enhanced websockets, which serve `transactionSubscribe`.
pub fn atlas_ws_url(api_key: &str, cluster: Cluster) -> Option<String> {
    let sub = subdomain(cluster)?;
    Some(format!("wss://atlas-{sub}.helius-rpc.com/?api-key={api_key}"))
}

/// Build an `HttpRpcClient` for Helius.
pub fn http_client(api_key: &str, cluster: Cluster) -> Result<HttpRpcClient, TransportError> {
    let url = http_url(api_key, cluster)
        .ok_or_else(|| TransportError::Other(format!("Helius does not serve {cluster}")))?;
    HttpRpcClient::new(url, HttpClientConfig::default())
}

// ─── getPriorityFeeEstimate ──────────────────────────────────────────────────

/// Percentile of recent fees to base the estimate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriorityLevel {
    Min,
    Low,
    Medium,
    High,
    VeryHigh,
    UnsafeMax,
    Default,
}

impl std::str::FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "min" => Ok(Self::Min),
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "veryhigh" | "very-high" => Ok(Self::VeryHigh),
            "unsafemax" | "unsafe-max" => Ok(Self::UnsafeMax),
            "default" => Ok(Self::Default),
            other => Err(format!("unknown priority level: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPriorityFeeEstimateOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_level: Option<PriorityLevel>,
    /// Return the fee Helius recommends instead of a raw percentile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<bool>,
    /// Return every level in `priorityFeeLevels`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_all_priority_fee_levels: Option<bool>,
    /// Encoding of the serialized transaction; base64 if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_encoding: Option<Encoding>,
}

/// Fee estimates in micro-lamports per compute unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MicroLamportPriorityFeeLevels {
    pub min: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub very_high: f64,
    pub unsafe_max: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityFeeEstimate {
    #[serde(default)]
    pub priority_fee_levels: Option<MicroLamportPriorityFeeLevels>,
    #[serde(default)]
    pub priority_fee_estimate: Option<f64>,
}

/// What to estimate fees for.
#[derive(Debug, Clone, Copy)]
pub enum FeeTarget<'a> {
    /// Accounts the transaction will write-lock.
    Accounts(&'a [String]),
    /// A serialized transaction, encoded per `transaction_encoding`.
    Transaction(&'a str),
}

/// Build the single params object of `getPriorityFeeEstimate`.
///
/// An empty transaction falls back to an empty account list. `options` is
/// sent only when at least one option is set.
pub fn priority_fee_estimate_params(
    target: FeeTarget<'_>,
    opts: Option<&GetPriorityFeeEstimateOpts>,
) -> Result<Value, TransportError> {
    let mut obj = Map::new();
    match target {
        FeeTarget::Transaction(tx) if !tx.is_empty() => {
            obj.insert("transaction".into(), Value::String(tx.to_string()));
        }
        FeeTarget::Transaction(_) => {
            obj.insert("accountKeys".into(), Value::Array(Vec::new()));
        }
        FeeTarget::Accounts(keys) => {
            obj.insert("accountKeys".into(), serde_json::to_value(keys)?);
        }
    }

    if let Some(opts) = opts.filter(|o| **o != GetPriorityFeeEstimateOpts::default()) {
        obj.insert("options".into(), serde_json::to_value(opts)?);
    }
    Ok(Value::Object(obj))
}

/// Call `getPriorityFeeEstimate` on any transport.
pub async fn get_priority_fee_estimate<T: RpcTransport>(
    transport: &T,
    target: FeeTarget<'_>,
    opts: Option<&GetPriorityFeeEstimateOpts>,
) -> Result<PriorityFeeEstimate, TransportError> {
    let params = priority_fee_estimate_params(target, opts)?;
    transport
        .call(1, GET_PRIORITY_FEE_ESTIMATE, vec![params])
        .await
}
