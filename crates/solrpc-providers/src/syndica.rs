//! Syndica ChainStream profile.
//!
//! ChainStream is a websocket-only API. It speaks its own subscription
//! dialect; see [`solrpc_ws::syndica`].
//! <https://docs.syndica.io/platform/chainstream-api>

use solrpc_core::TransportError;
use solrpc_ws::{SyndicaTransactionParams, WsClientConfig, WsRpcClient};

/// Network identifier for Solana mainnet.
pub const SOLANA_MAINNET: &str = "solana-mainnet";

/// ChainStream websocket endpoint for `api_key`.
pub fn ws_url(api_key: &str) -> String {
    format!("wss://chainstream.api.syndica.io/api-key/{api_key}")
}

/// Connect to ChainStream.
pub async fn connect(api_key: &str, config: WsClientConfig) -> Result<WsRpcClient, TransportError> {
    WsRpcClient::connect(ws_url(api_key), config).await
}

/// Mainnet transaction stream params, optionally restricted to transactions
/// touching any of `accounts`.
pub fn mainnet_transactions(accounts: &[String], exclude_votes: bool) -> SyndicaTransactionParams {
    SyndicaTransactionParams::new(SOLANA_MAINNET)
        .exclude_votes(exclude_votes)
        .one_of(accounts.iter().cloned())
}
