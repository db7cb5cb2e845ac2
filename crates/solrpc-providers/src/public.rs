//! Public Solana cluster endpoints.
//!
//! Free, no-API-key endpoints suitable for development and testing. They
//! are heavily rate limited and do not serve `transactionSubscribe`.

use solrpc_core::TransportError;
use solrpc_http::{HttpClientConfig, HttpRpcClient};
use solrpc_ws::{WsClientConfig, WsRpcClient};

use crate::Cluster;

pub fn http_url(cluster: Cluster) -> &'static str {
    match cluster {
        Cluster::MainnetBeta => "https://api.mainnet-beta.solana.com",
        Cluster::Devnet => "https://api.devnet.solana.com",
        Cluster::Testnet => "https://api.testnet.solana.com",
    }
}

pub fn ws_url(cluster: Cluster) -> &'static str {
    match cluster {
        Cluster::MainnetBeta => "wss://api.mainnet-beta.solana.com",
        Cluster::Devnet => "wss://api.devnet.solana.com",
        Cluster::Testnet => "wss://api.testnet.solana.com",
    }
}

pub fn http_client(cluster: Cluster) -> Result<HttpRpcClient, TransportError> {
    HttpRpcClient::new(http_url(cluster), HttpClientConfig::default())
}

pub async fn ws_client(cluster: Cluster) -> Result<WsRpcClient, TransportError> {
    WsRpcClient::connect(ws_url(cluster), WsClientConfig::default()).await
}
