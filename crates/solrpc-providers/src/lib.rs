//! solrpc-providers — endpoint profiles for Solana RPC providers.
//!
//! Each provider module knows the URL templates for a specific service and
//! any provider-only calls it exposes.
//!
//! # Quick start
//! ```rust,no_run
//! use solrpc_providers::{public, Cluster};
//!
//! let client = public::http_client(Cluster::Devnet).unwrap();
//! ```

pub mod helius;
pub mod public;
pub mod syndica;

use std::fmt;
use std::str::FromStr;

/// A Solana cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cluster {
    #[default]
    MainnetBeta,
    Devnet,
    Testnet,
}

impl Cluster {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cluster {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "mainnet-beta" => Ok(Self::MainnetBeta),
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            other => Err(format!("unknown cluster: {other}")),
        }
    }
}
