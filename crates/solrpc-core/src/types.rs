//! Solana query qualifiers and payload types.
//!
//! These values are passed through to the node as-is; their meaning is
//! defined by the Solana RPC protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commitment level of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
}

/// Wire encoding of account data or transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    #[serde(rename = "base58")]
    Base58,
    #[serde(rename = "base64")]
    Base64,
    #[serde(rename = "base64+zstd")]
    Base64Zstd,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "jsonParsed")]
    JsonParsed,
}

impl Encoding {
    /// The exact string sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base58 => "base58",
            Self::Base64 => "base64",
            Self::Base64Zstd => "base64+zstd",
            Self::Json => "json",
            Self::JsonParsed => "jsonParsed",
        }
    }

    /// Returns `true` if `self` is one of `allowed`.
    pub fn is_any_of(&self, allowed: &[Encoding]) -> bool {
        allowed.contains(self)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "base58" => Ok(Self::Base58),
            "base64" => Ok(Self::Base64),
            "base64+zstd" => Ok(Self::Base64Zstd),
            "json" => Ok(Self::Json),
            "jsonParsed" => Ok(Self::JsonParsed),
            other => Err(format!("unknown encoding: {other}")),
        }
    }
}

/// Level of transaction detail to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionDetails {
    Full,
    Signatures,
    Accounts,
    None,
}

/// A transaction together with its status metadata.
///
/// The encoded transaction and the metadata are kept as raw JSON; decoding
/// them into concrete Solana types is left to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionWithMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<i64>,
    /// Encoded transaction: `[data, encoding]` for binary encodings, an
    /// object for `json`/`jsonParsed`.
    #[serde(default)]
    pub transaction: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// `"legacy"` or a version number; absent for pre-versioning nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Value>,
}

impl TransactionWithMeta {
    /// The base58/base64 payload and its encoding, for binary encodings.
    pub fn encoded(&self) -> Option<(&str, Encoding)> {
        let arr = self.transaction.as_array()?;
        let data = arr.first()?.as_str()?;
        let encoding = arr.get(1)?.as_str()?.parse().ok()?;
        Some((data, encoding))
    }
}
