//! `transactionSubscribe`: transaction notifications over the JSON-RPC
//! pub/sub dialect (Helius enhanced websockets and compatible nodes).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use solrpc_core::{Commitment, Encoding, TransactionDetails, TransactionWithMeta};

use crate::error::SubscriptionError;
use crate::multiplexer::Multiplexer;
use crate::subscription::Subscription;

pub const TRANSACTION_SUBSCRIBE: &str = "transactionSubscribe";
pub const TRANSACTION_UNSUBSCRIBE: &str = "transactionUnsubscribe";

/// Encodings accepted for transaction notifications.
pub const ALLOWED_ENCODINGS: [Encoding; 3] =
    [Encoding::Base58, Encoding::Base64, Encoding::Base64Zstd];

/// Which transactions to be notified about. Only fields that differ from
/// their defaults are put on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSubscribeFilter {
    #[serde(default, skip_serializing_if = "is_false")]
    pub vote: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account_include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account_exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub account_required: Vec<String>,
}

impl TransactionSubscribeFilter {
    /// Filter on transactions touching any of `accounts`.
    pub fn account_include<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            account_include: accounts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Filter on a single transaction signature.
    pub fn signature(signature: impl Into<String>) -> Self {
        Self {
            signature: Some(signature.into()),
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Notification options. Unset options are omitted from the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSubscribeOpts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commitment: Option<Commitment>,
    /// Must be one of [`ALLOWED_ENCODINGS`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<Encoding>,
    #[serde(
        default,
        rename = "transaction_details",
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_details: Option<TransactionDetails>,
    /// Whether to populate the rewards array. The node includes rewards
    /// when this is unset.
    #[serde(default, rename = "showRewards", skip_serializing_if = "Option::is_none")]
    pub rewards: Option<bool>,
    /// Highest transaction version to return; a newer transaction produces
    /// an error notification instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_supported_transaction_version: Option<u64>,
}

impl TransactionSubscribeOpts {
    fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Build the positional `transactionSubscribe` params.
///
/// Each object is present only when it has at least one key. When options
/// are present but the filter is empty, the filter is sent as `{}` so the
/// options stay in the second position.
pub fn transaction_subscribe_params(
    filter: &TransactionSubscribeFilter,
    opts: Option<&TransactionSubscribeOpts>,
) -> Result<Vec<Value>, SubscriptionError> {
    let opts = opts.filter(|o| !o.is_empty());

    if let Some(encoding) = opts.and_then(|o| o.encoding) {
        if !encoding.is_any_of(&ALLOWED_ENCODINGS) {
            return Err(SubscriptionError::Validation(format!(
                "provided encoding is not supported: {encoding}"
            )));
        }
    }

    let mut params = Vec::with_capacity(2);
    if !filter.is_empty() || opts.is_some() {
        params.push(serde_json::to_value(filter)?);
    }
    if let Some(opts) = opts {
        params.push(serde_json::to_value(opts)?);
    }
    Ok(params)
}

/// One transaction notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    #[serde(default)]
    pub transaction: Option<TransactionWithMeta>,
    pub slot: u64,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<Value>,
}

impl TransactionResult {
    /// Returns `true` if the transaction failed on chain.
    pub fn is_failed(&self) -> bool {
        self.err.as_ref().is_some_and(|e| !e.is_null())
    }
}

/// Decode a `transactionNotification` result. Some nodes wrap the payload
/// in a `{context, value}` envelope; others send it bare.
pub fn decode_transaction_notification(
    mut payload: Value,
) -> Result<TransactionResult, SubscriptionError> {
    if let Some(value) = payload.get_mut("value").filter(|v| v.is_object()) {
        let value = value.take();
        return Ok(serde_json::from_value(value)?);
    }
    Ok(serde_json::from_value(payload)?)
}

pub type TransactionSubscription = Subscription<TransactionResult>;

impl Multiplexer {
    /// Subscribe to transactions matching `filter`.
    ///
    /// An encoding outside [`ALLOWED_ENCODINGS`] is rejected before anything
    /// is sent.
    pub async fn transaction_subscribe(
        &self,
        filter: &TransactionSubscribeFilter,
        opts: Option<&TransactionSubscribeOpts>,
    ) -> Result<TransactionSubscription, SubscriptionError> {
        let params = transaction_subscribe_params(filter, opts)?;
        self.subscribe(
            params,
            TRANSACTION_SUBSCRIBE,
            TRANSACTION_UNSUBSCRIBE,
            decode_transaction_notification,
        )
        .await
    }
}
