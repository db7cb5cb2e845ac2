//! Syndica ChainStream transaction subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use solrpc_core::TransactionWithMeta;

use crate::error::SubscriptionError;
use crate::multiplexer::Multiplexer;
use crate::subscription::{json_decoder, Subscription};

pub const CHAINSTREAM_TRANSACTIONS_SUBSCRIBE: &str = "chainstream.transactionsSubscribe";
pub const CHAINSTREAM_TRANSACTIONS_UNSUBSCRIBE: &str = "chainstream.transactionsUnsubscribe";

/// Account key constraints. Every list is sent, empty or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountKeys {
    /// Transaction must reference all of these.
    #[serde(default)]
    pub all: Vec<String>,
    /// Transaction must reference at least one of these.
    #[serde(default)]
    pub one_of: Vec<String>,
    /// Transaction must reference none of these.
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyndicaFilter {
    #[serde(default)]
    pub exclude_votes: bool,
    #[serde(default)]
    pub account_keys: AccountKeys,
}

/// Named params of `chainstream.transactionsSubscribe`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyndicaTransactionParams {
    /// Network identifier, e.g. `solana-mainnet`.
    pub network: String,
    /// Only stream transactions confirmed by multiple validators.
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub filter: SyndicaFilter,
}

impl SyndicaTransactionParams {
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            ..Self::default()
        }
    }

    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    pub fn exclude_votes(mut self, exclude: bool) -> Self {
        self.filter.exclude_votes = exclude;
        self
    }

    pub fn one_of<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter.account_keys.one_of = keys.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), SubscriptionError> {
        if self.network.trim().is_empty() {
            return Err(SubscriptionError::Validation("network is required".into()));
        }
        Ok(())
    }
}

/// Stream metadata attached to every ChainStream notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyndicaContext {
    pub index: u64,
    pub is_vote: bool,
    pub node_time: Option<DateTime<Utc>>,
    pub signature: String,
    pub slot_status: String,
}

/// One ChainStream transaction notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyndicaTransactionResult {
    #[serde(default)]
    pub value: Option<TransactionWithMeta>,
    pub context: SyndicaContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<Value>,
}

pub type SyndicaTransactionSubscription = Subscription<SyndicaTransactionResult>;

impl Multiplexer {
    /// Open a ChainStream transaction stream.
    ///
    /// `None` params, or params without a network, are rejected before
    /// anything is sent.
    pub async fn syndica_transaction_subscribe(
        &self,
        params: Option<&SyndicaTransactionParams>,
    ) -> Result<SyndicaTransactionSubscription, SubscriptionError> {
        let params = params
            .ok_or_else(|| SubscriptionError::Validation("params are required".into()))?;
        params.validate()?;

        self.subscribe_provider(
            serde_json::to_value(params)?,
            CHAINSTREAM_TRANSACTIONS_SUBSCRIBE,
            CHAINSTREAM_TRANSACTIONS_UNSUBSCRIBE,
            json_decoder::<SyndicaTransactionResult>,
        )
        .await
    }
}
