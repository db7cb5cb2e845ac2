//! solrpc-ws — Solana pub/sub over a single WebSocket connection.
//!
//! # Features
//! - Many logical subscriptions multiplexed over one connection
//! - Solana JSON-RPC pub/sub and Syndica ChainStream dialects
//! - Typed results per subscription (`Subscription<T>`)
//! - Plain request/response calls over the same socket (`RpcTransport`)
//!
//! The connection is not re-established after it drops; every open
//! subscription receives [`SubscriptionError::ConnectionClosed`].

pub mod client;
pub mod config;
pub mod dialect;
pub mod error;
pub mod multiplexer;
pub mod sink;
pub mod subscription;
pub mod syndica;
pub mod transaction;

pub use client::WsRpcClient;
pub use config::WsClientConfig;
pub use dialect::{Dialect, JsonRpcDialect, Notification, SyndicaDialect};
pub use error::SubscriptionError;
pub use multiplexer::Multiplexer;
pub use sink::FrameSink;
pub use subscription::{json_decoder, Subscription, SubscriptionId, SubscriptionState};
pub use syndica::{
    AccountKeys, SyndicaContext, SyndicaFilter, SyndicaTransactionParams,
    SyndicaTransactionResult, SyndicaTransactionSubscription,
};
pub use transaction::{
    transaction_subscribe_params, TransactionResult, TransactionSubscribeFilter,
    TransactionSubscribeOpts, TransactionSubscription,
};
