//! solrpc-core — foundation traits and types for solrpc.
//!
//! # Overview
//!
//! solrpc is a client-side access layer for Solana nodes: plain JSON-RPC
//! calls plus long-lived websocket subscriptions. The core crate defines:
//!
//! - [`RpcTransport`]: the async request/response trait every transport implements
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`]: wire types
//! - [`TransportError`]: structured error type
//! - [`types`] module: commitment, encoding and transaction payload types
//!   passed through to the node

pub mod error;
pub mod request;
pub mod transport;
pub mod types;

pub use error::TransportError;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;
pub use types::{Commitment, Encoding, TransactionDetails, TransactionWithMeta};
