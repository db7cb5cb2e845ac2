//! Wire dialects for subscribe / notify / unsubscribe.
//!
//! Both dialects are framed as JSON-RPC 2.0, so request/response
//! correlation by `id` is shared and lives in the multiplexer. Everything
//! else (parameter shape, acknowledgement contents and notification
//! envelopes) is owned by a [`Dialect`] implementation, so another provider
//! can be supported without touching the routing core.

use serde_json::Value;
use solrpc_core::JsonRpcRequest;

use crate::subscription::SubscriptionId;

/// A notification extracted from an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// The subscription the frame is addressed to.
    pub subscription: SubscriptionId,
    /// The payload to decode. `None` if the envelope carried no result.
    pub result: Option<Value>,
}

/// The wire convention a provider uses for subscriptions.
pub trait Dialect: Send + Sync + 'static {
    /// Short name used to tell dialects apart and in logs.
    fn name(&self) -> &'static str;

    /// Build the subscribe request.
    fn subscribe_request(&self, id: u64, method: &str, params: Value) -> JsonRpcRequest;

    /// Build the unsubscribe request for an open subscription.
    fn unsubscribe_request(
        &self,
        id: u64,
        method: &str,
        subscription: &SubscriptionId,
    ) -> JsonRpcRequest;

    /// Extract the subscription id from a subscribe acknowledgement's `result`.
    fn subscription_id(&self, ack: &Value) -> Option<SubscriptionId>;

    /// Recognise a notification frame. Returns `None` if the frame is not a
    /// notification in this dialect.
    fn parse_notification(&self, frame: &Value) -> Option<Notification>;
}

/// Solana's JSON-RPC pub/sub convention: positional params, numeric
/// subscription ids, un-namespaced `*Notification` methods with
/// `params.subscription`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRpcDialect;

impl Dialect for JsonRpcDialect {
    fn name(&self) -> &'static str {
        "jsonrpc"
    }

    fn subscribe_request(&self, id: u64, method: &str, params: Value) -> JsonRpcRequest {
        let params = match params {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        JsonRpcRequest::new(id, method, params)
    }

    fn unsubscribe_request(
        &self,
        id: u64,
        method: &str,
        subscription: &SubscriptionId,
    ) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, vec![subscription.to_value()])
    }

    fn subscription_id(&self, ack: &Value) -> Option<SubscriptionId> {
        ack.as_u64().map(SubscriptionId::Number)
    }

    fn parse_notification(&self, frame: &Value) -> Option<Notification> {
        let method = frame.get("method")?.as_str()?;
        if !method.ends_with("Notification") || method.contains('.') {
            return None;
        }
        let params = frame.get("params")?;
        let subscription = params.get("subscription")?.as_u64()?;
        Some(Notification {
            subscription: SubscriptionId::Number(subscription),
            result: params.get("result").cloned(),
        })
    }
}

/// Syndica ChainStream: a single named-params object, subscription ids that
/// may be numbers or strings, and notifications whose `result` is the
/// `{context, value}` envelope itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyndicaDialect;

/// Namespace of every ChainStream method.
const CHAINSTREAM_PREFIX: &str = "chainstream.";

impl Dialect for SyndicaDialect {
    fn name(&self) -> &'static str {
        "chainstream"
    }

    fn subscribe_request(&self, id: u64, method: &str, params: Value) -> JsonRpcRequest {
        JsonRpcRequest::with_params(id, method, params)
    }

    fn unsubscribe_request(
        &self,
        id: u64,
        method: &str,
        subscription: &SubscriptionId,
    ) -> JsonRpcRequest {
        JsonRpcRequest::new(id, method, vec![subscription.to_value()])
    }

    fn subscription_id(&self, ack: &Value) -> Option<SubscriptionId> {
        SubscriptionId::from_value(ack)
    }

    fn parse_notification(&self, frame: &Value) -> Option<Notification> {
        let method = frame.get("method")?.as_str()?;
        if !method.starts_with(CHAINSTREAM_PREFIX) {
            return None;
        }
        let params = frame.get("params")?;
        let subscription = SubscriptionId::from_value(params.get("subscription")?)?;
        Some(Notification {
            subscription,
            result: params.get("result").cloned(),
        })
    }
}
