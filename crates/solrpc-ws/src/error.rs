//! Subscription error taxonomy.

use solrpc_core::TransportError;
use thiserror::Error;

/// Errors returned by subscribe calls or delivered on a subscription's
/// error channel.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Bad caller input, detected before any I/O.
    #[error("invalid subscription request: {0}")]
    Validation(String),

    /// Sending or awaiting a request failed; retrying the whole subscribe
    /// call may succeed.
    #[error(transparent)]
    Transport(TransportError),

    /// Malformed or uncorrelated acknowledgement or notification.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A notification payload could not be decoded into the expected type.
    #[error("failed to decode notification: {0}")]
    Decode(#[from] serde_json::Error),

    /// The shared connection closed. Terminal for every open subscription.
    #[error("connection closed")]
    ConnectionClosed,

    /// The subscription was cancelled by the caller and has been drained.
    #[error("subscription was unsubscribed")]
    Unsubscribed,
}

impl SubscriptionError {
    /// Returns `true` if no further results will be delivered after this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Unsubscribed)
    }
}

impl From<TransportError> for SubscriptionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::ConnectionClosed => Self::ConnectionClosed,
            other => Self::Transport(other),
        }
    }
}
