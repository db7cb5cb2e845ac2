//! Typed subscription handles.
//!
//! The multiplexer routes untyped JSON payloads. Each subscription's decoder
//! turns a payload into `T` exactly once, inside the route, and the caller
//! receives statically typed values through [`Subscription<T>`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::SubscriptionError;
use crate::multiplexer::Multiplexer;

/// A subscription id assigned by the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionId {
    Number(u64),
    String(String),
}

impl SubscriptionId {
    /// Parse an id from a JSON number or string.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Number),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }

    /// The id as it appears on the wire.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Number(n) => Value::from(*n),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<u64> for SubscriptionId {
    fn from(n: u64) -> Self {
        Self::Number(n)
    }
}

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// Lifecycle of a subscription handle.
///
/// ```text
/// Active ──unsubscribe──▶ Unsubscribing ──▶ Unsubscribed
///    └──────ConnectionClosed observed──────▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Unsubscribing,
    Unsubscribed,
    /// Terminal; a new subscription is needed after the connection recovers.
    Closed,
}

/// Routing record held by the multiplexer: decodes a payload and pushes
/// the outcome into the handle's channels.
pub(crate) trait Route: Send + Sync {
    /// Decode and deliver one payload. Returns `false` once the handle's
    /// receivers are gone.
    fn deliver(&self, payload: Value) -> bool;

    /// Deliver an error. Returns `false` once the handle's receivers are gone.
    fn fail(&self, err: SubscriptionError) -> bool;
}

struct TypedRoute<T, F> {
    decode: F,
    items: mpsc::UnboundedSender<T>,
    errors: mpsc::UnboundedSender<SubscriptionError>,
}

impl<T, F> Route for TypedRoute<T, F>
where
    T: Send + 'static,
    F: Fn(Value) -> Result<T, SubscriptionError> + Send + Sync + 'static,
{
    fn deliver(&self, payload: Value) -> bool {
        match (self.decode)(payload) {
            Ok(item) => self.items.send(item).is_ok(),
            Err(err) => self.errors.send(err).is_ok(),
        }
    }

    fn fail(&self, err: SubscriptionError) -> bool {
        self.errors.send(err).is_ok()
    }
}

/// The receiving ends of a route, before an id is known.
pub(crate) struct Receivers<T> {
    pub(crate) items: mpsc::UnboundedReceiver<T>,
    pub(crate) errors: mpsc::UnboundedReceiver<SubscriptionError>,
}

/// Create a route around `decode` together with the channels it feeds.
pub(crate) fn route<T, F>(decode: F) -> (Arc<dyn Route>, Receivers<T>)
where
    T: Send + 'static,
    F: Fn(Value) -> Result<T, SubscriptionError> + Send + Sync + 'static,
{
    let (items_tx, items) = mpsc::unbounded_channel();
    let (errors_tx, errors) = mpsc::unbounded_channel();
    let route = TypedRoute {
        decode,
        items: items_tx,
        errors: errors_tx,
    };
    (Arc::new(route), Receivers { items, errors })
}

/// Decoder for payloads that deserialize directly into `T`.
pub fn json_decoder<T>(payload: Value) -> Result<T, SubscriptionError>
where
    T: serde::de::DeserializeOwned,
{
    Ok(serde_json::from_value(payload)?)
}

/// A single open subscription yielding values of type `T`.
///
/// Results and errors arrive on separate channels; [`recv`](Self::recv)
/// waits on both, [`errors`](Self::errors) exposes the error channel for
/// `tokio::select!`, and the handle is also a [`Stream`] of
/// `Result<T, SubscriptionError>`.
///
/// Dropping an active handle removes its route and sends a best-effort
/// unsubscribe request.
pub struct Subscription<T> {
    dialect: &'static str,
    id: SubscriptionId,
    mux: Multiplexer,
    items: mpsc::UnboundedReceiver<T>,
    errors: mpsc::UnboundedReceiver<SubscriptionError>,
    state: SubscriptionState,
}

enum Next<T> {
    Item(T),
    Error(SubscriptionError),
    Drained,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        dialect: &'static str,
        id: SubscriptionId,
        mux: Multiplexer,
        receivers: Receivers<T>,
    ) -> Self {
        Self {
            dialect,
            id,
            mux,
            items: receivers.items,
            errors: receivers.errors,
            state: SubscriptionState::Active,
        }
    }

    /// The remote-assigned subscription id.
    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    /// Name of the dialect the subscription was opened with.
    pub fn dialect(&self) -> &'static str {
        self.dialect
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Wait for the next result or error, whichever is available first.
    ///
    /// Queued results always win over queued errors. A closed connection
    /// therefore surfaces only after every earlier notification, but a
    /// decode error can also be returned after results from notifications
    /// that arrived later than the one that failed to decode.
    /// Once the handle is closed or unsubscribed and drained, this keeps
    /// returning `ConnectionClosed` or `Unsubscribed`.
    pub async fn recv(&mut self) -> Result<T, SubscriptionError> {
        if self.state == SubscriptionState::Closed {
            return Err(SubscriptionError::ConnectionClosed);
        }
        let next = tokio::select! {
            biased;
            Some(item) = self.items.recv() => Next::Item(item),
            Some(err) = self.errors.recv() => Next::Error(err),
            else => Next::Drained,
        };
        match next {
            Next::Item(item) => Ok(item),
            Next::Error(err) => Err(self.observe(err)),
            Next::Drained => Err(self.drained_error()),
        }
    }

    /// Wait for the next decoded result. This is the next element of the
    /// same sequence `recv` and the `Stream` read from.
    ///
    /// Returns `None` once the result channel is closed. Errors stay on
    /// the error channel.
    pub async fn response(&mut self) -> Option<T> {
        self.items.recv().await
    }

    /// The error channel, for waiting on it alongside other sources.
    pub fn errors(&mut self) -> &mut mpsc::UnboundedReceiver<SubscriptionError> {
        &mut self.errors
    }

    /// Cancel the subscription. Only the first call sends anything;
    /// later calls (and calls after the connection closed) are no-ops.
    ///
    /// Results already queued stay readable until drained.
    pub async fn unsubscribe(&mut self) -> Result<(), SubscriptionError> {
        if self.state != SubscriptionState::Active {
            return Ok(());
        }
        self.state = SubscriptionState::Unsubscribing;
        let result = self.mux.unsubscribe(self.dialect, &self.id).await;
        self.state = SubscriptionState::Unsubscribed;
        result
    }

    fn observe(&mut self, err: SubscriptionError) -> SubscriptionError {
        if matches!(err, SubscriptionError::ConnectionClosed) {
            self.state = SubscriptionState::Closed;
        }
        err
    }

    fn drained_error(&self) -> SubscriptionError {
        match self.state {
            SubscriptionState::Closed => SubscriptionError::ConnectionClosed,
            _ => SubscriptionError::Unsubscribed,
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = Result<T, SubscriptionError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.state == SubscriptionState::Closed {
            return Poll::Ready(None);
        }

        let items_done = match this.items.poll_recv(cx) {
            Poll::Ready(Some(item)) => return Poll::Ready(Some(Ok(item))),
            Poll::Ready(None) => true,
            Poll::Pending => false,
        };

        match this.errors.poll_recv(cx) {
            Poll::Ready(Some(err)) => Poll::Ready(Some(Err(this.observe(err)))),
            Poll::Ready(None) if items_done => Poll::Ready(None),
            _ => Poll::Pending,
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SubscriptionState::Active | SubscriptionState::Unsubscribing
        ) {
            self.mux.detach(self.dialect, &self.id);
        }
    }
}

impl<T> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("dialect", &self.dialect)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("item_type", &std::any::type_name::<T>())
            .finish()
    }
}
