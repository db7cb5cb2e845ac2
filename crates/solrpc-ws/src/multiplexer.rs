//! Subscription multiplexer.
//!
//! One [`Multiplexer`] per connection. It owns the map from subscription id
//! to route, correlates responses with in-flight requests, and fans inbound
//! notifications out to the owning subscription.
//!
//! All shared state sits behind a single mutex that is never held across an
//! `.await`. Payload decoding and channel sends happen after the lock is
//! released, on a cloned route.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use solrpc_core::{JsonRpcRequest, JsonRpcResponse, RpcId, TransportError};

use crate::config::WsClientConfig;
use crate::dialect::{Dialect, JsonRpcDialect, SyndicaDialect};
use crate::error::SubscriptionError;
use crate::sink::FrameSink;
use crate::subscription::{self, Route, Subscription, SubscriptionId};

/// A request waiting for its correlated response.
enum Pending {
    Subscribe {
        dialect: Arc<dyn Dialect>,
        route: Arc<dyn Route>,
        unsubscribe_method: String,
        done: oneshot::Sender<Result<SubscriptionId, SubscriptionError>>,
    },
    Call {
        done: oneshot::Sender<Result<JsonRpcResponse, TransportError>>,
    },
}

/// Subscription ids are only unique within a dialect.
type RouteKey = (&'static str, SubscriptionId);

/// An open subscription as seen by the router.
struct Registration {
    dialect: Arc<dyn Dialect>,
    route: Arc<dyn Route>,
    unsubscribe_method: String,
}

#[derive(Default)]
struct MuxState {
    subscriptions: HashMap<RouteKey, Registration>,
    pending: HashMap<u64, Pending>,
    /// Dialects consulted, in order, when a notification arrives.
    dialects: Vec<Arc<dyn Dialect>>,
    closed: bool,
}

struct Inner {
    sink: Arc<dyn FrameSink>,
    state: Mutex<MuxState>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

/// Routes subscriptions and requests over one shared connection.
///
/// Cheap to clone; every clone refers to the same connection state.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    /// Create a multiplexer writing through `sink`, with the JSON-RPC and
    /// Syndica dialects registered.
    pub fn new(sink: Arc<dyn FrameSink>, config: &WsClientConfig) -> Self {
        let state = MuxState {
            dialects: vec![Arc::new(JsonRpcDialect), Arc::new(SyndicaDialect)],
            ..MuxState::default()
        };
        Self {
            inner: Arc::new(Inner {
                sink,
                state: Mutex::new(state),
                next_id: AtomicU64::new(1),
                request_timeout: config.request_timeout,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MuxState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_request_id(&self) -> u64 {
        self.inner.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Number of open subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state().subscriptions.len()
    }

    /// Number of requests still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Returns `true` once the connection has closed.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    // ─── Subscribe ───────────────────────────────────────────────────────

    /// Open a subscription using Solana's JSON-RPC pub/sub dialect.
    pub async fn subscribe<T, F>(
        &self,
        params: Vec<Value>,
        subscribe_method: &str,
        unsubscribe_method: &str,
        decode: F,
    ) -> Result<Subscription<T>, SubscriptionError>
    where
        T: Send + 'static,
        F: Fn(Value) -> Result<T, SubscriptionError> + Send + Sync + 'static,
    {
        self.subscribe_with(
            Arc::new(JsonRpcDialect),
            Value::Array(params),
            subscribe_method,
            unsubscribe_method,
            decode,
        )
        .await
    }

    /// Open a subscription using the Syndica ChainStream dialect.
    pub async fn subscribe_provider<T, F>(
        &self,
        params: Value,
        subscribe_method: &str,
        unsubscribe_method: &str,
        decode: F,
    ) -> Result<Subscription<T>, SubscriptionError>
    where
        T: Send + 'static,
        F: Fn(Value) -> Result<T, SubscriptionError> + Send + Sync + 'static,
    {
        self.subscribe_with(
            Arc::new(SyndicaDialect),
            params,
            subscribe_method,
            unsubscribe_method,
            decode,
        )
        .await
    }

    /// Open a subscription in any dialect. A dialect not seen before is
    /// added to the notification routing list.
    ///
    /// The route is registered by the reader as soon as the acknowledgement
    /// arrives, so notifications that immediately follow it are not lost.
    pub async fn subscribe_with<T, F>(
        &self,
        dialect: Arc<dyn Dialect>,
        params: Value,
        subscribe_method: &str,
        unsubscribe_method: &str,
        decode: F,
    ) -> Result<Subscription<T>, SubscriptionError>
    where
        T: Send + 'static,
        F: Fn(Value) -> Result<T, SubscriptionError> + Send + Sync + 'static,
    {
        let (route, receivers) = subscription::route(decode);
        let id = self.next_request_id();
        let (done_tx, done_rx) = oneshot::channel();

        {
            let mut state = self.state();
            if state.closed {
                return Err(SubscriptionError::ConnectionClosed);
            }
            if !state.dialects.iter().any(|d| d.name() == dialect.name()) {
                state.dialects.push(Arc::clone(&dialect));
            }
            state.pending.insert(
                id,
                Pending::Subscribe {
                    dialect: Arc::clone(&dialect),
                    route,
                    unsubscribe_method: unsubscribe_method.to_string(),
                    done: done_tx,
                },
            );
        }

        let req = dialect.subscribe_request(id, subscribe_method, params);
        debug!(
            dialect = dialect.name(),
            method = subscribe_method,
            request_id = id,
            "subscribing"
        );
        self.send_or_forget(id, &req).await?;

        let sub_id = self.await_pending(id, done_rx).await??;
        Ok(Subscription::new(dialect.name(), sub_id, self.clone(), receivers))
    }

    // ─── Unsubscribe ─────────────────────────────────────────────────────

    /// Cancel the subscription `id` of the dialect named `dialect`. The
    /// route is removed before the request is sent, so once this returns no
    /// further results reach the handle; an id that is not registered is a
    /// no-op and sends nothing.
    pub async fn unsubscribe(
        &self,
        dialect: &'static str,
        id: &SubscriptionId,
    ) -> Result<(), SubscriptionError> {
        let removed = self.state().subscriptions.remove(&(dialect, id.clone()));
        let Some(registration) = removed else {
            debug!(dialect, subscription = %id, "unsubscribe for unknown subscription ignored");
            return Ok(());
        };
        let Registration {
            dialect,
            unsubscribe_method,
            ..
        } = registration;
        self.send_unsubscribe(dialect, &unsubscribe_method, id).await
    }

    /// Remove a route without waiting for the remote side. Used when a
    /// handle is dropped; the unsubscribe request is sent from a spawned
    /// task if a Tokio runtime is available.
    pub(crate) fn detach(&self, dialect: &'static str, id: &SubscriptionId) {
        let removed = self.state().subscriptions.remove(&(dialect, id.clone()));
        let Some(Registration {
            dialect,
            unsubscribe_method,
            ..
        }) = removed
        else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(subscription = %id, "no runtime, unsubscribe request not sent");
            return;
        };
        let mux = self.clone();
        let id = id.clone();
        runtime.spawn(async move {
            if let Err(e) = mux.send_unsubscribe(dialect, &unsubscribe_method, &id).await {
                debug!(subscription = %id, error = %e, "background unsubscribe failed");
            }
        });
    }

    async fn send_unsubscribe(
        &self,
        dialect: Arc<dyn Dialect>,
        method: &str,
        id: &SubscriptionId,
    ) -> Result<(), SubscriptionError> {
        let request_id = self.next_request_id();
        let req = dialect.unsubscribe_request(request_id, method, id);
        debug!(dialect = dialect.name(), subscription = %id, method, "unsubscribing");

        let resp = self.round_trip(request_id, &req).await?;
        match resp.into_result() {
            Ok(Value::Bool(true)) => Ok(()),
            Ok(other) => {
                warn!(subscription = %id, result = %other, "unsubscribe not confirmed");
                Ok(())
            }
            Err(e) => Err(SubscriptionError::Transport(TransportError::Rpc(e))),
        }
    }

    // ─── Plain requests ──────────────────────────────────────────────────

    /// Send a request over the shared connection and wait for its response.
    ///
    /// The request id is replaced by an internal one for correlation and
    /// restored on the returned response.
    pub async fn call(&self, mut req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_request_id();
        let caller_id = std::mem::replace(&mut req.id, RpcId::Number(id));
        let mut resp = self.round_trip(id, &req).await?;
        resp.id = caller_id;
        Ok(resp)
    }

    async fn round_trip(
        &self,
        id: u64,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, TransportError> {
        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut state = self.state();
            if state.closed {
                return Err(TransportError::ConnectionClosed);
            }
            state.pending.insert(id, Pending::Call { done: done_tx });
        }
        let _forget = ForgetOnDrop { mux: self, id };
        self.send_or_forget(id, req).await?;
        self.await_pending(id, done_rx).await?
    }

    /// Write a request frame; on failure, forget the pending entry.
    async fn send_or_forget(&self, id: u64, req: &JsonRpcRequest) -> Result<(), TransportError> {
        let sent = match serde_json::to_string(req) {
            Ok(frame) => self.inner.sink.send_frame(frame).await,
            Err(e) => Err(TransportError::Deserialization(e)),
        };
        if sent.is_err() {
            self.state().pending.remove(&id);
        }
        sent
    }

    async fn await_pending<R>(
        &self,
        id: u64,
        mut done: oneshot::Receiver<R>,
    ) -> Result<R, TransportError> {
        let timeout = self.inner.request_timeout;
        match tokio::time::timeout(timeout, &mut done).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(TransportError::ConnectionClosed),
            Err(_) => {
                let forgotten = self.state().pending.remove(&id).is_some();
                if forgotten {
                    let ms = timeout.as_millis() as u64;
                    warn!(request_id = id, timeout_ms = ms, "request timed out");
                    return Err(TransportError::Timeout { ms });
                }
                // The response was taken by the reader just as we timed out.
                done.await.map_err(|_| TransportError::ConnectionClosed)
            }
        }
    }

    // ─── Inbound ─────────────────────────────────────────────────────────

    /// Process one inbound text frame. Called by the connection's single
    /// reader, in receipt order.
    pub fn handle_frame(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "dropping non-JSON frame");
                return;
            }
        };

        let is_response = frame.get("method").is_none()
            && frame.get("id").is_some()
            && (frame.get("result").is_some() || frame.get("error").is_some());

        if is_response {
            self.handle_response(frame);
        } else if frame.get("method").is_some() {
            self.handle_notification(&frame);
        } else {
            debug!("dropping unrecognised frame");
        }
    }

    fn handle_response(&self, frame: Value) {
        let resp: JsonRpcResponse = match serde_json::from_value(frame) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed response frame");
                return;
            }
        };
        let Some(request_id) = resp.id.as_u64() else {
            debug!(id = %resp.id, "dropping response with foreign id");
            return;
        };

        let mut state = self.state();
        let Some(pending) = state.pending.remove(&request_id) else {
            debug!(request_id, "dropping response for unknown request");
            return;
        };

        match pending {
            Pending::Call { done } => {
                let _ = done.send(Ok(resp));
            }
            Pending::Subscribe {
                dialect,
                route,
                unsubscribe_method,
                done,
            } => {
                let dialect_name = dialect.name();
                let outcome = register(&mut state, resp, dialect, route, unsubscribe_method);
                if let Err(Ok(orphan)) = done.send(outcome) {
                    // The subscriber gave up before the acknowledgement arrived.
                    drop(state);
                    debug!(subscription = %orphan, "subscriber gone, detaching");
                    self.detach(dialect_name, &orphan);
                }
            }
        }
    }

    fn handle_notification(&self, frame: &Value) {
        let target = {
            let state = self.state();
            state.dialects.iter().find_map(|dialect| {
                let note = dialect.parse_notification(frame)?;
                let key = (dialect.name(), note.subscription.clone());
                let route = Arc::clone(&state.subscriptions.get(&key)?.route);
                Some((dialect.name(), note, route))
            })
        };

        let Some((dialect, note, route)) = target else {
            let method = frame
                .get("method")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            debug!(method, "dropping notification for unknown subscription");
            return;
        };

        let alive = match note.result {
            Some(payload) => route.deliver(payload),
            None => route.fail(SubscriptionError::Protocol(format!(
                "notification for subscription {} carries no result",
                note.subscription
            ))),
        };
        if !alive {
            debug!(dialect, subscription = %note.subscription, "receiver dropped, detaching");
            self.detach(dialect, &note.subscription);
        }
    }

    // ─── Closure ─────────────────────────────────────────────────────────

    /// Mark the connection closed. Every open subscription receives
    /// `ConnectionClosed` and is removed; every pending request fails.
    /// Idempotent.
    pub fn on_closed(&self) {
        let (subscriptions, pending) = {
            let mut state = self.state();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                std::mem::take(&mut state.subscriptions),
                std::mem::take(&mut state.pending),
            )
        };

        info!(
            subscriptions = subscriptions.len(),
            pending = pending.len(),
            "connection closed"
        );

        for (_, registration) in subscriptions {
            registration.route.fail(SubscriptionError::ConnectionClosed);
        }
        for (_, pending) in pending {
            match pending {
                Pending::Call { done } => {
                    let _ = done.send(Err(TransportError::ConnectionClosed));
                }
                Pending::Subscribe { done, .. } => {
                    let _ = done.send(Err(SubscriptionError::ConnectionClosed));
                }
            }
        }
    }

    /// Close the underlying connection and fail everything still open.
    pub async fn close(&self) {
        self.inner.sink.close().await;
        self.on_closed();
    }
}

/// Turn a subscribe acknowledgement into a registered route.
fn register(
    state: &mut MuxState,
    resp: JsonRpcResponse,
    dialect: Arc<dyn Dialect>,
    route: Arc<dyn Route>,
    unsubscribe_method: String,
) -> Result<SubscriptionId, SubscriptionError> {
    let result = resp
        .into_result()
        .map_err(|e| SubscriptionError::Transport(TransportError::Rpc(e)))?;
    let id = dialect.subscription_id(&result).ok_or_else(|| {
        SubscriptionError::Protocol(format!(
            "{} acknowledgement carries no subscription id: {result}",
            dialect.name()
        ))
    })?;
    let key = (dialect.name(), id.clone());
    if state.subscriptions.contains_key(&key) {
        return Err(SubscriptionError::Protocol(format!(
            "{} subscription id {id} is already registered",
            dialect.name()
        )));
    }
    debug!(dialect = dialect.name(), subscription = %id, "subscription registered");
    state.subscriptions.insert(
        key,
        Registration {
            dialect,
            route,
            unsubscribe_method,
        },
    );
    Ok(id)
}

/// Removes a pending call when its future is dropped, whether it completed,
/// timed out or was cancelled by the caller.
struct ForgetOnDrop<'a> {
    mux: &'a Multiplexer,
    id: u64,
}

impl Drop for ForgetOnDrop<'_> {
    fn drop(&mut self) {
        self.mux.state().pending.remove(&self.id);
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("Multiplexer")
            .field("subscriptions", &state.subscriptions.len())
            .field("pending", &state.pending.len())
            .field("closed", &state.closed)
            .finish()
    }
}
