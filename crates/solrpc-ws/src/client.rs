//! WebSocket JSON-RPC client: one connection, one background task, one
//! [`Multiplexer`] routing everything that arrives on it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use solrpc_core::{JsonRpcRequest, JsonRpcResponse, RpcTransport, TransportError};

use crate::config::WsClientConfig;
use crate::error::SubscriptionError;
use crate::multiplexer::Multiplexer;
use crate::sink::FrameSink;
use crate::syndica::{SyndicaTransactionParams, SyndicaTransactionSubscription};
use crate::transaction::{
    TransactionSubscribeFilter, TransactionSubscribeOpts, TransactionSubscription,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send {
        frame: String,
        done: oneshot::Sender<Result<(), TransportError>>,
    },
    Close,
}

/// [`FrameSink`] that hands frames to the background task.
struct CommandSink {
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
}

#[async_trait]
impl FrameSink for CommandSink {
    async fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        let (done, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send { frame, done })
            .map_err(|_| TransportError::ConnectionClosed)?;
        rx.await.map_err(|_| TransportError::ConnectionClosed)?
    }

    async fn close(&self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

/// WebSocket JSON-RPC client.
///
/// Owns a background task that reads the socket and feeds every frame to
/// the multiplexer. There is no reconnect: once the connection drops, every
/// open subscription sees `ConnectionClosed` and a new client is needed.
pub struct WsRpcClient {
    url: String,
    mux: Multiplexer,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
}

impl WsRpcClient {
    /// Connect to `url` and start the background task.
    pub async fn connect(
        url: impl Into<String>,
        config: WsClientConfig,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        info!(url = %url, "connecting via WebSocket");

        let ws = match tokio::time::timeout(
            config.connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
            Err(_) => {
                return Err(TransportError::Timeout {
                    ms: config.connect_timeout.as_millis() as u64,
                })
            }
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let sink = Arc::new(CommandSink {
            cmd_tx: cmd_tx.clone(),
        });
        let mux = Multiplexer::new(sink, &config);

        tokio::spawn(ws_task(ws, cmd_rx, mux.clone(), url.clone()));
        info!(url = %url, "WebSocket connected");

        Ok(Self { url, mux, cmd_tx })
    }

    /// The multiplexer for this connection, for custom subscriptions.
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.mux
    }

    pub async fn transaction_subscribe(
        &self,
        filter: &TransactionSubscribeFilter,
        opts: Option<&TransactionSubscribeOpts>,
    ) -> Result<TransactionSubscription, SubscriptionError> {
        self.mux.transaction_subscribe(filter, opts).await
    }

    pub async fn syndica_transaction_subscribe(
        &self,
        params: Option<&SyndicaTransactionParams>,
    ) -> Result<SyndicaTransactionSubscription, SubscriptionError> {
        self.mux.syndica_transaction_subscribe(params).await
    }

    pub fn is_closed(&self) -> bool {
        self.mux.is_closed()
    }

    /// Close the connection. Open subscriptions receive `ConnectionClosed`.
    pub async fn close(&self) {
        self.mux.close().await;
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        self.mux.call(req).await
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    ws: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    mux: Multiplexer,
    url: String,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    Some(WsCommand::Send { frame, done }) => {
                        let sent = sink
                            .send(Message::Text(frame.into()))
                            .await
                            .map_err(|e| TransportError::WebSocket(e.to_string()));
                        let failed = sent.is_err();
                        let _ = done.send(sent);
                        if failed {
                            break;
                        }
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "WS receive error");
                        break;
                    }
                    Some(Ok(Message::Text(text))) => mux.handle_frame(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => mux.handle_frame(text),
                        Err(_) => debug!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
                    },
                    Some(Ok(Message::Ping(payload))) => {
                        if sink.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "close frame received");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!(url = %url, "WebSocket disconnected");
    mux.on_closed();
}
