//! WebSocket client configuration.

use std::time::Duration;

/// Configuration for the WebSocket client and its multiplexer.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// How long to wait for the websocket handshake.
    pub connect_timeout: Duration,
    /// How long to wait for a request's correlated response, including
    /// subscribe and unsubscribe acknowledgements.
    pub request_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}
