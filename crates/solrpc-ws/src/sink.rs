//! Outbound half of the shared connection.
//!
//! The multiplexer never touches the socket directly: it writes frames
//! through a [`FrameSink`] and is fed inbound frames by whoever owns the
//! reading half (see [`Multiplexer::handle_frame`] and
//! [`Multiplexer::on_closed`]).
//!
//! [`Multiplexer::handle_frame`]: crate::Multiplexer::handle_frame
//! [`Multiplexer::on_closed`]: crate::Multiplexer::on_closed

use async_trait::async_trait;
use solrpc_core::TransportError;

/// Writes text frames to a persistent connection.
#[async_trait]
pub trait FrameSink: Send + Sync + 'static {
    /// Queue one text frame for sending.
    async fn send_frame(&self, frame: String) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn close(&self);
}
