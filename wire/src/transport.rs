//! Transport abstraction — an ordered duplex of text and binary frames.
//!
//! The protocol engine is transport-generic: endpoints consume any
//! [`Transport`] implementation. Any transport error is terminal for the
//! session; the engine performs no retries and no resumption. The in-memory
//! [`duplex`] pair backs tests and same-process endpoints; WebSocket adapters
//! live in the `ws` crate.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::codec::FramePayload;

/// I/O failure on the underlying channel. Always terminal for the session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer endpoint or the channel has gone away.
    #[error("transport closed")]
    Closed,
    /// The underlying I/O layer reported a failure.
    #[error("transport I/O failed: {0}")]
    Io(String),
}

/// A reliable, ordered, bidirectional frame duplex.
///
/// Implementations must preserve frame boundaries and per-direction emission
/// order. `close` is idempotent; after it, `recv` yields end-of-stream.
#[async_trait]
pub trait Transport: Send {
    /// Send one text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send one binary frame.
    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Receive the next frame, or `None` at end-of-stream.
    async fn recv(&mut self) -> Result<Option<FramePayload>, TransportError>;

    /// Close the duplex. Idempotent.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Send an already-encoded frame of either kind.
    async fn send_frame(&mut self, frame: FramePayload) -> Result<(), TransportError> {
        match frame {
            FramePayload::Text(text) => self.send_text(text).await,
            FramePayload::Binary(bytes) => self.send_binary(bytes).await,
        }
    }
}

// =============================================================================
// IN-MEMORY DUPLEX
// =============================================================================

/// One side of an in-memory frame duplex. Created in cross-wired pairs by
/// [`duplex`].
pub struct DuplexTransport {
    tx: Option<mpsc::Sender<FramePayload>>,
    rx: mpsc::Receiver<FramePayload>,
    closed: bool,
}

/// Create a cross-wired pair of in-memory transports with the given
/// per-direction frame capacity. Sends suspend once the peer's buffer is
/// full, which is the only backpressure the engine relies on.
#[must_use]
pub fn duplex(capacity: usize) -> (DuplexTransport, DuplexTransport) {
    let (left_tx, left_rx) = mpsc::channel(capacity);
    let (right_tx, right_rx) = mpsc::channel(capacity);
    (
        DuplexTransport { tx: Some(left_tx), rx: right_rx, closed: false },
        DuplexTransport { tx: Some(right_tx), rx: left_rx, closed: false },
    )
}

impl DuplexTransport {
    async fn send(&mut self, frame: FramePayload) -> Result<(), TransportError> {
        let Some(tx) = &self.tx else {
            return Err(TransportError::Closed);
        };
        tx.send(frame).await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for DuplexTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.send(FramePayload::Text(text)).await
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.send(FramePayload::Binary(bytes)).await
    }

    async fn recv(&mut self) -> Result<Option<FramePayload>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.tx = None;
        self.rx.close();
        Ok(())
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
