//! Accepting-side WebSocket transport over an `axum` upgraded socket.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use tracing::debug;

use wire::codec::FramePayload;
use wire::transport::{Transport, TransportError};

/// A [`Transport`] over an accepted WebSocket connection. Wrap the socket
/// handed to an `axum` `ws.on_upgrade` handler and feed it to a server
/// driver.
pub struct WsServerTransport {
    socket: WebSocket,
    closed: bool,
}

impl WsServerTransport {
    #[must_use]
    pub fn new(socket: WebSocket) -> Self {
        Self { socket, closed: false }
    }
}

#[async_trait]
impl Transport for WsServerTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.socket
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.socket
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<FramePayload>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        while let Some(message) = self.socket.recv().await {
            match message.map_err(|e| TransportError::Io(e.to_string()))? {
                Message::Text(text) => {
                    return Ok(Some(FramePayload::Text(text.as_str().to_owned())));
                }
                Message::Binary(bytes) => return Ok(Some(FramePayload::Binary(bytes.to_vec()))),
                Message::Close(_) => return Ok(None),
                // Ping/pong is handled by axum underneath.
                _ => {}
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // The peer may already be gone; a failed close handshake is fine.
        if let Err(e) = self.socket.send(Message::Close(None)).await {
            debug!(error = %e, "ws: server close handshake failed");
        }
        Ok(())
    }
}
