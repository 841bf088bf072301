//! Connecting-side WebSocket transport backed by `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use wire::codec::FramePayload;
use wire::transport::{Transport, TransportError};

/// A [`Transport`] over an outbound WebSocket connection.
pub struct WsClientTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

/// Connect to a WebSocket endpoint (`ws://` or `wss://`).
///
/// # Errors
///
/// Returns [`TransportError::Io`] if the TCP connection or WebSocket
/// handshake fails.
pub async fn connect(url: &str) -> Result<WsClientTransport, TransportError> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(WsClientTransport { stream, closed: false })
}

fn send_error(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Io(other.to_string()),
    }
}

#[async_trait]
impl Transport for WsClientTransport {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream.send(Message::Text(text.into())).await.map_err(send_error)
    }

    async fn send_binary(&mut self, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.stream.send(Message::Binary(bytes.into())).await.map_err(send_error)
    }

    async fn recv(&mut self) -> Result<Option<FramePayload>, TransportError> {
        if self.closed {
            return Ok(None);
        }
        while let Some(message) = self.stream.next().await {
            match message.map_err(send_error)? {
                Message::Text(text) => {
                    return Ok(Some(FramePayload::Text(text.as_str().to_owned())));
                }
                Message::Binary(bytes) => return Ok(Some(FramePayload::Binary(bytes.to_vec()))),
                Message::Close(_) => return Ok(None),
                // Pings are answered by tungstenite during the read loop;
                // pongs and raw frames carry no protocol payload.
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
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "ws: client close handshake failed");
        }
        Ok(())
    }
}
