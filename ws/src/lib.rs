//! WebSocket transport adapters for the Parley chat protocol.
//!
//! The protocol engine is transport-generic; this crate supplies the one
//! reference transport: WebSocket, whose text/binary message split maps
//! one-to-one onto the protocol's frame kinds. The connecting side wraps a
//! `tokio-tungstenite` stream, the accepting side wraps an `axum` WebSocket
//! obtained inside an `on_upgrade` handler.

mod client;
mod server;

pub use client::{WsClientTransport, connect};
pub use server::WsServerTransport;
