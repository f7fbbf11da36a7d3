//! # thermosync-transport
//!
//! Transport abstraction layer for the Thermosync hub.
//!
//! A [`Connection`] is an upgraded, message-oriented channel to one client,
//! split into two halves:
//!
//! - [`FrameStream`] - the reader half, owned by the connection's handler
//! - [`FrameSink`] - the writer half, used only by the dispatcher
//!
//! Implementations:
//!
//! - **axum** - connections upgraded by an axum `WebSocketUpgrade`
//! - **websocket** - a standalone tokio-tungstenite listener
//! - **memory** - in-process connections for tests and benchmarks
//!
//! ```rust,ignore
//! use thermosync_transport::{Transport, WebSocketTransport};
//!
//! let transport = WebSocketTransport::bind("127.0.0.1:3000".parse()?).await?;
//! while let Ok(conn) = transport.accept().await {
//!     hub.accept(conn).await?;
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "axum")]
pub mod axum_ws;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use traits::{Connection, ConnectionId, FrameSink, FrameStream, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WebSocketTransport;
