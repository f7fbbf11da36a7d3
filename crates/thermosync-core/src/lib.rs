//! # thermosync-core
//!
//! Connection hub and broadcast engine for Thermosync.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Registry** - The set of live connections eligible for broadcasts
//! - **Broadcast** - Bounded, ordered channel from handlers to the dispatcher
//! - **Handler** - Per-connection read loop
//! - **Dispatcher** - Single fan-out loop writing every message to every connection
//! - **Hub** - Owns all of the above; accepts connections and shuts down
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Handler(s) │────▶│  Broadcast  │────▶│ Dispatcher  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲                                       │
//!        │            ┌─────────────┐            │
//!   connections ─────▶│  Registry   │◀───────────┘
//!                     └─────────────┘   snapshot + write
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use thermosync_core::{Hub, HubConfig};
//! use thermosync_transport::{Transport, WebSocketTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (hub, dispatcher) = Hub::start(HubConfig::default());
//! let transport = WebSocketTransport::bind("127.0.0.1:3000".parse()?).await?;
//!
//! while let Ok(connection) = transport.accept().await {
//!     if let Err(e) = hub.accept(connection).await {
//!         eprintln!("rejected: {e}");
//!     }
//! }
//!
//! hub.shutdown().await;
//! dispatcher.await?;
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod hub;
pub mod message;
pub mod metrics;
pub mod registry;
pub mod stats;

pub use broadcast::{BroadcastReceiver, BroadcastSender, SubmitError};
pub use connection::ConnectionHandle;
pub use dispatcher::{DispatchReport, Dispatcher};
pub use handler::HandlerExit;
pub use hub::{Hub, HubConfig, HubError};
pub use message::{Message, MessageId};
pub use registry::Registry;
pub use stats::{HubStats, HubStatsSnapshot};
