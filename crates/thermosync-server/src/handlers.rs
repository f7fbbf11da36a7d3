//! HTTP routes for the Thermosync server.
//!
//! `/ws` upgrades to a websocket and hands the socket to the hub; `/health`
//! reports liveness and the current connection count.

use crate::config::Config;
use crate::metrics;
use anyhow::{Context, Result};
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thermosync_core::Hub;
use thermosync_transport::axum_ws;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The connection hub.
    pub hub: Hub,
    /// Server configuration.
    pub config: Config,
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("Thermosync server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    let (hub, dispatcher) = Hub::start(config.hub_config());
    let state = Arc::new(AppState {
        hub: hub.clone(),
        config,
    });

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(hub))
    .await
    .context("Server error")?;

    dispatcher.await.context("Dispatcher task failed")?;
    info!("Server stopped");

    Ok(())
}

/// Resolves on Ctrl-C, after the hub has closed every connection.
async fn shutdown_signal(hub: Hub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }

    info!("Shutdown signal received");
    hub.shutdown().await;
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.hub.connection_count(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let hub = &state.hub;
    if hub.is_shutting_down() || hub.connection_count() >= hub.config().max_connections {
        metrics::record_upgrade("refused");
        debug!(remote = %addr, "Refusing upgrade");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let max_message_size = state.config.limits.max_message_size;
    ws.max_message_size(max_message_size)
        .max_frame_size(max_message_size)
        .on_upgrade(move |socket| async move {
            let connection = axum_ws::from_socket(socket, Some(addr));
            match state.hub.accept(connection).await {
                Ok(_) => metrics::record_upgrade("accepted"),
                Err(e) => {
                    metrics::record_upgrade("rejected");
                    warn!(remote = %addr, error = %e, "Hub rejected connection");
                }
            }
        })
}
