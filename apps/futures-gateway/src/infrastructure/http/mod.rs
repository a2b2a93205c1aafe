//! Client HTTP API
//!
//! One axum server carries everything dashboard clients talk to:
//!
//! - `/live/*`: live trade WebSocket, last-trade snapshots, feed control
//!   and status, the master trade stream, and symbology (see [`live`])
//! - `/udf/*`: TradingView UDF endpoints backed by the bar cache
//!   (see [`udf`])

pub mod live;
pub mod udf;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{HistoryService, LiveMultiplexer, MasterStream};
use crate::infrastructure::upstream::FeedState;

/// State shared by every client handler.
#[derive(Clone)]
pub struct AppState {
    /// Live fan-out.
    pub multiplexer: Arc<LiveMultiplexer>,
    /// Historical bars.
    pub history: Arc<HistoryService>,
    /// Upstream connection status.
    pub feed_state: Arc<FeedState>,
    /// Every upstream trade, for `/live/master_stream`.
    pub master_stream: Arc<MasterStream>,
}

/// Build the client API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/live", live::routes())
        .nest("/udf", udf::routes())
        .with_state(state)
}

/// JSON error body for REST endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Client API server.
pub struct HttpServer {
    port: u16,
    state: AppState,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new server.
    #[must_use]
    pub const fn new(port: u16, state: AppState, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails or the server stops abnormally.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Client API listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Client API stopped");
        Ok(())
    }
}

/// Client API server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}
