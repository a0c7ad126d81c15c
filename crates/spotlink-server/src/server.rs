//! [`SpotlinkServer`] – axum router for the trip command endpoints.
//!
//! Listens on `0.0.0.0:9143` (configurable via [`SpotlinkServer::with_port`]).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header::{
    ACCEPT, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE, ORIGIN,
};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use spotlink_runtime::{CommandRelay, Coordinator, NewTripRequest, Session, StatusAggregator};
use spotlink_types::{RobotStatus, SpotError};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

/// Default TCP port for the command endpoints.
pub const DEFAULT_PORT: u16 = 9143;

const BODY_LIMIT: usize = 10 * 1024 * 1024;
const ALLOWED_HEADERS: &str = "Origin, X-Requested-With, Content-Type, Accept";

// ───────────────────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────────────────

/// Handles the router needs; all of them are shared with the coordinator.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<CommandRelay>,
    status: Arc<StatusAggregator>,
    session: Arc<Session>,
}

impl AppState {
    pub fn new(relay: Arc<CommandRelay>, status: Arc<StatusAggregator>, session: Arc<Session>) -> Self {
        Self {
            relay,
            status,
            session,
        }
    }

    pub fn from_coordinator(coordinator: &Coordinator) -> Self {
        Self::new(coordinator.relay(), coordinator.status(), coordinator.session())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    status: RobotStatus,
    active_trip: bool,
    logged_in: bool,
}

// ───────────────────────────────────────────────────────────────────────────
// Router
// ───────────────────────────────────────────────────────────────────────────

/// Build the command router with its CORS, body-limit and compression layers.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            ORIGIN,
            HeaderName::from_static("x-requested-with"),
            CONTENT_TYPE,
            ACCEPT,
        ]);

    Router::new()
        .route("/newTrip", post(new_trip))
        .route("/cancelledTrip", put(cancelled_trip))
        .route("/status", get(local_status))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        ))
        .layer(cors)
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// The raw body is parsed here rather than through the `Json` extractor so
/// every malformed request gets the same `500 {error}` reply.
async fn new_trip(State(state): State<AppState>, body: Bytes) -> Response {
    match NewTripRequest::from_json(&body).and_then(|request| state.relay.handle_new_trip(request)) {
        Ok(path) => (StatusCode::OK, Json(path)).into_response(),
        Err(e) => {
            warn!(error = %e, "rejected trip request");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn cancelled_trip(State(state): State<AppState>) -> Json<serde_json::Value> {
    let success = state.relay.handle_cancel_trip();
    Json(json!({ "success": success }))
}

async fn local_status(State(state): State<AppState>) -> Json<StatusView> {
    Json(StatusView {
        status: state.status.snapshot(),
        active_trip: state.status.trip_active(),
        logged_in: state.session.is_logged_in(),
    })
}

// ───────────────────────────────────────────────────────────────────────────
// SpotlinkServer
// ───────────────────────────────────────────────────────────────────────────

pub struct SpotlinkServer {
    state: AppState,
    port: u16,
}

impl SpotlinkServer {
    /// Create a server on the [`DEFAULT_PORT`].
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            port: DEFAULT_PORT,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until `shutdown` is cancelled; in-flight requests are drained.
    ///
    /// # Errors
    ///
    /// Returns [`SpotError::Transport`] if the listener cannot bind or the
    /// server fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), SpotError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SpotError::Transport(format!("bind error on {addr}: {e}")))?;

        info!(port = self.port, "command endpoint listening");

        axum::serve(listener, build_router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| SpotError::Transport(format!("server error: {e}")))?;

        info!("command endpoint stopped");
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────────────────
