//! HTTP/WebSocket API for the match server.
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                          - Liveness probe
//! POST /v2/rpc/find_or_create_match     - Matchmaking RPC
//! POST /api/v1/matchmaking              - Matchmaking RPC (alias)
//! GET  /api/v1/matches                  - List match summaries
//! GET  /api/v1/matches/{match_id}       - Match state snapshot
//! GET  /ws/{match_id}?user_id=<id>      - Play a match over WebSocket
//! ```
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tictactoe::{MatchRegistry, session::MatchConfig};
//! use ttt_server::api::{AppState, create_router};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(MatchRegistry::with_config(MatchConfig::default()));
//! let app = create_router(AppState::new(registry, 32));
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7350").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. Restrict origins in front of the
//! server when deploying it publicly.

pub mod matchmaking;
pub mod rate_limiter;
pub mod request_id;
pub mod websocket;

use axum::{
    Router,
    response::Json,
    routing::{get, post},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tictactoe::MatchRegistry;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers and WebSocket connections.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<MatchRegistry>,
    /// Capacity of each socket's outbound broadcast channel
    pub subscriber_capacity: usize,
}

impl AppState {
    pub fn new(registry: Arc<MatchRegistry>, subscriber_capacity: usize) -> Self {
        Self {
            registry,
            subscriber_capacity: subscriber_capacity.max(1),
        }
    }
}

/// Create the complete API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/matchmaking", post(matchmaking::find_or_create_match))
        .route("/matches", get(matchmaking::list_matches))
        .route("/matches/{match_id}", get(matchmaking::get_match));

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/v2/rpc/find_or_create_match",
            post(matchmaking::find_or_create_match),
        )
        .route("/ws/{match_id}", get(websocket::websocket_handler))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Liveness probe. Always `200 {"status":"ok"}` while the process serves.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
