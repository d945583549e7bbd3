//! Prometheus metrics for monitoring match server health.
//!
//! Metrics are recorded through the `metrics` facade and exposed in
//! Prometheus text format when an exporter is installed with
//! [`init_metrics`]. Without an exporter every call is a no-op.
//!
//! # Metrics Categories
//!
//! - **HTTP Metrics**: Matchmaking requests by outcome
//! - **WebSocket Metrics**: Active connections, messages sent/received
//! - **Match Metrics**: Live matches, moves submitted
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use ttt_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::matchmaking_requests_total("ok");
//! metrics::active_matches(3);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record a matchmaking request. `outcome` is `ok`, `bad_request`
/// or `error`.
pub fn matchmaking_requests_total(outcome: &'static str) {
    metrics::counter!("matchmaking_requests_total", "outcome" => outcome).increment(1);
}

// ============================================================================
// WebSocket Metrics
// ============================================================================

/// Track a newly established WebSocket connection.
pub fn websocket_connected() {
    metrics::counter!("websocket_connections_total").increment(1);
    metrics::gauge!("websocket_connections_active").increment(1.0);
}

/// Track a closed WebSocket connection.
pub fn websocket_disconnected() {
    metrics::gauge!("websocket_connections_active").decrement(1.0);
}

/// Increment WebSocket messages sent counter.
pub fn websocket_messages_sent() {
    metrics::counter!("websocket_messages_sent").increment(1);
}

/// Increment WebSocket messages received counter.
pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

/// Increment rate limit hits counter.
pub fn rate_limit_hits_total(endpoint: &'static str) {
    metrics::counter!("rate_limit_hits_total", "endpoint" => endpoint).increment(1);
}

// ============================================================================
// Match Metrics
// ============================================================================

/// Set current live matches count.
pub fn active_matches(count: usize) {
    metrics::gauge!("active_matches").set(count as f64);
}

/// Increment forwarded move submissions counter.
pub fn moves_submitted_total() {
    metrics::counter!("moves_submitted_total").increment(1);
}
