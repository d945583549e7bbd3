//! HTTP and WebSocket surface for the tic-tac-toe match engine.
//!
//! - [`api`]: matchmaking RPC, match lookup, health probe, WebSocket channel
//! - [`config`]: environment-driven server configuration
//! - [`logging`]: tracing subscriber setup
//! - [`metrics`]: Prometheus counters and gauges

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
