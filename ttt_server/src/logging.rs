//! Structured logging configuration.
//!
//! The engine logs through the `log` facade; those records are bridged into
//! the `tracing` subscriber installed here, so both end up in one stream
//! with the request ids attached by the HTTP middleware.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset or unparsable
pub const DEFAULT_FILTER: &str = "info,hyper=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use ttt_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log a matchmaking decision with the request it belongs to
pub fn log_matchmaking(request_id: &str, user_id: &str, match_id: &str) {
    tracing::info!(
        request_id = request_id,
        user_id = user_id,
        match_id = match_id,
        "Matchmaking resolved"
    );
}
