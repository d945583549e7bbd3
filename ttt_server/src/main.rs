//! Tic-tac-toe match server.
//!
//! Each match runs in its own actor task owned by the registry; this binary
//! only wires configuration, logging and metrics around the HTTP API.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Error};
use log::{info, warn};
use pico_args::Arguments;
use tictactoe::MatchRegistry;
use ttt_server::{api, config::ServerConfig, logging, metrics};

const HELP: &str = "\
Run an authoritative tic-tac-toe match server

USAGE:
  ttt_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:7350]
  --tick-rate  HZ          Match ticks per second      [default: env MATCH_TICK_RATE_HZ or 5]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  METRICS_BIND             Prometheus exporter address (disabled when unset)
  MATCH_TICK_RATE_HZ       Match ticks per second (1-60)
  MATCH_LABEL              Label advertised by new matches
  MATCH_NOTIFY_REJECTIONS  Tell players why their move was dropped (true/false)
  MATCH_IDLE_TIMEOUT_SECS  Reap empty matches idle this long [default: 300]
  MATCH_REAP_INTERVAL_SECS How often to reap matches [default: 30]
  RUST_LOG                 Log filter [default: info,hyper=warn]
";

/// Time each match gets to stop during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct Args {
    bind: Option<SocketAddr>,
    tick_rate: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        tick_rate: pargs.opt_value_from_str("--tick-rate")?,
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.tick_rate)?;
    config.validate()?;

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics exported at http://{metrics_bind}/metrics");
    }

    info!(
        "Starting match server at {} ({} Hz ticks, label {:?})",
        config.bind, config.match_config.tick_rate_hz, config.match_config.label
    );

    let subscriber_capacity = config.match_config.subscriber_capacity;
    let registry = Arc::new(MatchRegistry::with_config(config.match_config.clone()));
    let reaper = registry.spawn_reaper(config.reap_interval, config.idle_timeout);

    let app = api::create_router(api::AppState::new(Arc::clone(&registry), subscriber_capacity));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    reaper.abort();

    for summary in registry.list().await {
        if let Err(e) = registry.terminate(&summary.match_id, SHUTDOWN_GRACE).await {
            warn!("Failed to terminate match {}: {}", summary.match_id, e);
        }
    }

    Ok(())
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C ({e}); serving until killed");
        std::future::pending::<()>().await;
    }
}
