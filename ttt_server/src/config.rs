//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::{net::SocketAddr, str::FromStr, time::Duration};

use tictactoe::session::{self, MatchConfig};

/// Bind address used when neither `--bind` nor `SERVER_BIND` is given
pub const DEFAULT_BIND: &str = "127.0.0.1:7350";

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Prometheus exporter address; no exporter when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Settings handed to every new match
    pub match_config: MatchConfig,
    /// Empty matches idle this long are reaped
    pub idle_timeout: Duration,
    /// How often the reaper runs
    pub reap_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 7350)),
            metrics_bind: None,
            match_config: MatchConfig::default(),
            idle_timeout: Duration::from_secs(300),
            reap_interval: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `tick_rate_override` - Optional tick rate override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but cannot be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        tick_rate_override: Option<u32>,
    ) -> Result<Self, ConfigError> {
        Self::from_lookup(
            |key| std::env::var(key).ok(),
            bind_override,
            tick_rate_override,
        )
    }

    /// Same as [`ServerConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(
        lookup: F,
        bind_override: Option<SocketAddr>,
        tick_rate_override: Option<u32>,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_var(&lookup, "SERVER_BIND")?.unwrap_or(defaults.bind),
        };
        let metrics_bind = parse_var(&lookup, "METRICS_BIND")?;

        let default_match = MatchConfig::default();
        let match_config = MatchConfig {
            tick_rate_hz: tick_rate_override.unwrap_or_else(|| {
                parse_env_or(&lookup, "MATCH_TICK_RATE_HZ", default_match.tick_rate_hz)
            }),
            label: lookup("MATCH_LABEL").unwrap_or(default_match.label),
            notify_rejections: parse_env_or(
                &lookup,
                "MATCH_NOTIFY_REJECTIONS",
                default_match.notify_rejections,
            ),
            ..default_match
        };

        let idle_timeout = Duration::from_secs(parse_env_or(
            &lookup,
            "MATCH_IDLE_TIMEOUT_SECS",
            defaults.idle_timeout.as_secs(),
        ));
        let reap_interval = Duration::from_secs(parse_env_or(
            &lookup,
            "MATCH_REAP_INTERVAL_SECS",
            defaults.reap_interval.as_secs(),
        ));

        Ok(ServerConfig {
            bind,
            metrics_bind,
            match_config,
            idle_timeout,
            reap_interval,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.match_config.validate()?;

        if self.reap_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "MATCH_REAP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "MATCH_IDLE_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.metrics_bind == Some(self.bind) {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server bind address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },

    #[error(transparent)]
    Match(#[from] session::ConfigError),
}

/// Parse a variable that must be well-formed when present
fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: key.to_string(),
                reason: format!("{raw:?}: {e}"),
            })
        })
        .transpose()
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
