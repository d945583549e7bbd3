//! Match configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Slowest and fastest tick rates a match may be scheduled at.
pub const MIN_TICK_RATE_HZ: u32 = 1;
pub const MAX_TICK_RATE_HZ: u32 = 60;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid match configuration for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Per-match configuration handed to the match factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Scheduled ticks per second (default: 5)
    pub tick_rate_hz: u32,

    /// Label the host advertises for the match
    pub label: String,

    /// Send a private notice to submitters whose move was dropped
    pub notify_rejections: bool,

    /// Capacity of the host's inbox for this match
    pub inbox_capacity: usize,

    /// Capacity of each subscriber's outbound channel
    pub subscriber_capacity: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 5,
            label: "tic_tac_toe".to_string(),
            notify_rejections: true,
            inbox_capacity: 100,
            subscriber_capacity: 32,
        }
    }
}

impl MatchConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_TICK_RATE_HZ..=MAX_TICK_RATE_HZ).contains(&self.tick_rate_hz) {
            return Err(ConfigError::Invalid {
                field: "tick_rate_hz".to_string(),
                reason: format!(
                    "Must be between {MIN_TICK_RATE_HZ} and {MAX_TICK_RATE_HZ}, got {}",
                    self.tick_rate_hz
                ),
            });
        }

        if self.label.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "label".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if self.inbox_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "inbox_capacity".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.subscriber_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "subscriber_capacity".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Time between two scheduled ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate_hz.max(MIN_TICK_RATE_HZ)
    }
}
