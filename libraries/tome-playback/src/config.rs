//! Player configuration
//!
//! Loaded from an optional TOML file, then overridden by `TOME_`-prefixed
//! environment variables (`TOME_CHECKPOINT_INTERVAL_SECS=60`).

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Minimum whole seconds between two position checkpoints
    pub checkpoint_interval_secs: u64,

    /// How often the position is polled while playing
    pub position_poll_ms: u64,

    /// How often the backend load procedure is stepped
    pub idle_tick_ms: u64,

    /// Magnitude of the short named seeks
    pub seek_short_secs: u64,

    /// Magnitude of the long named seeks
    pub seek_long_secs: u64,

    /// Persist the position when a playlist is unloaded or replaced
    pub save_on_unload: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval_secs: 30,
            position_poll_ms: 500,
            idle_tick_ms: 10,
            seek_short_secs: 5,
            seek_long_secs: 30,
            save_on_unload: true,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            settings = settings.add_source(config::File::from(path));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("TOME")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings
            .build()
            .map_err(|e| PlaybackError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| PlaybackError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval_secs == 0 {
            return Err(PlaybackError::Config(
                "checkpoint_interval_secs must be positive".to_string(),
            ));
        }
        if self.position_poll_ms == 0 || self.idle_tick_ms == 0 {
            return Err(PlaybackError::Config(
                "poll and tick intervals must be positive".to_string(),
            ));
        }
        if self.seek_short_secs == 0 || self.seek_short_secs >= self.seek_long_secs {
            return Err(PlaybackError::Config(format!(
                "short seek ({}s) must be positive and shorter than long seek ({}s)",
                self.seek_short_secs, self.seek_long_secs
            )));
        }
        Ok(())
    }

    pub fn position_poll_interval(&self) -> Duration {
        Duration::from_millis(self.position_poll_ms)
    }

    pub fn idle_tick_interval(&self) -> Duration {
        Duration::from_millis(self.idle_tick_ms)
    }
}
