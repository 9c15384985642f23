use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tft_runs::TrackerConfig;
use tft_state::{DEFAULT_TOTAL_ROUNDS, MAX_STAGE, ROUNDS_PER_STAGE};
use tft_vision::{LayoutError, MatchThresholds, ZoneLayout};

pub const MAX_POLL_HZ: f64 = 10.0;

/// Longest run a round label can describe
pub const MAX_TOTAL_ROUNDS: u32 = MAX_STAGE * ROUNDS_PER_STAGE;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("poll_hz must be in (0, {MAX_POLL_HZ}], got {0}")]
    PollRate(f64),
    #[error("total_rounds must be in 1..={MAX_TOTAL_ROUNDS}, got {0}")]
    TotalRounds(u32),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Everything the overlay needs at startup. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Polls per second
    pub poll_hz: f64,
    pub data_dir: PathBuf,
    pub layout: ZoneLayout,
    pub thresholds: MatchThresholds,
    pub total_rounds: u32,
    /// Label-less polls on the final round before the run counts as completed
    pub final_round_grace_polls: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            poll_hz: 1.0,
            data_dir: PathBuf::from("data"),
            layout: ZoneLayout::default(),
            thresholds: MatchThresholds::default(),
            total_rounds: DEFAULT_TOTAL_ROUNDS,
            final_round_grace_polls: 5,
        }
    }
}

impl AppConfig {
    /// Read and validate a JSON config; `None` gives the validated defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.poll_hz > 0.0 && self.poll_hz <= MAX_POLL_HZ) {
            return Err(ConfigError::PollRate(self.poll_hz));
        }
        if !(1..=MAX_TOTAL_ROUNDS).contains(&self.total_rounds) {
            return Err(ConfigError::TotalRounds(self.total_rounds));
        }
        self.layout.validate()?;
        self.thresholds.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.poll_hz)
    }

    pub fn tracker(&self) -> TrackerConfig {
        TrackerConfig {
            total_rounds: self.total_rounds,
            final_round_grace_polls: self.final_round_grace_polls,
        }
    }

    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    pub fn reference_db(&self) -> PathBuf {
        self.data_dir.join("tft.db")
    }

    pub fn runs_db(&self) -> PathBuf {
        self.data_dir.join("runs.db")
    }

    pub fn strategy_file(&self) -> PathBuf {
        self.data_dir.join("strategy.md")
    }
}
