//! Serializable replay configuration (TOML).

use crate::strategies::StrategyConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use ticklab_core::broker::PositionLimits;
use ticklab_core::domain::{InstrumentSpec, Timeframe};
use ticklab_core::engine::ExecutionMode;
use ticklab_core::sync::ReplaySpeed;

/// Errors from loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for one replay run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub replay: ReplaySection,
    pub data: DataSection,
    #[serde(default)]
    pub limits: PositionLimits,
    pub instruments: Vec<InstrumentConfig>,
}

/// Engine and windowing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaySection {
    pub initial_balance: f64,
    #[serde(default = "default_mode")]
    pub mode: ExecutionMode,
    #[serde(default = "default_speed")]
    pub speed: ReplaySpeed,
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every_steps: usize,
    #[serde(default = "default_progress_every")]
    pub progress_every_steps: usize,
    /// Rolling-window capacity per timeframe (also the seed size K).
    #[serde(default = "default_candle_window")]
    pub candle_window: usize,
    /// Finest timeframe, aggregated incrementally from the tick stream.
    #[serde(default = "default_base_timeframe")]
    pub base_timeframe: Timeframe,
    /// Coarser timeframes loaded pre-bucketed from the data source.
    #[serde(default)]
    pub preloaded_timeframes: Vec<Timeframe>,
}

/// Where market data comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSection {
    pub dir: PathBuf,
    /// Generate seeded synthetic ticks for instruments with no source file
    /// instead of skipping them. Results are tagged as synthetic.
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub synthetic_params: SyntheticParams,
}

/// Shape of generated synthetic data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticParams {
    pub events: usize,
    pub interval_ms: i64,
    pub seed: u64,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            events: 10_000,
            interval_ms: 1_000,
            seed: 7,
        }
    }
}

/// One instrument plus the strategy assigned to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub symbol: String,
    #[serde(default = "default_digits")]
    pub digits: u32,
    #[serde(default = "default_contract_size")]
    pub contract_size: f64,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl InstrumentConfig {
    pub fn spec(&self) -> InstrumentSpec {
        InstrumentSpec::new(self.symbol.clone(), self.digits, self.contract_size)
    }
}

impl ReplayConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("no instruments configured".into()));
        }
        if self.replay.initial_balance <= 0.0 {
            return Err(ConfigError::Invalid(
                "initial_balance must be positive".into(),
            ));
        }
        if self.replay.candle_window == 0 {
            return Err(ConfigError::Invalid("candle_window must be positive".into()));
        }
        if self
            .replay
            .preloaded_timeframes
            .contains(&self.replay.base_timeframe)
        {
            return Err(ConfigError::Invalid(format!(
                "base timeframe {} cannot also be preloaded",
                self.replay.base_timeframe
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for instrument in &self.instruments {
            if !seen.insert(&instrument.symbol) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instrument '{}'",
                    instrument.symbol
                )));
            }
        }
        Ok(())
    }
}

fn default_mode() -> ExecutionMode {
    ExecutionMode::Sequential
}

fn default_speed() -> ReplaySpeed {
    ReplaySpeed::Unthrottled
}

fn default_snapshot_every() -> usize {
    1
}

fn default_progress_every() -> usize {
    10_000
}

fn default_candle_window() -> usize {
    500
}

fn default_base_timeframe() -> Timeframe {
    Timeframe::M1
}

fn default_digits() -> u32 {
    5
}

fn default_contract_size() -> f64 {
    100_000.0
}
