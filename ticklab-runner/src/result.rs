//! The persisted result of a replay run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticklab_core::broker::BrokerStatistics;
use ticklab_core::domain::{AccountState, ClosedTrade};
use ticklab_core::engine::ExecutionMode;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a replay run: the closed-trade ledger and the account
/// time series, plus enough provenance (dataset hash, fingerprint, mode) for
/// an external analysis layer to reproduce and compare runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub symbols: Vec<String>,
    pub skipped: Vec<String>,
    pub mode: ExecutionMode,
    pub initial_balance: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub statistics: BrokerStatistics,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<AccountState>,
    pub steps_completed: usize,
    pub events_processed: usize,
    pub cancelled: bool,
    /// blake3 over ledger + equity curve; equal across runs means
    /// byte-identical results.
    pub fingerprint: String,
    /// blake3 over the loaded source data.
    pub dataset_hash: String,
    /// True when any instrument ran on generated data.
    pub has_synthetic: bool,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl ReplayResult {
    /// Realized profit over the whole run.
    pub fn realized_profit(&self) -> f64 {
        self.trades.iter().map(|t| t.profit).sum()
    }

    pub fn final_equity(&self) -> f64 {
        self.equity_curve
            .last()
            .map_or(self.initial_balance, |state| state.equity)
    }
}
