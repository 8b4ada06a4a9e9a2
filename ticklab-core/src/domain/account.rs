//! Account snapshots for the equity curve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point of the equity curve.
///
/// `equity = balance + sum of floating profit over open positions`, valued at
/// the latest observed price per instrument. Snapshots are taken at step
/// boundaries, never continuously.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub time: DateTime<Utc>,
    pub balance: f64,
    pub equity: f64,
}

impl AccountState {
    /// Total unrealized profit embedded in this snapshot.
    pub fn floating(&self) -> f64 {
        self.equity - self.balance
    }
}
