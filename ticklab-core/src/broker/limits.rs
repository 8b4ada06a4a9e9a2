//! Pre-trade validation policy and typed rejections.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position-limit policy enforced at order placement.
///
/// The limits themselves are a caller decision (configuration); the broker
/// only enforces the check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionLimits {
    /// Maximum simultaneously open positions per instrument.
    pub max_per_instrument: usize,
    /// Maximum simultaneously open positions across all instruments.
    pub max_total: usize,
    pub min_volume: f64,
    pub max_volume: f64,
    /// Account leverage used for the notional margin check. Zero disables
    /// the check.
    pub leverage: f64,
}

impl Default for PositionLimits {
    fn default() -> Self {
        Self {
            max_per_instrument: 1,
            max_total: 8,
            min_volume: 0.01,
            max_volume: 100.0,
            leverage: 100.0,
        }
    }
}

/// Why an order was not accepted.
///
/// Rejections are returned as typed values to the strategy collaborator,
/// never raised past the caller.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum OrderRejection {
    #[error("volume {volume} outside [{min}, {max}]")]
    InvalidVolume { volume: f64, min: f64, max: f64 },

    #[error("instrument position limit {limit} reached")]
    InstrumentLimitReached { limit: usize },

    #[error("total position limit {limit} reached")]
    TotalLimitReached { limit: usize },

    #[error("required margin {required:.2} exceeds free margin {free:.2}")]
    InsufficientMargin { required: f64, free: f64 },

    #[error("no quote observed yet for instrument")]
    NoQuote,
}
