//! Instrument metadata and the registration-order index.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense index of an instrument in registration order.
///
/// Assigned by the timeline builder when an instrument is registered and used
/// everywhere in the hot path instead of the symbol string. Registration
/// order is load-bearing: it is the tie-break for equal-timestamp merging and
/// the serialization order for step commits, so it must be stable across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstrumentIdx(pub u32);

impl fmt::Display for InstrumentIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Static metadata for one tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    /// Price precision in decimal digits (e.g. 5 for EURUSD).
    pub digits: u32,
    /// Units of the base asset per 1.0 of volume (e.g. 100_000 for FX lots).
    pub contract_size: f64,
}

impl InstrumentSpec {
    pub fn new(symbol: impl Into<String>, digits: u32, contract_size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            digits,
            contract_size,
        }
    }

    /// Smallest representable price increment.
    pub fn point(&self) -> f64 {
        10f64.powi(-(self.digits as i32))
    }
}
