//! Tick — the fundamental market event.

use super::instrument::InstrumentIdx;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A timestamped bid/ask quote for one instrument.
///
/// Ticks are produced once by the timeline builder and never mutated.
/// The global ordering key is `(time, instrument registration index)`;
/// equal timestamps across instruments preserve registration order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument: InstrumentIdx,
    pub time: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
    pub volume: f64,
}

impl Tick {
    /// Midpoint of bid and ask.
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Quoted spread in price units.
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}
