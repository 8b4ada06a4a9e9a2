//! Candle — OHLCV summary over one timeframe bucket.

use super::timeframe::Timeframe;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An OHLCV bar for one timeframe bucket.
///
/// Mutable only while its bucket is still open; once the bucket boundary
/// passes, the candle is sealed and appended to the rolling window. Sealed
/// candles are never mutated. Strategies receive clones, never references
/// into the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Start a new candle from the first price of its bucket.
    pub fn opening(timeframe: Timeframe, open_time: DateTime<Utc>, price: f64, volume: f64) -> Self {
        Self {
            timeframe,
            open_time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Fold another price observation into a still-open candle.
    pub fn absorb(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }

    /// Close time (exclusive upper bound) of this candle's bucket.
    pub fn close_time(&self) -> DateTime<Utc> {
        self.open_time + self.timeframe.duration()
    }

    /// OHLC sanity check: high is the max and low is the min of the four.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}
