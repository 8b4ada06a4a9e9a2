//! Bounded rolling window of sealed candles.

use crate::domain::Candle;
use std::collections::VecDeque;

/// Fixed-capacity window that evicts the oldest candle on overflow.
///
/// Bounds memory regardless of total replay horizon: a series only ever
/// holds the most recent `capacity` sealed bars.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    capacity: usize,
    candles: VecDeque<Candle>,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling window capacity must be positive");
        Self {
            capacity,
            candles: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Append a sealed candle, evicting the oldest if at capacity.
    pub fn push(&mut self, candle: Candle) {
        if self.candles.len() == self.capacity {
            self.candles.pop_front();
        }
        self.candles.push_back(candle);
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// The most recent `count` candles, oldest first.
    pub fn last_n(&self, count: usize) -> Vec<Candle> {
        let take = count.min(self.candles.len());
        self.candles
            .iter()
            .skip(self.candles.len() - take)
            .copied()
            .collect()
    }
}
