//! Built-in strategies and the config-to-strategy factory.
//!
//! Real signal logic is a collaborator concern; these exist so the replay
//! tool is usable end to end and so tests have deterministic traders.

use serde::{Deserialize, Serialize};
use ticklab_core::broker::PositionSnapshot;
use ticklab_core::candles::CandleAggregator;
use ticklab_core::domain::{OpenRequest, PositionSide, Tick, Timeframe};
use ticklab_core::strategy::{NoopStrategy, Strategy, TradeIntent};

/// Serializable strategy selection for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Never trades.
    Noop,
    /// Moving-average crossover over sealed base-timeframe candles, long
    /// only, with a fixed bracket around the entry price.
    MaCross {
        timeframe: Timeframe,
        fast: usize,
        slow: usize,
        volume: f64,
        /// Stop distance below the entry bid, in price units.
        stop_offset: f64,
        /// Take-profit distance above the entry bid, in price units.
        take_profit_offset: f64,
    },
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self::Noop
    }
}

/// Build the strategy instance for one instrument.
pub fn build_strategy(config: &StrategyConfig) -> Box<dyn Strategy> {
    match config {
        StrategyConfig::Noop => Box::new(NoopStrategy),
        StrategyConfig::MaCross {
            timeframe,
            fast,
            slow,
            volume,
            stop_offset,
            take_profit_offset,
        } => Box::new(MaCrossStrategy {
            timeframe: *timeframe,
            fast: (*fast).max(1),
            slow: (*slow).max(2),
            volume: *volume,
            stop_offset: *stop_offset,
            take_profit_offset: *take_profit_offset,
        }),
    }
}

/// Long-only moving-average crossover.
///
/// Opens when the fast SMA crosses above the slow SMA, closes on the
/// opposite cross; SL/TP brackets handle the rest. Works entirely off
/// sealed candles, so it is deterministic across execution modes.
pub struct MaCrossStrategy {
    timeframe: Timeframe,
    fast: usize,
    slow: usize,
    volume: f64,
    stop_offset: f64,
    take_profit_offset: f64,
}

impl MaCrossStrategy {
    /// SMA over `period` closes ending `back` bars from the end.
    fn sma(closes: &[f64], period: usize, back: usize) -> Option<f64> {
        let end = closes.len().checked_sub(back)?;
        let start = end.checked_sub(period)?;
        let window = &closes[start..end];
        if window.is_empty() {
            return None;
        }
        Some(window.iter().sum::<f64>() / window.len() as f64)
    }
}

impl Strategy for MaCrossStrategy {
    fn on_event(
        &mut self,
        tick: &Tick,
        candles: &CandleAggregator,
        positions: &[PositionSnapshot],
    ) -> Option<TradeIntent> {
        let sealed = candles.get_candles(self.timeframe, self.slow + 1, false);
        if sealed.len() < self.slow + 1 {
            return None;
        }
        let closes: Vec<f64> = sealed.iter().map(|c| c.close).collect();

        let fast_now = Self::sma(&closes, self.fast, 0)?;
        let slow_now = Self::sma(&closes, self.slow, 0)?;
        let fast_prev = Self::sma(&closes, self.fast, 1)?;
        let slow_prev = Self::sma(&closes, self.slow, 1)?;

        if positions.is_empty() {
            if fast_prev <= slow_prev && fast_now > slow_now {
                return Some(TradeIntent::Open(OpenRequest {
                    instrument: tick.instrument,
                    side: PositionSide::Long,
                    volume: self.volume,
                    stop_loss: Some(tick.bid - self.stop_offset),
                    take_profit: Some(tick.bid + self.take_profit_offset),
                    magic: 0,
                    comment: "ma_cross".into(),
                }));
            }
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            return Some(TradeIntent::Close {
                ticket: positions[0].position.ticket,
            });
        }
        None
    }
}
