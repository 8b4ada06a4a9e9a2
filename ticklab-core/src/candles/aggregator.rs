//! Per-instrument candle aggregation across timeframes.

use super::window::RollingWindow;
use crate::domain::{Candle, InstrumentIdx, Tick, Timeframe};
use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;

/// How a timeframe's bars are produced during replay.
#[derive(Debug)]
enum BuildMode {
    /// Bars derived from the replayed tick stream (bid prices). Used for the
    /// finest timeframe driving strategy decisions.
    Incremental { open: Option<Candle> },
    /// Pre-bucketed bars loaded from the data source, revealed as simulated
    /// time passes. Avoids resampling the tick stream for coarse timeframes.
    Preloaded { pending: VecDeque<Candle> },
}

/// One timeframe's rolling window plus its build state.
#[derive(Debug)]
struct CandleSeries {
    timeframe: Timeframe,
    mode: BuildMode,
    window: RollingWindow,
    /// Monotone count of sealed bars; the cache validity key.
    sealed_count: u64,
}

impl CandleSeries {
    fn on_tick(&mut self, tick: &Tick) {
        match &mut self.mode {
            BuildMode::Incremental { open } => {
                let bucket = self.timeframe.bucket_open(tick.time);
                match open {
                    Some(candle) if candle.open_time == bucket => {
                        candle.absorb(tick.bid, tick.volume);
                    }
                    Some(candle) => {
                        // The tick crossed the bucket boundary: seal the old
                        // candle before starting the new bucket.
                        self.window.push(*candle);
                        self.sealed_count += 1;
                        *open = Some(Candle::opening(
                            self.timeframe,
                            bucket,
                            tick.bid,
                            tick.volume,
                        ));
                    }
                    None => {
                        *open = Some(Candle::opening(
                            self.timeframe,
                            bucket,
                            tick.bid,
                            tick.volume,
                        ));
                    }
                }
            }
            BuildMode::Preloaded { pending } => {
                while pending
                    .front()
                    .is_some_and(|bar| bar.close_time() <= tick.time)
                {
                    self.window.push(pending.pop_front().unwrap());
                    self.sealed_count += 1;
                }
            }
        }
    }

    fn open_candle(&self) -> Option<Candle> {
        match &self.mode {
            BuildMode::Incremental { open } => *open,
            BuildMode::Preloaded { .. } => None,
        }
    }
}

/// Cached materialized view for one `(timeframe, count)` query shape.
#[derive(Debug, Clone)]
struct CachedView {
    sealed_count: u64,
    candles: Vec<Candle>,
}

/// Candle store for one instrument.
///
/// Owned exclusively by the instrument's worker; strategies read snapshots
/// through `get_candles` and never hold references into the store.
#[derive(Debug)]
pub struct CandleAggregator {
    instrument: InstrumentIdx,
    series: Vec<CandleSeries>,
    cache: RefCell<HashMap<(Timeframe, usize), CachedView>>,
}

impl CandleAggregator {
    pub fn new(instrument: InstrumentIdx) -> Self {
        Self {
            instrument,
            series: Vec::new(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn instrument(&self) -> InstrumentIdx {
        self.instrument
    }

    /// Add an incrementally-built timeframe, seeded with at most `capacity`
    /// sealed bars from before the replay start.
    pub fn add_incremental(&mut self, timeframe: Timeframe, capacity: usize, seed: Vec<Candle>) {
        let mut window = RollingWindow::new(capacity);
        let skip = seed.len().saturating_sub(capacity);
        for bar in seed.into_iter().skip(skip) {
            window.push(bar);
        }
        self.series.push(CandleSeries {
            timeframe,
            mode: BuildMode::Incremental { open: None },
            window,
            sealed_count: 0,
        });
    }

    /// Add a preloaded timeframe from pre-bucketed source bars.
    ///
    /// Bars sealed before `start` seed the window (last `capacity` kept);
    /// later bars are revealed one by one as simulated time reaches their
    /// close time, so a strategy can never observe a future bar.
    pub fn add_preloaded(
        &mut self,
        timeframe: Timeframe,
        capacity: usize,
        bars: Vec<Candle>,
        start: DateTime<Utc>,
    ) {
        let mut window = RollingWindow::new(capacity);
        let mut pending = VecDeque::new();
        for bar in bars {
            if bar.close_time() <= start {
                window.push(bar);
            } else {
                pending.push_back(bar);
            }
        }
        self.series.push(CandleSeries {
            timeframe,
            mode: BuildMode::Preloaded { pending },
            window,
            sealed_count: 0,
        });
    }

    pub fn timeframes(&self) -> Vec<Timeframe> {
        self.series.iter().map(|s| s.timeframe).collect()
    }

    /// Total sealed bars for a timeframe since replay start.
    pub fn sealed_count(&self, timeframe: Timeframe) -> u64 {
        self.series
            .iter()
            .find(|s| s.timeframe == timeframe)
            .map_or(0, |s| s.sealed_count)
    }

    /// Feed one tick through every series.
    pub fn on_tick(&mut self, tick: &Tick) {
        debug_assert_eq!(tick.instrument, self.instrument);
        for series in &mut self.series {
            series.on_tick(tick);
        }
    }

    /// Up to `count` most recent sealed candles (oldest first), optionally
    /// with the in-progress candle appended.
    ///
    /// The sealed view is served from a cache keyed `(timeframe, count)`; a
    /// hit is valid only while the sealed-bar count is unchanged since the
    /// view was built. The open candle is a live snapshot and never cached.
    pub fn get_candles(
        &self,
        timeframe: Timeframe,
        count: usize,
        include_open: bool,
    ) -> Vec<Candle> {
        let Some(series) = self.series.iter().find(|s| s.timeframe == timeframe) else {
            return Vec::new();
        };

        let mut cache = self.cache.borrow_mut();
        let view = cache
            .entry((timeframe, count))
            .and_modify(|view| {
                if view.sealed_count != series.sealed_count {
                    view.sealed_count = series.sealed_count;
                    view.candles = series.window.last_n(count);
                }
            })
            .or_insert_with(|| CachedView {
                sealed_count: series.sealed_count,
                candles: series.window.last_n(count),
            });

        let mut candles = view.candles.clone();
        if include_open {
            if let Some(open) = series.open_candle() {
                candles.push(open);
            }
        }
        candles
    }
}
