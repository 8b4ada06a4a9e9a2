//! Shared fixtures for the kernel integration tests.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

use ticklab_core::broker::{Broker, PositionLimits, PositionSnapshot};
use ticklab_core::candles::CandleAggregator;
use ticklab_core::domain::{
    Candle, InstrumentIdx, InstrumentSpec, OpenRequest, PositionSide, Tick, Timeframe,
};
use ticklab_core::engine::{run_replay, EngineConfig, ExecutionMode, ReplayOutcome};
use ticklab_core::strategy::{Strategy, TradeIntent};
use ticklab_core::sync::ShutdownFlag;
use ticklab_core::telemetry::{CollectingSink, EventSink};
use ticklab_core::timeline::{EventTimeline, TimelineBuilder};

pub const INITIAL_BALANCE: f64 = 100_000.0;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn at_ms(offset_ms: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::milliseconds(offset_ms)
}

/// Seeded random-walk tick stream: `count` ticks spaced `interval_ms` apart
/// starting at `offset_ms`.
pub fn synthetic_ticks(
    seed: u64,
    count: usize,
    interval_ms: i64,
    offset_ms: i64,
    base_price: f64,
) -> Vec<Tick> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = base_price;
    (0..count)
        .map(|i| {
            price += rng.gen_range(-10..=10) as f64 * 0.0001;
            price = price.max(0.1);
            Tick {
                instrument: InstrumentIdx(0), // assigned at registration
                time: at_ms(offset_ms + i as i64 * interval_ms),
                bid: price,
                ask: price + 0.0002,
                volume: 1.0,
            }
        })
        .collect()
}

/// Constant-price tick stream, for instruments that must stay flat.
pub fn flat_ticks(count: usize, interval_ms: i64, offset_ms: i64, price: f64) -> Vec<Tick> {
    (0..count)
        .map(|i| Tick {
            instrument: InstrumentIdx(0),
            time: at_ms(offset_ms + i as i64 * interval_ms),
            bid: price,
            ask: price + 0.0002,
            volume: 1.0,
        })
        .collect()
}

pub fn build_timeline(streams: Vec<(&str, Vec<Tick>)>) -> EventTimeline {
    let mut builder = TimelineBuilder::new();
    for (symbol, ticks) in streams {
        builder
            .register(InstrumentSpec::new(symbol, 5, 100_000.0), ticks)
            .unwrap();
    }
    builder.build().unwrap()
}

/// Pre-bucketed M5 bars spanning `horizon_ms` from the base time.
pub fn m5_bars_covering(horizon_ms: i64, price: f64) -> Vec<Candle> {
    let width_ms = Timeframe::M5.duration().num_milliseconds();
    let buckets = horizon_ms / width_ms + 1;
    (0..buckets)
        .map(|i| {
            let open_time = Timeframe::M5.bucket_open(at_ms(i * width_ms));
            let mut bar = Candle::opening(Timeframe::M5, open_time, price, 10.0);
            bar.absorb(price + 0.0005, 10.0);
            bar.absorb(price - 0.0005, 10.0);
            bar
        })
        .collect()
}

/// Deterministic demo strategy: opens a bracketed long every `open_every`
/// events while flat, closes manually every `close_every` events while in a
/// position. Exercises opens, SL/TP hits, and manual closes.
pub struct PulseStrategy {
    pub open_every: usize,
    pub close_every: usize,
    count: usize,
}

impl PulseStrategy {
    pub fn new(open_every: usize, close_every: usize) -> Self {
        Self {
            open_every,
            close_every,
            count: 0,
        }
    }
}

impl Strategy for PulseStrategy {
    fn on_event(
        &mut self,
        tick: &Tick,
        _candles: &CandleAggregator,
        positions: &[PositionSnapshot],
    ) -> Option<TradeIntent> {
        self.count += 1;
        if positions.is_empty() {
            if self.count % self.open_every == 0 {
                return Some(TradeIntent::Open(OpenRequest {
                    instrument: tick.instrument,
                    side: PositionSide::Long,
                    volume: 0.1,
                    stop_loss: Some(tick.bid - 0.0030),
                    take_profit: Some(tick.bid + 0.0045),
                    magic: 1,
                    comment: "pulse".into(),
                }));
            }
        } else if self.close_every > 0 && self.count % self.close_every == 0 {
            return Some(TradeIntent::Close {
                ticket: positions[0].position.ticket,
            });
        }
        None
    }
}

/// Run a replay over `timeline` with one `PulseStrategy` per instrument.
pub fn run_pulse(
    timeline: &EventTimeline,
    mode: ExecutionMode,
    progress_every_steps: usize,
) -> (ReplayOutcome, Arc<CollectingSink>) {
    let sink: Arc<CollectingSink> = Arc::new(CollectingSink::new());
    let broker = Broker::new(
        timeline.instruments().to_vec(),
        INITIAL_BALANCE,
        PositionLimits::default(),
        sink.clone() as Arc<dyn EventSink>,
    );

    let n = timeline.instruments().len();
    let strategies: Vec<Box<dyn Strategy>> = (0..n)
        .map(|i| Box::new(PulseStrategy::new(7 + i, 53)) as Box<dyn Strategy>)
        .collect();
    let aggregators: Vec<CandleAggregator> = (0..n)
        .map(|i| {
            let mut agg = CandleAggregator::new(InstrumentIdx(i as u32));
            agg.add_incremental(Timeframe::M1, 200, Vec::new());
            agg
        })
        .collect();

    let config = EngineConfig {
        mode,
        progress_every_steps,
        ..EngineConfig::default()
    };
    let outcome = run_replay(
        timeline,
        strategies,
        aggregators,
        &broker,
        &config,
        sink.as_ref(),
        ShutdownFlag::new(),
    );
    (outcome, sink)
}
