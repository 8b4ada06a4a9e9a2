//! Replay runner — wires config, data, strategies, and the engine together.

use crate::config::{ConfigError, ReplayConfig};
use crate::data_loader::{load_instruments, DataError, LoadedData};
use crate::result::{ReplayResult, SCHEMA_VERSION};
use crate::strategies::build_strategy;
use std::sync::Arc;
use thiserror::Error;
use ticklab_core::broker::Broker;
use ticklab_core::candles::CandleAggregator;
use ticklab_core::domain::{Candle, InstrumentIdx};
use ticklab_core::engine::{run_replay, EngineConfig};
use ticklab_core::strategy::Strategy;
use ticklab_core::sync::ShutdownFlag;
use ticklab_core::telemetry::EventSink;
use ticklab_core::timeline::{TimelineBuilder, TimelineError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("no instruments with usable data (skipped: {0:?})")]
    NoInstruments(Vec<String>),
}

/// Run a full replay from a configuration.
///
/// `shutdown` lets the caller (CLI signal handler, another thread) cancel
/// the run cooperatively; the result then reflects the last committed step.
pub fn run_from_config(
    config: &ReplayConfig,
    sink: Arc<dyn EventSink>,
    shutdown: ShutdownFlag,
) -> Result<ReplayResult, RunError> {
    let loaded = load_instruments(config, sink.as_ref());
    run_from_data(config, loaded, sink, shutdown)
}

/// Run a replay over already-loaded data — no file I/O.
pub fn run_from_data(
    config: &ReplayConfig,
    loaded: LoadedData,
    sink: Arc<dyn EventSink>,
    shutdown: ShutdownFlag,
) -> Result<ReplayResult, RunError> {
    let LoadedData {
        instruments,
        mut skipped,
        dataset_hash,
        has_synthetic,
    } = loaded;
    if instruments.is_empty() {
        return Err(RunError::NoInstruments(skipped));
    }

    // Register instruments in configuration order. A frame that fails
    // conversion is a data-availability problem: skip it, like a missing
    // file.
    let mut builder = TimelineBuilder::new();
    let mut registered = Vec::new();
    for loaded in instruments {
        match builder.register_frame(loaded.config.spec(), &loaded.ticks) {
            Ok(_) => registered.push(loaded),
            Err(e) => {
                tracing::warn!(
                    symbol = %loaded.config.symbol,
                    error = %e,
                    "skipping instrument with bad tick frame"
                );
                skipped.push(loaded.config.symbol.clone());
            }
        }
    }
    if registered.is_empty() {
        return Err(RunError::NoInstruments(skipped));
    }
    let timeline = builder.build()?;
    let start = timeline.start_time();

    // One strategy and one candle store per instrument.
    let mut strategies: Vec<Box<dyn Strategy>> = Vec::with_capacity(registered.len());
    let mut aggregators = Vec::with_capacity(registered.len());
    let window = config.replay.candle_window;
    for (i, loaded) in registered.iter().enumerate() {
        strategies.push(build_strategy(&loaded.config.strategy));

        let mut aggregator = CandleAggregator::new(InstrumentIdx(i as u32));
        let base = config.replay.base_timeframe;
        let seed: Vec<Candle> = loaded
            .candles
            .iter()
            .find(|(tf, _)| *tf == base)
            .map(|(_, bars)| {
                bars.iter()
                    .filter(|bar| bar.close_time() <= start)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        aggregator.add_incremental(base, window, seed);

        for timeframe in &config.replay.preloaded_timeframes {
            if let Some((_, bars)) = loaded.candles.iter().find(|(tf, _)| tf == timeframe) {
                aggregator.add_preloaded(*timeframe, window, bars.clone(), start);
            }
        }
        aggregators.push(aggregator);
    }

    let broker = Broker::new(
        timeline.instruments().to_vec(),
        config.replay.initial_balance,
        config.limits.clone(),
        sink.clone(),
    );
    let engine_config = EngineConfig {
        mode: config.replay.mode,
        speed: config.replay.speed,
        snapshot_every_steps: config.replay.snapshot_every_steps,
        progress_every_steps: config.replay.progress_every_steps,
    };

    let outcome = run_replay(
        &timeline,
        strategies,
        aggregators,
        &broker,
        &engine_config,
        sink.as_ref(),
        shutdown,
    );
    let statistics = broker.statistics();

    Ok(ReplayResult {
        schema_version: SCHEMA_VERSION,
        symbols: registered
            .iter()
            .map(|l| l.config.symbol.clone())
            .collect(),
        skipped,
        mode: config.replay.mode,
        initial_balance: config.replay.initial_balance,
        start_time: timeline.start_time(),
        end_time: timeline.end_time(),
        statistics,
        trades: outcome.trades,
        equity_curve: outcome.equity_curve,
        steps_completed: outcome.steps_completed,
        events_processed: outcome.events_processed,
        cancelled: outcome.cancelled,
        fingerprint: outcome.fingerprint,
        dataset_hash,
        has_synthetic,
    })
}
