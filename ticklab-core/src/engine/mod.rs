//! Replay engine: two interchangeable execution strategies over one kernel.
//!
//! Sequential mode iterates the merged timeline in place and is the default
//! for production-scale replay. Barrier mode spawns one worker per
//! instrument plus a position monitor and exercises the same concurrency
//! path a live multi-instrument deployment uses. Both must produce
//! byte-identical ledgers and equity curves for the same input.

mod parallel;
mod sequential;

use crate::broker::Broker;
use crate::candles::CandleAggregator;
use crate::domain::{AccountState, CloseReason, ClosedTrade, Tick};
use crate::strategy::{Strategy, TradeIntent};
use crate::sync::{ReplaySpeed, ShutdownFlag};
use crate::telemetry::{EventSink, ReplayEvent};
use crate::timeline::EventTimeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which execution strategy drives the replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Single loop over the merged timeline. Fastest; the default.
    Sequential,
    /// One worker thread per instrument plus a position monitor,
    /// synchronized by the step barrier. Fidelity mode.
    Barrier,
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    pub speed: ReplaySpeed,
    /// Equity snapshot cadence in steps. Step-indexed so the cadence is
    /// identical in both execution modes.
    pub snapshot_every_steps: usize,
    /// Progress event cadence in steps. Never per-event: a full statistics
    /// recomputation per event is the dominant performance risk here.
    pub progress_every_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Sequential,
            speed: ReplaySpeed::Unthrottled,
            snapshot_every_steps: 1,
            progress_every_steps: 10_000,
        }
    }
}

/// Final result of a replay run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<AccountState>,
    pub steps_completed: usize,
    pub events_processed: usize,
    /// True when the run was cut short by a shutdown signal; the ledger then
    /// reflects the last fully committed step.
    pub cancelled: bool,
    /// blake3 over the serialized ledger + equity curve; equal fingerprints
    /// mean byte-identical results.
    pub fingerprint: String,
}

impl ReplayOutcome {
    fn assemble(
        broker: &Broker,
        equity_curve: Vec<AccountState>,
        steps_completed: usize,
        events_processed: usize,
        cancelled: bool,
    ) -> Self {
        let trades = broker.ledger();
        let payload = serde_json::to_vec(&(&trades, &equity_curve))
            .expect("ledger and equity curve serialize");
        let fingerprint = blake3::hash(&payload).to_hex().to_string();
        Self {
            trades,
            equity_curve,
            steps_completed,
            events_processed,
            cancelled,
            fingerprint,
        }
    }
}

/// Run a replay over `timeline` with one strategy and one candle aggregator
/// per instrument, in registration order.
pub fn run_replay(
    timeline: &EventTimeline,
    strategies: Vec<Box<dyn Strategy>>,
    aggregators: Vec<CandleAggregator>,
    broker: &Broker,
    config: &EngineConfig,
    sink: &dyn EventSink,
    shutdown: ShutdownFlag,
) -> ReplayOutcome {
    assert_eq!(
        strategies.len(),
        timeline.instruments().len(),
        "one strategy per registered instrument"
    );
    assert_eq!(
        aggregators.len(),
        timeline.instruments().len(),
        "one candle aggregator per registered instrument"
    );

    match config.mode {
        ExecutionMode::Sequential => {
            sequential::run(timeline, strategies, aggregators, broker, config, sink, shutdown)
        }
        ExecutionMode::Barrier => {
            parallel::run(timeline, strategies, aggregators, broker, config, sink, shutdown)
        }
    }
}

/// Feed one due event through the instrument's aggregator, the broker, and
/// the strategy, relaying any resulting intent.
pub(crate) fn process_tick(
    tick: &Tick,
    aggregator: &mut CandleAggregator,
    strategy: &mut dyn Strategy,
    broker: &Broker,
) {
    aggregator.on_tick(tick);
    broker.on_tick(tick);
    let positions = broker.positions(Some(tick.instrument));
    if let Some(intent) = strategy.on_event(tick, aggregator, &positions) {
        match intent {
            // Rejections are already surfaced as telemetry; the engine only
            // relays, it does not retry or escalate.
            TradeIntent::Open(request) => {
                let _ = broker.open_position(request);
            }
            TradeIntent::Close { ticket } => broker.request_close(ticket),
            TradeIntent::Modify {
                ticket,
                stop_loss,
                take_profit,
            } => broker.modify_position(ticket, stop_loss, take_profit),
        }
    }
}

/// Step-boundary bookkeeping shared by both execution modes.
pub(crate) struct StepAccounting<'a> {
    broker: &'a Broker,
    sink: &'a dyn EventSink,
    snapshot_every: usize,
    progress_every: usize,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pub equity_curve: Vec<AccountState>,
}

impl<'a> StepAccounting<'a> {
    pub fn new(
        broker: &'a Broker,
        sink: &'a dyn EventSink,
        config: &EngineConfig,
        timeline: &EventTimeline,
    ) -> Self {
        Self {
            broker,
            sink,
            snapshot_every: config.snapshot_every_steps.max(1),
            progress_every: config.progress_every_steps.max(1),
            start: timeline.start_time(),
            end: timeline.end_time(),
            equity_curve: Vec::new(),
        }
    }

    /// Fraction of elapsed simulated time, in [0, 1]. Event-index fractions
    /// would be biased by unequal event density across instruments.
    pub fn progress_fraction(&self, time: DateTime<Utc>) -> f64 {
        let total = (self.end - self.start).num_milliseconds();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (time - self.start).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }

    /// Commit the finished step and take periodic snapshots.
    pub fn on_step_committed(&mut self, generation: usize, time: DateTime<Utc>) {
        self.broker.commit_step(generation as u64);
        if generation % self.snapshot_every == 0 {
            self.equity_curve.push(self.broker.account_state(time));
        }
        if generation % self.progress_every == 0 {
            self.emit_progress(generation as u64, time);
        }
    }

    /// Liquidate remaining positions and record the final state. Only runs
    /// on clean completion; cancelled runs keep the last committed ledger.
    pub fn finish(&mut self, final_generation: usize) {
        self.broker
            .close_all(CloseReason::EndOfReplay, final_generation as u64);
        self.equity_curve.push(self.broker.account_state(self.end));
        self.emit_progress(final_generation as u64, self.end);
    }

    fn emit_progress(&self, generation: u64, time: DateTime<Utc>) {
        let stats = self.broker.statistics();
        self.sink.emit(&ReplayEvent::Progress {
            fraction: self.progress_fraction(time),
            simulated_time: time,
            generation,
            open_positions: stats.open_positions,
            closed_trades: stats.closed_trades,
            equity: stats.equity,
        });
    }
}
