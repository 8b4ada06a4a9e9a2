//! The authoritative account/position ledger.
//!
//! All shared mutable state lives behind one mutex: position mutations are
//! rare relative to tick volume, so a single lock is both sufficient and
//! simpler than fine-grained locking.
//!
//! Determinism protocol: SL/TP hits and strategy close intents are *staged*
//! during a step and applied at `commit_step`, ordered by instrument
//! registration index. Workers only ever touch their own instrument's
//! quotes, candles and staging entries inside a step, so the committed state
//! is identical no matter how the OS schedules the workers.

use super::limits::{OrderRejection, PositionLimits};
use super::statistics::{BrokerStatistics, LedgerStats};
use crate::domain::{
    AccountState, CloseReason, ClosedTrade, InstrumentIdx, InstrumentSpec, OpenRequest, Position,
    PositionSide, Tick, Ticket,
};
use crate::telemetry::{EventSink, ReplayEvent};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Latest observed quote for one instrument.
#[derive(Debug, Clone, Copy)]
struct Quote {
    bid: f64,
    ask: f64,
    time: DateTime<Utc>,
}

/// A close recorded during the current step, applied at the commit boundary.
#[derive(Debug, Clone)]
struct StagedClose {
    ticket: Ticket,
    price: f64,
    time: DateTime<Utc>,
    reason: CloseReason,
}

/// An open position together with its profit valued at the latest quote.
///
/// Floating profit is computed here, at read time, and nowhere else.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub position: Position,
    pub floating_profit: f64,
}

#[derive(Debug)]
struct BrokerState {
    balance: f64,
    positions: BTreeMap<Ticket, Position>,
    by_instrument: HashMap<InstrumentIdx, Vec<Ticket>>,
    ledger: Vec<ClosedTrade>,
    staged: Vec<StagedClose>,
    /// Tickets staged for close this step; blocks double-triggering.
    pending: HashSet<Ticket>,
    quotes: HashMap<InstrumentIdx, Quote>,
    next_seq: HashMap<InstrumentIdx, u32>,
    /// Open-position count as of the last commit. Pre-trade checks validate
    /// against step-boundary state, never against mid-step state that other
    /// workers may be mutating concurrently — otherwise an accept/reject
    /// could depend on thread scheduling.
    committed_open_count: usize,
    /// Margin in use as of the last commit.
    committed_margin: f64,
    /// Positions opened this step per instrument: (count, margin). Each
    /// instrument's entry is only touched by its own worker.
    step_opens: HashMap<InstrumentIdx, (usize, f64)>,
    ledger_stats: LedgerStats,
    generation: u64,
}

impl BrokerState {
    fn floating_profit(&self, position: &Position, contract_size: f64) -> f64 {
        match self.quotes.get(&position.instrument) {
            Some(quote) => position.floating_profit(quote.bid, quote.ask, contract_size),
            // No quote observed yet: the position cannot exist without one,
            // but seeded states value it at entry.
            None => 0.0,
        }
    }

    fn used_margin(&self, specs: &[InstrumentSpec], leverage: f64) -> f64 {
        if leverage <= 0.0 {
            return 0.0;
        }
        self.positions
            .values()
            .map(|p| p.volume * specs[p.instrument.0 as usize].contract_size * p.open_price / leverage)
            .sum()
    }

    fn equity(&self, specs: &[InstrumentSpec]) -> f64 {
        // BTreeMap iteration is (instrument, sequence) ticket order, so the
        // float accumulation order is deterministic.
        let floating: f64 = self
            .positions
            .values()
            .map(|p| self.floating_profit(p, specs[p.instrument.0 as usize].contract_size))
            .sum();
        self.balance + floating
    }
}

/// The broker state machine.
///
/// Shared across workers behind `Arc`; every public method locks internally.
pub struct Broker {
    specs: Vec<InstrumentSpec>,
    limits: PositionLimits,
    sink: Arc<dyn EventSink>,
    state: Mutex<BrokerState>,
}

impl Broker {
    pub fn new(
        specs: Vec<InstrumentSpec>,
        initial_balance: f64,
        limits: PositionLimits,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let by_instrument = (0..specs.len() as u32)
            .map(|i| (InstrumentIdx(i), Vec::new()))
            .collect();
        Self {
            specs,
            limits,
            sink,
            state: Mutex::new(BrokerState {
                balance: initial_balance,
                positions: BTreeMap::new(),
                by_instrument,
                ledger: Vec::new(),
                staged: Vec::new(),
                pending: HashSet::new(),
                quotes: HashMap::new(),
                next_seq: HashMap::new(),
                committed_open_count: 0,
                committed_margin: 0.0,
                step_opens: HashMap::new(),
                ledger_stats: LedgerStats::default(),
                generation: 0,
            }),
        }
    }

    pub fn spec(&self, instrument: InstrumentIdx) -> &InstrumentSpec {
        &self.specs[instrument.0 as usize]
    }

    fn contract_size(&self, instrument: InstrumentIdx) -> f64 {
        self.specs[instrument.0 as usize].contract_size
    }

    /// Record the tick's quote and test SL/TP for the tick's instrument only.
    ///
    /// Candidates come from the per-instrument index, never a scan of the
    /// full position table. Triggered closes are staged at the observed
    /// market price and applied at the next `commit_step`.
    ///
    /// When both SL and TP are crossable within the same tick, stop-loss
    /// takes precedence (worst-case fill); the upstream behavior is
    /// ambiguous, so the conservative policy is pinned here.
    pub fn on_tick(&self, tick: &Tick) {
        let mut state = self.state.lock();
        state.quotes.insert(
            tick.instrument,
            Quote {
                bid: tick.bid,
                ask: tick.ask,
                time: tick.time,
            },
        );

        let Some(bucket) = state.by_instrument.get(&tick.instrument) else {
            return;
        };
        let mut triggered: Vec<StagedClose> = Vec::new();
        for &ticket in bucket {
            if state.pending.contains(&ticket) {
                continue;
            }
            let position = &state.positions[&ticket];
            let reason = if position.stop_loss_hit(tick.bid, tick.ask) {
                CloseReason::StopLoss
            } else if position.take_profit_hit(tick.bid, tick.ask) {
                CloseReason::TakeProfit
            } else {
                continue;
            };
            triggered.push(StagedClose {
                ticket,
                price: position.close_side_price(tick.bid, tick.ask),
                time: tick.time,
                reason,
            });
        }
        for close in triggered {
            state.pending.insert(close.ticket);
            state.staged.push(close);
        }
    }

    /// Open a position at the instrument's current market quote.
    ///
    /// Validation failures return a typed rejection and emit an
    /// `OrderRejected` event; they never abort the run.
    pub fn open_position(&self, request: OpenRequest) -> Result<Ticket, OrderRejection> {
        let result = self.try_open(&request);
        match &result {
            Ok((ticket, event)) => {
                self.sink.emit(event);
                return Ok(*ticket);
            }
            Err(rejection) => {
                let quote_time = self.state.lock().quotes.get(&request.instrument).map(|q| q.time);
                self.sink.emit(&ReplayEvent::OrderRejected {
                    symbol: self.spec(request.instrument).symbol.clone(),
                    reason: rejection.to_string(),
                    time: quote_time.unwrap_or_default(),
                });
            }
        }
        result.map(|(ticket, _)| ticket)
    }

    fn try_open(&self, request: &OpenRequest) -> Result<(Ticket, ReplayEvent), OrderRejection> {
        let mut state = self.state.lock();
        let quote = *state
            .quotes
            .get(&request.instrument)
            .ok_or(OrderRejection::NoQuote)?;

        if request.volume < self.limits.min_volume || request.volume > self.limits.max_volume {
            return Err(OrderRejection::InvalidVolume {
                volume: request.volume,
                min: self.limits.min_volume,
                max: self.limits.max_volume,
            });
        }
        let bucket_len = state
            .by_instrument
            .get(&request.instrument)
            .map_or(0, Vec::len);
        if bucket_len >= self.limits.max_per_instrument {
            return Err(OrderRejection::InstrumentLimitReached {
                limit: self.limits.max_per_instrument,
            });
        }

        // Global checks see committed state plus this instrument's own
        // in-step opens. Mid-step opens on other instruments are invisible
        // here so the outcome is the same no matter how workers interleave.
        let (own_opens, own_margin) = state
            .step_opens
            .get(&request.instrument)
            .copied()
            .unwrap_or((0, 0.0));
        if state.committed_open_count + own_opens >= self.limits.max_total {
            return Err(OrderRejection::TotalLimitReached {
                limit: self.limits.max_total,
            });
        }

        let open_price = match request.side {
            PositionSide::Long => quote.ask,
            PositionSide::Short => quote.bid,
        };
        let contract_size = self.contract_size(request.instrument);
        let mut required = 0.0;
        if self.limits.leverage > 0.0 {
            required = request.volume * contract_size * open_price / self.limits.leverage;
            let free = state.balance - state.committed_margin - own_margin;
            if required > free {
                return Err(OrderRejection::InsufficientMargin { required, free });
            }
        }

        let seq = state.next_seq.entry(request.instrument).or_insert(0);
        *seq += 1;
        let ticket = Ticket::compose(request.instrument, *seq);

        let position = Position {
            ticket,
            instrument: request.instrument,
            symbol: self.spec(request.instrument).symbol.clone(),
            side: request.side,
            volume: request.volume,
            open_price,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            open_time: quote.time,
            magic: request.magic,
            comment: request.comment.clone(),
        };
        let event = ReplayEvent::PositionOpened {
            ticket,
            symbol: position.symbol.clone(),
            side: position.side,
            volume: position.volume,
            price: open_price,
            time: quote.time,
        };

        // Position table and per-instrument index are updated in the same
        // critical section.
        state.positions.insert(ticket, position);
        state
            .by_instrument
            .get_mut(&request.instrument)
            .expect("index bucket exists for every registered instrument")
            .push(ticket);
        let entry = state.step_opens.entry(request.instrument).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += required;

        Ok((ticket, event))
    }

    /// Stage a strategy-requested close at the current market quote.
    ///
    /// Idempotent within a step: a ticket already staged (for example by an
    /// SL hit earlier in the same step) is left as-is.
    pub fn request_close(&self, ticket: Ticket) {
        let mut state = self.state.lock();
        if state.pending.contains(&ticket) {
            return;
        }
        let generation = state.generation;
        let Some(position) = state.positions.get(&ticket) else {
            panic!(
                "close requested for unknown ticket {ticket} (generation {generation}): \
                 position table and caller disagree"
            );
        };
        let quote = state.quotes[&position.instrument];
        let close = StagedClose {
            ticket,
            price: position.close_side_price(quote.bid, quote.ask),
            time: quote.time,
            reason: CloseReason::Manual,
        };
        state.pending.insert(ticket);
        state.staged.push(close);
    }

    /// Adjust SL/TP levels in place. Unlike closes this applies immediately:
    /// only the owning instrument's worker mutates its positions mid-step.
    pub fn modify_position(&self, ticket: Ticket, stop_loss: Option<f64>, take_profit: Option<f64>) {
        let mut state = self.state.lock();
        let generation = state.generation;
        let Some(position) = state.positions.get_mut(&ticket) else {
            panic!(
                "modify requested for unknown ticket {ticket} (generation {generation}): \
                 position table and caller disagree"
            );
        };
        position.stop_loss = stop_loss;
        position.take_profit = take_profit;
    }

    /// Apply all staged closes for the finished step.
    ///
    /// This is the serialization point that makes barrier and sequential
    /// execution byte-identical: staged closes are applied in (instrument
    /// registration, staging) order, and each ledger append removes the
    /// ticket from the position table and index in the same critical
    /// section.
    pub fn commit_step(&self, generation: u64) {
        let mut events = Vec::new();
        {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.generation = generation;
            let mut staged = std::mem::take(&mut state.staged);
            // Stable by instrument: per-instrument staging order is already
            // serial, cross-instrument order must not depend on scheduling.
            staged.sort_by_key(|close| close.ticket.instrument());

            for close in staged {
                let Some(position) = state.positions.remove(&close.ticket) else {
                    panic!(
                        "staged close for ticket {} ({}) not in position table \
                         (generation {generation}): index/ledger desync",
                        close.ticket,
                        self.spec(close.ticket.instrument()).symbol,
                    );
                };
                let bucket = state
                    .by_instrument
                    .get_mut(&position.instrument)
                    .expect("index bucket exists for every registered instrument");
                bucket.retain(|&t| t != close.ticket);
                state.pending.remove(&close.ticket);

                let trade = ClosedTrade::from_close(
                    &position,
                    close.price,
                    close.time,
                    close.reason,
                    self.contract_size(position.instrument),
                );
                state.balance += trade.profit;
                events.push(ReplayEvent::PositionClosed {
                    ticket: trade.ticket,
                    symbol: trade.symbol.clone(),
                    reason: trade.close_reason,
                    price: trade.close_price,
                    profit: trade.profit,
                    time: trade.close_time,
                });
                state.ledger.push(trade);
            }

            // Refresh the step-boundary view the pre-trade checks run
            // against.
            state.committed_open_count = state.positions.len();
            state.committed_margin = state.used_margin(&self.specs, self.limits.leverage);
            state.step_opens.clear();
        }
        for event in &events {
            self.sink.emit(event);
        }
    }

    /// Stage and commit a close of every open position, e.g. at end of
    /// replay, valuing each at its instrument's last observed quote.
    pub fn close_all(&self, reason: CloseReason, generation: u64) {
        {
            let mut state = self.state.lock();
            let closes: Vec<StagedClose> = state
                .positions
                .values()
                .filter(|p| !state.pending.contains(&p.ticket))
                .map(|position| {
                    let quote = state.quotes[&position.instrument];
                    StagedClose {
                        ticket: position.ticket,
                        price: position.close_side_price(quote.bid, quote.ask),
                        time: quote.time,
                        reason,
                    }
                })
                .collect();
            for close in closes {
                state.pending.insert(close.ticket);
                state.staged.push(close);
            }
        }
        self.commit_step(generation);
    }

    /// Open positions, newest floating profit included, optionally filtered
    /// by instrument (via the per-instrument index, not a table scan).
    pub fn positions(&self, filter: Option<InstrumentIdx>) -> Vec<PositionSnapshot> {
        let state = self.state.lock();
        let snapshot = |position: &Position| PositionSnapshot {
            floating_profit: state
                .floating_profit(position, self.contract_size(position.instrument)),
            position: position.clone(),
        };
        match filter {
            Some(instrument) => state
                .by_instrument
                .get(&instrument)
                .into_iter()
                .flatten()
                .map(|ticket| snapshot(&state.positions[ticket]))
                .collect(),
            None => state.positions.values().map(snapshot).collect(),
        }
    }

    /// Account snapshot at `time`, equity valued at the latest quotes.
    pub fn account_state(&self, time: DateTime<Utc>) -> AccountState {
        let state = self.state.lock();
        AccountState {
            time,
            balance: state.balance,
            equity: state.equity(&self.specs),
        }
    }

    /// Aggregate statistics. Ledger-derived fields come from the cache,
    /// recomputed only when the ledger has grown; instantaneous fields are
    /// always fresh.
    pub fn statistics(&self) -> BrokerStatistics {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.ledger_stats.is_valid_for(&state.ledger) {
            state.ledger_stats = LedgerStats::recompute(&state.ledger);
        }
        let equity = state.equity(&self.specs);
        BrokerStatistics {
            balance: state.balance,
            equity,
            floating_profit: equity - state.balance,
            open_positions: state.positions.len(),
            closed_trades: state.ledger.len(),
            wins: state.ledger_stats.wins,
            losses: state.ledger_stats.losses,
            win_rate: state.ledger_stats.win_rate(),
            profit_factor: state.ledger_stats.profit_factor(),
            gross_profit: state.ledger_stats.gross_profit,
            gross_loss: state.ledger_stats.gross_loss,
        }
    }

    pub fn balance(&self) -> f64 {
        self.state.lock().balance
    }

    pub fn open_position_count(&self) -> usize {
        self.state.lock().positions.len()
    }

    pub fn ledger(&self) -> Vec<ClosedTrade> {
        self.state.lock().ledger.clone()
    }

    /// Whether the index and tables agree: the union of the per-instrument
    /// buckets equals the open-position key set, and no open ticket appears
    /// in the ledger.
    pub fn index_is_consistent(&self) -> bool {
        let state = self.state.lock();
        let mut indexed: Vec<Ticket> = state
            .by_instrument
            .values()
            .flatten()
            .copied()
            .collect();
        indexed.sort();
        let mut open: Vec<Ticket> = state.positions.keys().copied().collect();
        open.sort();
        if indexed != open {
            return false;
        }
        let closed: HashSet<Ticket> = state.ledger.iter().map(|t| t.ticket).collect();
        open.iter().all(|t| !closed.contains(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{CollectingSink, NullSink};
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_709_280_000 + secs, 0).unwrap()
    }

    fn tick(instrument: u32, secs: i64, bid: f64) -> Tick {
        Tick {
            instrument: InstrumentIdx(instrument),
            time: at(secs),
            bid,
            ask: bid + 0.0002,
            volume: 1.0,
        }
    }

    fn specs() -> Vec<InstrumentSpec> {
        vec![
            InstrumentSpec::new("EURUSD", 5, 100_000.0),
            InstrumentSpec::new("GBPUSD", 5, 100_000.0),
        ]
    }

    fn broker_with_sink(sink: Arc<dyn EventSink>) -> Broker {
        Broker::new(specs(), 10_000.0, PositionLimits::default(), sink)
    }

    fn open_long(broker: &Broker, instrument: u32, sl: Option<f64>, tp: Option<f64>) -> Ticket {
        broker
            .open_position(OpenRequest {
                instrument: InstrumentIdx(instrument),
                side: PositionSide::Long,
                volume: 0.1,
                stop_loss: sl,
                take_profit: tp,
                magic: 1,
                comment: "test".into(),
            })
            .unwrap()
    }

    #[test]
    fn open_requires_a_quote() {
        let broker = broker_with_sink(Arc::new(NullSink));
        let result = broker.open_position(OpenRequest {
            instrument: InstrumentIdx(0),
            side: PositionSide::Long,
            volume: 0.1,
            stop_loss: None,
            take_profit: None,
            magic: 0,
            comment: String::new(),
        });
        assert_eq!(result, Err(OrderRejection::NoQuote));
    }

    #[test]
    fn open_long_fills_at_ask() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        let ticket = open_long(&broker, 0, None, None);
        let positions = broker.positions(Some(InstrumentIdx(0)));
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].position.ticket, ticket);
        assert!((positions[0].position.open_price - 1.1002).abs() < 1e-9);
    }

    #[test]
    fn volume_and_limit_rejections_are_typed() {
        let sink = Arc::new(CollectingSink::new());
        let broker = broker_with_sink(sink.clone());
        broker.on_tick(&tick(0, 0, 1.1));

        let too_small = broker.open_position(OpenRequest {
            instrument: InstrumentIdx(0),
            side: PositionSide::Long,
            volume: 0.001,
            stop_loss: None,
            take_profit: None,
            magic: 0,
            comment: String::new(),
        });
        assert!(matches!(too_small, Err(OrderRejection::InvalidVolume { .. })));

        open_long(&broker, 0, None, None);
        let over_limit = broker.open_position(OpenRequest {
            instrument: InstrumentIdx(0),
            side: PositionSide::Long,
            volume: 0.1,
            stop_loss: None,
            take_profit: None,
            magic: 0,
            comment: String::new(),
        });
        assert!(matches!(
            over_limit,
            Err(OrderRejection::InstrumentLimitReached { .. })
        ));

        // Both rejections were observable.
        let rejected = sink
            .events()
            .iter()
            .filter(|e| matches!(e, ReplayEvent::OrderRejected { .. }))
            .count();
        assert_eq!(rejected, 2);
    }

    #[test]
    fn margin_check_rejects_oversized_notional() {
        let limits = PositionLimits {
            max_volume: 1000.0,
            ..PositionLimits::default()
        };
        let broker = Broker::new(specs(), 1_000.0, limits, Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1));
        // 10 lots * 100k * 1.1002 / 100 leverage ≈ 11_000 > 1000 balance.
        let result = broker.open_position(OpenRequest {
            instrument: InstrumentIdx(0),
            side: PositionSide::Long,
            volume: 10.0,
            stop_loss: None,
            take_profit: None,
            magic: 0,
            comment: String::new(),
        });
        assert!(matches!(result, Err(OrderRejection::InsufficientMargin { .. })));
    }

    #[test]
    fn stop_loss_stages_then_commit_closes() {
        let sink = Arc::new(CollectingSink::new());
        let broker = broker_with_sink(sink.clone());
        broker.on_tick(&tick(0, 0, 1.1000));
        let ticket = open_long(&broker, 0, Some(1.0950), None);

        broker.on_tick(&tick(0, 1, 1.0940));
        // Staged, not yet applied: the position is still open.
        assert_eq!(broker.open_position_count(), 1);
        assert!(broker.ledger().is_empty());

        broker.commit_step(1);
        assert_eq!(broker.open_position_count(), 0);
        let ledger = broker.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].ticket, ticket);
        assert_eq!(ledger[0].close_reason, CloseReason::StopLoss);
        assert!((ledger[0].close_price - 1.0940).abs() < 1e-9);
        assert_eq!(sink.closes_with_reason(CloseReason::StopLoss), 1);
        assert!(broker.index_is_consistent());
    }

    #[test]
    fn stop_loss_takes_precedence_over_take_profit() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        // Degenerate levels: both SL and TP crossable on the same tick.
        open_long(&broker, 0, Some(1.2000), Some(1.0500));
        broker.on_tick(&tick(0, 1, 1.1500));
        broker.commit_step(1);
        let ledger = broker.ledger();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].close_reason, CloseReason::StopLoss);
    }

    #[test]
    fn double_trigger_within_step_closes_once() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        open_long(&broker, 0, Some(1.0950), None);
        broker.on_tick(&tick(0, 1, 1.0940));
        broker.on_tick(&tick(0, 1, 1.0930)); // same step, lower still
        broker.commit_step(1);
        assert_eq!(broker.ledger().len(), 1);
        // First trigger's price wins.
        assert!((broker.ledger()[0].close_price - 1.0940).abs() < 1e-9);
    }

    #[test]
    fn lazy_floating_profit_tracks_latest_tick() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        open_long(&broker, 0, None, None);

        broker.on_tick(&tick(0, 1, 1.1050));
        let positions = broker.positions(Some(InstrumentIdx(0)));
        // Long valued at bid: (1.1050 - 1.1002) * 0.1 * 100k = 48.
        assert!((positions[0].floating_profit - 48.0).abs() < 1e-6);

        broker.on_tick(&tick(0, 2, 1.0900));
        let positions = broker.positions(Some(InstrumentIdx(0)));
        assert!((positions[0].floating_profit + 102.0).abs() < 1e-6);
    }

    #[test]
    fn statistics_cache_invalidates_on_close_only() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        broker.on_tick(&tick(1, 0, 1.2500));
        open_long(&broker, 0, Some(1.0950), None);

        let first = broker.statistics();
        let second = broker.statistics();
        assert_eq!(first.wins, second.wins);
        assert_eq!(first.losses, second.losses);
        assert_eq!(first.closed_trades, 0);

        broker.on_tick(&tick(0, 1, 1.0900));
        broker.commit_step(1);

        let third = broker.statistics();
        assert_eq!(third.closed_trades, 1);
        assert_eq!(third.wins + third.losses, 1);
        assert_eq!(third.losses, 1);
    }

    #[test]
    fn manual_close_is_idempotent_within_step() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        let ticket = open_long(&broker, 0, None, None);
        broker.request_close(ticket);
        broker.request_close(ticket);
        broker.commit_step(1);
        assert_eq!(broker.ledger().len(), 1);
        assert_eq!(broker.ledger()[0].close_reason, CloseReason::Manual);
    }

    #[test]
    fn close_all_liquidates_at_last_quote() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        broker.on_tick(&tick(1, 0, 1.2500));
        open_long(&broker, 0, None, None);
        open_long(&broker, 1, None, None);

        broker.close_all(CloseReason::EndOfReplay, 9);
        assert_eq!(broker.open_position_count(), 0);
        let ledger = broker.ledger();
        assert_eq!(ledger.len(), 2);
        assert!(ledger
            .iter()
            .all(|t| t.close_reason == CloseReason::EndOfReplay));
        // Ledger order follows instrument registration order.
        assert_eq!(ledger[0].instrument, InstrumentIdx(0));
        assert_eq!(ledger[1].instrument, InstrumentIdx(1));
        // Equity equals balance once the book is flat.
        let account = broker.account_state(at(10));
        assert!((account.equity - account.balance).abs() < 1e-9);
    }

    #[test]
    fn commit_orders_cross_instrument_closes_by_registration() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        broker.on_tick(&tick(1, 0, 1.2500));
        open_long(&broker, 0, Some(1.0950), None);
        open_long(&broker, 1, Some(1.2450), None);

        // Stage in reverse registration order.
        broker.on_tick(&tick(1, 1, 1.2400));
        broker.on_tick(&tick(0, 1, 1.0900));
        broker.commit_step(1);

        let ledger = broker.ledger();
        assert_eq!(ledger[0].instrument, InstrumentIdx(0));
        assert_eq!(ledger[1].instrument, InstrumentIdx(1));
    }

    #[test]
    #[should_panic(expected = "unknown ticket")]
    fn closing_unknown_ticket_is_fatal() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.request_close(Ticket::compose(InstrumentIdx(0), 99));
    }

    #[test]
    fn modify_updates_levels_in_place() {
        let broker = broker_with_sink(Arc::new(NullSink));
        broker.on_tick(&tick(0, 0, 1.1000));
        let ticket = open_long(&broker, 0, Some(1.0950), None);
        broker.modify_position(ticket, Some(1.0980), Some(1.1100));
        let position = &broker.positions(None)[0].position;
        assert_eq!(position.stop_loss, Some(1.0980));
        assert_eq!(position.take_profit, Some(1.1100));
    }
}
