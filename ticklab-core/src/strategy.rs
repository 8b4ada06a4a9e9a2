//! Strategy collaborator seam.
//!
//! Signal logic lives outside the kernel. The engine calls `on_event` once
//! per due event for the strategy's instrument and relays the returned
//! intent to the broker — nothing more.

use crate::broker::PositionSnapshot;
use crate::candles::CandleAggregator;
use crate::domain::{OpenRequest, Tick, Ticket};

/// What a strategy wants done after seeing an event.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeIntent {
    Open(OpenRequest),
    Close {
        ticket: Ticket,
    },
    Modify {
        ticket: Ticket,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    },
}

/// Per-instrument decision logic.
///
/// One strategy instance per instrument; it is moved into that instrument's
/// worker and only ever sees its own instrument's events. `positions` holds
/// the instrument's open positions with floating profit already valued at
/// the latest quote.
pub trait Strategy: Send {
    fn on_event(
        &mut self,
        tick: &Tick,
        candles: &CandleAggregator,
        positions: &[PositionSnapshot],
    ) -> Option<TradeIntent>;
}

/// Strategy that never trades. Useful for replaying pure market data and as
/// a placeholder for instruments without signal logic.
#[derive(Debug, Default)]
pub struct NoopStrategy;

impl Strategy for NoopStrategy {
    fn on_event(
        &mut self,
        _tick: &Tick,
        _candles: &CandleAggregator,
        _positions: &[PositionSnapshot],
    ) -> Option<TradeIntent> {
        None
    }
}
