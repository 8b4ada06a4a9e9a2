//! Open positions, tickets, and order requests.

use super::instrument::InstrumentIdx;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position ticket.
///
/// Composed of the instrument's registration index (high 32 bits) and a
/// per-instrument sequence number (low 32 bits). Because each instrument's
/// orders are placed serially by its own worker, ticket assignment is
/// deterministic no matter how the OS schedules the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticket(pub u64);

impl Ticket {
    pub fn compose(instrument: InstrumentIdx, sequence: u32) -> Self {
        Self(((instrument.0 as u64) << 32) | sequence as u64)
    }

    pub fn instrument(&self) -> InstrumentIdx {
        InstrumentIdx((self.0 >> 32) as u32)
    }

    pub fn sequence(&self) -> u32 {
        self.0 as u32
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.instrument().0, self.sequence())
    }
}

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// +1.0 for long, -1.0 for short.
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }
}

/// Why a position left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    Manual,
    EndOfReplay,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::StopLoss => "SL",
            CloseReason::TakeProfit => "TP",
            CloseReason::Manual => "manual",
            CloseReason::EndOfReplay => "end_of_replay",
        };
        write!(f, "{s}")
    }
}

/// Parameters for opening a position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenRequest {
    pub instrument: InstrumentIdx,
    pub side: PositionSide,
    pub volume: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Strategy tag carried through to the ledger.
    pub magic: i64,
    pub comment: String,
}

/// An open position.
///
/// Created by order placement, mutated only by the broker (SL/TP
/// adjustment), and moved to the ledger on close. `floating_profit` is not a
/// stored field — it is derived from the latest observed price at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: Ticket,
    pub instrument: InstrumentIdx,
    pub symbol: String,
    pub side: PositionSide,
    pub volume: f64,
    pub open_price: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub open_time: DateTime<Utc>,
    pub magic: i64,
    pub comment: String,
}

impl Position {
    /// Price at which this position would close right now: bid for longs,
    /// ask for shorts.
    pub fn close_side_price(&self, bid: f64, ask: f64) -> f64 {
        match self.side {
            PositionSide::Long => bid,
            PositionSide::Short => ask,
        }
    }

    /// Unrealized profit at the given quote, in account currency.
    pub fn floating_profit(&self, bid: f64, ask: f64, contract_size: f64) -> f64 {
        let close = self.close_side_price(bid, ask);
        (close - self.open_price) * self.side.sign() * self.volume * contract_size
    }

    /// Whether this tick's quote crosses the stop-loss level.
    pub fn stop_loss_hit(&self, bid: f64, ask: f64) -> bool {
        match (self.side, self.stop_loss) {
            (PositionSide::Long, Some(sl)) => bid <= sl,
            (PositionSide::Short, Some(sl)) => ask >= sl,
            (_, None) => false,
        }
    }

    /// Whether this tick's quote crosses the take-profit level.
    pub fn take_profit_hit(&self, bid: f64, ask: f64) -> bool {
        match (self.side, self.take_profit) {
            (PositionSide::Long, Some(tp)) => bid >= tp,
            (PositionSide::Short, Some(tp)) => ask <= tp,
            (_, None) => false,
        }
    }
}
