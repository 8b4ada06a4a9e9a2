//! ClosedTrade — the append-only ledger record.

use super::instrument::InstrumentIdx;
use super::position::{CloseReason, Position, PositionSide, Ticket};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Immutable snapshot of a position at the moment it closed.
///
/// Ledger entries are append-only and never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub ticket: Ticket,
    pub instrument: InstrumentIdx,
    pub symbol: String,
    pub side: PositionSide,
    pub volume: f64,
    pub open_price: f64,
    pub open_time: DateTime<Utc>,
    pub close_price: f64,
    pub close_time: DateTime<Utc>,
    pub close_reason: CloseReason,
    /// Realized profit in account currency.
    pub profit: f64,
    pub magic: i64,
    pub comment: String,
}

impl ClosedTrade {
    /// Build the ledger record for `position` closed at the given fill.
    pub fn from_close(
        position: &Position,
        close_price: f64,
        close_time: DateTime<Utc>,
        close_reason: CloseReason,
        contract_size: f64,
    ) -> Self {
        let profit = (close_price - position.open_price)
            * position.side.sign()
            * position.volume
            * contract_size;
        Self {
            ticket: position.ticket,
            instrument: position.instrument,
            symbol: position.symbol.clone(),
            side: position.side,
            volume: position.volume,
            open_price: position.open_price,
            open_time: position.open_time,
            close_price,
            close_time,
            close_reason,
            profit,
            magic: position.magic,
            comment: position.comment.clone(),
        }
    }

    pub fn is_winner(&self) -> bool {
        self.profit > 0.0
    }
}
