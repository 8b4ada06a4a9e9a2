//! Aggregate broker statistics with a ledger-keyed cache.

use crate::domain::ClosedTrade;
use serde::{Deserialize, Serialize};

/// Aggregate account metrics.
///
/// The ledger-derived fields (wins, losses, win rate, profit factor, gross
/// profit/loss) are served from a cache that is valid while the ledger
/// length is unchanged. The instantaneous fields (balance, equity, floating,
/// open count) are always recomputed fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerStatistics {
    pub balance: f64,
    pub equity: f64,
    pub floating_profit: f64,
    pub open_positions: usize,
    pub closed_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
}

/// Ledger-derived portion of the statistics, cached by ledger length.
#[derive(Debug, Clone, Default)]
pub(crate) struct LedgerStats {
    pub ledger_len: usize,
    pub wins: usize,
    pub losses: usize,
    pub gross_profit: f64,
    pub gross_loss: f64,
}

impl LedgerStats {
    /// Recompute from the full ledger. Called only when the ledger length
    /// differs from the cached one.
    pub fn recompute(ledger: &[ClosedTrade]) -> Self {
        let mut stats = Self {
            ledger_len: ledger.len(),
            ..Self::default()
        };
        for trade in ledger {
            if trade.profit > 0.0 {
                stats.wins += 1;
                stats.gross_profit += trade.profit;
            } else {
                stats.losses += 1;
                stats.gross_loss += -trade.profit;
            }
        }
        stats
    }

    pub fn is_valid_for(&self, ledger: &[ClosedTrade]) -> bool {
        self.ledger_len == ledger.len()
    }

    pub fn win_rate(&self) -> f64 {
        if self.ledger_len == 0 {
            0.0
        } else {
            self.wins as f64 / self.ledger_len as f64
        }
    }

    pub fn profit_factor(&self) -> f64 {
        if self.gross_loss > 0.0 {
            self.gross_profit / self.gross_loss
        } else if self.gross_profit > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }
}
