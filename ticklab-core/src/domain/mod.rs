//! Domain types: ticks, timeframes, candles, instruments, positions, trades, account.

mod account;
mod candle;
mod instrument;
mod position;
mod tick;
mod timeframe;
mod trade;

pub use account::AccountState;
pub use candle::Candle;
pub use instrument::{InstrumentIdx, InstrumentSpec};
pub use position::{CloseReason, OpenRequest, Position, PositionSide, Ticket};
pub use tick::Tick;
pub use timeframe::Timeframe;
pub use trade::ClosedTrade;
