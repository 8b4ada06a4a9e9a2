//! Tracing-backed telemetry sink.

use ticklab_core::telemetry::{EventSink, ReplayEvent};

/// Forwards structured replay events to `tracing`.
///
/// The kernel never depends on what happens here; this sink is the default
/// presentation for CLI runs.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &ReplayEvent) {
        match event {
            ReplayEvent::PositionOpened {
                ticket,
                symbol,
                side,
                volume,
                price,
                time,
            } => {
                tracing::info!(%ticket, %symbol, ?side, volume, price, %time, "position opened");
            }
            ReplayEvent::PositionClosed {
                ticket,
                symbol,
                reason,
                price,
                profit,
                time,
            } => {
                tracing::info!(%ticket, %symbol, %reason, price, profit, %time, "position closed");
            }
            ReplayEvent::OrderRejected {
                symbol,
                reason,
                time,
            } => {
                tracing::warn!(%symbol, %reason, %time, "order rejected");
            }
            ReplayEvent::InstrumentSkipped { symbol, reason } => {
                tracing::warn!(%symbol, %reason, "instrument skipped");
            }
            ReplayEvent::Progress {
                fraction,
                simulated_time,
                generation,
                open_positions,
                closed_trades,
                equity,
            } => {
                tracing::info!(
                    progress = format_args!("{:.1}%", fraction * 100.0),
                    %simulated_time,
                    generation,
                    open_positions,
                    closed_trades,
                    equity,
                    "replay progress"
                );
            }
        }
    }
}
