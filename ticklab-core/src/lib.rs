//! TickLab Core — the deterministic replay kernel.
//!
//! This crate contains the heart of the replay engine:
//! - Domain types (ticks, candles, instruments, positions, trades)
//! - Event timeline builder (bulk ingestion + k-way stable merge)
//! - Candle aggregator (incremental and preloaded rolling windows)
//! - Broker state machine (positions, SL/TP detection, ledger, statistics)
//! - Step barrier and simulated clock (lockstep time progression)
//! - Sequential and barrier execution strategies over the same kernel

pub mod broker;
pub mod candles;
pub mod domain;
pub mod engine;
pub mod strategy;
pub mod sync;
pub mod telemetry;
pub mod timeline;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything shared across worker threads is
    /// Send + Sync. If any type fails this check, the build breaks
    /// immediately instead of when the barrier mode is exercised.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain types
        require_send::<domain::Tick>();
        require_sync::<domain::Tick>();
        require_send::<domain::Candle>();
        require_sync::<domain::Candle>();
        require_send::<domain::Position>();
        require_sync::<domain::Position>();
        require_send::<domain::ClosedTrade>();
        require_sync::<domain::ClosedTrade>();
        require_send::<domain::AccountState>();
        require_sync::<domain::AccountState>();
        require_send::<domain::InstrumentSpec>();
        require_sync::<domain::InstrumentSpec>();
        require_send::<domain::Ticket>();
        require_sync::<domain::Ticket>();

        // Shared kernel state
        require_send::<broker::Broker>();
        require_sync::<broker::Broker>();
        require_send::<sync::StepBarrier>();
        require_sync::<sync::StepBarrier>();
        require_send::<sync::SimClock>();
        require_sync::<sync::SimClock>();
        require_send::<sync::ShutdownFlag>();
        require_sync::<sync::ShutdownFlag>();
        require_send::<timeline::EventTimeline>();
        require_sync::<timeline::EventTimeline>();

        // Worker-owned state only needs Send: the candle aggregator's view
        // cache is interior-mutable and is deliberately not Sync.
        require_send::<candles::CandleAggregator>();
        require_send::<strategy::NoopStrategy>();

        // Telemetry
        require_send::<telemetry::ReplayEvent>();
        require_sync::<telemetry::ReplayEvent>();
        require_send::<telemetry::NullSink>();
        require_sync::<telemetry::NullSink>();
        require_send::<telemetry::CollectingSink>();
        require_sync::<telemetry::CollectingSink>();

        // Engine surface
        require_send::<engine::EngineConfig>();
        require_sync::<engine::EngineConfig>();
        require_send::<engine::ReplayOutcome>();
        require_sync::<engine::ReplayOutcome>();
    }
}
