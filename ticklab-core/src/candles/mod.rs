//! Candle aggregation: bounded rolling windows per timeframe with
//! incremental or preloaded build modes and a materialized-view cache.

mod aggregator;
mod window;

pub use aggregator::CandleAggregator;
pub use window::RollingWindow;
