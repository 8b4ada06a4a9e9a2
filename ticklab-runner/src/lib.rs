//! TickLab Runner — replay orchestration on top of `ticklab-core`.
//!
//! This crate provides:
//! - TOML configuration (instruments, limits, engine mode, data layout)
//! - Market-data loading from Parquet with a synthetic fallback
//! - Built-in demo strategies and the config-to-strategy factory
//! - The end-to-end runner producing a `ReplayResult`
//! - JSON/CSV export with schema versioning
//! - A tracing-backed telemetry sink

pub mod config;
pub mod data_loader;
pub mod export;
pub mod logging;
pub mod result;
pub mod runner;
pub mod strategies;

pub use config::{ConfigError, DataSection, InstrumentConfig, ReplayConfig, ReplaySection};
pub use data_loader::{load_instruments, DataError, DataSource, LoadedData, LoadedInstrument};
pub use export::{export_equity_csv, export_json, export_trades_csv, import_json};
pub use logging::TracingSink;
pub use result::{ReplayResult, SCHEMA_VERSION};
pub use runner::{run_from_config, run_from_data, RunError};
pub use strategies::{build_strategy, StrategyConfig};
