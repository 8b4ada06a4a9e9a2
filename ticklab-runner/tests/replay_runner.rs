//! End-to-end runner tests over synthetic and on-disk data.

use std::sync::Arc;
use ticklab_core::sync::ShutdownFlag;
use ticklab_core::telemetry::{CollectingSink, EventSink, ReplayEvent};
use ticklab_runner::config::ReplayConfig;
use ticklab_runner::data_loader::{synthetic_ticks_frame, write_ticks_parquet};
use ticklab_runner::export::{export_json, export_trades_csv, import_json};
use ticklab_runner::runner::{run_from_config, RunError};

fn synthetic_config(mode: &str) -> ReplayConfig {
    let text = format!(
        r#"
[replay]
initial_balance = 100000.0
mode = "{mode}"
progress_every_steps = 5000

[data]
dir = "/nonexistent/ticklab-test-data"
synthetic = true
synthetic_params = {{ events = 6000, interval_ms = 1000, seed = 99 }}

[[instruments]]
symbol = "EURUSD"

[instruments.strategy]
type = "ma_cross"
timeframe = "M1"
fast = 5
slow = 20
volume = 0.1
stop_offset = 0.0030
take_profit_offset = 0.0045

[[instruments]]
symbol = "GBPUSD"
"#
    );
    ReplayConfig::from_toml(&text).unwrap()
}

#[test]
fn synthetic_end_to_end() {
    let config = synthetic_config("sequential");
    let sink = Arc::new(CollectingSink::new());
    let result = run_from_config(
        &config,
        sink.clone() as Arc<dyn EventSink>,
        ShutdownFlag::new(),
    )
    .unwrap();

    assert_eq!(result.symbols, vec!["EURUSD", "GBPUSD"]);
    assert!(result.skipped.is_empty());
    assert!(result.has_synthetic);
    assert!(!result.cancelled);
    assert_eq!(result.events_processed, 12_000);

    // Accounting identity: final balance is the initial balance plus the
    // realized profit of every closed trade.
    let expected_balance = result.initial_balance + result.realized_profit();
    assert!((result.statistics.balance - expected_balance).abs() < 1e-6);
    // The book is flat after end-of-replay liquidation.
    assert_eq!(result.statistics.open_positions, 0);
    assert!((result.final_equity() - result.statistics.balance).abs() < 1e-6);

    // Progress events were emitted periodically, ending at 100%.
    let fractions: Vec<f64> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            ReplayEvent::Progress { fraction, .. } => Some(*fraction),
            _ => None,
        })
        .collect();
    assert!(!fractions.is_empty());
    assert_eq!(*fractions.last().unwrap(), 1.0);
}

#[test]
fn runner_output_is_deterministic_across_modes() {
    let run = |mode: &str| {
        let config = synthetic_config(mode);
        run_from_config(
            &config,
            Arc::new(CollectingSink::new()) as Arc<dyn EventSink>,
            ShutdownFlag::new(),
        )
        .unwrap()
    };

    let sequential = run("sequential");
    let sequential_again = run("sequential");
    let barrier = run("barrier");

    assert_eq!(sequential.fingerprint, sequential_again.fingerprint);
    assert_eq!(sequential.fingerprint, barrier.fingerprint);
    assert_eq!(sequential.dataset_hash, barrier.dataset_hash);
}

#[test]
fn result_exports_roundtrip() {
    let config = synthetic_config("sequential");
    let result = run_from_config(
        &config,
        Arc::new(CollectingSink::new()) as Arc<dyn EventSink>,
        ShutdownFlag::new(),
    )
    .unwrap();

    let json = export_json(&result).unwrap();
    let restored = import_json(&json).unwrap();
    assert_eq!(restored.fingerprint, result.fingerprint);
    assert_eq!(restored.trades.len(), result.trades.len());

    let csv = export_trades_csv(&result.trades).unwrap();
    assert_eq!(csv.lines().count(), result.trades.len() + 1);
}

#[test]
fn missing_instrument_is_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let params = ticklab_runner::config::SyntheticParams {
        events: 500,
        interval_ms: 1000,
        seed: 5,
    };
    let mut frame = synthetic_ticks_frame("EURUSD", &params);
    write_ticks_parquet(dir.path(), "EURUSD", &mut frame).unwrap();

    let text = format!(
        r#"
[replay]
initial_balance = 100000.0

[data]
dir = "{}"

[[instruments]]
symbol = "EURUSD"

[[instruments]]
symbol = "GBPUSD"
"#,
        dir.path().display()
    );
    let config = ReplayConfig::from_toml(&text).unwrap();
    let sink = Arc::new(CollectingSink::new());
    let result = run_from_config(
        &config,
        sink.clone() as Arc<dyn EventSink>,
        ShutdownFlag::new(),
    )
    .unwrap();

    assert_eq!(result.symbols, vec!["EURUSD"]);
    assert_eq!(result.skipped, vec!["GBPUSD"]);
    assert!(!result.has_synthetic);
    assert_eq!(result.events_processed, 500);

    let skipped_events = sink
        .events()
        .iter()
        .filter(|e| matches!(e, ReplayEvent::InstrumentSkipped { symbol, .. } if symbol == "GBPUSD"))
        .count();
    assert_eq!(skipped_events, 1);
}

#[test]
fn all_instruments_missing_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let text = format!(
        r#"
[replay]
initial_balance = 100000.0

[data]
dir = "{}"

[[instruments]]
symbol = "EURUSD"
"#,
        dir.path().display()
    );
    let config = ReplayConfig::from_toml(&text).unwrap();
    let result = run_from_config(
        &config,
        Arc::new(CollectingSink::new()) as Arc<dyn EventSink>,
        ShutdownFlag::new(),
    );
    assert!(matches!(result, Err(RunError::NoInstruments(_))));
}
