//! TickLab CLI — replay and sample-data commands.
//!
//! Commands:
//! - `run` — execute a replay from a TOML config file, write result artifacts
//! - `synth` — generate sample tick Parquet files in the data layout

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use ticklab_core::engine::ExecutionMode;
use ticklab_core::sync::ShutdownFlag;
use ticklab_core::telemetry::EventSink;
use ticklab_runner::config::{ReplayConfig, SyntheticParams};
use ticklab_runner::data_loader::{synthetic_ticks_frame, write_ticks_parquet};
use ticklab_runner::export::{export_equity_csv, export_json, export_trades_csv};
use ticklab_runner::runner::run_from_config;
use ticklab_runner::TracingSink;

#[derive(Parser)]
#[command(
    name = "ticklab",
    about = "TickLab CLI — deterministic historical-replay engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a replay from a TOML config file.
    Run {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Override the execution mode from the config.
        #[arg(long, value_parser = parse_mode)]
        mode: Option<ExecutionMode>,

        /// Output directory for result artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Generate seeded sample tick data in the data directory layout.
    Synth {
        /// Symbols to generate (e.g., EURUSD GBPUSD).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Data directory. Defaults to ./data.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// Number of ticks per symbol.
        #[arg(long, default_value_t = 100_000)]
        events: usize,

        /// Milliseconds between ticks.
        #[arg(long, default_value_t = 1_000)]
        interval_ms: i64,

        /// Base RNG seed (mixed with each symbol).
        #[arg(long, default_value_t = 7)]
        seed: u64,
    },
}

fn parse_mode(s: &str) -> std::result::Result<ExecutionMode, String> {
    match s {
        "sequential" => Ok(ExecutionMode::Sequential),
        "barrier" => Ok(ExecutionMode::Barrier),
        other => Err(format!("unknown mode '{other}' (sequential|barrier)")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            mode,
            output_dir,
        } => run_replay_cmd(&config, mode, &output_dir),
        Commands::Synth {
            symbols,
            data_dir,
            events,
            interval_ms,
            seed,
        } => run_synth_cmd(&symbols, &data_dir, events, interval_ms, seed),
    }
}

fn run_replay_cmd(
    config_path: &PathBuf,
    mode: Option<ExecutionMode>,
    output_dir: &PathBuf,
) -> Result<()> {
    let mut config = ReplayConfig::from_path(config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    if let Some(mode) = mode {
        config.replay.mode = mode;
    }

    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let result = run_from_config(&config, sink, ShutdownFlag::new())?;

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    let json_path = output_dir.join("result.json");
    std::fs::write(&json_path, export_json(&result)?)?;
    std::fs::write(
        output_dir.join("trades.csv"),
        export_trades_csv(&result.trades)?,
    )?;
    std::fs::write(
        output_dir.join("equity.csv"),
        export_equity_csv(&result.equity_curve)?,
    )?;

    let stats = &result.statistics;
    println!(
        "replayed {} events over {} steps ({} instruments, {} skipped)",
        result.events_processed,
        result.steps_completed,
        result.symbols.len(),
        result.skipped.len(),
    );
    println!(
        "trades: {} (win rate {:.1}%, profit factor {:.2})",
        stats.closed_trades,
        stats.win_rate * 100.0,
        stats.profit_factor,
    );
    println!(
        "balance: {:.2} -> {:.2} | fingerprint {}",
        result.initial_balance,
        stats.balance,
        &result.fingerprint[..16],
    );
    println!("artifacts written to {}", output_dir.display());
    Ok(())
}

fn run_synth_cmd(
    symbols: &[String],
    data_dir: &PathBuf,
    events: usize,
    interval_ms: i64,
    seed: u64,
) -> Result<()> {
    let params = SyntheticParams {
        events,
        interval_ms,
        seed,
    };
    for symbol in symbols {
        let mut frame = synthetic_ticks_frame(symbol, &params);
        let path = write_ticks_parquet(data_dir, symbol, &mut frame)
            .with_context(|| format!("writing ticks for {symbol}"))?;
        println!("wrote {} ticks to {}", events, path.display());
    }
    Ok(())
}
