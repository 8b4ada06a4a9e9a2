//! Market-data loading for the runner.
//!
//! Layout under the data directory:
//! `{dir}/{SYMBOL}/ticks.parquet` — tick source (`time`, `bid`, `ask`, `volume`)
//! `{dir}/{SYMBOL}/candles_{TF}.parquet` — optional pre-bucketed bars
//!
//! Policy: an instrument with a missing or unreadable tick source is skipped
//! with a warning and an `InstrumentSkipped` event — never fatal. With
//! `synthetic` enabled, such instruments get seeded random-walk ticks
//! instead, and the run is tagged as synthetic.

use crate::config::{InstrumentConfig, ReplayConfig, SyntheticParams};
use chrono::{TimeZone, Utc};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use ticklab_core::domain::{Candle, Timeframe};
use ticklab_core::telemetry::{EventSink, ReplayEvent};

/// Errors from reading or writing market-data files.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("write {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}': {message}")]
    Column { column: String, message: String },
}

/// Where an instrument's ticks came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Parquet,
    Synthetic,
}

/// One instrument ready for timeline registration.
#[derive(Debug)]
pub struct LoadedInstrument {
    pub config: InstrumentConfig,
    pub ticks: DataFrame,
    /// Pre-bucketed bars per configured timeframe, where a file existed.
    pub candles: Vec<(Timeframe, Vec<Candle>)>,
    pub source: DataSource,
    /// blake3 of the source file bytes (or of the synthetic recipe).
    pub source_hash: String,
}

/// Everything the runner loaded, in configuration order.
#[derive(Debug)]
pub struct LoadedData {
    pub instruments: Vec<LoadedInstrument>,
    pub skipped: Vec<String>,
    /// Combined blake3 over the per-instrument hashes, in order.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

pub fn ticks_path(dir: &Path, symbol: &str) -> PathBuf {
    dir.join(symbol).join("ticks.parquet")
}

pub fn candles_path(dir: &Path, symbol: &str, timeframe: Timeframe) -> PathBuf {
    dir.join(symbol).join(format!("candles_{timeframe}.parquet"))
}

/// Load every configured instrument, in parallel, preserving config order.
pub fn load_instruments(config: &ReplayConfig, sink: &dyn EventSink) -> LoadedData {
    // Candle files are wanted for the preloaded timeframes and, as window
    // seed, for the base timeframe.
    let mut wanted_timeframes = config.replay.preloaded_timeframes.clone();
    wanted_timeframes.push(config.replay.base_timeframe);

    let results: Vec<Result<LoadedInstrument, String>> = config
        .instruments
        .par_iter()
        .map(|instrument| load_one(instrument, config, &wanted_timeframes))
        .collect();

    let mut instruments = Vec::new();
    let mut skipped = Vec::new();
    let mut has_synthetic = false;
    let mut hasher = blake3::Hasher::new();
    for (instrument, result) in config.instruments.iter().zip(results) {
        match result {
            Ok(loaded) => {
                has_synthetic |= loaded.source == DataSource::Synthetic;
                hasher.update(loaded.source_hash.as_bytes());
                instruments.push(loaded);
            }
            Err(reason) => {
                tracing::warn!(symbol = %instrument.symbol, %reason, "skipping instrument");
                sink.emit(&ReplayEvent::InstrumentSkipped {
                    symbol: instrument.symbol.clone(),
                    reason,
                });
                skipped.push(instrument.symbol.clone());
            }
        }
    }

    LoadedData {
        instruments,
        skipped,
        dataset_hash: hasher.finalize().to_hex().to_string(),
        has_synthetic,
    }
}

fn load_one(
    instrument: &InstrumentConfig,
    config: &ReplayConfig,
    wanted_timeframes: &[Timeframe],
) -> Result<LoadedInstrument, String> {
    let dir = &config.data.dir;
    let path = ticks_path(dir, &instrument.symbol);

    let (ticks, source, source_hash) = if path.is_file() {
        let bytes = std::fs::read(&path).map_err(|e| format!("read {}: {e}", path.display()))?;
        let frame = ParquetReader::new(std::io::Cursor::new(&bytes))
            .finish()
            .map_err(|e| format!("parse {}: {e}", path.display()))?;
        let hash = blake3::hash(&bytes).to_hex().to_string();
        (frame, DataSource::Parquet, hash)
    } else if config.data.synthetic {
        tracing::warn!(
            symbol = %instrument.symbol,
            "no tick source, generating synthetic data — results will be tagged"
        );
        let params = &config.data.synthetic_params;
        let frame = synthetic_ticks_frame(&instrument.symbol, params);
        let mut hasher = blake3::Hasher::new();
        hasher.update(instrument.symbol.as_bytes());
        hasher.update(&params.seed.to_le_bytes());
        hasher.update(&(params.events as u64).to_le_bytes());
        hasher.update(&params.interval_ms.to_le_bytes());
        (
            frame,
            DataSource::Synthetic,
            hasher.finalize().to_hex().to_string(),
        )
    } else {
        return Err(format!("no tick source at {}", path.display()));
    };

    // Candle files are optional per timeframe; a bad file only costs that
    // timeframe, not the instrument.
    let mut candles = Vec::new();
    for &timeframe in wanted_timeframes {
        let path = candles_path(dir, &instrument.symbol, timeframe);
        if !path.is_file() {
            continue;
        }
        match read_candles(&path, timeframe) {
            Ok(bars) => candles.push((timeframe, bars)),
            Err(e) => {
                tracing::warn!(
                    symbol = %instrument.symbol,
                    %timeframe,
                    error = %e,
                    "ignoring unreadable candle file"
                );
            }
        }
    }

    Ok(LoadedInstrument {
        config: instrument.clone(),
        ticks,
        candles,
        source,
        source_hash,
    })
}

fn read_candles(path: &Path, timeframe: Timeframe) -> Result<Vec<Candle>, DataError> {
    let file = std::fs::File::open(path).map_err(|e| DataError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let frame = ParquetReader::new(file).finish().map_err(|e| DataError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    candles_from_dataframe(&frame, timeframe)
}

/// Bulk conversion of a pre-bucketed bar frame
/// (`time`, `open`, `high`, `low`, `close`, `volume`).
pub fn candles_from_dataframe(
    df: &DataFrame,
    timeframe: Timeframe,
) -> Result<Vec<Candle>, DataError> {
    let time = time_millis(df)?;
    let open = f64_column(df, "open")?;
    let high = f64_column(df, "high")?;
    let low = f64_column(df, "low")?;
    let close = f64_column(df, "close")?;
    let volume = f64_column(df, "volume")?;

    let mut candles = Vec::with_capacity(df.height());
    for (i, ms) in time.into_iter().enumerate() {
        candles.push(Candle {
            timeframe,
            open_time: Utc.timestamp_millis_opt(ms).unwrap(),
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(0.0),
        });
    }
    Ok(candles)
}

fn time_millis(df: &DataFrame) -> Result<Vec<i64>, DataError> {
    let time = df
        .column("time")
        .map_err(|_| DataError::MissingColumn("time".into()))?;
    let divisor = match time.dtype() {
        DataType::Datetime(TimeUnit::Milliseconds, _) => 1,
        DataType::Datetime(TimeUnit::Microseconds, _) => 1_000,
        DataType::Datetime(TimeUnit::Nanoseconds, _) => 1_000_000,
        DataType::Int64 => 1,
        other => {
            return Err(DataError::Column {
                column: "time".into(),
                message: format!("unsupported dtype {other}"),
            })
        }
    };
    let cast = time.cast(&DataType::Int64).map_err(|e| DataError::Column {
        column: "time".into(),
        message: e.to_string(),
    })?;
    let ca = cast.i64().map_err(|e| DataError::Column {
        column: "time".into(),
        message: e.to_string(),
    })?;
    if ca.null_count() > 0 {
        return Err(DataError::Column {
            column: "time".into(),
            message: "null values".into(),
        });
    }
    Ok(ca.into_no_null_iter().map(|ms| ms / divisor).collect())
}

fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked, DataError> {
    df.column(name)
        .map_err(|_| DataError::MissingColumn(name.into()))?
        .f64()
        .map_err(|e| DataError::Column {
            column: name.into(),
            message: e.to_string(),
        })
}

/// Seeded random-walk tick frame for one symbol.
///
/// The seed mixes the configured base seed with the symbol so instruments
/// differ but every run over the same config is identical.
pub fn synthetic_ticks_frame(symbol: &str, params: &SyntheticParams) -> DataFrame {
    let mut seed_bytes = [0u8; 8];
    seed_bytes.copy_from_slice(&blake3::hash(symbol.as_bytes()).as_bytes()[..8]);
    let seed = params.seed ^ u64::from_le_bytes(seed_bytes);
    let mut rng = StdRng::seed_from_u64(seed);

    let start_ms = Utc
        .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
        .unwrap()
        .timestamp_millis();
    let mut price = 1.0 + (seed % 1000) as f64 * 0.001;
    let mut times = Vec::with_capacity(params.events);
    let mut bids = Vec::with_capacity(params.events);
    let mut asks = Vec::with_capacity(params.events);
    let mut volumes = Vec::with_capacity(params.events);
    for i in 0..params.events {
        price += rng.gen_range(-10..=10) as f64 * 0.0001;
        price = price.max(0.1);
        times.push(start_ms + i as i64 * params.interval_ms);
        bids.push(price);
        asks.push(price + 0.0002);
        volumes.push(rng.gen_range(1..=5) as f64);
    }

    df!(
        "time" => times,
        "bid" => bids,
        "ask" => asks,
        "volume" => volumes,
    )
    .expect("synthetic columns have equal length")
}

/// Write a tick frame to its place in the data directory layout.
pub fn write_ticks_parquet(dir: &Path, symbol: &str, frame: &mut DataFrame) -> Result<PathBuf, DataError> {
    let path = ticks_path(dir, symbol);
    let parent = path.parent().expect("tick path has a parent");
    std::fs::create_dir_all(parent).map_err(|e| DataError::Write {
        path: path.clone(),
        message: e.to_string(),
    })?;
    let file = std::fs::File::create(&path).map_err(|e| DataError::Write {
        path: path.clone(),
        message: e.to_string(),
    })?;
    ParquetWriter::new(file)
        .finish(frame)
        .map_err(|e| DataError::Write {
            path: path.clone(),
            message: e.to_string(),
        })?;
    Ok(path)
}
