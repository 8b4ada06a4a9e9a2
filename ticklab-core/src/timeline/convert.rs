//! Bulk columnar-to-tick conversion.
//!
//! Ingestion throughput must stay within the same order of magnitude as the
//! columnar source size, so conversion is done over whole column chunks with
//! zipped iterators — never with per-row `get` calls.

use super::TimelineError;
use crate::domain::{InstrumentIdx, Tick};
use chrono::{TimeZone, Utc};
use polars::prelude::*;

/// Millisecond scale factor for a datetime time unit.
fn ms_divisor(unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Milliseconds => 1,
        TimeUnit::Microseconds => 1_000,
        TimeUnit::Nanoseconds => 1_000_000,
    }
}

/// Convert a tick DataFrame (`time`, `bid`, `ask`, `volume`) into a tick vector.
///
/// The `time` column may be a Datetime of any unit or a raw Int64 of epoch
/// milliseconds. Null values in any column are an error — quote feeds do not
/// have holes, and a null here means the source file is broken.
pub fn ticks_from_dataframe(
    df: &DataFrame,
    instrument: InstrumentIdx,
) -> Result<Vec<Tick>, TimelineError> {
    let time = column(df, "time")?;
    let bid = f64_column(df, "bid")?;
    let ask = f64_column(df, "ask")?;
    let volume = f64_column(df, "volume")?;

    // Normalize the time column to epoch milliseconds, one cast over the
    // whole column rather than per-row arithmetic.
    let divisor = match time.dtype() {
        DataType::Datetime(unit, _) => ms_divisor(*unit),
        DataType::Int64 => 1,
        other => return Err(TimelineError::TimeDtype(other.to_string())),
    };
    let time_phys = time
        .cast(&DataType::Int64)
        .map_err(|e| TimelineError::ColumnType {
            column: "time".into(),
            source: e,
        })?;
    let time_ca = time_phys.i64().map_err(|e| TimelineError::ColumnType {
        column: "time".into(),
        source: e,
    })?;
    if time_ca.null_count() > 0 {
        return Err(TimelineError::NullValues("time".into()));
    }

    let mut ticks = Vec::with_capacity(df.height());
    for (((ms, bid), ask), volume) in time_ca
        .into_no_null_iter()
        .zip(bid.into_no_null_iter())
        .zip(ask.into_no_null_iter())
        .zip(volume.into_no_null_iter())
    {
        ticks.push(Tick {
            instrument,
            time: Utc.timestamp_millis_opt(ms / divisor).unwrap(),
            bid,
            ask,
            volume,
        });
    }
    Ok(ticks)
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column, TimelineError> {
    df.column(name)
        .map_err(|_| TimelineError::MissingColumn(name.into()))
}

fn f64_column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Float64Chunked, TimelineError> {
    let col = column(df, name)?;
    let ca = col.f64().map_err(|e| TimelineError::ColumnType {
        column: name.into(),
        source: e,
    })?;
    if ca.null_count() > 0 {
        return Err(TimelineError::NullValues(name.into()));
    }
    Ok(ca)
}
