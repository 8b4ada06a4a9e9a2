//! Event timeline: bulk tick ingestion and the k-way merged global sequence.

mod builder;
mod convert;

pub use builder::{EventTimeline, InstrumentCursor, Step, TimelineBuilder};
pub use convert::ticks_from_dataframe;

use thiserror::Error;

/// Errors from timeline construction.
#[derive(Debug, Error)]
pub enum TimelineError {
    #[error("missing column '{0}'")]
    MissingColumn(String),

    #[error("column '{column}' has wrong type: {source}")]
    ColumnType {
        column: String,
        source: polars::prelude::PolarsError,
    },

    #[error("column '{0}' contains null values")]
    NullValues(String),

    #[error("unsupported dtype for 'time' column: {0}")]
    TimeDtype(String),

    #[error("tick source for '{symbol}' is not time-ordered at row {row}")]
    UnsortedSource { symbol: String, row: usize },

    #[error("timeline has no events")]
    Empty,
}
