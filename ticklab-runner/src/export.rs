//! Result export — JSON and CSV artifact generation.
//!
//! JSON is the full round-trip format with schema versioning; the trade tape
//! and equity curve additionally export as CSV for external analysis tools.
//! Unknown schema versions are rejected on load.

use anyhow::{bail, Context, Result};
use ticklab_core::domain::{AccountState, ClosedTrade};

use crate::result::{ReplayResult, SCHEMA_VERSION};

// ─── JSON ───────────────────────────────────────────────────────────

/// Serialize a `ReplayResult` to pretty JSON.
pub fn export_json(result: &ReplayResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize ReplayResult to JSON")
}

/// Deserialize a `ReplayResult`, rejecting newer schema versions.
pub fn import_json(json: &str) -> Result<ReplayResult> {
    let result: ReplayResult =
        serde_json::from_str(json).context("failed to deserialize ReplayResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Export the trade tape as CSV.
///
/// Columns: ticket, symbol, side, volume, open_time, open_price, close_time,
/// close_price, close_reason, profit, magic, comment
pub fn export_trades_csv(trades: &[ClosedTrade]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "ticket",
        "symbol",
        "side",
        "volume",
        "open_time",
        "open_price",
        "close_time",
        "close_price",
        "close_reason",
        "profit",
        "magic",
        "comment",
    ])?;
    for trade in trades {
        wtr.write_record([
            trade.ticket.to_string(),
            trade.symbol.clone(),
            format!("{:?}", trade.side),
            trade.volume.to_string(),
            trade.open_time.to_rfc3339(),
            trade.open_price.to_string(),
            trade.close_time.to_rfc3339(),
            trade.close_price.to_string(),
            trade.close_reason.to_string(),
            trade.profit.to_string(),
            trade.magic.to_string(),
            trade.comment.clone(),
        ])?;
    }
    let bytes = wtr.into_inner().context("csv writer flush")?;
    String::from_utf8(bytes).context("csv output is not UTF-8")
}

/// Export the equity curve as CSV (time, balance, equity).
pub fn export_equity_csv(curve: &[AccountState]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "balance", "equity"])?;
    for point in curve {
        wtr.write_record([
            point.time.to_rfc3339(),
            point.balance.to_string(),
            point.equity.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().context("csv writer flush")?;
    String::from_utf8(bytes).context("csv output is not UTF-8")
}
