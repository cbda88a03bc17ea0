// Persistence: params JSON, trade/performance/per-trade CSV exports.
// Every write goes through a temp-file-then-rename so readers never observe
// a half-written file.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{info, warn};
use tempfile::NamedTempFile;

use crate::backtesting::executor::TradeEvent;
use crate::backtesting::lot_book::ClosedTrade;
use crate::backtesting::metrics::{EquityCurve, PerfRow};
use crate::backtesting::selector::SmaParams;
use crate::error::Result;

/// NaN-aware cell formatting: undefined values serialize as empty cells.
fn fmt_cell(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        format!("{}", v)
    }
}

/// Write `contents` to `path` atomically: the bytes land in a temp file in
/// the destination directory and are renamed into place.
fn atomic_write_bytes(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }
    let tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))?;
    fs::write(tmp.path(), contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Save the per-ticker (short, long) windows as JSON.
pub fn save_per_ticker_params(params: &SmaParams, path: &Path) -> Result<()> {
    let serial: BTreeMap<&str, [usize; 2]> = params
        .iter()
        .map(|(t, &(s, l))| (t.as_str(), [s, l]))
        .collect();
    let json = serde_json::to_string_pretty(&serial)?;
    atomic_write_bytes(path, json.as_bytes())?;
    info!("saved per-ticker params to {}", path.display());
    Ok(())
}

/// Load previously saved windows. None when the file does not exist or
/// cannot be parsed; individually invalid entries (windows < 2, or
/// short ≥ long) are dropped with a warning.
pub fn load_per_ticker_params(path: &Path) -> Option<SmaParams> {
    if !path.exists() {
        info!("no saved per-ticker params found at {}", path.display());
        return None;
    }
    let raw = match fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to read params at {}: {}", path.display(), e);
            return None;
        }
    };
    let parsed: BTreeMap<String, Vec<usize>> = match serde_json::from_str(&raw) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse params at {}: {}", path.display(), e);
            return None;
        }
    };

    let mut cleaned = SmaParams::new();
    for (ticker, windows) in parsed {
        match windows.as_slice() {
            [s, l, ..] if *s >= 2 && *l >= 2 && s < l => {
                cleaned.insert(ticker, (*s, *l));
            }
            _ => warn!("dropping invalid params for {}: {:?}", ticker, windows),
        }
    }
    info!(
        "loaded per-ticker params from {} (tickers: {})",
        path.display(),
        cleaned.len()
    );
    Some(cleaned)
}

/// Export the chronological event ledger.
/// Columns: Date,Ticker,Type,Price,Shares,Cash_after.
pub fn export_trade_history(events: &[TradeEvent], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["Date", "Ticker", "Type", "Price", "Shares", "Cash_after"])?;
    for e in events {
        wtr.write_record([
            e.date.to_string(),
            e.ticker.clone(),
            e.side.as_str().to_string(),
            fmt_cell(e.price),
            fmt_cell(e.shares),
            fmt_cell(e.cash_after),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    atomic_write_bytes(path, &bytes)?;
    info!("exported trade history to {}", path.display());
    Ok(())
}

/// Export the performance table (per-ticker rows plus `_PORTFOLIO_`).
pub fn export_performance_metrics(perf: &[PerfRow], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "Ticker",
        "NTrades",
        "WinRate",
        "Realized_pnl",
        "PNL",
        "Avg_realized_pnl",
        "ProfitFactor",
        "Remaining_share_value",
        "FinalCash",
        "FinalEquity",
        "CAGR",
        "Sharpe",
        "MaxDrawdown",
        "Calmar",
    ])?;
    for row in perf {
        wtr.write_record([
            row.ticker.clone(),
            row.n_trades.to_string(),
            fmt_cell(row.win_rate),
            fmt_cell(row.realized_pnl),
            fmt_cell(row.pnl),
            fmt_cell(row.avg_realized_pnl),
            fmt_cell(row.profit_factor),
            fmt_cell(row.remaining_share_value),
            fmt_cell(row.final_cash),
            fmt_cell(row.final_equity),
            fmt_cell(row.cagr),
            fmt_cell(row.sharpe),
            fmt_cell(row.max_drawdown),
            fmt_cell(row.calmar),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    atomic_write_bytes(path, &bytes)?;
    info!("exported performance metrics to {}", path.display());
    Ok(())
}

/// Export the FIFO-paired per-trade ledger.
pub fn export_per_trade_summary(trades: &[ClosedTrade], path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record([
        "Ticker",
        "EntryDate",
        "ExitDate",
        "EntryPrice",
        "ExitPrice",
        "Shares",
        "RealizedPNL",
        "HoldingDays",
    ])?;
    for t in trades {
        wtr.write_record([
            t.ticker.clone(),
            t.entry_date.to_string(),
            t.exit_date.to_string(),
            fmt_cell(t.entry_price),
            fmt_cell(t.exit_price),
            fmt_cell(t.shares),
            fmt_cell(t.realized_pnl),
            t.holding_days.to_string(),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    atomic_write_bytes(path, &bytes)?;
    info!("exported per-trade summary to {}", path.display());
    Ok(())
}

/// Export daily portfolio returns derived from the equity curve.
/// The first day has no prior sample, so its return is 0.0.
pub fn export_daily_returns(curve: &EquityCurve, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(["Date", "Equity", "DailyReturn"])?;
    for i in 0..curve.len() {
        let ret = if i == 0 {
            0.0
        } else {
            curve.equity[i] / curve.equity[i - 1] - 1.0
        };
        wtr.write_record([
            curve.dates[i].to_string(),
            fmt_cell(curve.equity[i]),
            fmt_cell(ret),
        ])?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    atomic_write_bytes(path, &bytes)?;
    info!("exported daily returns to {}", path.display());
    Ok(())
}
