//! Data loading utilities for the Tarifa CLI.
//!
//! The core never reads a file or opens a database connection itself —
//! it only ever sees an `Arc<dyn Store>` and, through the factor cache, a
//! synchronous raw-column resolver. Building both of those from a
//! directory of JSON fixtures is exactly the kind of "downloader
//! collaborator" glue §6 calls out of scope for the engine itself; this
//! module is that glue, kept intentionally small, with a real downloader
//! and live database left as a drop-in replacement for [`MemoryStore`].

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use ndarray::Array2;
use serde::Deserialize;
use tarifa_panel::PanelFrame;
use tarifa_traits::{
    AdjustKind, Date, FundamentalSnapshot, HistoricalBar, MemoryStore, Store, Symbol,
    SymbolClassification, TarifaError,
};

/// One row of `bars.json`: a [`HistoricalBar`] plus the symbol it belongs
/// to (the store keys bars by symbol separately from the bar itself).
#[derive(Debug, Deserialize)]
struct BarRecord {
    symbol: Symbol,
    adjust: AdjustKind,
    date: Date,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    amount: f64,
    turnover_rate: f64,
    change_pct: f64,
}

/// One row of `fundamentals.json`.
#[derive(Debug, Deserialize)]
struct FundamentalRecord {
    symbol: Symbol,
    date: Date,
    pe: Option<f64>,
    pb: Option<f64>,
}

/// Populate a fresh [`MemoryStore`] from `<data_dir>/bars.json`,
/// `<data_dir>/classification.json`, and the optional
/// `<data_dir>/fundamentals.json`.
///
/// # Errors
///
/// Returns [`TarifaError::Other`] if `bars.json` or `classification.json`
/// is missing or fails to parse. `fundamentals.json` is optional; its
/// absence seeds no fundamentals rather than failing the load.
pub fn load_store(data_dir: &Path) -> Result<MemoryStore, TarifaError> {
    let store = MemoryStore::new();

    let bars: Vec<BarRecord> = read_json(&data_dir.join("bars.json"))?;
    let mut by_symbol: HashMap<(Symbol, AdjustKind), Vec<HistoricalBar>> = HashMap::new();
    for row in bars {
        by_symbol.entry((row.symbol, row.adjust)).or_default().push(HistoricalBar {
            symbol_adjust: row.adjust,
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            amount: row.amount,
            turnover_rate: row.turnover_rate,
            change_pct: row.change_pct,
        });
    }
    for ((symbol, adjust), rows) in by_symbol {
        store.seed_bars(&symbol, adjust, rows);
    }

    let classification: Vec<SymbolClassification> = read_json(&data_dir.join("classification.json"))?;
    let mut by_type: HashMap<tarifa_traits::AssetType, Vec<SymbolClassification>> = HashMap::new();
    for row in classification {
        by_type.entry(row.asset_type).or_default().push(row);
    }
    for (asset_type, rows) in by_type {
        store.seed_classification(asset_type, rows);
    }

    let fundamentals_path = data_dir.join("fundamentals.json");
    if fundamentals_path.exists() {
        let fundamentals: Vec<FundamentalRecord> = read_json(&fundamentals_path)?;
        let mut by_symbol: HashMap<Symbol, Vec<FundamentalSnapshot>> = HashMap::new();
        for row in fundamentals {
            by_symbol.entry(row.symbol).or_default().push(FundamentalSnapshot { date: row.date, pe: row.pe, pb: row.pb });
        }
        for (symbol, rows) in by_symbol {
            store.seed_fundamentals(&symbol, rows);
        }
    }

    Ok(store)
}

/// Fetch every raw column the factor expression grammar can reference
/// (`tarifa_expr::RAW_COLUMNS`) for `symbols` across `[start, end]`, and
/// build one dense [`PanelFrame`] per column.
///
/// The date axis is the sorted union of every symbol's bar dates in
/// range; a symbol with no bar on a given date gets a `NaN` hole there,
/// matching the panel's documented "non-trading day" semantics.
/// Fundamentals are broadcast forward from their last snapshot, per §3.
///
/// # Errors
///
/// Returns [`TarifaError::MissingDataError`] if no symbol has any bars in
/// range (there would be no date axis to build a panel over).
pub async fn fetch_panels(
    store: &dyn Store,
    symbols: &[Symbol],
    start: Date,
    end: Date,
    adjust: AdjustKind,
) -> Result<HashMap<String, PanelFrame>, TarifaError> {
    let mut bars_by_symbol: HashMap<&Symbol, Vec<HistoricalBar>> = HashMap::new();
    let mut fundamentals_by_symbol: HashMap<&Symbol, Vec<FundamentalSnapshot>> = HashMap::new();

    for symbol in symbols {
        bars_by_symbol.insert(symbol, store.fetch_bars(symbol, start, end, adjust).await?);
        fundamentals_by_symbol.insert(symbol, store.fetch_fundamentals(symbol, start, end).await?);
    }

    let mut dates: Vec<Date> = bars_by_symbol.values().flatten().map(|b| b.date).collect();
    dates.sort();
    dates.dedup();

    if dates.is_empty() {
        return Err(TarifaError::MissingDataError {
            symbol: "*".to_string(),
            message: format!("no bars for any symbol in [{start}, {end}]"),
        });
    }

    let rows = dates.len();
    let cols = symbols.len();
    let mut columns: HashMap<&str, Array2<f64>> = tarifa_expr::RAW_COLUMNS
        .iter()
        .map(|&name| (name, Array2::from_elem((rows, cols), f64::NAN)))
        .collect();

    for (col, symbol) in symbols.iter().enumerate() {
        let mut bar_at: HashMap<Date, &HistoricalBar> = HashMap::new();
        if let Some(bars) = bars_by_symbol.get(symbol) {
            for bar in bars {
                bar_at.insert(bar.date, bar);
            }
        }

        let mut last_pe: Option<f64> = None;
        let mut last_pb: Option<f64> = None;
        let mut fundamental_idx = 0usize;
        let fundamentals = fundamentals_by_symbol.get(symbol).map(Vec::as_slice).unwrap_or_default();

        for (row, &date) in dates.iter().enumerate() {
            while fundamental_idx < fundamentals.len() && fundamentals[fundamental_idx].date <= date {
                last_pe = fundamentals[fundamental_idx].pe.or(last_pe);
                last_pb = fundamentals[fundamental_idx].pb.or(last_pb);
                fundamental_idx += 1;
            }

            if let Some(bar) = bar_at.get(&date) {
                columns.get_mut("close").unwrap()[[row, col]] = bar.close;
                columns.get_mut("open").unwrap()[[row, col]] = bar.open;
                columns.get_mut("high").unwrap()[[row, col]] = bar.high;
                columns.get_mut("low").unwrap()[[row, col]] = bar.low;
                columns.get_mut("volume").unwrap()[[row, col]] = bar.volume;
                columns.get_mut("amount").unwrap()[[row, col]] = bar.amount;
                columns.get_mut("turnover_rate").unwrap()[[row, col]] = bar.turnover_rate;
            }
            if let Some(pe) = last_pe {
                columns.get_mut("pe").unwrap()[[row, col]] = pe;
            }
            if let Some(pb) = last_pb {
                columns.get_mut("pb").unwrap()[[row, col]] = pb;
            }
        }
    }

    columns
        .into_iter()
        .map(|(name, data)| {
            let frame = PanelFrame::new(dates.clone(), symbols.to_vec(), data)?;
            Ok((name.to_string(), frame))
        })
        .collect()
}

/// Wrap `panels` in a synchronous [`tarifa_expr::ColumnResolver`] closure,
/// the form the factor cache needs.
#[must_use]
pub fn resolver_from(panels: HashMap<String, PanelFrame>) -> impl Fn(&str) -> Result<PanelFrame, TarifaError> + Sync {
    move |name: &str| -> Result<PanelFrame, TarifaError> {
        panels
            .get(name)
            .cloned()
            .ok_or_else(|| TarifaError::MissingDataError { symbol: "*".to_string(), message: format!("no raw column '{name}'") })
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, TarifaError> {
    let bytes = std::fs::read(path).map_err(|e| TarifaError::Other(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes).map_err(|e| TarifaError::Other(format!("cannot parse {}: {e}", path.display())))
}

/// Parse a date string in `YYYY-MM-DD` format.
pub fn parse_date(date_str: &str) -> Result<NaiveDate, TarifaError> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|e| TarifaError::Other(format!("invalid date '{date_str}': {e}")))
}
