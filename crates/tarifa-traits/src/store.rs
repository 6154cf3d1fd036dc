//! The `Store` persistence boundary.
//!
//! The core never opens a database connection itself; it receives an
//! `Arc<dyn Store>` (see §9 "Cross-cutting I/O objects"). The relational
//! schema and its migrations are out of scope — this trait only pins down
//! the logical operations in §6 so the core is testable against
//! [`MemoryStore`] without a live database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::BacktestReport;
use crate::signal::Signal;
use crate::types::{AdjustKind, AssetType, Date, Symbol};

/// One day of OHLCV plus amount/turnover for one symbol (§3 "Historical Bar").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoricalBar {
    pub symbol_adjust: AdjustKind,
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: f64,
    pub turnover_rate: f64,
    pub change_pct: f64,
}

/// A sparse fundamental reading for one symbol on one date (§3 "Fundamental
/// Snapshot"). Remaining fields beyond PE/PB are reserved and may be absent
/// entirely from a given upstream payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub date: Date,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
}

/// Status flags and listing metadata read from `stock_metadata` (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolClassification {
    pub symbol: Symbol,
    pub asset_type: AssetType,
    pub list_date: Date,
    pub is_st: bool,
    pub is_suspend: bool,
    /// `None` when the upstream row has no market-cap figure; market-cap
    /// banding in the smart filter is disabled for such symbols.
    pub total_mv: Option<f64>,
}

/// The persistence boundary the signal generator and both backtesters are
/// handed, per §9's "pass a `Store` handle in" design note.
///
/// Every method maps to one logical table/operation in §6. Implementations
/// are expected to apply the idempotent "insert-if-absent by `(symbol,
/// date)`" rule for bar/fundamental writes and to upsert reports by their
/// identity tuple; [`MemoryStore`] does both.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch bars for `symbol` within `[start, end]` on the given
    /// adjustment series. Returns an empty vector (not an error) when the
    /// symbol has no bars at all in range — callers turn that into
    /// [`crate::error::TarifaError::MissingDataError`] themselves, since
    /// only they know whether the gap is fatal.
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: Date,
        end: Date,
        adjust: AdjustKind,
    ) -> Result<Vec<HistoricalBar>>;

    /// Fetch the sparse fundamental history for `symbol` within `[start,
    /// end]`.
    async fn fetch_fundamentals(
        &self,
        symbol: &str,
        start: Date,
        end: Date,
    ) -> Result<Vec<FundamentalSnapshot>>;

    /// Fetch classification/status metadata for every known symbol of the
    /// given asset type.
    async fn fetch_symbol_classification(
        &self,
        asset_type: AssetType,
    ) -> Result<Vec<SymbolClassification>>;

    /// Upsert signals into the `trader` table, keyed by `(symbol,
    /// signal_date, signal_type)`.
    async fn upsert_signals(&self, signals: &[Signal]) -> Result<()>;

    /// Upsert a backtest report, keyed by its identity tuple (§3).
    async fn upsert_report(&self, report: &BacktestReport) -> Result<()>;

    /// Load the most recently stored report for `(task_name, version,
    /// start, end)`, if any.
    async fn load_report(
        &self,
        task_name: &str,
        version: &str,
        start: Date,
        end: Date,
    ) -> Result<Option<BacktestReport>>;
}

/// An in-memory [`Store`] used by tests and by callers exercising the
/// engine without a live database. Bars/fundamentals are seeded directly;
/// writes (`upsert_signals`, `upsert_report`) accumulate in memory for the
/// lifetime of the value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bars: Mutex<HashMap<(Symbol, AdjustKind), Vec<HistoricalBar>>>,
    fundamentals: Mutex<HashMap<Symbol, Vec<FundamentalSnapshot>>>,
    classification: Mutex<HashMap<AssetType, Vec<SymbolClassification>>>,
    signals: Mutex<Vec<Signal>>,
    reports: Mutex<BTreeMap<(String, String, Date, Date), BacktestReport>>,
}

impl MemoryStore {
    /// An empty store with nothing seeded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a fresh, empty store in an `Arc` for handing to the core.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed bars for `symbol` on the given adjustment series. Bars already
    /// present for the same `(symbol, date, adjust)` are left untouched
    /// (insert-if-absent), matching the persisted store's semantics.
    pub fn seed_bars(&self, symbol: &str, adjust: AdjustKind, bars: Vec<HistoricalBar>) {
        let mut guard = self.bars.lock().expect("lock poisoned");
        let existing = guard.entry((symbol.to_string(), adjust)).or_default();
        let known: std::collections::HashSet<Date> = existing.iter().map(|b| b.date).collect();
        existing.extend(bars.into_iter().filter(|b| !known.contains(&b.date)));
        existing.sort_by_key(|b| b.date);
    }

    /// Seed fundamentals for `symbol`.
    pub fn seed_fundamentals(&self, symbol: &str, snapshots: Vec<FundamentalSnapshot>) {
        let mut guard = self.fundamentals.lock().expect("lock poisoned");
        guard.entry(symbol.to_string()).or_default().extend(snapshots);
    }

    /// Seed the classification table for one asset type.
    pub fn seed_classification(&self, asset_type: AssetType, rows: Vec<SymbolClassification>) {
        self.classification
            .lock()
            .expect("lock poisoned")
            .insert(asset_type, rows);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: Date,
        end: Date,
        adjust: AdjustKind,
    ) -> Result<Vec<HistoricalBar>> {
        let guard = self.bars.lock().expect("lock poisoned");
        Ok(guard
            .get(&(symbol.to_string(), adjust))
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start && b.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_fundamentals(
        &self,
        symbol: &str,
        start: Date,
        end: Date,
    ) -> Result<Vec<FundamentalSnapshot>> {
        let guard = self.fundamentals.lock().expect("lock poisoned");
        Ok(guard
            .get(symbol)
            .map(|rows| {
                rows.iter()
                    .filter(|s| s.date >= start && s.date <= end)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_symbol_classification(
        &self,
        asset_type: AssetType,
    ) -> Result<Vec<SymbolClassification>> {
        Ok(self
            .classification
            .lock()
            .expect("lock poisoned")
            .get(&asset_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_signals(&self, signals: &[Signal]) -> Result<()> {
        self.signals
            .lock()
            .expect("lock poisoned")
            .extend(signals.iter().cloned());
        Ok(())
    }

    async fn upsert_report(&self, report: &BacktestReport) -> Result<()> {
        let key = (
            report.task_name.clone(),
            report.version.clone(),
            report.start,
            report.end,
        );
        self.reports.lock().expect("lock poisoned").insert(key, report.clone());
        Ok(())
    }

    async fn load_report(
        &self,
        task_name: &str,
        version: &str,
        start: Date,
        end: Date,
    ) -> Result<Option<BacktestReport>> {
        let key = (task_name.to_string(), version.to_string(), start, end);
        Ok(self.reports.lock().expect("lock poisoned").get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(date: Date, close: f64) -> HistoricalBar {
        HistoricalBar {
            symbol_adjust: AdjustKind::ForwardAdjusted,
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
            amount: 10_000.0,
            turnover_rate: 1.0,
            change_pct: 0.0,
        }
    }

    #[tokio::test]
    async fn fetch_bars_filters_by_range() {
        let store = MemoryStore::new();
        store.seed_bars(
            "A",
            AdjustKind::ForwardAdjusted,
            vec![
                bar(date(2024, 1, 1), 10.0),
                bar(date(2024, 1, 2), 11.0),
                bar(date(2024, 1, 3), 12.0),
            ],
        );
        let bars = store
            .fetch_bars("A", date(2024, 1, 2), date(2024, 1, 3), AdjustKind::ForwardAdjusted)
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 11.0);
    }

    #[tokio::test]
    async fn seed_bars_is_insert_if_absent() {
        let store = MemoryStore::new();
        store.seed_bars("A", AdjustKind::ForwardAdjusted, vec![bar(date(2024, 1, 1), 10.0)]);
        store.seed_bars("A", AdjustKind::ForwardAdjusted, vec![bar(date(2024, 1, 1), 999.0)]);
        let bars = store
            .fetch_bars("A", date(2024, 1, 1), date(2024, 1, 1), AdjustKind::ForwardAdjusted)
            .await
            .unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 10.0);
    }

    #[tokio::test]
    async fn report_upsert_overwrites_same_identity() {
        let store = MemoryStore::new();
        let mut report = crate::report::BacktestReport {
            task_name: "demo".to_string(),
            version: "v1".to_string(),
            asset_type: AssetType::Etf,
            start: date(2024, 1, 1),
            end: date(2024, 12, 31),
            initial_capital: 1_000_000.0,
            final_value: 1_000_000.0,
            total_return: 0.0,
            annual_return: 0.0,
            sharpe: 0.0,
            sortino: 0.0,
            calmar: 0.0,
            max_dd: 0.0,
            var95: 0.0,
            cvar95: 0.0,
            info_ratio: None,
            avg_turnover: 0.0,
            win_rates: crate::report::WinRates {
                daily: 0.0,
                weekly: 0.0,
                monthly: 0.0,
            },
            monthly_returns: BTreeMap::new(),
            equity_curve: vec![],
            benchmark_curve: vec![],
            final_holdings: BTreeMap::new(),
            trade_log: vec![],
            total_trades: 0,
            positions: vec![],
            status: crate::report::BacktestStatus::Completed,
            backtest_type: crate::report::BacktestType::Portfolio,
            portfolio_config: None,
        };
        store.upsert_report(&report).await.unwrap();
        report.final_value = 1_200_000.0;
        store.upsert_report(&report).await.unwrap();

        let loaded = store
            .load_report("demo", "v1", date(2024, 1, 1), date(2024, 12, 31))
            .await
            .unwrap()
            .expect("report present");
        assert_eq!(loaded.final_value, 1_200_000.0);
    }
}
