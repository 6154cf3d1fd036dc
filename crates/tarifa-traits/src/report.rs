//! The `BacktestReport` value type and its identity tuple.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::portfolio::{PortfolioState, Trade};
use crate::types::{AssetType, Date, Symbol};

/// One point on an equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Trading date.
    pub date: Date,
    /// Portfolio or strategy value on that date.
    pub value: f64,
}

/// Fraction of periods with a positive compounded return, at three
/// granularities, each expressed 0-100 (not 0-1; see §6 "Signal and report
/// JSON").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinRates {
    /// Percentage of daily returns that are positive.
    pub daily: f64,
    /// Percentage of (5 trading-day) compounded weekly returns that are
    /// positive.
    pub weekly: f64,
    /// Percentage of calendar-month compounded returns that are positive.
    pub monthly: f64,
}

/// Which backtester produced a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestType {
    /// Produced by the rotation backtester (§4.3).
    Single,
    /// Produced by the portfolio backtester (§4.4).
    Portfolio,
}

/// Terminal status of a backtest run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum BacktestStatus {
    /// Completed without error.
    Completed,
    /// Aborted; carries the error code and message (§7 "User-visible
    /// failure").
    Failed {
        /// Machine-readable code, e.g. `"backtest_timeout_error"`.
        code: String,
        /// Human-readable message.
        message: String,
    },
}

/// Free-form configuration echoed back for portfolio backtests, e.g. the
/// weight scheme and commission rate used, so a report is self-describing
/// without re-reading the originating `Task`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Name of the weight scheme (`"equal"` or `"fixed"`).
    pub weight_scheme: String,
    /// Commission rate applied during the run.
    pub commission_rate: f64,
    /// Whether A-share mode (T+1, round-lots) was enabled.
    pub ashare_mode: bool,
}

/// The result of running a backtest to completion (or to failure).
///
/// Identity: `(task_name, version, start, end)` — a report is upserted by
/// this tuple, so re-running an identical backtest definition overwrites
/// the prior row rather than accumulating duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Strategy name.
    pub task_name: String,
    /// Strategy format/config version.
    pub version: String,
    /// ETF or A-share, derived from the task's symbols.
    pub asset_type: AssetType,
    /// First date in the backtest window.
    pub start: Date,
    /// Last date in the backtest window.
    pub end: Date,
    /// Starting cash.
    pub initial_capital: f64,
    /// Ending portfolio value.
    pub final_value: f64,
    /// `final_value / initial_capital - 1`.
    pub total_return: f64,
    /// Annualized return, see §4.5.
    pub annual_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_dd: f64,
    pub var95: f64,
    pub cvar95: f64,
    /// Present only when a benchmark return series was supplied.
    pub info_ratio: Option<f64>,
    /// Mean of the rolling 20-day turnover ratio across the run.
    pub avg_turnover: f64,
    pub win_rates: WinRates,
    /// Compounded return per calendar month, keyed `"YYYY-MM"`.
    pub monthly_returns: BTreeMap<String, f64>,
    /// Daily equity curve.
    pub equity_curve: Vec<EquityPoint>,
    /// `RunOnce + SelectAll + WeighEqually + Rebalance` on the benchmark
    /// symbol, run on the same trading-day schedule as `equity_curve`
    /// (§4.3 "Output"). Empty when no benchmark run was supplied.
    pub benchmark_curve: Vec<EquityPoint>,
    /// Holdings open at the end of the run.
    pub final_holdings: BTreeMap<Symbol, f64>,
    /// The full trade log, oldest first.
    pub trade_log: Vec<Trade>,
    /// Total trades executed, across the whole run.
    pub total_trades: u64,
    /// Daily position snapshots (cash, holdings, portfolio value), oldest
    /// first — the "positions series" in §4.3 "Output".
    pub positions: Vec<PortfolioState>,
    /// Completed or failed (with error detail).
    pub status: BacktestStatus,
    /// Which backtester produced this report.
    pub backtest_type: BacktestType,
    /// Present only for `BacktestType::Portfolio` reports.
    pub portfolio_config: Option<PortfolioConfig>,
}

impl BacktestReport {
    /// The `(task_name, version, start, end)` identity tuple used for
    /// upsert into the `strategy_backtests` table (§6).
    #[must_use]
    pub fn identity(&self) -> (&str, &str, Date, Date) {
        (&self.task_name, &self.version, self.start, self.end)
    }
}

/// A single executed fill paired with the strategy that generated it, the
/// shape the `transactions` table (§6) persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTrade {
    /// The underlying fill.
    pub trade: Trade,
    /// Strategy that generated the fill.
    pub strategy_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> BacktestReport {
        BacktestReport {
            task_name: "demo".to_string(),
            version: "v1".to_string(),
            asset_type: AssetType::Etf,
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            initial_capital: 1_000_000.0,
            final_value: 1_200_000.0,
            total_return: 0.2,
            annual_return: 0.2,
            sharpe: 1.0,
            sortino: 1.1,
            calmar: 2.0,
            max_dd: -0.1,
            var95: -0.02,
            cvar95: -0.03,
            info_ratio: None,
            avg_turnover: 0.15,
            win_rates: WinRates {
                daily: 55.0,
                weekly: 60.0,
                monthly: 70.0,
            },
            monthly_returns: BTreeMap::new(),
            equity_curve: vec![],
            benchmark_curve: vec![],
            final_holdings: BTreeMap::new(),
            trade_log: vec![],
            total_trades: 10,
            positions: vec![],
            status: BacktestStatus::Completed,
            backtest_type: BacktestType::Portfolio,
            portfolio_config: None,
        }
    }

    #[test]
    fn identity_tuple_matches_fields() {
        let report = sample();
        let (name, version, start, end) = report.identity();
        assert_eq!(name, "demo");
        assert_eq!(version, "v1");
        assert_eq!(start, report.start);
        assert_eq!(end, report.end);
    }

    #[test]
    fn round_trips_through_json() {
        let report = sample();
        let json = serde_json::to_string(&report).expect("serialize");
        let back: BacktestReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }

    #[test]
    fn failed_status_round_trips() {
        let mut report = sample();
        report.status = BacktestStatus::Failed {
            code: "backtest_timeout_error".to_string(),
            message: "exceeded 30 min".to_string(),
        };
        let json = serde_json::to_string(&report).expect("serialize");
        let back: BacktestReport = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.status, report.status);
    }
}
