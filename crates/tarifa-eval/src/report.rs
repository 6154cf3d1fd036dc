//! Assembling a completed backtester run into the `BacktestReport` the
//! store persists (§6 "Backtest Store").

use std::collections::BTreeMap;

use tarifa_traits::{
    AssetType, BacktestReport, BacktestStatus, BacktestType, EquityPoint, PortfolioConfig, Task,
};

use crate::metrics::{MetricsConfig, PerformanceMetrics};
use crate::tracker::PortfolioStateTracker;

/// Build a completed [`BacktestReport`] from a tracker that ran `task` to
/// the end of its window.
///
/// `asset_type` is derived from the task's first declared symbol (falling
/// back to the benchmark when the task's universe was resolved at run
/// time and never recorded on the task itself), matching the report's
/// documented "derived from the task's symbols" rule.
///
/// `benchmark_curve` is the equity series of the synthetic
/// `RunOnce + SelectAll + WeighEqually` benchmark run (§4.3 "Output"), or
/// empty when the caller has none. `benchmark_returns`, if given, must be
/// the benchmark's daily returns aligned day-for-day with `tracker`'s own
/// states (see [`PerformanceMetrics::calculate`]).
#[must_use]
pub fn build_report(
    task: &Task,
    tracker: &PortfolioStateTracker,
    backtest_type: BacktestType,
    benchmark_returns: Option<&[f64]>,
    benchmark_curve: &[EquityPoint],
    config: &MetricsConfig,
) -> BacktestReport {
    let states = tracker.daily_states();
    let metrics = PerformanceMetrics::calculate(states, benchmark_returns, config);

    let final_value = states.last().map_or(task.initial_capital, |s| s.portfolio_value);
    let total_return = final_value / task.initial_capital - 1.0;
    let avg_turnover = if states.is_empty() {
        0.0
    } else {
        states.iter().map(|s| s.daily_turnover).sum::<f64>() / states.len() as f64
    };

    let equity_curve: Vec<EquityPoint> = states.iter().map(|s| EquityPoint { date: s.date, value: s.portfolio_value }).collect();
    let final_holdings: BTreeMap<_, _> = tracker.holdings().iter().map(|(symbol, holding)| (symbol.clone(), holding.shares)).collect();

    let asset_type = task
        .symbols
        .first()
        .map_or_else(|| AssetType::classify(&task.benchmark), |symbol| AssetType::classify(symbol));

    let portfolio_config = matches!(backtest_type, BacktestType::Portfolio).then(|| PortfolioConfig {
        weight_scheme: tarifa_combine::scheme_for(&task.weight).name().to_string(),
        commission_rate: task.commission_rate,
        ashare_mode: task.ashare_mode,
    });

    BacktestReport {
        task_name: task.name.clone(),
        version: task.version.clone(),
        asset_type,
        start: task.start_date,
        end: task.end_date,
        initial_capital: task.initial_capital,
        final_value,
        total_return,
        annual_return: metrics.annual_return,
        sharpe: metrics.sharpe,
        sortino: metrics.sortino,
        calmar: metrics.calmar,
        max_dd: metrics.max_dd,
        var95: metrics.var95,
        cvar95: metrics.cvar95,
        info_ratio: metrics.info_ratio,
        avg_turnover,
        win_rates: metrics.win_rates,
        monthly_returns: metrics.monthly_returns,
        equity_curve,
        benchmark_curve: benchmark_curve.to_vec(),
        final_holdings,
        trade_log: tracker.trade_history().to_vec(),
        total_trades: tracker.trade_history().len() as u64,
        positions: states.to_vec(),
        status: BacktestStatus::Completed,
        backtest_type,
        portfolio_config,
    }
}

/// Build the failure-shaped report §7 calls for when a backtest aborts
/// before completion (e.g. `BacktestTimeoutError`).
#[must_use]
pub fn build_failed_report(task: &Task, backtest_type: BacktestType, code: &str, message: &str) -> BacktestReport {
    let asset_type = task
        .symbols
        .first()
        .map_or_else(|| AssetType::classify(&task.benchmark), |symbol| AssetType::classify(symbol));

    BacktestReport {
        task_name: task.name.clone(),
        version: task.version.clone(),
        asset_type,
        start: task.start_date,
        end: task.end_date,
        initial_capital: task.initial_capital,
        final_value: task.initial_capital,
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
        win_rates: tarifa_traits::WinRates { daily: 0.0, weekly: 0.0, monthly: 0.0 },
        monthly_returns: BTreeMap::new(),
        equity_curve: vec![],
        benchmark_curve: vec![],
        final_holdings: BTreeMap::new(),
        trade_log: vec![],
        total_trades: 0,
        positions: vec![],
        status: BacktestStatus::Failed { code: code.to_string(), message: message.to_string() },
        backtest_type,
        portfolio_config: None,
    }
}
