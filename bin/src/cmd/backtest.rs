//! The `backtest` subcommand: runs a declared strategy through the
//! rotation or portfolio backtester and prints (or serializes) the
//! resulting report.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tarifa_eval::{benchmark_task, build_failed_report, build_report, MetricsConfig, PortfolioBacktester, RotationBacktester};
use tarifa_expr::FactorCache;
use tarifa_signals::{resolve_universe, SignalGenerator, SmartFilter, SmartFilterPresets};
use tarifa_traits::{AssetType, BacktestType, CancellationToken, EquityPoint, Store};

use crate::data;

/// Which backtester drives the run.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum BacktestKind {
    Rotation,
    Portfolio,
}

/// Report rendering.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub async fn run(
    strategies_dir: PathBuf,
    data_dir: PathBuf,
    name: String,
    mode: AssetType,
    kind: BacktestKind,
    format: OutputFormat,
) -> Result<()> {
    let loaded = tarifa_loader::load_dir(&strategies_dir).context("loading strategy directory")?;
    let task = loaded
        .into_iter()
        .find(|entry| entry.filename == name && entry.is_valid())
        .and_then(|entry| entry.task)
        .ok_or_else(|| anyhow!("no valid strategy named '{name}' in {}", strategies_dir.display()))?;

    let backtest_type = match kind {
        BacktestKind::Rotation => BacktestType::Single,
        BacktestKind::Portfolio => BacktestType::Portfolio,
    };

    let store = match data::load_store(&data_dir) {
        Ok(store) => store,
        Err(err) => return emit(&build_failed_report(&task, backtest_type, err.code(), &err.to_string()), format),
    };

    match run_backtest(&task, mode, backtest_type, &store).await {
        Ok(report) => emit(&report, format),
        Err(err) => emit(&build_failed_report(&task, backtest_type, err.code(), &err.to_string()), format),
    }
}

async fn run_backtest(
    task: &tarifa_traits::Task,
    mode: AssetType,
    backtest_type: BacktestType,
    store: &dyn Store,
) -> Result<tarifa_traits::BacktestReport, tarifa_traits::TarifaError> {
    let classification = store.fetch_symbol_classification(mode).await?;
    let symbols: Vec<String> = if task.symbols.is_empty() {
        classification.iter().map(|c| c.symbol.clone()).collect()
    } else {
        task.symbols.clone()
    };

    let panels = data::fetch_panels(store, &symbols, task.start_date, task.end_date, task.adjust).await?;
    let close = panels
        .get("close")
        .cloned()
        .ok_or_else(|| tarifa_traits::TarifaError::Other("missing close panel".to_string()))?;
    let turnover_rate = panels
        .get("turnover_rate")
        .cloned()
        .ok_or_else(|| tarifa_traits::TarifaError::Other("missing turnover_rate panel".to_string()))?;
    let amount = panels
        .get("amount")
        .cloned()
        .ok_or_else(|| tarifa_traits::TarifaError::Other("missing amount panel".to_string()))?;

    let trading_days = close.dates().to_vec();
    let smart_filter = SmartFilter::new(SmartFilterPresets::balanced());
    let universe = trading_days.last().map_or_else(Vec::new, |&target_date| {
        resolve_universe(task, mode, &classification, &smart_filter, target_date, &turnover_rate, &amount)
    });

    let cancel = CancellationToken::new();
    let resolver = data::resolver_from(panels);
    let cache = FactorCache::new(symbols, task.start_date, task.end_date, task.adjust, resolver);

    let tracker = match backtest_type {
        BacktestType::Single => RotationBacktester::new(cache).run(task, &universe, &trading_days, &close, &cancel)?,
        BacktestType::Portfolio => {
            PortfolioBacktester::new(SignalGenerator::new(cache)).run(task, &universe, &trading_days, &close, &cancel)?
        }
    };

    let (benchmark_returns, benchmark_curve) = run_benchmark(task, store, tracker.daily_states().len(), &cancel).await;

    Ok(build_report(task, &tracker, backtest_type, benchmark_returns.as_deref(), &benchmark_curve, &MetricsConfig::default()))
}

/// Run the synthetic `RunOnce + SelectAll + WeighEqually` benchmark task
/// (§4.3 "Output") and return its equity curve plus, when its day count
/// matches the main run's (`expected_days`), its daily returns for the
/// info ratio. A benchmark that fails to load or run at all degrades to
/// an empty curve and no returns rather than failing the whole report.
async fn run_benchmark(
    task: &tarifa_traits::Task,
    store: &dyn Store,
    expected_days: usize,
    cancel: &CancellationToken,
) -> (Option<Vec<f64>>, Vec<EquityPoint>) {
    let bench = benchmark_task(task);
    let symbols = vec![bench.benchmark.clone()];

    let Ok(panels) = data::fetch_panels(store, &symbols, bench.start_date, bench.end_date, bench.adjust).await else {
        return (None, vec![]);
    };
    let Some(close) = panels.get("close").cloned() else {
        return (None, vec![]);
    };
    let trading_days = close.dates().to_vec();

    let resolver = data::resolver_from(panels);
    let cache = FactorCache::new(symbols.clone(), bench.start_date, bench.end_date, bench.adjust, resolver);

    let Ok(tracker) = RotationBacktester::new(cache).run(&bench, &symbols, &trading_days, &close, cancel) else {
        return (None, vec![]);
    };

    let states = tracker.daily_states();
    let curve: Vec<EquityPoint> = states.iter().map(|s| EquityPoint { date: s.date, value: s.portfolio_value }).collect();
    let returns = (states.len() == expected_days).then(|| states.iter().map(|s| s.daily_return).collect());

    (returns, curve)
}

fn emit(report: &tarifa_traits::BacktestReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("\n╔══════════════════════════════════════════════════════════════╗");
            println!("║                       Backtest Report                         ║");
            println!("╚══════════════════════════════════════════════════════════════╝\n");
            println!("Strategy:       {} ({})", report.task_name, report.version);
            println!("Window:         {} .. {}", report.start, report.end);
            println!("Status:         {:?}", report.status);
            println!();
            println!("Initial capital: {:.2}", report.initial_capital);
            println!("Final value:     {:.2}", report.final_value);
            println!("Total return:    {:.2}%", report.total_return * 100.0);
            println!("Annual return:   {:.2}%", report.annual_return * 100.0);
            println!("Sharpe:          {:.3}", report.sharpe);
            println!("Sortino:         {:.3}", report.sortino);
            println!("Calmar:          {:.3}", report.calmar);
            println!("Max drawdown:    {:.2}%", report.max_dd * 100.0);
            println!("VaR 95%:         {:.2}%", report.var95 * 100.0);
            println!("CVaR 95%:        {:.2}%", report.cvar95 * 100.0);
            println!("Avg turnover:    {:.2}%", report.avg_turnover * 100.0);
            println!("Total trades:    {}", report.total_trades);
            println!();
        }
    }
    Ok(())
}
