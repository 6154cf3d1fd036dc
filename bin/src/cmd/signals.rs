//! The `signals` subcommand: generate buy/sell/hold signals for one
//! declared strategy on a single date, without running a backtest.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use tarifa_expr::FactorCache;
use tarifa_signals::{resolve_universe, SignalGenerator, SmartFilter, SmartFilterPresets};
use tarifa_traits::{AssetType, SignalKind, Store, TarifaError};

use crate::data;

/// Smart Filter preset to narrow the resolved universe before ranking.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum FilterPreset {
    Conservative,
    Balanced,
    Aggressive,
}

pub async fn run(
    strategies_dir: PathBuf,
    data_dir: PathBuf,
    name: String,
    mode: AssetType,
    date: Option<String>,
    filter: FilterPreset,
) -> Result<()> {
    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                      Signal Generation                        ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let loaded = tarifa_loader::load_dir(&strategies_dir).context("loading strategy directory")?;
    let task = loaded
        .into_iter()
        .find(|entry| entry.filename == name && entry.is_valid())
        .and_then(|entry| entry.task)
        .ok_or_else(|| anyhow!("no valid strategy named '{name}' in {}", strategies_dir.display()))?;

    println!("Strategy: {} ({})", task.name, task.version);
    println!("Window:   {} .. {}", task.start_date, task.end_date);

    let target_date = match date {
        Some(ref raw) => data::parse_date(raw)?,
        None => task.end_date,
    };
    println!("Date:     {target_date}\n");

    let store = data::load_store(&data_dir).context("loading data directory")?;
    let classification = store.fetch_symbol_classification(mode).await?;

    let symbols: Vec<String> = if task.symbols.is_empty() {
        classification.iter().map(|c| c.symbol.clone()).collect()
    } else {
        task.symbols.clone()
    };

    let panels = data::fetch_panels(&store, &symbols, task.start_date, task.end_date, task.adjust).await?;
    let turnover_rate = panels.get("turnover_rate").cloned().ok_or_else(|| {
        TarifaError::Other("missing turnover_rate panel".to_string())
    })?;
    let amount = panels.get("amount").cloned().ok_or_else(|| TarifaError::Other("missing amount panel".to_string()))?;

    let filter_config = match filter {
        FilterPreset::Conservative => SmartFilterPresets::conservative(),
        FilterPreset::Balanced => SmartFilterPresets::balanced(),
        FilterPreset::Aggressive => SmartFilterPresets::aggressive(),
    };
    let smart_filter = SmartFilter::new(filter_config);

    let universe = resolve_universe(&task, mode, &classification, &smart_filter, target_date, &turnover_rate, &amount);
    println!("Universe: {} symbols after filtering\n", universe.len());

    let resolver = data::resolver_from(panels);
    let cache = FactorCache::new(symbols.clone(), task.start_date, task.end_date, task.adjust, resolver);
    let generator = SignalGenerator::new(cache);

    let signals = generator.generate(&task, &universe, &[], target_date)?;

    if signals.is_empty() {
        println!("No signals produced.\n");
        return Ok(());
    }

    println!("{:<12} {:<6} {:>6}", "Symbol", "Side", "Rank");
    println!("{}", "-".repeat(28));
    for signal in &signals {
        let side = match signal.kind {
            SignalKind::Buy => "BUY",
            SignalKind::Sell => "SELL",
            SignalKind::Hold => "HOLD",
        };
        let rank = signal.rank.map_or("-".to_string(), |r| r.to_string());
        println!("{:<12} {:<6} {:>6}", signal.symbol, side, rank);
    }
    println!();

    Ok(())
}
