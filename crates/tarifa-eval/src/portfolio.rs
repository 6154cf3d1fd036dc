//! The portfolio backtester (§4.4): holds every symbol its signal
//! generator currently flags as a buy, equally (or by a declared fixed
//! weight), and rebalances only when that buy set actually changes.

use std::collections::{HashMap, HashSet};

use tarifa_expr::ColumnResolver;
use tarifa_panel::PanelFrame;
use tarifa_signals::SignalGenerator;
use tarifa_traits::{CancellationToken, Date, Signal, SignalKind, Symbol, TarifaError, Task, Trade, TradeAction};

use crate::tracker::PortfolioStateTracker;

/// Drives a portfolio task over a fixed universe and trading-day calendar,
/// delegating buy/sell/hold evaluation to a [`SignalGenerator`] rather than
/// re-deriving threshold rules itself.
pub struct PortfolioBacktester<R> {
    generator: SignalGenerator<R>,
}

impl<R: ColumnResolver + Sync> PortfolioBacktester<R> {
    /// Wrap a signal generator already built over this task's factor cache.
    #[must_use]
    pub fn new(generator: SignalGenerator<R>) -> Self {
        Self { generator }
    }

    /// Run `task` over `universe` across `trading_days`.
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::StrategyCompileError`] if any of `task`'s
    /// expressions fails to parse or evaluate, or [`TarifaError::Other`] if
    /// `cancel` is observed cancelled between trading days.
    pub fn run(
        &self,
        task: &Task,
        universe: &[Symbol],
        trading_days: &[Date],
        close: &PanelFrame,
        cancel: &CancellationToken,
    ) -> Result<PortfolioStateTracker, TarifaError> {
        let mut tracker = PortfolioStateTracker::new(task.initial_capital);
        let scheme = tarifa_combine::scheme_for(&task.weight);
        let mut previous_buys: Option<HashSet<Symbol>> = None;

        for &date in trading_days {
            if cancel.is_cancelled() {
                return Err(TarifaError::Other("portfolio backtest cancelled".to_string()));
            }

            let held: Vec<Symbol> = tracker.holdings().keys().cloned().collect();
            let signals = self.generator.generate(task, universe, &held, date)?;
            let current_buys = buy_set(&signals);

            let prices = price_map(close, date, universe);

            if previous_buys.as_ref().is_none_or(|prev| *prev != current_buys) {
                if current_buys.is_empty() {
                    close_all_positions(&mut tracker, date, &prices, task);
                } else {
                    let survivors: Vec<Symbol> = current_buys.iter().cloned().collect();
                    let weights = scheme.weights(&survivors);
                    rebalance(&mut tracker, date, &weights, &prices, task);
                }
                previous_buys = Some(current_buys);
            }

            tracker.advance_day(date, &prices);
        }

        Ok(tracker)
    }
}

fn buy_set(signals: &[Signal]) -> HashSet<Symbol> {
    signals.iter().filter(|s| s.kind == SignalKind::Buy).map(|s| s.symbol.clone()).collect()
}

fn price_map(close: &PanelFrame, date: Date, universe: &[Symbol]) -> HashMap<Symbol, f64> {
    universe
        .iter()
        .filter_map(|symbol| {
            let price = close.get(date, symbol);
            (!price.is_nan() && price > 0.0).then(|| (symbol.clone(), price))
        })
        .collect()
}

/// Recompute target share counts for `target_weights` against the
/// previous day's portfolio value, round each to the nearest lot of 100
/// shares, then sell every symbol whose target fell below its current
/// holding before buying any symbol whose target rose above it — so sells
/// free cash before buys need it (§4.4.1).
fn rebalance(
    tracker: &mut PortfolioStateTracker,
    date: Date,
    target_weights: &HashMap<Symbol, f64>,
    prices: &HashMap<Symbol, f64>,
    task: &Task,
) {
    let portfolio_value = tracker.previous_value();

    let mut target_shares: HashMap<Symbol, f64> = HashMap::new();
    for (symbol, weight) in target_weights {
        if let Some(&price) = prices.get(symbol) {
            if price > 0.0 {
                let target_value = portfolio_value * weight;
                let shares = (target_value / price / 100.0).floor().max(0.0) * 100.0;
                if shares > 0.0 {
                    target_shares.insert(symbol.clone(), shares);
                }
            }
        }
    }

    let current_shares: HashMap<Symbol, f64> = tracker.holdings().iter().map(|(s, h)| (s.clone(), h.shares)).collect();
    let mut all_symbols: Vec<Symbol> = current_shares.keys().chain(target_shares.keys()).cloned().collect();
    all_symbols.sort();
    all_symbols.dedup();

    for symbol in &all_symbols {
        let current = current_shares.get(symbol).copied().unwrap_or(0.0);
        let target = target_shares.get(symbol).copied().unwrap_or(0.0);
        if target >= current {
            continue;
        }
        let Some(&price) = prices.get(symbol) else { continue };
        if price <= 0.0 {
            continue;
        }
        let sell_shares = current - target;
        let amount = sell_shares * price;
        tracker.apply_trade(
            Trade { date, symbol: symbol.clone(), action: TradeAction::Sell, shares: sell_shares, price, amount },
            task.commission_rate,
        );
    }

    for symbol in &all_symbols {
        let current = current_shares.get(symbol).copied().unwrap_or(0.0);
        let target = target_shares.get(symbol).copied().unwrap_or(0.0);
        if target <= current {
            continue;
        }
        let Some(&price) = prices.get(symbol) else { continue };
        if price <= 0.0 {
            continue;
        }
        let buy_shares = target - current;
        let amount = buy_shares * price;
        let cost = amount * (1.0 + task.commission_rate);
        if tracker.cash() < cost {
            let err = TarifaError::InsufficientCashError {
                symbol: symbol.clone(),
                required: cost,
                available: tracker.cash(),
            };
            tracing::warn!(task = %task.name, date = %date, error = %err, "skipping buy");
            continue;
        }
        tracker.apply_trade(
            Trade { date, symbol: symbol.clone(), action: TradeAction::Buy, shares: buy_shares, price, amount },
            task.commission_rate,
        );
    }
}

fn close_all_positions(tracker: &mut PortfolioStateTracker, date: Date, prices: &HashMap<Symbol, f64>, task: &Task) {
    let holdings: Vec<(Symbol, f64)> = tracker.holdings().iter().map(|(s, h)| (s.clone(), h.shares)).collect();
    for (symbol, shares) in holdings {
        let Some(&price) = prices.get(&symbol) else { continue };
        if price <= 0.0 || shares <= 0.0 {
            continue;
        }
        let amount = shares * price;
        tracker.apply_trade(
            Trade { date, symbol, action: TradeAction::Sell, shares, price, amount },
            task.commission_rate,
        );
    }
}
