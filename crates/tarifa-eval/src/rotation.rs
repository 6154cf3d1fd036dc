//! The rotation backtester (§4.3): a scheduler-gated strategy that holds a
//! ranked, top-K subset of its universe and rotates it on a declared
//! cadence, rather than rebalancing every time its signal set changes.

use std::collections::{HashMap, HashSet, VecDeque};

use tarifa_expr::ColumnResolver;
use tarifa_expr::FactorCache;
use tarifa_panel::PanelFrame;
use tarifa_traits::{CancellationToken, Date, Symbol, TarifaError, Task, TradeAction};

use crate::scheduler::RebalanceScheduler;
use crate::tracker::PortfolioStateTracker;

/// The stamp-duty-like surcharge applied to sells on top of
/// `task.commission_rate` when `task.ashare_mode` is set — real A-share
/// trading charges commission on both sides plus a sell-only stamp duty.
const ASHARE_SELL_SURCHARGE: f64 = 0.001;

fn truthy(x: f64) -> bool {
    !x.is_nan() && x != 0.0
}

/// One unsettled batch of shares under T+1 settlement: it cannot be sold
/// until `earliest_sell_date`.
#[derive(Debug, Clone, Copy)]
struct Lot {
    shares: f64,
    earliest_sell_date: Date,
}

/// Drives a rotation task over a fixed universe and trading-day calendar.
pub struct RotationBacktester<R> {
    cache: FactorCache<R>,
}

impl<R: ColumnResolver + Sync> RotationBacktester<R> {
    /// Wrap an already-built factor cache.
    #[must_use]
    pub fn new(cache: FactorCache<R>) -> Self {
        Self { cache }
    }

    /// Run `task` over `universe` across `trading_days`, returning the
    /// resulting tracker. `close` must cover every symbol in `universe`
    /// across `trading_days`.
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::StrategyCompileError`] if `task`'s
    /// expressions fail to parse or evaluate, or [`TarifaError::Other`] if
    /// `cancel` is observed cancelled between trading days.
    pub fn run(
        &self,
        task: &Task,
        universe: &[Symbol],
        trading_days: &[Date],
        close: &PanelFrame,
        cancel: &CancellationToken,
    ) -> Result<PortfolioStateTracker, TarifaError> {
        let buy_panels: Vec<PanelFrame> =
            task.select_buy.iter().map(|expr| self.cache.get(expr)).collect::<Result<_, _>>()?;
        let sell_panels: Vec<PanelFrame> =
            task.select_sell.iter().map(|expr| self.cache.get(expr)).collect::<Result<_, _>>()?;
        let order_panel = task
            .order_by_signal
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|expr| self.cache.get(expr))
            .transpose()?;

        let mut tracker = PortfolioStateTracker::new(task.initial_capital);
        let mut scheduler = RebalanceScheduler::new(task.period);
        let scheme = tarifa_combine::scheme_for(&task.weight);
        let mut selected: HashSet<Symbol> = HashSet::new();
        let mut lots: HashMap<Symbol, VecDeque<Lot>> = HashMap::new();

        for (i, &date) in trading_days.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(TarifaError::Other("rotation backtest cancelled".to_string()));
            }
            let is_last_day = i + 1 == trading_days.len();

            selected = self.forward_fill_selection(
                universe,
                &buy_panels,
                &sell_panels,
                task,
                date,
                selected,
            );

            let prices = price_map(close, date, universe);

            if scheduler.advance(date, is_last_day) {
                let survivors = rank_and_cap(task, &selected, order_panel.as_ref(), date);
                let weights = scheme.weights(&survivors);
                self.rebalance(&mut tracker, &mut lots, date, &weights, &prices, task);
            }

            tracker.advance_day(date, &prices);
        }

        Ok(tracker)
    }

    /// Evaluate today's raw buy/sell hit counts against each universe
    /// symbol and fold them into `prior`: a buy hit sets the symbol
    /// selected, a sell hit (checked after, so it always wins a same-day
    /// conflict) clears it, and a symbol hit by neither keeps its prior
    /// state (§4.3 "no-buy and no-sell implies keep prior state").
    fn forward_fill_selection(
        &self,
        universe: &[Symbol],
        buy_panels: &[PanelFrame],
        sell_panels: &[PanelFrame],
        task: &Task,
        date: Date,
        prior: HashSet<Symbol>,
    ) -> HashSet<Symbol> {
        let buy_threshold = if task.buy_at_least_count > 0 {
            task.buy_at_least_count
        } else {
            task.select_buy.len()
        };

        let mut next = prior;
        for symbol in universe {
            let buy_hits = buy_panels.iter().filter(|p| truthy(p.get(date, symbol))).count();
            let sell_hits = sell_panels.iter().filter(|p| truthy(p.get(date, symbol))).count();

            let buys = !task.select_buy.is_empty() && buy_hits >= buy_threshold;
            let sells = !task.select_sell.is_empty() && sell_hits >= task.sell_at_least_count;

            if sells {
                next.remove(symbol);
            } else if buys {
                next.insert(symbol.clone());
            }
            // neither fired: leave `next`'s membership for `symbol` as it
            // already was in `prior`.
        }
        next
    }

    fn rebalance(
        &self,
        tracker: &mut PortfolioStateTracker,
        lots: &mut HashMap<Symbol, VecDeque<Lot>>,
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
                    // Headroom for commission (§4.3 step 8): target only 99%
                    // of the nominal weighted value so the buy's commission
                    // doesn't push the fill past available cash.
                    let target_value = portfolio_value * weight * 0.99;
                    let shares = round_lot(target_value / price);
                    if shares > 0.0 {
                        target_shares.insert(symbol.clone(), shares);
                    }
                }
            }
        }

        let current_shares: HashMap<Symbol, f64> =
            tracker.holdings().iter().map(|(s, h)| (s.clone(), h.shares)).collect();
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
            let requested = current - target;
            let sellable = if task.ashare_mode { sellable_shares(lots, symbol, date, requested) } else { requested };
            if sellable <= 0.0 {
                continue;
            }
            let amount = sellable * price;
            tracker.apply_trade(
                tarifa_traits::Trade {
                    date,
                    symbol: symbol.clone(),
                    action: TradeAction::Sell,
                    shares: sellable,
                    price,
                    amount,
                },
                sell_commission(task),
            );
            if task.ashare_mode {
                consume_lots(lots, symbol, sellable);
            }
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
                tarifa_traits::Trade {
                    date,
                    symbol: symbol.clone(),
                    action: TradeAction::Buy,
                    shares: buy_shares,
                    price,
                    amount,
                },
                task.commission_rate,
            );
            if task.ashare_mode {
                lots.entry(symbol.clone()).or_default().push_back(Lot {
                    shares: buy_shares,
                    earliest_sell_date: date.succ_opt().unwrap_or(date),
                });
            }
        }
    }
}

/// Build the synthetic single-symbol task §4.3's Output paragraph
/// describes for the benchmark curve: `RunOnce + SelectAll + WeighEqually`
/// on `task.benchmark`. Run through [`RotationBacktester`] with a universe
/// of just that one symbol, `select_buy = ["close > -1"]` selects it on
/// the first bar (close is never negative) and it is never deselected, so
/// the run reduces to buy-and-hold at `task.initial_capital`.
#[must_use]
pub fn benchmark_task(task: &Task) -> Task {
    Task {
        name: format!("{}-benchmark", task.name),
        version: task.version.clone(),
        symbols: vec![task.benchmark.clone()],
        start_date: task.start_date,
        end_date: task.end_date,
        benchmark: task.benchmark.clone(),
        adjust: task.adjust,
        select_buy: vec!["close > -1".to_string()],
        buy_at_least_count: 1,
        select_sell: vec![],
        sell_at_least_count: 1,
        order_by_signal: None,
        order_by_topk: 0,
        order_by_dropn: 0,
        order_by_desc: true,
        period: tarifa_traits::Period::RunOnce,
        period_days: None,
        weight: tarifa_traits::Weight::Equal,
        ashare_mode: task.ashare_mode,
        commission_rate: task.commission_rate,
        initial_capital: task.initial_capital,
    }
}

fn sell_commission(task: &Task) -> f64 {
    if task.ashare_mode {
        task.commission_rate + ASHARE_SELL_SURCHARGE
    } else {
        task.commission_rate
    }
}

fn round_lot(raw_shares: f64) -> f64 {
    (raw_shares / 100.0).floor().max(0.0) * 100.0
}

/// Shares of `symbol` settled (eligible to sell) as of `date`, capped at
/// `requested`.
fn sellable_shares(lots: &HashMap<Symbol, VecDeque<Lot>>, symbol: &str, date: Date, requested: f64) -> f64 {
    let Some(queue) = lots.get(symbol) else { return 0.0 };
    let settled: f64 = queue.iter().filter(|lot| lot.earliest_sell_date <= date).map(|lot| lot.shares).sum();
    settled.min(requested)
}

fn consume_lots(lots: &mut HashMap<Symbol, VecDeque<Lot>>, symbol: &str, mut shares: f64) {
    let Some(queue) = lots.get_mut(symbol) else { return };
    while shares > 1e-9 {
        let Some(front) = queue.front_mut() else { break };
        if front.shares <= shares {
            shares -= front.shares;
            queue.pop_front();
        } else {
            front.shares -= shares;
            shares = 0.0;
        }
    }
    if queue.is_empty() {
        lots.remove(symbol);
    }
}

fn rank_and_cap(
    task: &Task,
    selected: &HashSet<Symbol>,
    order_panel: Option<&PanelFrame>,
    date: Date,
) -> Vec<Symbol> {
    let Some(panel) = order_panel else {
        let mut symbols: Vec<Symbol> = selected.iter().cloned().collect();
        symbols.sort();
        return symbols;
    };

    let mut scored: Vec<(Symbol, f64)> = selected
        .iter()
        .filter_map(|symbol| {
            let score = panel.get(date, symbol);
            (!score.is_nan()).then(|| (symbol.clone(), score))
        })
        .collect();

    scored.sort_by(|a, b| {
        let ord = a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal);
        if task.order_by_desc {
            ord.reverse()
        } else {
            ord
        }
    });

    scored
        .into_iter()
        .skip(task.order_by_dropn)
        .take(if task.order_by_topk == 0 { usize::MAX } else { task.order_by_topk })
        .map(|(symbol, _)| symbol)
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tarifa_traits::{AdjustKind, Period, Weight};

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn close_panel() -> PanelFrame {
        let dates: Vec<Date> = (1..=10).map(|d| date(2024, 1, d)).collect();
        let data = ndarray::Array2::from_shape_fn((10, 2), |(_, j)| if j == 0 { 10.0 } else { 20.0 });
        PanelFrame::new(dates, vec!["A".to_string(), "B".to_string()], data).unwrap()
    }

    fn resolver() -> impl ColumnResolver + Sync {
        move |name: &str| -> Result<PanelFrame, TarifaError> {
            if name == "close" {
                Ok(close_panel())
            } else {
                Err(TarifaError::MissingDataError { symbol: "*".to_string(), message: name.to_string() })
            }
        }
    }

    fn cache() -> FactorCache<impl ColumnResolver + Sync> {
        FactorCache::new(
            vec!["A".to_string(), "B".to_string()],
            date(2024, 1, 1),
            date(2024, 1, 10),
            AdjustKind::ForwardAdjusted,
            resolver(),
        )
    }

    fn base_task() -> Task {
        Task {
            name: "rotation-task".to_string(),
            version: "v1".to_string(),
            symbols: vec![],
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 10),
            benchmark: "510300.SH".to_string(),
            adjust: AdjustKind::ForwardAdjusted,
            select_buy: vec!["close > 0".to_string()],
            buy_at_least_count: 0,
            select_sell: vec![],
            sell_at_least_count: 1,
            order_by_signal: None,
            order_by_topk: 1,
            order_by_dropn: 0,
            order_by_desc: true,
            period: Period::RunOnce,
            period_days: None,
            weight: Weight::Equal,
            ashare_mode: false,
            commission_rate: 0.0,
            initial_capital: 1_000_000.0,
        }
    }

    #[test]
    fn run_once_rotation_buys_on_the_first_bar_and_never_rebalances_again() {
        let backtester = RotationBacktester::new(cache());
        let task = base_task();
        let universe = vec!["A".to_string()];
        let days: Vec<Date> = (1..=5).map(|d| date(2024, 1, d)).collect();
        let tracker = backtester
            .run(&task, &universe, &days, &close_panel(), &CancellationToken::new())
            .unwrap();
        assert_eq!(tracker.trade_history().iter().filter(|t| t.action == TradeAction::Buy).count(), 1);
        assert_eq!(tracker.daily_states().len(), 5);
    }

    #[test]
    fn ashare_mode_blocks_same_day_resale() {
        let lots_empty: HashMap<Symbol, VecDeque<Lot>> = HashMap::new();
        assert_eq!(sellable_shares(&lots_empty, "A", date(2024, 1, 1), 100.0), 0.0);

        let mut lots = HashMap::new();
        lots.insert(
            "A".to_string(),
            VecDeque::from(vec![Lot { shares: 100.0, earliest_sell_date: date(2024, 1, 2) }]),
        );
        assert_eq!(sellable_shares(&lots, "A", date(2024, 1, 1), 100.0), 0.0);
        assert_eq!(sellable_shares(&lots, "A", date(2024, 1, 2), 100.0), 100.0);
    }

    #[test]
    fn round_lot_floors_to_the_nearest_hundred_shares() {
        assert_eq!(round_lot(249.0), 200.0);
        assert_eq!(round_lot(50.0), 0.0);
    }

    #[test]
    fn forward_fill_keeps_prior_selection_when_neither_rule_fires() {
        let backtester = RotationBacktester::new(cache());
        let task = Task { select_buy: vec![], select_sell: vec![], ..base_task() };
        let universe = vec!["A".to_string()];
        let mut prior = HashSet::new();
        prior.insert("A".to_string());
        let next = backtester.forward_fill_selection(&universe, &[], &[], &task, date(2024, 1, 1), prior);
        assert!(next.contains("A"));
    }

    #[test]
    fn benchmark_task_buys_and_holds_the_benchmark_symbol() {
        let mut task = base_task();
        task.benchmark = "A".to_string();
        let bench = benchmark_task(&task);
        let backtester = RotationBacktester::new(cache());
        let universe = vec![bench.benchmark.clone()];
        let days: Vec<Date> = (1..=5).map(|d| date(2024, 1, d)).collect();
        let tracker = backtester
            .run(&bench, &universe, &days, &close_panel(), &CancellationToken::new())
            .unwrap();
        assert_eq!(tracker.trade_history().iter().filter(|t| t.action == TradeAction::Buy).count(), 1);
        assert!(tracker.holdings().contains_key("A"));
        assert_eq!(tracker.daily_states().len(), 5);
    }
}
