//! The per-task signal evaluation procedure (§4.2 steps 1-6).

use std::collections::HashSet;

use tarifa_expr::{ColumnResolver, FactorCache};
use tarifa_traits::{AssetType, Date, Signal, SignalKind, Symbol, TarifaError, Task};

fn truthy(x: f64) -> bool {
    !x.is_nan() && x != 0.0
}

/// Evaluates a task's `select_buy`/`select_sell`/`order_by_signal`
/// expressions over a fixed universe and produces ordered buy/sell/hold
/// signals.
///
/// Wraps a [`FactorCache`] so repeated calls across tasks that share
/// sub-expressions (e.g. the same `ma(close,20)`) reuse the cache's memo.
pub struct SignalGenerator<R> {
    cache: FactorCache<R>,
}

impl<R: ColumnResolver + Sync> SignalGenerator<R> {
    /// Wrap an already-built factor cache.
    #[must_use]
    pub fn new(cache: FactorCache<R>) -> Self {
        Self { cache }
    }

    /// Evaluate `task` over `universe` on `target_date`, given the symbols
    /// currently held.
    ///
    /// Returns signals ordered by rank ascending, then symbol ascending
    /// (§5 "Ordering guarantees"). Calling this twice with the same inputs
    /// yields byte-identical results (§4.2 "Idempotence").
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::StrategyCompileError`] if any of the task's
    /// expressions fails to parse or evaluate.
    pub fn generate(
        &self,
        task: &Task,
        universe: &[Symbol],
        held: &[Symbol],
        target_date: Date,
    ) -> Result<Vec<Signal>, TarifaError> {
        let buy_candidates = self.buy_candidates(task, universe, target_date)?;
        let sell_candidates = self.sell_candidates(task, universe, target_date)?;

        let ranked_buys = self.rank_buy_candidates(task, &buy_candidates, target_date)?;

        let bought: HashSet<&str> = ranked_buys.iter().map(|(symbol, _)| symbol.as_str()).collect();

        let mut signals = Vec::new();
        for (symbol, rank) in &ranked_buys {
            signals.push(self.signal(symbol, SignalKind::Buy, target_date, *rank, task));
        }
        for symbol in held {
            if sell_candidates.contains(symbol.as_str()) {
                signals.push(self.signal(symbol, SignalKind::Sell, target_date, None, task));
            } else if !bought.contains(symbol.as_str()) {
                signals.push(self.signal(symbol, SignalKind::Hold, target_date, None, task));
            }
        }

        signals.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Ok(signals)
    }

    fn signal(&self, symbol: &str, kind: SignalKind, date: Date, rank: Option<u32>, task: &Task) -> Signal {
        Signal {
            symbol: symbol.to_string(),
            kind,
            date,
            price: 0.0,
            rank,
            score: None,
            strategies: vec![task.name.clone()],
            quantity_hint: None,
            asset_type: AssetType::classify(symbol),
        }
    }

    /// Symbols in `universe` meeting §4.2 step 2's buy-candidate rule.
    /// `select_buy = []` is a special case (§8 boundary behaviour): every
    /// universe symbol is vacuously a candidate, but that candidacy is only
    /// acted on when `order_by_signal` is present (see
    /// [`Self::rank_buy_candidates`]).
    fn buy_candidates(
        &self,
        task: &Task,
        universe: &[Symbol],
        target_date: Date,
    ) -> Result<HashSet<Symbol>, TarifaError> {
        if task.select_buy.is_empty() {
            return Ok(universe.iter().cloned().collect());
        }

        let panels: Vec<_> = task
            .select_buy
            .iter()
            .map(|expr| self.cache.get(expr))
            .collect::<Result<_, _>>()?;

        let threshold = if task.buy_at_least_count > 0 {
            task.buy_at_least_count.max(1)
        } else {
            task.select_buy.len()
        };

        Ok(universe
            .iter()
            .filter(|symbol| {
                let hits = panels.iter().filter(|p| truthy(p.get(target_date, symbol))).count();
                hits >= threshold
            })
            .cloned()
            .collect())
    }

    /// Symbols in `universe` meeting §4.2 step 3's sell-candidate rule.
    fn sell_candidates(
        &self,
        task: &Task,
        universe: &[Symbol],
        target_date: Date,
    ) -> Result<HashSet<Symbol>, TarifaError> {
        if task.select_sell.is_empty() {
            return Ok(HashSet::new());
        }

        let panels: Vec<_> = task
            .select_sell
            .iter()
            .map(|expr| self.cache.get(expr))
            .collect::<Result<_, _>>()?;

        Ok(universe
            .iter()
            .filter(|symbol| {
                let hits = panels.iter().filter(|p| truthy(p.get(target_date, symbol))).count();
                hits >= task.sell_at_least_count
            })
            .cloned()
            .collect())
    }

    /// §4.2 step 4: rank buy candidates by `order_by_signal`, drop/keep,
    /// and assign each survivor a 1-based rank. Without `order_by_signal`,
    /// every candidate survives, unranked (`rank: None`, per
    /// [`Signal::rank`]'s documented contract) — unless `select_buy` is
    /// also empty, in which case there is nothing to rank on and no buys
    /// are emitted at all (§8 "with order_by_signal='' and select_buy=[]:
    /// no buys are emitted").
    fn rank_buy_candidates(
        &self,
        task: &Task,
        candidates: &HashSet<Symbol>,
        target_date: Date,
    ) -> Result<Vec<(Symbol, Option<u32>)>, TarifaError> {
        let Some(order_by_signal) = task.order_by_signal.as_deref().filter(|s| !s.is_empty()) else {
            if task.select_buy.is_empty() {
                return Ok(Vec::new());
            }
            let mut symbols: Vec<Symbol> = candidates.iter().cloned().collect();
            symbols.sort();
            return Ok(symbols.into_iter().map(|s| (s, None)).collect());
        };

        let score_panel = self.cache.get(order_by_signal)?;
        let mut scored: Vec<(Symbol, f64)> = candidates
            .iter()
            .filter_map(|symbol| {
                let score = score_panel.get(target_date, symbol);
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

        let survivors: Vec<Symbol> = scored
            .into_iter()
            .skip(task.order_by_dropn)
            .take(if task.order_by_topk == 0 { usize::MAX } else { task.order_by_topk })
            .map(|(symbol, _)| symbol)
            .collect();

        Ok(survivors.into_iter().enumerate().map(|(i, s)| (s, Some(i as u32 + 1))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tarifa_panel::PanelFrame;
    use tarifa_traits::{AdjustKind, Period, TarifaError, Weight};

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn base_task() -> Task {
        Task {
            name: "demo".to_string(),
            version: "v1".to_string(),
            symbols: vec![],
            start_date: date(2024, 1, 1),
            end_date: date(2024, 1, 31),
            benchmark: "510300.SH".to_string(),
            adjust: AdjustKind::ForwardAdjusted,
            select_buy: vec![],
            buy_at_least_count: 0,
            select_sell: vec![],
            sell_at_least_count: 1,
            order_by_signal: None,
            order_by_topk: 0,
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

    fn close_panel() -> PanelFrame {
        let dates = vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)];
        let data = ndarray::Array2::from_shape_vec(
            (3, 3),
            vec![10.0, 20.0, 5.0, 11.0, 19.0, 6.0, 12.0, 18.0, 7.0],
        )
        .unwrap();
        PanelFrame::new(dates, vec!["A".to_string(), "B".to_string(), "C".to_string()], data).unwrap()
    }

    fn resolver() -> impl ColumnResolver + Sync {
        move |name: &str| -> Result<PanelFrame, TarifaError> {
            if name == "close" {
                Ok(close_panel())
            } else {
                Err(TarifaError::MissingDataError {
                    symbol: "*".to_string(),
                    message: format!("no column '{name}'"),
                })
            }
        }
    }

    fn cache() -> FactorCache<impl ColumnResolver + Sync> {
        FactorCache::new(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            date(2024, 1, 1),
            date(2024, 1, 3),
            AdjustKind::ForwardAdjusted,
            resolver(),
        )
    }

    fn universe() -> Vec<Symbol> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn empty_select_buy_and_no_order_by_signal_emits_no_buys() {
        let generator = SignalGenerator::new(cache());
        let task = base_task();
        let signals = generator.generate(&task, &universe(), &[], date(2024, 1, 3)).unwrap();
        assert!(signals.iter().all(|s| s.kind != SignalKind::Buy));
    }

    #[test]
    fn empty_select_buy_with_order_by_signal_ranks_the_whole_universe() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.order_by_signal = Some("close".to_string());
        task.order_by_topk = 2;
        let signals = generator.generate(&task, &universe(), &[], date(2024, 1, 3)).unwrap();
        let buys: Vec<&str> = signals
            .iter()
            .filter(|s| s.kind == SignalKind::Buy)
            .map(|s| s.symbol.as_str())
            .collect();
        assert_eq!(buys, vec!["B", "A"]);
    }

    #[test]
    fn select_buy_threshold_determines_candidates() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.select_buy = vec!["close < 10".to_string()];
        let signals = generator.generate(&task, &universe(), &[], date(2024, 1, 3)).unwrap();
        let buys: Vec<&str> = signals
            .iter()
            .filter(|s| s.kind == SignalKind::Buy)
            .map(|s| s.symbol.as_str())
            .collect();
        assert_eq!(buys, vec!["C"]);
    }

    #[test]
    fn select_buy_without_order_by_signal_leaves_buys_unranked() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.select_buy = vec!["close > 0".to_string()];
        let signals = generator.generate(&task, &universe(), &[], date(2024, 1, 3)).unwrap();
        assert!(signals.iter().filter(|s| s.kind == SignalKind::Buy).all(|s| s.rank.is_none()));
    }

    #[test]
    fn held_symbol_not_selected_or_sold_becomes_a_hold() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.select_sell = vec!["close < 0".to_string()];
        let held = vec!["C".to_string()];
        let signals = generator.generate(&task, &universe(), &held, date(2024, 1, 3)).unwrap();
        let hold = signals.iter().find(|s| s.symbol == "C").unwrap();
        assert_eq!(hold.kind, SignalKind::Hold);
    }

    #[test]
    fn held_symbol_meeting_sell_threshold_is_sold() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.select_sell = vec!["close > 0".to_string()];
        let held = vec!["C".to_string()];
        let signals = generator.generate(&task, &universe(), &held, date(2024, 1, 3)).unwrap();
        let sell = signals.iter().find(|s| s.symbol == "C").unwrap();
        assert_eq!(sell.kind, SignalKind::Sell);
    }

    #[test]
    fn repeated_generation_is_idempotent() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.order_by_signal = Some("close".to_string());
        task.order_by_topk = 2;
        let first = generator.generate(&task, &universe(), &[], date(2024, 1, 3)).unwrap();
        let second = generator.generate(&task, &universe(), &[], date(2024, 1, 3)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unknown_operator_in_select_buy_fails() {
        let generator = SignalGenerator::new(cache());
        let mut task = base_task();
        task.select_buy = vec!["frobnicate(close,2)".to_string()];
        assert!(generator.generate(&task, &universe(), &[], date(2024, 1, 3)).is_err());
    }
}
