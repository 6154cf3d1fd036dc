//! `FactorCache`: evaluates a batch of factor expressions over a fixed
//! `(symbols, date range, adjust kind)` universe, deduplicating shared
//! sub-expressions and storing each result keyed by its canonical text
//! (§4.1 "Caching and reuse").

use std::collections::HashMap;
use std::sync::Mutex;

use rayon::prelude::*;
use tarifa_panel::PanelFrame;
use tarifa_traits::{AdjustKind, CancellationToken, Date, Symbol, TarifaError};

use crate::ast::Expr;
use crate::evaluator::{self, ColumnResolver, Memo, Value};
use crate::parser::parse;
use crate::printer::print;

/// A single-writer-during-`preload`, multi-reader-after cache of evaluated
/// factor panels, scoped to one evaluation run.
pub struct FactorCache<R> {
    symbols: Vec<Symbol>,
    start: Date,
    end: Date,
    adjust: AdjustKind,
    resolver: R,
    memo: Memo,
}

impl<R: ColumnResolver + Sync> FactorCache<R> {
    /// Build an empty cache over `symbols` and `[start, end]`, resolving
    /// raw columns through `resolver`.
    pub fn new(symbols: Vec<Symbol>, start: Date, end: Date, adjust: AdjustKind, resolver: R) -> Self {
        Self {
            symbols,
            start,
            end,
            adjust,
            resolver,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// The symbols this cache was built over.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The inclusive date range this cache was built over.
    #[must_use]
    pub fn date_range(&self) -> (Date, Date) {
        (self.start, self.end)
    }

    /// Which price adjustment this cache's raw columns were resolved
    /// under.
    #[must_use]
    pub fn adjust(&self) -> AdjustKind {
        self.adjust
    }

    /// Compile and evaluate every expression in `expressions`, deduplicating
    /// shared sub-expressions so each unique one is computed at most once,
    /// then storing every result (including intermediate sub-expressions)
    /// keyed by canonical text. Independent sub-expressions at the same
    /// dependency depth are evaluated in parallel via `rayon`.
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::StrategyCompileError`] if any expression fails
    /// to parse or names an unknown operator.
    pub fn preload(&self, expressions: &[&str]) -> Result<(), TarifaError> {
        self.preload_with_cancel(expressions, &CancellationToken::new())
    }

    /// As [`Self::preload`], but cooperatively cancellable between
    /// dependency levels (§5 "Cancellation").
    ///
    /// # Errors
    ///
    /// As [`Self::preload`], plus an [`TarifaError::Other`] if `cancel` is
    /// observed cancelled before the batch completes.
    pub fn preload_with_cancel(
        &self,
        expressions: &[&str],
        cancel: &CancellationToken,
    ) -> Result<(), TarifaError> {
        let parsed: Vec<Expr> = expressions.iter().map(|s| parse(s)).collect::<Result<_, _>>()?;

        let mut nodes: HashMap<String, (Expr, usize)> = HashMap::new();
        for expr in &parsed {
            collect_nodes(expr, &mut nodes);
        }
        let max_height = nodes.values().map(|(_, h)| *h).max().unwrap_or(0);
        let mut levels: Vec<Vec<Expr>> = (0..=max_height).map(|_| Vec::new()).collect();
        for (expr, height) in nodes.into_values() {
            levels[height].push(expr);
        }

        for level in levels {
            if cancel.is_cancelled() {
                return Err(TarifaError::Other("factor preload cancelled".to_string()));
            }
            let results: Vec<Result<(), TarifaError>> = level
                .par_iter()
                .map(|expr| {
                    let value = evaluator::eval(expr, &self.resolver, &self.memo)?;
                    if let Value::Panel(panel) = &value {
                        self.assert_index_matches(panel);
                    }
                    Ok(())
                })
                .collect();
            for result in results {
                result?;
            }
        }
        Ok(())
    }

    /// Return the cached panel for `expression`. Safe to call from multiple
    /// readers once [`Self::preload`] has returned; `expression` need not
    /// have been passed to `preload` verbatim, only be equal to it (or one
    /// of its sub-expressions) after canonicalisation.
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::StrategyCompileError`] if `expression` fails
    /// to parse, names an unknown operator, or resolves to a bare scalar
    /// rather than a panel.
    pub fn get(&self, expression: &str) -> Result<PanelFrame, TarifaError> {
        let expr = parse(expression)?;
        match evaluator::eval(&expr, &self.resolver, &self.memo)? {
            Value::Panel(panel) => Ok(panel),
            Value::Scalar(s) => Err(TarifaError::StrategyCompileError {
                strategy: String::new(),
                message: format!("'{expression}' evaluates to the bare scalar {s}, not a panel"),
            }),
        }
    }

    #[cfg(debug_assertions)]
    fn assert_index_matches(&self, panel: &PanelFrame) {
        let expected: std::collections::HashSet<&str> =
            self.symbols.iter().map(String::as_str).collect();
        let actual: std::collections::HashSet<&str> =
            panel.symbols().iter().map(String::as_str).collect();
        debug_assert!(
            actual.is_subset(&expected),
            "cached panel references symbols outside this FactorCache's universe"
        );
    }

    #[cfg(not(debug_assertions))]
    fn assert_index_matches(&self, _panel: &PanelFrame) {}
}

/// Populate `nodes` with every distinct sub-expression of `expr`, keyed by
/// canonical text, recording each one's height (0 for leaves, otherwise
/// `1 + max(child heights)`) so `preload` can process children strictly
/// before their parents.
fn collect_nodes(expr: &Expr, nodes: &mut HashMap<String, (Expr, usize)>) -> usize {
    let mut height = 0;
    for child in expr.children() {
        height = height.max(collect_nodes(child, nodes) + 1);
    }
    let key = print(expr);
    nodes.entry(key).or_insert_with(|| (expr.clone(), height)).1
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn close_panel() -> PanelFrame {
        let dates = vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)];
        let data = ndarray::Array2::from_shape_vec(
            (4, 2),
            vec![10.0, 20.0, 11.0, 19.0, 9.0, 21.0, 13.0, 18.0],
        )
        .unwrap();
        PanelFrame::new(dates, vec!["A".to_string(), "B".to_string()], data).unwrap()
    }

    fn counting_resolver() -> (impl ColumnResolver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let resolver = move |name: &str| -> Result<PanelFrame, TarifaError> {
            counted.fetch_add(1, Ordering::SeqCst);
            if name == "close" {
                Ok(close_panel())
            } else {
                Err(TarifaError::MissingDataError {
                    symbol: "*".to_string(),
                    message: format!("no column '{name}'"),
                })
            }
        };
        (resolver, calls)
    }

    fn cache(resolver: impl ColumnResolver + Sync) -> FactorCache<impl ColumnResolver + Sync> {
        FactorCache::new(
            vec!["A".to_string(), "B".to_string()],
            date(2024, 1, 1),
            date(2024, 1, 4),
            AdjustKind::ForwardAdjusted,
            resolver,
        )
    }

    #[test]
    fn preload_then_get_returns_the_evaluated_panel() {
        let (resolver, _calls) = counting_resolver();
        let cache = cache(resolver);
        cache.preload(&["ma(close,2)"]).unwrap();
        let panel = cache.get("ma(close,2)").unwrap();
        assert_eq!(panel.get(date(2024, 1, 2), "A"), 10.5);
    }

    #[test]
    fn shared_subexpression_is_resolved_once_across_the_batch() {
        let (resolver, calls) = counting_resolver();
        let cache = cache(resolver);
        cache
            .preload(&["ma(close,2) > 0", "ma(close,2) + 1", "roc(close,2)"])
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "close should be resolved only once");
    }

    #[test]
    fn get_without_preload_still_evaluates_lazily() {
        let (resolver, _calls) = counting_resolver();
        let cache = cache(resolver);
        let panel = cache.get("close > 9").unwrap();
        assert_eq!(panel.get(date(2024, 1, 3), "A"), 0.0);
    }

    #[test]
    fn bare_scalar_expression_is_rejected_by_get() {
        let (resolver, _calls) = counting_resolver();
        let cache = cache(resolver);
        assert!(cache.get("1 + 2").is_err());
    }

    #[test]
    fn cancelled_token_aborts_preload() {
        let (resolver, _calls) = counting_resolver();
        let cache = cache(resolver);
        let token = CancellationToken::new();
        token.cancel();
        assert!(cache.preload_with_cancel(&["ma(close,2)"], &token).is_err());
    }

    #[test]
    fn unknown_operator_fails_the_whole_batch() {
        let (resolver, _calls) = counting_resolver();
        let cache = cache(resolver);
        assert!(cache.preload(&["ma(close,2)", "frobnicate(close,2)"]).is_err());
    }
}
