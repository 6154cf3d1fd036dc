//! The `Task` strategy declaration and its load-time validation rules.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TarifaError};
use crate::types::{AdjustKind, Date, Symbol};

/// How often a rotation strategy reconsiders its holdings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// Rebalance on every trading day.
    Daily,
    /// Rebalance when the ISO week changes.
    Weekly,
    /// Rebalance when the calendar month changes.
    Monthly,
    /// Rebalance when the calendar quarter changes.
    Quarterly,
    /// Rebalance when the calendar year changes.
    Yearly,
    /// Rebalance once, on the first bar of the window.
    RunOnce,
    /// Rebalance on the first bar, then whenever at least `n` days have
    /// elapsed since the last rebalance. `n` is carried on the variant so a
    /// task cannot declare this period without a window.
    EveryNPeriods(u32),
}

impl Period {
    /// Whether this period requires `Task::period_days` to be set and
    /// consistent. Only `EveryNPeriods` folds its window into the variant
    /// itself, but the field is still validated against it for tasks loaded
    /// from a format that keeps the two separate (see [`Task::validate`]).
    #[must_use]
    pub const fn is_every_n(&self) -> bool {
        matches!(self, Self::EveryNPeriods(_))
    }
}

/// How target weights are assigned across the symbols a strategy selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weight {
    /// Every selected symbol gets `1 / |selected|`.
    Equal,
    /// Each symbol gets an explicitly declared weight; the declared weights
    /// must sum to at most 1.0 (validated at load time).
    Fixed(HashMap<Symbol, f64>),
}

impl Default for Weight {
    fn default() -> Self {
        Self::Equal
    }
}

/// A strategy declaration: the value object both backtesters and the signal
/// generator evaluate against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Strategy name, unique within a catalogue.
    pub name: String,
    /// Strategy format/config version, part of a report's identity tuple.
    #[serde(default = "default_version")]
    pub version: String,
    /// Explicit symbol universe. Empty means "resolve from the classification
    /// table at run time" (see §4.2 "Universe resolution").
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    /// First trading day in scope.
    pub start_date: Date,
    /// Last trading day in scope.
    pub end_date: Date,
    /// Symbol used as the performance benchmark.
    pub benchmark: Symbol,
    /// Which adjustment series the task (and its benchmark) read.
    #[serde(default)]
    pub adjust: AdjustKind,
    /// Ordered boolean factor expressions; a symbol is a buy candidate when
    /// enough of these are true (see `buy_at_least_count`).
    #[serde(default)]
    pub select_buy: Vec<String>,
    /// Minimum number of `select_buy` expressions that must hold. `0` means
    /// all of them must hold.
    #[serde(default)]
    pub buy_at_least_count: usize,
    /// Ordered boolean factor expressions; a held symbol becomes a sell
    /// candidate when enough of these are true.
    #[serde(default)]
    pub select_sell: Vec<String>,
    /// Minimum number of `select_sell` expressions that must hold.
    #[serde(default = "default_sell_at_least_count")]
    pub sell_at_least_count: usize,
    /// Optional numeric expression used to rank buy candidates.
    pub order_by_signal: Option<String>,
    /// Number of top-ranked survivors to keep after `order_by_dropN`.
    #[serde(default)]
    pub order_by_topk: usize,
    /// Number of top-ranked candidates to skip before taking `order_by_topK`.
    #[serde(default)]
    pub order_by_dropn: usize,
    /// Sort direction for `order_by_signal`. `true` (the default) means
    /// descending / "highest score first"; literal, not reinterpreted.
    #[serde(default = "default_true")]
    pub order_by_desc: bool,
    /// Rebalance cadence.
    pub period: Period,
    /// Window length in days when `period` needs one outside
    /// `EveryNPeriods`. Reserved for loaders that keep the window separate
    /// from the period tag; unused by `Period::EveryNPeriods`, which already
    /// carries its own `n`.
    #[serde(default)]
    pub period_days: Option<u32>,
    /// Target-weight scheme.
    #[serde(default)]
    pub weight: Weight,
    /// Enables T+1 settlement, round-lot rounding, and the stricter A-share
    /// commission schedule.
    #[serde(default)]
    pub ashare_mode: bool,
    /// Commission rate applied to both buys and sells, e.g. `0.0003`.
    #[serde(default)]
    pub commission_rate: f64,
    /// Starting cash for the simulation.
    pub initial_capital: f64,
}

fn default_version() -> String {
    "v1".to_string()
}

const fn default_sell_at_least_count() -> usize {
    1
}

const fn default_true() -> bool {
    true
}

impl Task {
    /// Validate the load-time rules in §6 that do not require parsing the
    /// task's expressions (expression validity is checked by the loader,
    /// which alone depends on the expression parser).
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::StrategyCompileError`] describing the first
    /// rule violated.
    pub fn validate(&self) -> Result<()> {
        let fail = |message: String| {
            Err(TarifaError::StrategyCompileError {
                strategy: self.name.clone(),
                message,
            })
        };

        if self.buy_at_least_count > self.select_buy.len() {
            return fail(format!(
                "buy_at_least_count ({}) exceeds select_buy length ({})",
                self.buy_at_least_count,
                self.select_buy.len()
            ));
        }
        if self.start_date > self.end_date {
            return fail(format!(
                "start_date ({}) is after end_date ({})",
                self.start_date, self.end_date
            ));
        }
        if let Weight::Fixed(weights) = &self.weight {
            let total: f64 = weights.values().sum();
            if total > 1.0 + 1e-9 {
                return fail(format!("fixed weights sum to {total}, expected <= 1.0"));
            }
        }
        if let Period::EveryNPeriods(n) = self.period {
            if n == 0 {
                return fail("EveryNPeriods(0) is not a valid rebalance window".to_string());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base_task() -> Task {
        Task {
            name: "t1".to_string(),
            version: "v1".to_string(),
            symbols: vec![],
            start_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2020, 12, 31).unwrap(),
            benchmark: "510300.SH".to_string(),
            adjust: AdjustKind::ForwardAdjusted,
            select_buy: vec!["close > 0".to_string()],
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

    #[test]
    fn valid_task_passes() {
        assert!(base_task().validate().is_ok());
    }

    #[test]
    fn buy_at_least_count_cannot_exceed_rule_count() {
        let mut t = base_task();
        t.buy_at_least_count = 5;
        assert!(t.validate().is_err());
    }

    #[test]
    fn start_after_end_is_rejected() {
        let mut t = base_task();
        std::mem::swap(&mut t.start_date, &mut t.end_date);
        assert!(t.validate().is_err());
    }

    #[test]
    fn fixed_weights_over_one_are_rejected() {
        let mut t = base_task();
        let mut w = HashMap::new();
        w.insert("A".to_string(), 0.6);
        w.insert("B".to_string(), 0.6);
        t.weight = Weight::Fixed(w);
        assert!(t.validate().is_err());
    }

    #[test]
    fn fixed_weights_at_one_are_accepted() {
        let mut t = base_task();
        let mut w = HashMap::new();
        w.insert("A".to_string(), 0.5);
        w.insert("B".to_string(), 0.5);
        t.weight = Weight::Fixed(w);
        assert!(t.validate().is_ok());
    }

    #[test]
    fn every_n_periods_zero_is_rejected() {
        let mut t = base_task();
        t.period = Period::EveryNPeriods(0);
        assert!(t.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let t = base_task();
        let json = serde_json::to_string(&t).expect("serialize");
        let back: Task = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.name, t.name);
        assert_eq!(back.period, t.period);
    }
}
