//! Per-day portfolio state tracking shared by both backtesters (§4.4.1,
//! §4.3's rebalance procedure).
//!
//! Grounded on the original engine's `PortfolioStateTracker`: cash plus a
//! holdings map are mutated by [`PortfolioStateTracker::apply_trade`], and
//! [`PortfolioStateTracker::advance_day`] folds those into the day's
//! [`PortfolioState`] — portfolio value, daily/cumulative return, running
//! drawdown, and a rolling 20-day turnover.

use std::collections::HashMap;

use tarifa_traits::{Date, Holding, PortfolioState, Symbol, Trade, TradeAction};

const TURNOVER_WINDOW_DAYS: i64 = 20;

/// Tracks cash, holdings, and the full daily-state/trade history of one
/// simulated portfolio.
#[derive(Debug, Clone)]
pub struct PortfolioStateTracker {
    initial_capital: f64,
    cash: f64,
    holdings: std::collections::BTreeMap<Symbol, Holding>,
    daily_states: Vec<PortfolioState>,
    trade_history: Vec<Trade>,
}

impl PortfolioStateTracker {
    /// Start a new tracker with `initial_capital` cash and no positions.
    #[must_use]
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            holdings: std::collections::BTreeMap::new(),
            daily_states: Vec::new(),
            trade_history: Vec::new(),
        }
    }

    /// The most recently recorded portfolio value, or `initial_capital`
    /// before the first day has been advanced.
    #[must_use]
    pub fn previous_value(&self) -> f64 {
        self.daily_states.last().map_or(self.initial_capital, |s| s.portfolio_value)
    }

    /// Current uninvested cash.
    #[must_use]
    pub fn cash(&self) -> f64 {
        self.cash
    }

    /// Current open positions.
    #[must_use]
    pub fn holdings(&self) -> &std::collections::BTreeMap<Symbol, Holding> {
        &self.holdings
    }

    /// All recorded daily states, oldest first.
    #[must_use]
    pub fn daily_states(&self) -> &[PortfolioState] {
        &self.daily_states
    }

    /// The full trade log, oldest first.
    #[must_use]
    pub fn trade_history(&self) -> &[Trade] {
        &self.trade_history
    }

    /// Apply one fill at `commission_rate`: update cash, and update or
    /// close the affected holding. `trade.amount` is always the gross
    /// `shares * price` (the field's documented contract); commission is
    /// applied here, on top of it, to the cash side only — a position's
    /// `avg_cost` basis excludes commission. A buy adds to the position
    /// with a volume-weighted average cost; a sell preserves `avg_cost`
    /// unless it fully closes the position, in which case the holding is
    /// deleted rather than kept at zero shares.
    pub fn apply_trade(&mut self, trade: Trade, commission_rate: f64) {
        match trade.action {
            TradeAction::Buy => {
                self.cash -= trade.amount * (1.0 + commission_rate);
                let entry = self.holdings.entry(trade.symbol.clone()).or_insert(Holding {
                    shares: 0.0,
                    avg_cost: trade.price,
                });
                let total_cost = entry.shares * entry.avg_cost + trade.shares * trade.price;
                entry.shares += trade.shares;
                entry.avg_cost = total_cost / entry.shares;
            }
            TradeAction::Sell => {
                self.cash += trade.amount * (1.0 - commission_rate);
                if let Some(entry) = self.holdings.get_mut(&trade.symbol) {
                    entry.shares -= trade.shares;
                    if entry.shares <= 0.0 {
                        self.holdings.remove(&trade.symbol);
                    }
                }
            }
        }
        self.trade_history.push(trade);
    }

    /// Advance the tracker by one trading day: fold `trades` (already
    /// applied via [`Self::apply_trade`]) and `prices` into a new
    /// [`PortfolioState`], append it to the history, and return it.
    ///
    /// A symbol held but missing from `prices` contributes nothing to
    /// `portfolio_value` for the day (a stale quote does not invalidate
    /// the rest of the portfolio, per §4.4 step 1).
    pub fn advance_day(&mut self, date: Date, prices: &HashMap<Symbol, f64>) -> PortfolioState {
        let holdings_value: f64 = self
            .holdings
            .iter()
            .filter_map(|(symbol, h)| prices.get(symbol).map(|p| h.shares * p))
            .sum();
        let portfolio_value = self.cash + holdings_value;

        let previous_value = self.previous_value();
        let daily_return = if previous_value > 0.0 { portfolio_value / previous_value - 1.0 } else { 0.0 };
        let cumulative_return =
            if self.initial_capital > 0.0 { portfolio_value / self.initial_capital - 1.0 } else { 0.0 };

        let running_max_drawdown = self.running_max_drawdown(portfolio_value);
        let daily_turnover = self.turnover_rate();

        let state = PortfolioState {
            date,
            cash: self.cash,
            holdings: self.holdings.clone(),
            daily_return,
            cumulative_return,
            running_max_drawdown,
            daily_turnover,
            portfolio_value,
        };
        self.daily_states.push(state.clone());
        state
    }

    fn running_max_drawdown(&self, current_value: f64) -> f64 {
        let peak = self
            .daily_states
            .iter()
            .map(|s| s.portfolio_value)
            .fold(current_value, f64::max);
        let daily_drawdown = if peak > 0.0 { current_value / peak - 1.0 } else { 0.0 };
        let prior_running = self.daily_states.iter().map(|s| s.running_max_drawdown).fold(0.0_f64, f64::min);
        prior_running.min(daily_drawdown)
    }

    /// Rolling 20-day turnover, anchored to the most recent recorded
    /// trade date rather than the day being advanced — matching the
    /// original tracker's `_calculate_turnover_rate`, which windows
    /// around `last_trade_date`.
    fn turnover_rate(&self) -> f64 {
        let Some(last_trade_date) = self.trade_history.last().map(|t| t.date) else {
            return 0.0;
        };

        let recent: Vec<&Trade> = self
            .trade_history
            .iter()
            .filter(|t| (last_trade_date - t.date).num_days() < TURNOVER_WINDOW_DAYS)
            .collect();
        if recent.is_empty() {
            return 0.0;
        }

        let buy_amount: f64 = recent.iter().filter(|t| t.action == TradeAction::Buy).map(|t| t.amount).sum();
        let sell_amount: f64 = recent.iter().filter(|t| t.action == TradeAction::Sell).map(|t| t.amount).sum();

        let window_len = TURNOVER_WINDOW_DAYS as usize;
        let window_states = if self.daily_states.len() >= window_len {
            &self.daily_states[self.daily_states.len() - window_len..]
        } else {
            &self.daily_states[..]
        };
        if window_states.is_empty() {
            return 0.0;
        }
        let avg_value = window_states.iter().map(|s| s.portfolio_value).sum::<f64>() / window_states.len() as f64;
        if avg_value == 0.0 {
            return 0.0;
        }

        (buy_amount + sell_amount) / (2.0 * avg_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trade(date: Date, symbol: &str, action: TradeAction, shares: f64, price: f64) -> Trade {
        Trade { date, symbol: symbol.to_string(), action, shares, price, amount: shares * price }
    }

    #[test]
    fn previous_value_before_any_day_is_initial_capital() {
        let tracker = PortfolioStateTracker::new(1_000_000.0);
        assert_eq!(tracker.previous_value(), 1_000_000.0);
    }

    #[test]
    fn buying_reduces_cash_and_opens_a_holding() {
        let mut tracker = PortfolioStateTracker::new(1_000_000.0);
        tracker.apply_trade(trade(date(2024, 1, 2), "510300.SH", TradeAction::Buy, 1000.0, 4.0), 0.0);
        assert_eq!(tracker.cash(), 1_000_000.0 - 4000.0);
        let holding = tracker.holdings().get("510300.SH").unwrap();
        assert_eq!(holding.shares, 1000.0);
        assert_eq!(holding.avg_cost, 4.0);
    }

    #[test]
    fn selling_all_shares_removes_the_holding() {
        let mut tracker = PortfolioStateTracker::new(1_000_000.0);
        tracker.apply_trade(trade(date(2024, 1, 2), "510300.SH", TradeAction::Buy, 1000.0, 4.0), 0.0);
        tracker.apply_trade(trade(date(2024, 1, 3), "510300.SH", TradeAction::Sell, 1000.0, 4.2), 0.0);
        assert!(tracker.holdings().is_empty());
    }

    #[test]
    fn averaging_cost_on_a_second_buy() {
        let mut tracker = PortfolioStateTracker::new(1_000_000.0);
        tracker.apply_trade(trade(date(2024, 1, 2), "510300.SH", TradeAction::Buy, 100.0, 4.0), 0.0);
        tracker.apply_trade(trade(date(2024, 1, 3), "510300.SH", TradeAction::Buy, 100.0, 6.0), 0.0);
        let holding = tracker.holdings().get("510300.SH").unwrap();
        assert_eq!(holding.shares, 200.0);
        assert!((holding.avg_cost - 5.0).abs() < 1e-9);
    }

    #[test]
    fn portfolio_value_equals_cash_plus_holdings_value() {
        let mut tracker = PortfolioStateTracker::new(1_000_000.0);
        tracker.apply_trade(trade(date(2024, 1, 2), "510300.SH", TradeAction::Buy, 1000.0, 4.0), 0.0);
        let mut prices = HashMap::new();
        prices.insert("510300.SH".to_string(), 4.1);
        let state = tracker.advance_day(date(2024, 1, 2), &prices);
        assert!((state.portfolio_value - (996_000.0 + 4100.0)).abs() < 1e-6);
    }

    #[test]
    fn running_max_drawdown_is_non_increasing() {
        let mut tracker = PortfolioStateTracker::new(1_000_000.0);
        let days = [
            (date(2024, 1, 2), 1_000_000.0),
            (date(2024, 1, 3), 1_100_000.0),
            (date(2024, 1, 4), 900_000.0),
            (date(2024, 1, 5), 950_000.0),
        ];
        let mut prior_dd = 0.0_f64;
        for (d, value) in days {
            tracker.cash = value;
            let state = tracker.advance_day(d, &HashMap::new());
            assert!(state.running_max_drawdown <= prior_dd + 1e-9);
            prior_dd = state.running_max_drawdown;
        }
    }

    #[test]
    fn missing_price_drops_that_symbol_from_the_days_value() {
        let mut tracker = PortfolioStateTracker::new(1_000_000.0);
        tracker.apply_trade(trade(date(2024, 1, 2), "510300.SH", TradeAction::Buy, 1000.0, 4.0), 0.0);
        let state = tracker.advance_day(date(2024, 1, 2), &HashMap::new());
        assert_eq!(state.portfolio_value, tracker.cash());
    }

    #[test]
    fn turnover_is_zero_before_any_trade() {
        let tracker = PortfolioStateTracker::new(1_000_000.0);
        assert_eq!(tracker.turnover_rate(), 0.0);
    }
}
