//! Per-day portfolio state shared by both backtesters.

use serde::{Deserialize, Serialize};

use crate::types::{Date, Symbol};

/// A single position: number of shares and their volume-weighted average
/// cost. Holdings with `shares == 0` are deleted immediately, never kept
/// around as a zero entry (§3 "Portfolio State" invariant).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// Shares currently held.
    pub shares: f64,
    /// Volume-weighted average cost per share, preserved across partial
    /// sells and updated only when shares are added.
    pub avg_cost: f64,
}

/// A portfolio's state after one simulated trading day.
///
/// Invariants (enforced by `PortfolioStateTracker`, see `tarifa-eval`):
/// `cash >= 0`; `sum(shares * price) + cash == portfolio_value` to a 1e-6
/// relative tolerance; `running_max_drawdown` is non-increasing day over
/// day; holdings never carry a zero share count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Trading date this state describes.
    pub date: Date,
    /// Uninvested cash.
    pub cash: f64,
    /// Open positions, keyed by symbol.
    pub holdings: std::collections::BTreeMap<Symbol, Holding>,
    /// Return relative to the previous day's `portfolio_value`.
    pub daily_return: f64,
    /// Return relative to `initial_capital`.
    pub cumulative_return: f64,
    /// `min(running_max_drawdown_prev, value / peak - 1)`.
    pub running_max_drawdown: f64,
    /// Rolling 20-day turnover, see §4.4.1.
    pub daily_turnover: f64,
    /// `sum(shares * price) + cash`.
    pub portfolio_value: f64,
}

impl PortfolioState {
    /// Total market value of open positions at the given prices, ignoring
    /// symbols the price map does not cover (a missing quote for one
    /// symbol does not invalidate the rest of the day, per §4.4 step 1).
    #[must_use]
    pub fn holdings_value(&self, prices: &std::collections::HashMap<Symbol, f64>) -> f64 {
        self.holdings
            .iter()
            .filter_map(|(sym, h)| prices.get(sym).map(|p| h.shares * p))
            .sum()
    }
}

/// A single executed fill, recorded by both backtesters' trade logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Date the trade executed.
    pub date: Date,
    /// Symbol traded.
    pub symbol: Symbol,
    /// Buy or sell.
    pub action: TradeAction,
    /// Shares filled.
    pub shares: f64,
    /// Fill price.
    pub price: f64,
    /// `shares * price`, before commission.
    pub amount: f64,
}

/// Direction of a [`Trade`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeAction {
    /// Opened or added to a position.
    Buy,
    /// Closed or reduced a position.
    Sell,
}
