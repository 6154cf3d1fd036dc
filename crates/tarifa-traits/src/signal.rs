//! The `Signal` value type emitted by the signal generator.

use serde::{Deserialize, Serialize};

use crate::types::{AssetType, Date, Symbol};

/// Whether a signal recommends entering, exiting, or holding a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Enter or add to a position.
    Buy,
    /// Exit or reduce a position.
    Sell,
    /// No change; symbol is currently held and qualifies for neither.
    Hold,
}

/// A single buy/sell/hold recommendation for one symbol on one date.
///
/// Signals are emitted exactly once per `(symbol, date, kind, strategy-set)`
/// — that tuple is the signal's identity for the `trader` table (§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Symbol the signal applies to.
    pub symbol: Symbol,
    /// Buy, sell, or hold.
    pub kind: SignalKind,
    /// Trading date the signal was evaluated for.
    pub date: Date,
    /// Close price used to evaluate the signal.
    pub price: f64,
    /// Rank among survivors after `order_by_topK`/`order_by_dropN`
    /// (1-based); `None` for sell/hold signals and for buy signals from
    /// tasks with no `order_by_signal`.
    pub rank: Option<u32>,
    /// Value of `order_by_signal` at evaluation time, when present.
    pub score: Option<f64>,
    /// Names of every strategy whose evaluation produced this signal.
    pub strategies: Vec<String>,
    /// Suggested quantity, when the caller already knows the target
    /// position size (e.g. the portfolio backtester); `None` when only the
    /// direction is meaningful.
    pub quantity_hint: Option<f64>,
    /// Asset classification of `symbol`, cached at emission time so
    /// downstream consumers need not re-derive it.
    pub asset_type: AssetType,
}

impl Signal {
    /// Sort key matching the ordering guarantee in §5: rank ascending, then
    /// symbol ascending. Signals without a rank sort after all ranked ones.
    #[must_use]
    pub fn sort_key(&self) -> (u32, &str) {
        (self.rank.unwrap_or(u32::MAX), self.symbol.as_str())
    }
}
