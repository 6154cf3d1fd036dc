#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tarifa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core types shared by every crate in the Tarifa backtest engine.
//!
//! This crate has no dataframe dependency: it is pure vocabulary — the
//! error taxonomy, the `Task` strategy declaration, `Signal`, portfolio
//! state, `BacktestReport`, and the `Store`/`MarketDataProvider` traits
//! that let the rest of the workspace be exercised without a live
//! database.

/// The version of the tarifa-traits crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cancel;
pub mod error;
pub mod portfolio;
pub mod provider;
pub mod report;
pub mod retry;
pub mod signal;
pub mod store;
pub mod task;
pub mod types;

pub use cancel::CancellationToken;
pub use error::{Result, TarifaError};
pub use portfolio::{Holding, PortfolioState, Trade, TradeAction};
pub use provider::MarketDataProvider;
pub use report::{BacktestReport, BacktestStatus, BacktestType, EquityPoint, PortfolioConfig, StrategyTrade, WinRates};
pub use retry::retry;
pub use signal::{Signal, SignalKind};
pub use store::{FundamentalSnapshot, HistoricalBar, MemoryStore, Store, SymbolClassification};
pub use task::{Period, Task, Weight};
pub use types::{AdjustKind, AssetType, Date, Symbol};

/// Re-exports convenient for downstream crates that want the whole
/// vocabulary in scope with one `use tarifa_traits::prelude::*;`.
pub mod prelude {
    pub use crate::cancel::CancellationToken;
    pub use crate::error::{Result, TarifaError};
    pub use crate::portfolio::{Holding, PortfolioState, Trade, TradeAction};
    pub use crate::report::{BacktestReport, BacktestStatus, BacktestType, EquityPoint, WinRates};
    pub use crate::signal::{Signal, SignalKind};
    pub use crate::store::{FundamentalSnapshot, HistoricalBar, MemoryStore, Store, SymbolClassification};
    pub use crate::task::{Period, Task, Weight};
    pub use crate::types::{AdjustKind, AssetType, Date, Symbol};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }
}
