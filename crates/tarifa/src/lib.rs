#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tarifa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # tarifa
//!
//! The strategy evaluation and backtest engine for Chinese-market ETFs
//! and A-share equities.
//!
//! tarifa is an umbrella crate that re-exports every sub-crate of the
//! engine for convenience: the factor expression engine, the signal
//! generator, the rotation and portfolio backtesters, and the strategy
//! loader that turns a directory of declarations into validated `Task`s.
//!
//! ## Quick Start
//!
//! ```ignore
//! use tarifa::{Task, RotationBacktester, FactorCache};
//! use tarifa::loader::load_dir;
//!
//! # fn main() -> tarifa::Result<()> {
//! let loaded = load_dir(std::path::Path::new("strategy"))?;
//! let task = loaded.into_iter().find_map(|t| t.task).expect("no valid task");
//! // ... build a FactorCache over the task's window, then:
//! // let tracker = RotationBacktester::new(cache).run(&task, &universe, &days, &close, &cancel)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Crate Organization
//!
//! - [`traits`] - Core vocabulary: `Task`, `Signal`, `PortfolioState`,
//!   `BacktestReport`, the `TarifaError` taxonomy, and the `Store`/
//!   `MarketDataProvider` traits external collaborators implement.
//! - [`panel`] - The `PanelFrame` value type shared by the expression
//!   engine and the signal generator.
//! - [`expr`] - Parses and evaluates factor expressions over panels.
//! - [`combine`] - Target-weight schemes (equal, fixed) shared by both
//!   backtesters.
//! - [`signals`] - Universe resolution, the Smart Filter, and per-task
//!   signal generation.
//! - [`eval`] - The rotation and portfolio backtesters, the per-day
//!   tracker they share, and performance metrics.
//! - [`loader`] - Discovers and validates TOML strategy declarations.
//!
//! ## Architecture
//!
//! tarifa follows the engine's own leaf-to-root dependency order:
//!
//! 1. **Strategy Loader** discovers and validates declared strategies.
//! 2. **Factor Expression Engine** evaluates declared formulas over panel
//!    data, producing boolean/numeric factor matrices.
//! 3. **Signal Generator** intersects those matrices with the universe
//!    and the Smart Filter, ranks candidates, and emits buy/sell signals.
//! 4. **Rotation** and **Portfolio Backtesters** simulate the strategy
//!    day by day and produce an equity curve and risk metrics.
//!
//! ## Integration
//!
//! The core never calls a live data source or database directly — it
//! takes an `Arc<dyn Store>` (see [`traits::store`]) and an upstream
//! `MarketDataProvider` boundary, leaving ingestion, schema migration,
//! and the HTTP/dashboard layer to external collaborators.

/// Version information for the tarifa crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// Core Traits
// ============================================================================

/// Core vocabulary shared by every crate in the engine.
///
/// This module re-exports the foundational types that define the tarifa
/// data model:
///
/// - [`Task`] - A strategy declaration.
/// - [`Signal`] - A buy/sell/hold emitted by the signal generator.
/// - [`PortfolioState`] - A backtester's per-day bookkeeping snapshot.
/// - [`BacktestReport`] - The persisted result of a completed run.
/// - [`TarifaError`] - The error taxonomy every fallible operation uses.
///
/// # Example
///
/// ```
/// use tarifa::{Task, TarifaError};
/// ```
pub mod traits {
    pub use tarifa_traits::*;
}

// Re-export core vocabulary at top level for convenience.
pub use tarifa_traits::{CancellationToken, Date, Result, Signal, SignalKind, Symbol, Task, TarifaError};
pub use tarifa_traits::{BacktestReport, BacktestStatus, BacktestType, PortfolioState};

// ============================================================================
// Panel Data
// ============================================================================

/// The `PanelFrame` value type shared by the factor expression engine and
/// the signal generator.
pub mod panel {
    pub use tarifa_panel::*;
}

// ============================================================================
// Factor Expression Engine
// ============================================================================

/// Parsing, printing, and evaluating factor expressions over panel data.
///
/// ## Available Operators
///
/// The grammar supports comparisons, boolean combinators, and a library
/// of windowed operators (`roc`, `ma`, `trend_score`, `rank`, and more)
/// over raw panel columns such as `close` and `volume`.
///
/// # Example
///
/// ```ignore
/// use tarifa::expr::{parse, FactorCache};
///
/// # fn example() -> tarifa::Result<()> {
/// let expr = parse("roc(close, 20) > 0.05")?;
/// # Ok(())
/// # }
/// ```
pub mod expr {
    pub use tarifa_expr::*;
}

// ============================================================================
// Weight Schemes
// ============================================================================

/// Target-weight schemes shared by the rotation and portfolio
/// backtesters.
///
/// ## Available Schemes
///
/// - **EqualWeight**: `1 / |selected|` for every selected symbol.
/// - **FixedWeight**: task-declared weights, validated to sum to at
///   most 1.0 at load time.
pub mod combine {
    pub use tarifa_combine::*;
}

// ============================================================================
// Signal Generation
// ============================================================================

/// Universe resolution, the Smart Filter, and per-task signal generation.
pub mod signals {
    pub use tarifa_signals::*;
}

// ============================================================================
// Backtesting & Evaluation
// ============================================================================

/// The rotation and portfolio backtesters, the tracker and scheduler they
/// share, and the performance metrics computed over a completed run.
///
/// ## Key Components
///
/// - [`eval::RotationBacktester`] - Fixed-top-K rotation with
///   calendar-based rebalancing.
/// - [`eval::PortfolioBacktester`] - Equal/fixed-weight basket driven by
///   the signal generator, rebalanced on buy-set change.
/// - [`eval::PerformanceMetrics`] - Sharpe, Sortino, Calmar, VaR, CVaR,
///   win rates, and monthly returns over a tracker's daily states.
///
/// ## Evaluation Metrics
///
/// ### Sharpe & Sortino
///
/// ```text
/// Sharpe = (mean(daily_return) * 252 - risk_free_rate) / (std(daily_return) * sqrt(252))
/// ```
///
/// Sortino replaces the denominator with the population standard
/// deviation of only the negative returns.
///
/// ### Calmar
///
/// ```text
/// Calmar = annual_return / abs(max_drawdown)
/// ```
///
/// # Example
///
/// ```ignore
/// use tarifa::eval::{PortfolioBacktester, MetricsConfig, PerformanceMetrics};
///
/// # fn example() {
/// // let tracker = PortfolioBacktester::new(generator).run(&task, &universe, &days, &close, &cancel)?;
/// // let metrics = PerformanceMetrics::calculate(tracker.daily_states(), None, &MetricsConfig::default());
/// # }
/// ```
pub mod eval {
    pub use tarifa_eval::*;
}

// ============================================================================
// Strategy Loading
// ============================================================================

/// Discovers TOML strategy declarations on disk and validates them into
/// [`Task`] values, skipping (not failing on) any one broken file.
pub mod loader {
    pub use tarifa_loader::*;
}

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module for convenient imports.
///
/// ```ignore
/// use tarifa::prelude::*;
/// ```
///
/// This brings into scope the most commonly used types: `Task`,
/// `Signal`, `PortfolioState`, `BacktestReport`, `TarifaError`/`Result`,
/// and `CancellationToken`.
pub mod prelude {
    pub use crate::traits::*;
    pub use crate::{BacktestReport, CancellationToken, Result, Signal, SignalKind, Task, TarifaError};
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
    }

    #[test]
    fn test_re_exports_compile() {
        fn _accept_task(_task: &Task) {}
        fn _accept_signal(_signal: &Signal) {}
        fn _accept_report(_report: &BacktestReport) {}
        fn _accept_error(_err: &TarifaError) {}
    }

    #[test]
    fn test_error_types() {
        let _result: Result<()> = Ok(());
        let _error: TarifaError = TarifaError::Other("test".to_string());
    }
}
