//! The Tarifa error taxonomy.
//!
//! Every failure mode in the engine is one variant of [`TarifaError`]. Each
//! variant carries a machine-readable `code()` and a human message, and the
//! doc comment on the variant records the handling policy the caller is
//! expected to follow (fail the one strategy and continue, retry, abort the
//! task, etc).

use thiserror::Error;

/// The error type shared by every crate in the Tarifa workspace.
#[derive(Debug, Error)]
pub enum TarifaError {
    /// A strategy's declared expressions failed to parse or validate.
    ///
    /// Policy: fail loading of that one strategy; other strategies continue.
    #[error("strategy compile error in '{strategy}': {message}")]
    StrategyCompileError {
        /// Name of the strategy that failed to load.
        strategy: String,
        /// Human-readable parse/validation failure.
        message: String,
    },

    /// A required symbol has zero bars in the requested window.
    ///
    /// Policy: exclude the symbol, log, continue.
    #[error("missing data for symbol '{symbol}': {message}")]
    MissingDataError {
        /// Symbol with no usable data.
        symbol: String,
        /// Detail of what was missing.
        message: String,
    },

    /// A task's evaluation universe is empty after the smart filter runs.
    ///
    /// Policy: emit an empty signal set, mark the task as a no-op for the
    /// day; not fatal.
    #[error("universe empty for task '{task}' on {date}")]
    EmptyUniverseError {
        /// Task whose universe filtered down to nothing.
        task: String,
        /// Date of the evaluation that produced an empty universe.
        date: String,
    },

    /// A rebalance buy could not be funded.
    ///
    /// Policy: skip that buy, log, continue with the remaining orders.
    #[error("insufficient cash for '{symbol}': need {required:.2}, have {available:.2}")]
    InsufficientCashError {
        /// Symbol whose buy order was skipped.
        symbol: String,
        /// Cash the order would have required.
        required: f64,
        /// Cash actually available.
        available: f64,
    },

    /// A backtest exceeded its configured time budget.
    ///
    /// Policy: abort the task; record `status = failed`.
    #[error("backtest for '{task}' timed out after {elapsed_secs}s")]
    BacktestTimeoutError {
        /// Task whose backtest was aborted.
        task: String,
        /// Wall-clock seconds elapsed before the abort.
        elapsed_secs: u64,
    },

    /// A store read or write failed in a way that may succeed on retry.
    ///
    /// Policy: retry with exponential backoff (base 1s, up to 3 tries);
    /// surface this variant if still failing. See [`crate::retry`].
    #[error("transient I/O error during {operation}: {message}")]
    TransientIOError {
        /// Operation being attempted (e.g. `"fetch_bars"`).
        operation: String,
        /// Underlying failure description.
        message: String,
    },

    /// An equity curve handed to the metrics collaborator is non-positive
    /// or non-monotonic in time.
    ///
    /// Policy: surface; report `status = failed`.
    #[error("corrupt equity curve: {0}")]
    CorruptCurveError(String),

    /// Catch-all for conditions that do not fit a named kind above.
    #[error("{0}")]
    Other(String),
}

impl TarifaError {
    /// The machine-readable code for this error, stable across releases.
    ///
    /// Used as the `error_code` field on a failed [`crate::report::BacktestReport`].
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StrategyCompileError { .. } => "strategy_compile_error",
            Self::MissingDataError { .. } => "missing_data_error",
            Self::EmptyUniverseError { .. } => "empty_universe_error",
            Self::InsufficientCashError { .. } => "insufficient_cash_error",
            Self::BacktestTimeoutError { .. } => "backtest_timeout_error",
            Self::TransientIOError { .. } => "transient_io_error",
            Self::CorruptCurveError(_) => "corrupt_curve_error",
            Self::Other(_) => "other",
        }
    }

    /// Whether this error kind is eligible for the retry-with-backoff
    /// policy in §7 (only `TransientIOError`).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientIOError { .. })
    }
}

impl From<String> for TarifaError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for TarifaError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

/// A specialized `Result` type using [`TarifaError`] as the error type.
pub type Result<T> = std::result::Result<T, TarifaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = TarifaError::StrategyCompileError {
            strategy: "momentum".into(),
            message: "unknown identifier 'foo'".into(),
        };
        assert_eq!(err.code(), "strategy_compile_error");
        assert!(err.to_string().contains("momentum"));
    }

    #[test]
    fn only_transient_io_is_retryable() {
        assert!(TarifaError::TransientIOError {
            operation: "fetch_bars".into(),
            message: "connection reset".into()
        }
        .is_retryable());
        assert!(!TarifaError::CorruptCurveError("non-monotonic".into()).is_retryable());
    }

    #[test]
    fn from_str_is_other() {
        let err: TarifaError = "boom".into();
        assert_eq!(err.code(), "other");
    }
}
