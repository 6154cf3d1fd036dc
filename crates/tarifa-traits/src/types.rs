//! Common types shared across the Tarifa backtest engine.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A trading date. Trading-day calendars are the caller's responsibility;
/// this type only carries the calendar date.
pub type Date = NaiveDate;

/// A market symbol identifier, e.g. `"510300.SH"` or `"600519.SH"`.
pub type Symbol = String;

/// Classification of a symbol as an ETF or an A-share equity.
///
/// Symbols starting with `51`, `52`, `53`, `56`, `58`, or `159` are ETFs;
/// everything else is treated as an A-share equity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// Exchange-traded fund.
    Etf,
    /// A-share equity.
    AShare,
}

impl AssetType {
    /// Classify a symbol by its numeric prefix.
    ///
    /// # Examples
    ///
    /// ```
    /// use tarifa_traits::AssetType;
    ///
    /// assert_eq!(AssetType::classify("510300.SH"), AssetType::Etf);
    /// assert_eq!(AssetType::classify("159919.SZ"), AssetType::Etf);
    /// assert_eq!(AssetType::classify("600519.SH"), AssetType::AShare);
    /// ```
    #[must_use]
    pub fn classify(symbol: &str) -> Self {
        const ETF_PREFIXES: &[&str] = &["51", "52", "53", "56", "58", "159"];
        if ETF_PREFIXES.iter().any(|p| symbol.starts_with(p)) {
            Self::Etf
        } else {
            Self::AShare
        }
    }
}

/// Which price-adjustment series a task should read.
///
/// The upstream data provider carries both a raw series and a
/// forward-adjusted ("qfq") series that folds corporate actions back so
/// the latest price is unchanged. The core always reads whichever series
/// the task declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustKind {
    /// Unadjusted close-of-day prices.
    Raw,
    /// Forward-adjusted prices.
    ForwardAdjusted,
}

impl Default for AdjustKind {
    fn default() -> Self {
        Self::ForwardAdjusted
    }
}

/// Exchange suffix extracted from a symbol, e.g. `SH`, `SZ`, `BJ`.
#[must_use]
pub fn exchange_suffix(symbol: &str) -> Option<&str> {
    symbol.rsplit('.').next().filter(|s| *s != symbol)
}

/// A `(year, month)` key used for monthly bucketing (monthly returns,
/// `Period::Monthly` rebalancing).
#[must_use]
pub fn year_month(date: Date) -> (i32, u32) {
    (date.year(), date.month())
}

/// A `(ISO year, ISO week)` key used for weekly bucketing.
#[must_use]
pub fn iso_year_week(date: Date) -> (i32, u32) {
    let iso = date.iso_week();
    (iso.year(), iso.week())
}

/// A `(year, quarter)` key used for quarterly bucketing.
#[must_use]
pub fn year_quarter(date: Date) -> (i32, u32) {
    (date.year(), (date.month0() / 3) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_etf_prefixes() {
        for sym in ["510300.SH", "513100.SH", "159915.SZ", "588000.SH", "560001.SH"] {
            assert_eq!(AssetType::classify(sym), AssetType::Etf, "{sym}");
        }
    }

    #[test]
    fn classify_ashare() {
        for sym in ["600519.SH", "000001.SZ", "300750.SZ"] {
            assert_eq!(AssetType::classify(sym), AssetType::AShare, "{sym}");
        }
    }

    #[test]
    fn quarter_buckets() {
        assert_eq!(year_quarter(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()), (2024, 1));
        assert_eq!(year_quarter(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap()), (2024, 2));
        assert_eq!(year_quarter(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()), (2024, 4));
    }
}
