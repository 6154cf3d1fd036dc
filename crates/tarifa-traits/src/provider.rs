//! The upstream market-data provider boundary.
//!
//! The core never calls this trait; only the out-of-scope downloader
//! collaborator does, writing the results into the tables behind
//! [`crate::store::Store`]. It is defined here so the type boundary is
//! explicit and can be exercised in tests with a fake.

use async_trait::async_trait;

use crate::error::Result;
use crate::store::{FundamentalSnapshot, HistoricalBar};
use crate::types::{AdjustKind, Date};

/// A single upstream data source for bars and fundamental snapshots.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetch daily bars for `symbol` between `start` and `end` on the given
    /// adjustment series.
    async fn fetch_bars(
        &self,
        symbol: &str,
        start: Date,
        end: Date,
        adjust: AdjustKind,
    ) -> Result<Vec<HistoricalBar>>;

    /// Fetch the latest fundamental snapshot for `symbol`.
    async fn fetch_fundamental_snapshot(&self, symbol: &str) -> Result<FundamentalSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    struct FakeProvider;

    #[async_trait]
    impl MarketDataProvider for FakeProvider {
        async fn fetch_bars(
            &self,
            _symbol: &str,
            _start: Date,
            _end: Date,
            _adjust: AdjustKind,
        ) -> Result<Vec<HistoricalBar>> {
            Ok(vec![])
        }

        async fn fetch_fundamental_snapshot(&self, _symbol: &str) -> Result<FundamentalSnapshot> {
            Ok(FundamentalSnapshot {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                pe: Some(12.0),
                pb: Some(1.5),
            })
        }
    }

    #[tokio::test]
    async fn fake_provider_satisfies_the_trait() {
        let provider = FakeProvider;
        let snapshot = provider.fetch_fundamental_snapshot("510300.SH").await.unwrap();
        assert_eq!(snapshot.pe, Some(12.0));
    }
}
