//! The rotation backtester's rebalance scheduler (§4.3 "Scheduler").
//!
//! One [`RebalanceScheduler`] tracks a single task's rebalance cadence
//! across a run. It walks `Pending -> Rebalancing -> Holding -> {Rebalancing
//! | Terminal}`: the first bar always rebalances, subsequent bars rebalance
//! only when the task's [`Period`] says the current period has rolled over,
//! and the final bar of the run becomes `Terminal` once no further
//! rebalance is due.

use chrono::Datelike;
use tarifa_traits::types::{iso_year_week, year_month, year_quarter};
use tarifa_traits::{Date, Period};

/// Where a scheduler sits in its rebalance cycle, for observability and
/// tests. `advance` never returns `Pending`; it is the conceptual state
/// before the first bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No bar has been processed yet.
    Pending,
    /// This bar triggers a rebalance.
    Rebalancing,
    /// This bar holds the prior allocation unchanged.
    Holding,
    /// The final bar of the run, and no rebalance is due.
    Terminal,
}

/// Drives one task's rebalance cadence, bar by bar.
#[derive(Debug, Clone)]
pub struct RebalanceScheduler {
    period: Period,
    last_period_key: Option<(i32, u32)>,
    last_rebalance_date: Option<Date>,
    state: SchedulerState,
}

impl RebalanceScheduler {
    /// Build a scheduler for `period`, starting in [`SchedulerState::Pending`].
    #[must_use]
    pub fn new(period: Period) -> Self {
        Self {
            period,
            last_period_key: None,
            last_rebalance_date: None,
            state: SchedulerState::Pending,
        }
    }

    /// Current state, as of the last call to [`Self::advance`].
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Process one trading day and return whether it triggers a
    /// rebalance. `is_last_trading_day` marks the final bar of the run —
    /// for `Period::EveryNPeriods`, this forces one last rebalance even if
    /// the window has not fully elapsed, so a partial final period is not
    /// silently skipped.
    pub fn advance(&mut self, today: Date, is_last_trading_day: bool) -> bool {
        let trigger = match self.period {
            Period::Daily => true,
            Period::Weekly => self.period_key_changed(iso_year_week(today)),
            Period::Monthly => self.period_key_changed(year_month(today)),
            Period::Quarterly => self.period_key_changed(year_quarter(today)),
            Period::Yearly => self.period_key_changed((today.year(), 0)),
            Period::RunOnce => self.last_rebalance_date.is_none(),
            Period::EveryNPeriods(n) => {
                self.last_rebalance_date.is_none()
                    || self.last_rebalance_date.is_some_and(|last| (today - last).num_days() >= i64::from(n))
                    || (is_last_trading_day && self.last_rebalance_date != Some(today))
            }
        };

        if trigger {
            self.last_rebalance_date = Some(today);
            self.state = SchedulerState::Rebalancing;
        } else if is_last_trading_day {
            self.state = SchedulerState::Terminal;
        } else {
            self.state = SchedulerState::Holding;
        }
        trigger
    }

    fn period_key_changed(&mut self, key: (i32, u32)) -> bool {
        let changed = self.last_period_key != Some(key);
        if changed {
            self.last_period_key = Some(key);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_period_always_rebalances() {
        let mut scheduler = RebalanceScheduler::new(Period::Daily);
        assert!(scheduler.advance(date(2024, 1, 1), false));
        assert!(scheduler.advance(date(2024, 1, 2), false));
        assert_eq!(scheduler.state(), SchedulerState::Rebalancing);
    }

    #[test]
    fn run_once_rebalances_only_on_the_first_bar() {
        let mut scheduler = RebalanceScheduler::new(Period::RunOnce);
        assert!(scheduler.advance(date(2024, 1, 1), false));
        assert!(!scheduler.advance(date(2024, 1, 2), false));
        assert!(!scheduler.advance(date(2024, 1, 3), true));
        assert_eq!(scheduler.state(), SchedulerState::Terminal);
    }

    #[test]
    fn monthly_period_rebalances_on_month_rollover() {
        let mut scheduler = RebalanceScheduler::new(Period::Monthly);
        assert!(scheduler.advance(date(2024, 1, 15), false));
        assert!(!scheduler.advance(date(2024, 1, 20), false));
        assert!(scheduler.advance(date(2024, 2, 1), false));
    }

    #[test]
    fn weekly_period_rebalances_on_iso_week_rollover() {
        let mut scheduler = RebalanceScheduler::new(Period::Weekly);
        assert!(scheduler.advance(date(2024, 1, 1), false));
        assert!(!scheduler.advance(date(2024, 1, 2), false));
        assert!(scheduler.advance(date(2024, 1, 8), false));
    }

    #[test]
    fn every_n_periods_rebalances_after_n_days_elapse() {
        let mut scheduler = RebalanceScheduler::new(Period::EveryNPeriods(5));
        assert!(scheduler.advance(date(2024, 1, 1), false));
        assert!(!scheduler.advance(date(2024, 1, 3), false));
        assert!(scheduler.advance(date(2024, 1, 6), false));
    }

    #[test]
    fn every_n_periods_forces_a_final_rebalance_on_the_last_bar() {
        let mut scheduler = RebalanceScheduler::new(Period::EveryNPeriods(20));
        assert!(scheduler.advance(date(2024, 1, 1), false));
        assert!(!scheduler.advance(date(2024, 1, 5), false));
        assert!(scheduler.advance(date(2024, 1, 6), true));
    }

    #[test]
    fn quarterly_period_rebalances_on_quarter_rollover() {
        let mut scheduler = RebalanceScheduler::new(Period::Quarterly);
        assert!(scheduler.advance(date(2024, 1, 1), false));
        assert!(!scheduler.advance(date(2024, 3, 31), false));
        assert!(scheduler.advance(date(2024, 4, 1), false));
    }
}
