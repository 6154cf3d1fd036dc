//! Performance metrics computed from a completed backtest's daily
//! [`PortfolioState`] series (§4.5).
//!
//! Every metric degrades to `0.0` on empty or constant inputs rather than
//! propagating `NaN` to the caller (§4.5 "All metrics degrade gracefully").

use std::collections::BTreeMap;

use tarifa_traits::report::WinRates;
use tarifa_traits::types::year_month;
use tarifa_traits::PortfolioState;

/// Tunables for [`PerformanceMetrics::calculate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsConfig {
    /// Annual risk-free rate subtracted before Sharpe/Sortino.
    pub risk_free_rate: f64,
    /// Trading days per year used for annualization.
    pub trading_days_per_year: f64,
    /// Confidence level for VaR/CVaR, e.g. `0.95`.
    pub var_confidence: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.03,
            trading_days_per_year: 252.0,
            var_confidence: 0.95,
        }
    }
}

/// The full set of performance metrics in §4.5, shaped to drop directly
/// into [`tarifa_traits::BacktestReport`]'s metric fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceMetrics {
    pub annual_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub calmar: f64,
    pub max_dd: f64,
    pub var95: f64,
    pub cvar95: f64,
    pub info_ratio: Option<f64>,
    pub win_rates: WinRates,
    pub monthly_returns: BTreeMap<String, f64>,
}

impl PerformanceMetrics {
    /// Compute every metric from a completed run's daily states.
    /// `benchmark_returns`, if given, must be the same length as `states`
    /// and aligned day-for-day; its presence alone decides whether
    /// [`Self::info_ratio`] is populated.
    #[must_use]
    pub fn calculate(
        states: &[PortfolioState],
        benchmark_returns: Option<&[f64]>,
        config: &MetricsConfig,
    ) -> Self {
        if states.is_empty() {
            return Self {
                annual_return: 0.0,
                volatility: 0.0,
                sharpe: 0.0,
                sortino: 0.0,
                calmar: 0.0,
                max_dd: 0.0,
                var95: 0.0,
                cvar95: 0.0,
                info_ratio: None,
                win_rates: WinRates {
                    daily: 0.0,
                    weekly: 0.0,
                    monthly: 0.0,
                },
                monthly_returns: BTreeMap::new(),
            };
        }

        let returns: Vec<f64> = states.iter().map(|s| s.daily_return).collect();
        let total_return = states.last().expect("non-empty").cumulative_return;
        let max_dd = states.iter().map(|s| s.running_max_drawdown).fold(0.0_f64, f64::min);

        let annual_return = annualize(total_return, states.len());
        let volatility = population_std(&returns) * config.trading_days_per_year.sqrt();
        let sharpe = if volatility > 0.0 {
            (annual_return - config.risk_free_rate) / volatility
        } else {
            0.0
        };
        let sortino = sortino_ratio(annual_return, &returns, config);
        let calmar = if max_dd != 0.0 { annual_return / max_dd.abs() } else { 0.0 };
        let var95 = percentile(&returns, 1.0 - config.var_confidence);
        let cvar95 = conditional_value_at_risk(&returns, var95);
        let win_rates = win_rates(states);
        let monthly_returns = monthly_returns(states);
        let info_ratio = benchmark_returns.map(|bench| information_ratio(&returns, bench, config));

        Self {
            annual_return,
            volatility,
            sharpe,
            sortino,
            calmar,
            max_dd,
            var95,
            cvar95,
            info_ratio,
            win_rates,
            monthly_returns,
        }
    }
}

fn annualize(total_return: f64, n_days: usize) -> f64 {
    if n_days == 0 {
        return 0.0;
    }
    (1.0 + total_return).powf(252.0 / n_days as f64) - 1.0
}

fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn sortino_ratio(annual_return: f64, returns: &[f64], config: &MetricsConfig) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|&r| r < 0.0).collect();
    let downside_std = population_std(&downside) * config.trading_days_per_year.sqrt();
    if downside_std == 0.0 {
        return 0.0;
    }
    (annual_return - config.risk_free_rate) / downside_std
}

/// Linear-interpolated percentile, matching `numpy.percentile`'s default
/// method, at fraction `q` in `[0, 1]`.
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

fn conditional_value_at_risk(returns: &[f64], var: f64) -> f64 {
    let tail: Vec<f64> = returns.iter().copied().filter(|&r| r <= var).collect();
    if tail.is_empty() {
        return var;
    }
    tail.iter().sum::<f64>() / tail.len() as f64
}

fn compounded(returns: &[f64]) -> f64 {
    returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0
}

fn win_rates(states: &[PortfolioState]) -> WinRates {
    let returns: Vec<f64> = states.iter().map(|s| s.daily_return).collect();

    let daily = win_rate_pct(returns.iter().filter(|&&r| r > 0.0).count(), returns.len());

    let weekly_returns: Vec<f64> = returns.chunks(5).map(compounded).collect();
    let weekly = win_rate_pct(weekly_returns.iter().filter(|&&r| r > 0.0).count(), weekly_returns.len());

    let monthly_map = monthly_returns(states);
    let monthly = win_rate_pct(monthly_map.values().filter(|&&r| r > 0.0).count(), monthly_map.len());

    WinRates { daily, weekly, monthly }
}

fn win_rate_pct(wins: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        wins as f64 / total as f64 * 100.0
    }
}

fn monthly_returns(states: &[PortfolioState]) -> BTreeMap<String, f64> {
    let mut buckets: BTreeMap<(i32, u32), Vec<f64>> = BTreeMap::new();
    for state in states {
        buckets.entry(year_month(state.date)).or_default().push(state.daily_return);
    }
    buckets
        .into_iter()
        .map(|((year, month), returns)| (format!("{year:04}-{month:02}"), compounded(&returns)))
        .collect()
}

fn information_ratio(returns: &[f64], benchmark: &[f64], config: &MetricsConfig) -> f64 {
    if returns.is_empty() || returns.len() != benchmark.len() {
        return 0.0;
    }
    let excess: Vec<f64> = returns.iter().zip(benchmark).map(|(r, b)| r - b).collect();
    let tracking_error = population_std(&excess) * config.trading_days_per_year.sqrt();
    if tracking_error == 0.0 {
        return 0.0;
    }
    let mean_excess = excess.iter().sum::<f64>() / excess.len() as f64;
    mean_excess * config.trading_days_per_year / tracking_error
}
