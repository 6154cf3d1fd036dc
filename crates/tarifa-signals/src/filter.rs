//! The Smart Filter: a five-layer sieve over a symbol universe (§4.2.1),
//! each layer narrowing its input.
//!
//! Layers 4 (liquidity) reuse [`tarifa_expr::operators::ma`] for the
//! trailing rolling averages, rather than re-implementing a mean, so the
//! filter's notion of "20-day average" matches the factor engine's.

use tarifa_expr::operators::ma;
use tarifa_panel::PanelFrame;
use tarifa_traits::{AssetType, Date, Symbol, SymbolClassification};

/// Configuration for one layer of the [`SmartFilter`].
#[derive(Debug, Clone, PartialEq)]
pub struct SmartFilterConfig {
    /// Layer 1: minimum trading history, in days, before the target date.
    pub min_data_days: u32,
    /// Layer 2: drop ST-flagged symbols.
    pub exclude_st: bool,
    /// Layer 2: drop suspended symbols.
    pub exclude_suspend: bool,
    /// Layer 2: drop symbols listed within this many days of the target
    /// date. `0` disables the check.
    pub exclude_new_ipo_days: u32,
    /// Layer 2: drop STAR-board, ChiNext, and Beijing-exchange symbols.
    pub exclude_restricted_boards: bool,
    /// Layer 3: minimum total market cap, 亿元. `None` disables the band's
    /// lower bound.
    pub min_total_mv: Option<f64>,
    /// Layer 3: maximum total market cap, 亿元. `None` disables the band's
    /// upper bound.
    pub max_total_mv: Option<f64>,
    /// Layer 4: minimum rolling-average turnover rate, %.
    pub min_turnover_rate: Option<f64>,
    /// Layer 4: minimum rolling-average traded amount, 万元.
    pub min_avg_amount: Option<f64>,
    /// Trailing window, in trading days, for the layer-4 rolling averages.
    pub liquidity_days: usize,
    /// Layer 5: maximum symbols to keep, ranked by rolling-average amount
    /// descending. `None` disables the cap.
    pub target_count: Option<usize>,
}

/// The three named presets (§4.2.1).
pub struct SmartFilterPresets;

impl SmartFilterPresets {
    /// Tight band: well-established, liquid, large-cap names only.
    #[must_use]
    pub fn conservative() -> SmartFilterConfig {
        SmartFilterConfig {
            min_data_days: 365,
            exclude_st: true,
            exclude_suspend: true,
            exclude_new_ipo_days: 180,
            exclude_restricted_boards: true,
            min_total_mv: Some(100.0),
            max_total_mv: None,
            min_turnover_rate: Some(1.5),
            min_avg_amount: Some(10_000.0),
            liquidity_days: 20,
            target_count: Some(300),
        }
    }

    /// The default middle ground.
    #[must_use]
    pub fn balanced() -> SmartFilterConfig {
        SmartFilterConfig {
            min_data_days: 180,
            exclude_st: true,
            exclude_suspend: true,
            exclude_new_ipo_days: 60,
            exclude_restricted_boards: false,
            min_total_mv: Some(50.0),
            max_total_mv: None,
            min_turnover_rate: Some(1.5),
            min_avg_amount: Some(5_000.0),
            liquidity_days: 20,
            target_count: Some(1_000),
        }
    }

    /// Wide universe: light filtering, lets small/illiquid names through.
    #[must_use]
    pub fn aggressive() -> SmartFilterConfig {
        SmartFilterConfig {
            min_data_days: 180,
            exclude_st: true,
            exclude_suspend: true,
            exclude_new_ipo_days: 0,
            exclude_restricted_boards: false,
            min_total_mv: None,
            max_total_mv: None,
            min_turnover_rate: None,
            min_avg_amount: None,
            liquidity_days: 20,
            target_count: None,
        }
    }
}

impl Default for SmartFilterConfig {
    fn default() -> Self {
        SmartFilterPresets::balanced()
    }
}

/// A five-layer sieve: data availability → status → market-cap band →
/// liquidity → count cap.
#[derive(Debug, Clone)]
pub struct SmartFilter {
    config: SmartFilterConfig,
}

impl SmartFilter {
    /// Build a filter from `config`.
    #[must_use]
    pub fn new(config: SmartFilterConfig) -> Self {
        Self { config }
    }

    /// Run every layer in order over `classification`, returning the
    /// surviving symbols. `turnover_rate`/`amount` must cover every symbol
    /// in `classification` up to and including `target_date`.
    #[must_use]
    pub fn apply(
        &self,
        classification: &[SymbolClassification],
        target_date: Date,
        turnover_rate: &PanelFrame,
        amount: &PanelFrame,
    ) -> Vec<Symbol> {
        let by_symbol: std::collections::HashMap<&str, &SymbolClassification> =
            classification.iter().map(|c| (c.symbol.as_str(), c)).collect();

        let survivors = self.layer1_data_availability(classification, target_date, turnover_rate);
        let survivors = self.layer2_status(&survivors, &by_symbol, target_date);
        let survivors = self.layer3_market_cap(&survivors, &by_symbol);
        let survivors = self.layer4_liquidity(&survivors, target_date, turnover_rate, amount);
        self.layer5_count_cap(&survivors, target_date, amount)
    }

    fn layer1_data_availability(
        &self,
        classification: &[SymbolClassification],
        target_date: Date,
        turnover_rate: &PanelFrame,
    ) -> Vec<Symbol> {
        classification
            .iter()
            .filter(|c| data_days(turnover_rate, &c.symbol, target_date) as u32 >= self.config.min_data_days)
            .map(|c| c.symbol.clone())
            .collect()
    }

    fn layer2_status(
        &self,
        symbols: &[Symbol],
        by_symbol: &std::collections::HashMap<&str, &SymbolClassification>,
        target_date: Date,
    ) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|symbol| {
                let Some(c) = by_symbol.get(symbol.as_str()) else {
                    return false;
                };
                if self.config.exclude_st && c.is_st {
                    return false;
                }
                if self.config.exclude_suspend && c.is_suspend {
                    return false;
                }
                if self.config.exclude_new_ipo_days > 0 {
                    let days_listed = (target_date - c.list_date).num_days();
                    if days_listed < i64::from(self.config.exclude_new_ipo_days) {
                        return false;
                    }
                }
                if self.config.exclude_restricted_boards
                    && c.asset_type == AssetType::AShare
                    && is_restricted_board(symbol)
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect()
    }

    fn layer3_market_cap(
        &self,
        symbols: &[Symbol],
        by_symbol: &std::collections::HashMap<&str, &SymbolClassification>,
    ) -> Vec<Symbol> {
        if self.config.min_total_mv.is_none() && self.config.max_total_mv.is_none() {
            return symbols.to_vec();
        }
        symbols
            .iter()
            .filter(|symbol| {
                let Some(c) = by_symbol.get(symbol.as_str()) else {
                    return false;
                };
                let Some(mv) = c.total_mv else {
                    return false;
                };
                self.config.min_total_mv.is_none_or(|min| mv >= min)
                    && self.config.max_total_mv.is_none_or(|max| mv <= max)
            })
            .cloned()
            .collect()
    }

    fn layer4_liquidity(
        &self,
        symbols: &[Symbol],
        target_date: Date,
        turnover_rate: &PanelFrame,
        amount: &PanelFrame,
    ) -> Vec<Symbol> {
        if self.config.min_turnover_rate.is_none() && self.config.min_avg_amount.is_none() {
            return symbols.to_vec();
        }
        let avg_turnover = ma(turnover_rate, self.config.liquidity_days);
        let avg_amount = ma(amount, self.config.liquidity_days);
        symbols
            .iter()
            .filter(|symbol| {
                let turnover_ok = self
                    .config
                    .min_turnover_rate
                    .is_none_or(|min| avg_turnover.get(target_date, symbol) >= min);
                let amount_ok = self
                    .config
                    .min_avg_amount
                    .is_none_or(|min| avg_amount.get(target_date, symbol) >= min);
                turnover_ok && amount_ok
            })
            .cloned()
            .collect()
    }

    fn layer5_count_cap(&self, symbols: &[Symbol], target_date: Date, amount: &PanelFrame) -> Vec<Symbol> {
        let Some(target_count) = self.config.target_count else {
            return symbols.to_vec();
        };
        if symbols.len() <= target_count {
            return symbols.to_vec();
        }
        let avg_amount = ma(amount, self.config.liquidity_days);
        let mut ranked: Vec<&Symbol> = symbols.iter().collect();
        ranked.sort_by(|a, b| {
            let va = avg_amount.get(target_date, a);
            let vb = avg_amount.get(target_date, b);
            vb.partial_cmp(&va).unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.into_iter().take(target_count).cloned().collect()
    }
}

fn data_days(panel: &PanelFrame, symbol: &str, target_date: Date) -> usize {
    match panel.column(symbol) {
        Some(col) => panel
            .dates()
            .iter()
            .zip(col.iter())
            .filter(|(date, value)| **date <= target_date && !value.is_nan())
            .count(),
        None => 0,
    }
}

/// Whether `symbol` trades on the STAR board (`688xxx`), ChiNext
/// (`300xxx`/`301xxx`), or the Beijing Stock Exchange (`8xxxxx`/`4xxxxx`),
/// the three restricted boards §4.2.1 names.
#[must_use]
pub fn is_restricted_board(symbol: &str) -> bool {
    const RESTRICTED_PREFIXES: &[&str] = &["688", "300", "301", "8", "4"];
    RESTRICTED_PREFIXES.iter().any(|prefix| symbol.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> Date {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn classification(symbol: &str, is_st: bool, is_suspend: bool, total_mv: Option<f64>) -> SymbolClassification {
        SymbolClassification {
            symbol: symbol.to_string(),
            asset_type: AssetType::AShare,
            list_date: date(2015, 1, 1),
            is_st,
            is_suspend,
            total_mv,
        }
    }

    fn panel_of(symbols: &[&str], value: f64, days: usize) -> PanelFrame {
        let dates: Vec<Date> = (1..=days).map(|d| date(2024, 1, d as u32)).collect();
        let data = ndarray::Array2::from_elem((days, symbols.len()), value);
        PanelFrame::new(dates, symbols.iter().map(|s| s.to_string()).collect(), data).unwrap()
    }

    #[test]
    fn restricted_board_prefixes_are_detected() {
        assert!(is_restricted_board("688981.SH"));
        assert!(is_restricted_board("300750.SZ"));
        assert!(is_restricted_board("830946.BJ"));
        assert!(!is_restricted_board("600519.SH"));
    }

    #[test]
    fn excludes_st_and_suspended_symbols() {
        let classification = vec![
            classification("A", true, false, Some(100.0)),
            classification("B", false, true, Some(100.0)),
            classification("C", false, false, Some(100.0)),
        ];
        let turnover = panel_of(&["A", "B", "C"], 2.0, 30);
        let amount = panel_of(&["A", "B", "C"], 8_000.0, 30);
        let mut config = SmartFilterPresets::aggressive();
        config.min_data_days = 0;
        let filter = SmartFilter::new(config);
        let survivors = filter.apply(&classification, date(2024, 1, 30), &turnover, &amount);
        assert_eq!(survivors, vec!["C".to_string()]);
    }

    #[test]
    fn market_cap_band_excludes_symbols_with_no_figure() {
        let classification = vec![
            classification("A", false, false, Some(30.0)),
            classification("B", false, false, None),
        ];
        let turnover = panel_of(&["A", "B"], 2.0, 30);
        let amount = panel_of(&["A", "B"], 8_000.0, 30);
        let mut config = SmartFilterPresets::aggressive();
        config.min_data_days = 0;
        config.min_total_mv = Some(50.0);
        let filter = SmartFilter::new(config);
        let survivors = filter.apply(&classification, date(2024, 1, 30), &turnover, &amount);
        assert!(survivors.is_empty());
    }

    #[test]
    fn count_cap_keeps_the_highest_amount_symbols() {
        let classification = vec![
            classification("A", false, false, Some(100.0)),
            classification("B", false, false, Some(100.0)),
            classification("C", false, false, Some(100.0)),
        ];
        let turnover = panel_of(&["A", "B", "C"], 2.0, 30);
        let dates: Vec<Date> = (1..=30).map(|d| date(2024, 1, d)).collect();
        let data = ndarray::Array2::from_shape_fn((30, 3), |(_, c)| [5_000.0, 9_000.0, 7_000.0][c]);
        let amount = PanelFrame::new(dates, vec!["A".to_string(), "B".to_string(), "C".to_string()], data).unwrap();
        let mut config = SmartFilterPresets::aggressive();
        config.min_data_days = 0;
        config.target_count = Some(2);
        let filter = SmartFilter::new(config);
        let survivors = filter.apply(&classification, date(2024, 1, 30), &turnover, &amount);
        assert_eq!(survivors, vec!["B".to_string(), "C".to_string()]);
    }
}
