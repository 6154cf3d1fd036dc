//! The `PanelFrame` value type: a dense date x symbol matrix of one named
//! numeric quantity (§9 "Panel / frame ubiquity").

use ndarray::{Array2, ArrayView1, Axis};
use tarifa_traits::{Date, Symbol, TarifaError};

type Result<T> = std::result::Result<T, TarifaError>;

/// A dense date x symbol matrix. Rows are trading dates (strictly
/// increasing); columns are symbols. Cells hold `f64::NAN` for
/// non-existent observations — operators must propagate that hole rather
/// than treat it as zero (§3 "Panel Frame" invariant).
#[derive(Debug, Clone, PartialEq)]
pub struct PanelFrame {
    dates: Vec<Date>,
    symbols: Vec<Symbol>,
    data: Array2<f64>,
}

impl PanelFrame {
    /// Build a frame from an explicit date index, symbol index, and dense
    /// matrix. `data` must have shape `(dates.len(), symbols.len())` and
    /// `dates` must be strictly increasing.
    ///
    /// # Errors
    ///
    /// Returns [`TarifaError::InvalidData`] when the shape does not match
    /// the index lengths or the dates are not strictly increasing.
    pub fn new(dates: Vec<Date>, symbols: Vec<Symbol>, data: Array2<f64>) -> Result<Self> {
        if data.shape() != [dates.len(), symbols.len()] {
            return Err(TarifaError::Other(format!(
                "panel shape {:?} does not match index ({} dates, {} symbols)",
                data.shape(),
                dates.len(),
                symbols.len()
            )));
        }
        if !dates.windows(2).all(|w| w[0] < w[1]) {
            return Err(TarifaError::Other("panel dates must be strictly increasing".to_string()));
        }
        Ok(Self { dates, symbols, data })
    }

    /// A frame with no rows, over the given symbol index. Used as the
    /// identity value for folds over an empty expression set.
    #[must_use]
    pub fn empty(symbols: Vec<Symbol>) -> Self {
        let n = symbols.len();
        Self {
            dates: Vec::new(),
            symbols,
            data: Array2::from_elem((0, n), f64::NAN),
        }
    }

    /// A frame filled entirely with `value`, same shape as `self`. Used to
    /// broadcast a scalar literal against a panel operand in a binary
    /// expression.
    #[must_use]
    pub fn constant_like(&self, value: f64) -> Self {
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data: Array2::from_elem(self.data.dim(), value),
        }
    }

    /// A frame filled entirely with `NaN`, same shape as `self`. Used when
    /// a referenced symbol has no data at all (§4.1 "missing data in the DB
    /// ... degrades to all-NaN columns").
    #[must_use]
    pub fn all_nan_like(&self) -> Self {
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data: Array2::from_elem(self.data.dim(), f64::NAN),
        }
    }

    /// The date index.
    #[must_use]
    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    /// The symbol index.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// The underlying dense matrix.
    #[must_use]
    pub const fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Number of rows (trading dates).
    #[must_use]
    pub fn nrows(&self) -> usize {
        self.dates.len()
    }

    /// Number of columns (symbols).
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.symbols.len()
    }

    fn symbol_index(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    fn date_index(&self, date: Date) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    /// The value at `(date, symbol)`, or `NaN` if either is absent from the
    /// index (a non-trading day for that symbol, per §3).
    #[must_use]
    pub fn get(&self, date: Date, symbol: &str) -> f64 {
        match (self.date_index(date), self.symbol_index(symbol)) {
            (Some(r), Some(c)) => self.data[(r, c)],
            _ => f64::NAN,
        }
    }

    /// One column (one symbol's full time series).
    #[must_use]
    pub fn column(&self, symbol: &str) -> Option<ArrayView1<'_, f64>> {
        self.symbol_index(symbol).map(|c| self.data.column(c))
    }

    /// One row (one date's cross-section).
    #[must_use]
    pub fn row(&self, date: Date) -> Option<ArrayView1<'_, f64>> {
        self.date_index(date).map(|r| self.data.row(r))
    }

    /// The last row, the cross-section most operations target (§4.2 "one
    /// date = the target date, typically the most recent bar").
    #[must_use]
    pub fn last_row(&self) -> Option<ArrayView1<'_, f64>> {
        if self.dates.is_empty() {
            None
        } else {
            Some(self.data.row(self.dates.len() - 1))
        }
    }

    /// Restrict to dates within `[start, end]` inclusive, keeping every
    /// symbol column.
    #[must_use]
    pub fn slice(&self, start: Date, end: Date) -> Self {
        let rows: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= start && **d <= end)
            .map(|(i, _)| i)
            .collect();
        let dates: Vec<Date> = rows.iter().map(|&i| self.dates[i]).collect();
        let mut data = Array2::from_elem((rows.len(), self.ncols()), f64::NAN);
        for (out_r, &in_r) in rows.iter().enumerate() {
            data.row_mut(out_r).assign(&self.data.row(in_r));
        }
        Self {
            dates,
            symbols: self.symbols.clone(),
            data,
        }
    }

    /// Apply `f` to the elements in each trailing window of length
    /// `window`, per symbol column independently. The first `window - 1`
    /// rows of each column are `NaN` (the window is not yet full, per
    /// §4.1's universal "not yet full" edge-case policy). `f` receives the
    /// window's values in chronological order (oldest first).
    #[must_use]
    pub fn rolling_apply(&self, window: usize, f: impl Fn(&[f64]) -> f64) -> Self {
        let (nrows, ncols) = self.data.dim();
        let mut data = Array2::from_elem((nrows, ncols), f64::NAN);
        if window == 0 {
            return Self {
                dates: self.dates.clone(),
                symbols: self.symbols.clone(),
                data,
            };
        }
        for c in 0..ncols {
            let column = self.data.column(c);
            for r in (window.saturating_sub(1))..nrows {
                let start = r + 1 - window;
                let slice: Vec<f64> = column.slice(ndarray::s![start..=r]).to_vec();
                data[(r, c)] = f(&slice);
            }
        }
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data,
        }
    }

    /// Shift every column `n` rows down (`n > 0`, the common case for
    /// `ref`/`shift`) or up (`n < 0`). Vacated rows are `NaN`.
    #[must_use]
    pub fn shift(&self, n: i64) -> Self {
        let (nrows, ncols) = self.data.dim();
        let mut data = Array2::from_elem((nrows, ncols), f64::NAN);
        for r in 0..nrows {
            let src = r as i64 - n;
            if src >= 0 && (src as usize) < nrows {
                data.row_mut(r).assign(&self.data.row(src as usize));
            }
        }
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data,
        }
    }

    /// Elementwise unary map, e.g. `log`/`abs`/`exp`.
    #[must_use]
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data: self.data.mapv(f),
        }
    }

    /// Elementwise binary combine with another frame sharing the same
    /// index. Debug builds assert the indices line up (§4.1 "per-expression
    /// output must share the index of the input panel").
    #[must_use]
    pub fn zip_with(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Self {
        debug_assert_eq!(self.dates, other.dates, "panel date index mismatch");
        debug_assert_eq!(self.symbols, other.symbols, "panel symbol index mismatch");
        let mut data = Array2::from_elem(self.data.dim(), f64::NAN);
        for ((r, c), out) in data.indexed_iter_mut() {
            *out = f(self.data[(r, c)], other.data[(r, c)]);
        }
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data,
        }
    }

    /// Forward-fill each column: a `NaN` cell takes the value of the
    /// nearest preceding non-`NaN` cell in the same column. Used both for
    /// fundamentals (§3 "broadcasts the latest-known value forward") and
    /// for the rotation scheduler's "keep prior state" rule.
    #[must_use]
    pub fn forward_fill(&self) -> Self {
        let mut data = self.data.clone();
        for mut column in data.axis_iter_mut(Axis(1)) {
            let mut last = f64::NAN;
            for cell in &mut column {
                if cell.is_nan() {
                    *cell = last;
                } else {
                    last = *cell;
                }
            }
        }
        Self {
            dates: self.dates.clone(),
            symbols: self.symbols.clone(),
            data,
        }
    }

    /// Build a frame from long-form `(date, symbol, value)` records. Dates
    /// and symbols are deduplicated and sorted to form the index; cells
    /// with no matching record are `NaN`. Duplicate `(date, symbol)`
    /// records keep the last value seen.
    #[must_use]
    pub fn pivot_wide(records: impl IntoIterator<Item = (Date, Symbol, f64)>) -> Self {
        let records: Vec<(Date, Symbol, f64)> = records.into_iter().collect();

        let mut dates: Vec<Date> = records.iter().map(|(d, _, _)| *d).collect();
        dates.sort_unstable();
        dates.dedup();

        let mut symbols: Vec<Symbol> = records.iter().map(|(_, s, _)| s.clone()).collect();
        symbols.sort_unstable();
        symbols.dedup();

        let mut data = Array2::from_elem((dates.len(), symbols.len()), f64::NAN);
        for (date, symbol, value) in records {
            let r = dates.binary_search(&date).expect("date was inserted above");
            let c = symbols.binary_search(&symbol).expect("symbol was inserted above");
            data[(r, c)] = value;
        }

        Self { dates, symbols, data }
    }

    /// Reindex `self` and `other` onto the union of their date and symbol
    /// indices, filling any cell that neither side supplies with `NaN`.
    /// Both returned frames share the same index and therefore can be fed
    /// to [`Self::zip_with`].
    #[must_use]
    pub fn align_union(&self, other: &Self) -> (Self, Self) {
        let mut dates: Vec<Date> = self
            .dates
            .iter()
            .chain(other.dates.iter())
            .copied()
            .collect();
        dates.sort_unstable();
        dates.dedup();

        let mut symbols: Vec<Symbol> = self
            .symbols
            .iter()
            .chain(other.symbols.iter())
            .cloned()
            .collect();
        symbols.sort_unstable();
        symbols.dedup();

        (self.reindex(&dates, &symbols), other.reindex(&dates, &symbols))
    }

    fn reindex(&self, dates: &[Date], symbols: &[Symbol]) -> Self {
        let mut data = Array2::from_elem((dates.len(), symbols.len()), f64::NAN);
        for (r, date) in dates.iter().enumerate() {
            let Some(src_r) = self.date_index(*date) else { continue };
            for (c, symbol) in symbols.iter().enumerate() {
                if let Some(src_c) = self.symbol_index(symbol) {
                    data[(r, c)] = self.data[(src_r, src_c)];
                }
            }
        }
        Self {
            dates: dates.to_vec(),
            symbols: symbols.to_vec(),
            data,
        }
    }
}
