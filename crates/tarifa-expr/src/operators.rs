//! The operator library (§4.1 table), each operating on whole
//! [`PanelFrame`]s, vectorised per symbol.

use tarifa_panel::PanelFrame;

/// `1e-6`, the epsilon `pe_score`/`pb_score`/`ps_score` add before
/// reciprocating.
const SCORE_EPSILON: f64 = 1e-6;

/// Division that yields `NaN` instead of `+/-inf` on a zero denominator
/// (§4.1: "division by zero yields NaN (not +-infinity)").
#[must_use]
pub fn safe_div(a: f64, b: f64) -> f64 {
    if b == 0.0 {
        f64::NAN
    } else {
        a / b
    }
}

/// `ref(x, n)`: value from `n` trading days earlier.
#[must_use]
pub fn ref_(x: &PanelFrame, n: usize) -> PanelFrame {
    x.shift(n as i64)
}

/// `ma(x, n)`: simple moving average of the trailing `n` days.
#[must_use]
pub fn ma(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| w.iter().sum::<f64>() / w.len() as f64)
}

/// `ema(x, n)`: exponential moving average, smoothing `2 / (n + 1)`.
///
/// Unlike the other operators this is not a fixed-window reduction: each
/// day's value depends on the previous day's EMA. A `NaN` input leaves the
/// running average unchanged and itself emits `NaN` for that day.
#[must_use]
pub fn ema(x: &PanelFrame, n: usize) -> PanelFrame {
    let alpha = 2.0 / (n as f64 + 1.0);
    let (nrows, ncols) = x.data().dim();
    let mut data = ndarray::Array2::from_elem((nrows, ncols), f64::NAN);
    for c in 0..ncols {
        let mut prev: Option<f64> = None;
        for r in 0..nrows {
            let v = x.data()[(r, c)];
            if v.is_nan() {
                data[(r, c)] = f64::NAN;
                continue;
            }
            let next = match prev {
                None => v,
                Some(p) => alpha * v + (1.0 - alpha) * p,
            };
            data[(r, c)] = next;
            prev = Some(next);
        }
    }
    PanelFrame::new(x.dates().to_vec(), x.symbols().to_vec(), data).expect("same shape as input")
}

/// `std(x, n)`: rolling sample standard deviation (Bessel-corrected).
#[must_use]
pub fn std(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| {
        if w.iter().any(|v| v.is_nan()) || w.len() < 2 {
            return if w.len() < 2 { 0.0 } else { f64::NAN };
        }
        let mean = w.iter().sum::<f64>() / w.len() as f64;
        let var = w.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (w.len() as f64 - 1.0);
        var.sqrt()
    })
}

/// `sum(x, n)`: rolling sum.
#[must_use]
pub fn sum(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| w.iter().sum())
}

/// `max(x, n)`: rolling maximum. `NaN` propagates if any value in the
/// window is missing (unlike `f64::max`, which ignores `NaN`).
#[must_use]
pub fn max(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| {
        if w.iter().any(|v| v.is_nan()) {
            f64::NAN
        } else {
            w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }
    })
}

/// `min(x, n)`: rolling minimum, same `NaN` policy as [`max`].
#[must_use]
pub fn min(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| {
        if w.iter().any(|v| v.is_nan()) {
            f64::NAN
        } else {
            w.iter().copied().fold(f64::INFINITY, f64::min)
        }
    })
}

/// `roc(x, n)`: `(x - ref(x,n)) / ref(x,n)`.
#[must_use]
pub fn roc(x: &PanelFrame, n: usize) -> PanelFrame {
    let prior = ref_(x, n);
    x.zip_with(&prior, safe_div_roc)
}

fn safe_div_roc(current: f64, prior: f64) -> f64 {
    safe_div(current - prior, prior)
}

/// OLS slope and R-squared of `window` against `0..n-1`, computed in
/// log-space (matching the upstream `_linear_regression_params` source).
/// Short-circuits to `(0.0, 0.0)` when `n < 2`, any value in the window is
/// non-positive (log undefined), or the index has zero variance.
#[must_use]
pub fn log_ols(window: &[f64]) -> (f64, f64) {
    let n = window.len();
    if n < 2 {
        return (0.0, 0.0);
    }
    let mut logs = Vec::with_capacity(n);
    for &v in window {
        if v.is_nan() || v <= 0.0 {
            return (0.0, 0.0);
        }
        logs.push(v.ln());
    }
    let x_mean = (n as f64 - 1.0) / 2.0;
    let y_mean = logs.iter().sum::<f64>() / n as f64;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    for (i, y) in logs.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxy += dx * (y - y_mean);
        sxx += dx * dx;
    }
    if sxx.abs() < 1e-9 {
        return (0.0, 0.0);
    }
    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in logs.iter().enumerate() {
        let pred = intercept + slope * i as f64;
        ss_res += (y - pred).powi(2);
        ss_tot += (y - y_mean).powi(2);
    }
    let r2 = if ss_tot.abs() < 1e-9 {
        0.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };
    (slope, r2)
}

/// `slope(x, n)`: log-space OLS slope of the trailing `n` values.
#[must_use]
pub fn slope(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| log_ols(w).0)
}

/// `rsquare(x, n)`: log-space OLS R-squared of the trailing `n` values,
/// clipped to `[0, 1]`.
#[must_use]
pub fn rsquare(x: &PanelFrame, n: usize) -> PanelFrame {
    x.rolling_apply(n, |w| log_ols(w).1)
}

/// `trend_score(x, n)`: `(exp(slope * 250) - 1) * rsquare`, the annualised
/// log-slope scaled by regression fit quality. Collapses to `0` whenever
/// `log_ols` short-circuits (§4.1: "trend_score thus collapses to 0 during
/// insufficient history").
#[must_use]
pub fn trend_score(x: &PanelFrame, n: usize) -> PanelFrame {
    let annualized_slope = x.rolling_apply(n, |w| {
        let (slope, _r2) = log_ols(w);
        (slope * 250.0).exp() - 1.0
    });
    annualized_slope.zip_with(&rsquare(x, n), |trend_component, r2| trend_component * r2)
}

/// `log(x)`: element-wise natural log; non-positive inputs yield `NaN`.
#[must_use]
pub fn log(x: &PanelFrame) -> PanelFrame {
    x.map(|v| if v > 0.0 { v.ln() } else { f64::NAN })
}

/// `abs(x)`: element-wise absolute value.
#[must_use]
pub fn abs(x: &PanelFrame) -> PanelFrame {
    x.map(f64::abs)
}

/// `exp(x)`: element-wise exponential.
#[must_use]
pub fn exp(x: &PanelFrame) -> PanelFrame {
    x.map(f64::exp)
}

/// `normalize_score(x)`: min-max scale to `[0, 1]` *per date* (a
/// cross-sectional, not temporal, operator — every other operator in this
/// module acts down a symbol's own column).
#[must_use]
pub fn normalize_score(x: &PanelFrame) -> PanelFrame {
    let (nrows, ncols) = x.data().dim();
    let mut data = ndarray::Array2::from_elem((nrows, ncols), f64::NAN);
    for r in 0..nrows {
        let row = x.data().row(r);
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &v in &row {
            if !v.is_nan() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if !lo.is_finite() || !hi.is_finite() || (hi - lo).abs() < f64::EPSILON {
            continue;
        }
        for c in 0..ncols {
            let v = row[c];
            if !v.is_nan() {
                data[(r, c)] = (v - lo) / (hi - lo);
            }
        }
    }
    PanelFrame::new(x.dates().to_vec(), x.symbols().to_vec(), data).expect("same shape as input")
}

fn score(x: &PanelFrame) -> PanelFrame {
    x.map(|v| if v == 0.0 { f64::NAN } else { 1.0 / (v + SCORE_EPSILON) })
}

/// `pe_score(x)`: `1 / (x + eps)`, `NaN` when `x == 0`.
#[must_use]
pub fn pe_score(x: &PanelFrame) -> PanelFrame {
    score(x)
}

/// `pb_score(x)`: same shape as [`pe_score`].
#[must_use]
pub fn pb_score(x: &PanelFrame) -> PanelFrame {
    score(x)
}

/// `ps_score(x)`: same shape as [`pe_score`].
#[must_use]
pub fn ps_score(x: &PanelFrame) -> PanelFrame {
    score(x)
}
