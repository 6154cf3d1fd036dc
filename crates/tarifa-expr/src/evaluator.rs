//! Walks a parsed [`Expr`] and evaluates it over panel data.

use std::collections::HashMap;
use std::sync::Mutex;

use tarifa_panel::PanelFrame;
use tarifa_traits::TarifaError;

use crate::ast::{BinOp, Expr};
use crate::operators;
use crate::printer::print;

/// The raw columns every expression may bottom out on (§4.1: "A bare
/// identifier that names a raw column").
pub const RAW_COLUMNS: &[&str] =
    &["close", "open", "high", "low", "volume", "amount", "turnover_rate", "pe", "pb"];

/// Either a whole panel or a scalar literal, produced while evaluating an
/// expression. A scalar only becomes a panel once it meets a panel operand
/// in a binary operator (broadcast across that operand's shape).
#[derive(Debug, Clone)]
pub enum Value {
    /// A computed panel.
    Panel(PanelFrame),
    /// A bare numeric literal not yet broadcast.
    Scalar(f64),
}

impl Value {
    /// Coerce to a panel, broadcasting a scalar across `like`'s shape.
    #[must_use]
    pub fn into_panel(self, like: &PanelFrame) -> PanelFrame {
        match self {
            Self::Panel(p) => p,
            Self::Scalar(s) => like.constant_like(s),
        }
    }
}

/// Resolves a raw column name to its panel, e.g. by reading it out of an
/// already-loaded `FactorCache` or a freshly-fetched `Store` result.
pub trait ColumnResolver {
    /// Fetch the panel for `name`, or an error if it cannot be resolved.
    fn resolve(&self, name: &str) -> Result<PanelFrame, TarifaError>;
}

impl<F> ColumnResolver for F
where
    F: Fn(&str) -> Result<PanelFrame, TarifaError>,
{
    fn resolve(&self, name: &str) -> Result<PanelFrame, TarifaError> {
        self(name)
    }
}

/// Shared sub-expression cache keyed by canonical text, safe to read and
/// write from multiple evaluations running in parallel (see
/// `tarifa-expr::cache::FactorCache::preload`).
pub type Memo = Mutex<HashMap<String, PanelFrame>>;

fn memo_get(memo: &Memo, key: &str) -> Option<PanelFrame> {
    memo.lock().expect("memo lock poisoned").get(key).cloned()
}

fn memo_insert(memo: &Memo, key: String, value: PanelFrame) {
    memo.lock().expect("memo lock poisoned").insert(key, value);
}

/// Evaluate `expr` against `columns`, memoizing every sub-expression by its
/// canonical text in `memo` so that a sub-expression shared by multiple
/// top-level expressions (e.g. `close` itself, or `ma(volume,5)` reused
/// across strategies) is computed at most once.
pub fn eval(
    expr: &Expr,
    columns: &impl ColumnResolver,
    memo: &Memo,
) -> Result<Value, TarifaError> {
    match expr {
        Expr::Number(n) => Ok(Value::Scalar(*n)),
        Expr::Column(name) => {
            let key = print(expr);
            if let Some(cached) = memo_get(memo, &key) {
                return Ok(Value::Panel(cached));
            }
            if !RAW_COLUMNS.contains(&name.as_str()) {
                return Err(TarifaError::StrategyCompileError {
                    strategy: String::new(),
                    message: format!("unknown identifier '{name}' is neither a raw column nor a function call"),
                });
            }
            let panel = columns.resolve(name)?;
            memo_insert(memo, key, panel.clone());
            Ok(Value::Panel(panel))
        }
        Expr::Call { name, args } => {
            let key = print(expr);
            if let Some(cached) = memo_get(memo, &key) {
                return Ok(Value::Panel(cached));
            }
            let panel = eval_call(name, args, columns, memo)?;
            memo_insert(memo, key, panel.clone());
            Ok(Value::Panel(panel))
        }
        Expr::BinOp { op, lhs, rhs } => {
            let key = print(expr);
            if let Some(cached) = memo_get(memo, &key) {
                return Ok(Value::Panel(cached));
            }
            let lv = eval(lhs, columns, memo)?;
            let rv = eval(rhs, columns, memo)?;
            let value = eval_binop(*op, lv, rv);
            if let Value::Panel(p) = &value {
                memo_insert(memo, key, p.clone());
            }
            Ok(value)
        }
        Expr::Neg(inner) => {
            let value = eval(inner, columns, memo)?;
            Ok(match value {
                Value::Scalar(s) => Value::Scalar(-s),
                Value::Panel(p) => Value::Panel(p.map(|v| -v)),
            })
        }
    }
}

fn eval_binop(op: BinOp, lv: Value, rv: Value) -> Value {
    match (lv, rv) {
        (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(scalar_binop(op, a, b)),
        (Value::Panel(a), Value::Scalar(b)) => {
            let b_panel = a.constant_like(b);
            Value::Panel(panel_binop(op, &a, &b_panel))
        }
        (Value::Scalar(a), Value::Panel(b)) => {
            let a_panel = b.constant_like(a);
            Value::Panel(panel_binop(op, &a_panel, &b))
        }
        (Value::Panel(a), Value::Panel(b)) => Value::Panel(panel_binop(op, &a, &b)),
    }
}

fn truthy(x: f64) -> bool {
    !x.is_nan() && x != 0.0
}

fn bool_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

fn scalar_binop(op: BinOp, a: f64, b: f64) -> f64 {
    match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => operators::safe_div(a, b),
        BinOp::Gt => bool_f64(!a.is_nan() && !b.is_nan() && a > b),
        BinOp::Lt => bool_f64(!a.is_nan() && !b.is_nan() && a < b),
        BinOp::Ge => bool_f64(!a.is_nan() && !b.is_nan() && a >= b),
        BinOp::Le => bool_f64(!a.is_nan() && !b.is_nan() && a <= b),
        BinOp::Eq => bool_f64(!a.is_nan() && !b.is_nan() && a == b),
        BinOp::Ne => bool_f64(!a.is_nan() && !b.is_nan() && a != b),
        BinOp::And => bool_f64(truthy(a) && truthy(b)),
        BinOp::Or => bool_f64(truthy(a) || truthy(b)),
    }
}

fn panel_binop(op: BinOp, a: &PanelFrame, b: &PanelFrame) -> PanelFrame {
    a.zip_with(b, |x, y| scalar_binop(op, x, y))
}

fn literal_window(expr: &Expr) -> Result<usize, TarifaError> {
    match expr {
        Expr::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Ok(*n as usize),
        other => Err(TarifaError::StrategyCompileError {
            strategy: String::new(),
            message: format!("expected a non-negative integer literal window, found {other:?}"),
        }),
    }
}

fn expect_panel(value: Value, like_hint: Option<&PanelFrame>) -> PanelFrame {
    match (value, like_hint) {
        (Value::Panel(p), _) => p,
        (Value::Scalar(s), Some(like)) => like.constant_like(s),
        (Value::Scalar(s), None) => PanelFrame::new(vec![], vec![], ndarray::Array2::from_elem((0, 0), s))
            .unwrap_or_else(|_| PanelFrame::empty(vec![])),
    }
}

fn eval_call(
    name: &str,
    args: &[Expr],
    columns: &impl ColumnResolver,
    memo: &Memo,
) -> Result<PanelFrame, TarifaError> {
    let arity_err = |expected: usize| TarifaError::StrategyCompileError {
        strategy: String::new(),
        message: format!("'{name}' expects {expected} argument(s), got {}", args.len()),
    };
    let unknown_err = || TarifaError::StrategyCompileError {
        strategy: String::new(),
        message: format!("unknown operator '{name}'"),
    };

    const UNARY: &[&str] = &["log", "abs", "exp", "normalize_score", "pe_score", "pb_score", "ps_score"];
    const WINDOWED: &[&str] = &[
        "ref", "ma", "ema", "std", "sum", "max", "min", "shift", "roc", "slope", "rsquare", "trend_score",
    ];

    if UNARY.contains(&name) {
        if args.len() != 1 {
            return Err(arity_err(1));
        }
        let value = eval(&args[0], columns, memo)?;
        let panel = expect_panel(value, None);
        return Ok(match name {
            "log" => operators::log(&panel),
            "abs" => operators::abs(&panel),
            "exp" => operators::exp(&panel),
            "normalize_score" => operators::normalize_score(&panel),
            "pe_score" => operators::pe_score(&panel),
            "pb_score" => operators::pb_score(&panel),
            "ps_score" => operators::ps_score(&panel),
            _ => unreachable!(),
        });
    }

    if WINDOWED.contains(&name) {
        if args.len() != 2 {
            return Err(arity_err(2));
        }
        let value = eval(&args[0], columns, memo)?;
        let panel = expect_panel(value, None);
        let n = literal_window(&args[1])?;
        return Ok(match name {
            "ref" | "shift" => operators::ref_(&panel, n),
            "ma" => operators::ma(&panel, n),
            "ema" => operators::ema(&panel, n),
            "std" => operators::std(&panel, n),
            "sum" => operators::sum(&panel, n),
            "max" => operators::max(&panel, n),
            "min" => operators::min(&panel, n),
            "roc" => operators::roc(&panel, n),
            "slope" => operators::slope(&panel, n),
            "rsquare" => operators::rsquare(&panel, n),
            "trend_score" => operators::trend_score(&panel, n),
            _ => unreachable!(),
        });
    }

    Err(unknown_err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> chrono::NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn close_panel() -> PanelFrame {
        let dates = vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3), date(2024, 1, 4)];
        let data = ndarray::Array2::from_shape_vec((4, 1), vec![10.0, 11.0, 9.0, 13.0]).unwrap();
        PanelFrame::new(dates, vec!["A".to_string()], data).unwrap()
    }

    fn resolver() -> impl ColumnResolver {
        move |name: &str| -> Result<PanelFrame, TarifaError> {
            if name == "close" {
                Ok(close_panel())
            } else {
                Err(TarifaError::MissingDataError {
                    symbol: "*".to_string(),
                    message: format!("no column '{name}'"),
                })
            }
        }
    }

    #[test]
    fn evaluates_comparison_to_boolean_panel() {
        let expr = parse("close > 10").unwrap();
        let memo = Mutex::new(HashMap::new());
        let value = eval(&expr, &resolver(), &memo).unwrap();
        let panel = value.into_panel(&close_panel());
        assert_eq!(panel.get(date(2024, 1, 1), "A"), 0.0);
        assert_eq!(panel.get(date(2024, 1, 2), "A"), 1.0);
        assert_eq!(panel.get(date(2024, 1, 3), "A"), 0.0);
    }

    #[test]
    fn evaluates_roc_expression() {
        let expr = parse("roc(close,2) > 0").unwrap();
        let memo = Mutex::new(HashMap::new());
        let value = eval(&expr, &resolver(), &memo).unwrap();
        let panel = value.into_panel(&close_panel());
        assert_eq!(panel.get(date(2024, 1, 3), "A"), 0.0);
        assert_eq!(panel.get(date(2024, 1, 4), "A"), 1.0);
    }

    #[test]
    fn unknown_identifier_fails_to_compile() {
        let expr = parse("frobnicate").unwrap();
        let memo = Mutex::new(HashMap::new());
        assert!(eval(&expr, &resolver(), &memo).is_err());
    }

    #[test]
    fn memoizes_shared_subexpressions() {
        let calls = std::cell::Cell::new(0);
        let resolver = |name: &str| -> Result<PanelFrame, TarifaError> {
            calls.set(calls.get() + 1);
            if name == "close" {
                Ok(close_panel())
            } else {
                unreachable!()
            }
        };
        let memo = Mutex::new(HashMap::new());
        let a = parse("ma(close,2)").unwrap();
        let b = parse("ma(close,2) > 0").unwrap();
        eval(&a, &resolver, &memo).unwrap();
        eval(&b, &resolver, &memo).unwrap();
        assert_eq!(calls.get(), 1, "close should be resolved only once across both expressions");
    }

    #[test]
    fn window_must_be_a_literal() {
        let expr = parse("ma(close, close)").unwrap();
        let memo = Mutex::new(HashMap::new());
        assert!(eval(&expr, &resolver(), &memo).is_err());
    }
}
