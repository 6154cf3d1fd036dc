//! Canonical pretty-printer. Parsing `print(parse(text))` again must yield
//! an identical AST (§8 "Round-trip / idempotence"); this printer achieves
//! that by always fully parenthesizing binary operators rather than trying
//! to reconstruct the original, possibly-ambiguous, whitespace.

use crate::ast::Expr;

/// Render `expr` as canonical factor expression text.
#[must_use]
pub fn print(expr: &Expr) -> String {
    match expr {
        Expr::Number(n) => format_number(*n),
        Expr::Column(name) => name.clone(),
        Expr::Call { name, args } => {
            let rendered: Vec<String> = args.iter().map(print).collect();
            format!("{name}({})", rendered.join(","))
        }
        Expr::BinOp { op, lhs, rhs } => {
            format!("({} {} {})", print(lhs), op.as_str(), print(rhs))
        }
        Expr::Neg(inner) => format!("-({})", print(inner)),
    }
}

fn format_number(n: f64) -> String {
    if n == n.trunc() && n.is_finite() {
        format!("{n:.1}")
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn round_trips_through_print_and_reparse() {
        let samples = [
            "close",
            "ma(close,5)",
            "roc(close,20) > 0.05",
            "trend_score(close,25)*0.2 + ma(volume,5)/ma(volume,19)",
            "close > 0 and volume > 0 or pe < 10",
            "-5",
            "pe_score(pe)",
        ];
        for source in samples {
            let first = parse(source).unwrap();
            let printed = print(&first);
            let second = parse(&printed).unwrap();
            assert_eq!(first, second, "round trip mismatch for '{source}' -> '{printed}'");
        }
    }

    #[test]
    fn integers_print_without_superfluous_precision() {
        assert_eq!(format_number(5.0), "5.0");
        assert_eq!(format_number(0.05), "0.05");
    }
}
