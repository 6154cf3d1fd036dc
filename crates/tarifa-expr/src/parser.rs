//! Recursive-descent parser for the factor expression grammar (§4.1).

use tarifa_traits::TarifaError;

use crate::ast::{BinOp, Expr};
use crate::lexer::{lex, Token};

/// Parse `source` into an [`Expr`] AST.
///
/// # Errors
///
/// Returns [`TarifaError::StrategyCompileError`] on a lexical error, a
/// syntax error, or trailing input after a complete expression.
pub fn parse(source: &str) -> Result<Expr, TarifaError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn fail(&self, message: impl Into<String>) -> TarifaError {
        TarifaError::StrategyCompileError {
            strategy: String::new(),
            message: message.into(),
        }
    }

    fn expect_eof(&self) -> Result<(), TarifaError> {
        if *self.peek() == Token::Eof {
            Ok(())
        } else {
            Err(self.fail(format!("unexpected trailing token {:?}", self.peek())))
        }
    }

    // expr := orexpr
    fn parse_expr(&mut self) -> Result<Expr, TarifaError> {
        self.parse_orexpr()
    }

    // orexpr := andexpr (('and'|'or') andexpr)*
    fn parse_orexpr(&mut self) -> Result<Expr, TarifaError> {
        let mut lhs = self.parse_andexpr()?;
        loop {
            let op = match self.peek() {
                Token::Ident(name) if name == "and" => BinOp::And,
                Token::Ident(name) if name == "or" => BinOp::Or,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_andexpr()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // andexpr := cmp (('>'|'<'|'>='|'<='|'=='|'!=') cmp)?
    fn parse_andexpr(&mut self) -> Result<Expr, TarifaError> {
        let lhs = self.parse_cmp()?;
        let op = match self.peek() {
            Token::Gt => BinOp::Gt,
            Token::Lt => BinOp::Lt,
            Token::Ge => BinOp::Ge,
            Token::Le => BinOp::Le,
            Token::EqEq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_cmp()?;
        Ok(Expr::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    // cmp := sum
    fn parse_cmp(&mut self) -> Result<Expr, TarifaError> {
        self.parse_sum()
    }

    // sum := term (('+'|'-') term)*
    fn parse_sum(&mut self) -> Result<Expr, TarifaError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // term := factor (('*'|'/') factor)*
    fn parse_term(&mut self) -> Result<Expr, TarifaError> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_factor()?;
            lhs = Expr::BinOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    // factor := number | ident | call | '(' expr ')' | '-' factor
    fn parse_factor(&mut self) -> Result<Expr, TarifaError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Minus => {
                self.advance();
                let inner = self.parse_factor()?;
                Ok(Expr::Neg(Box::new(inner)))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                if *self.peek() == Token::LParen {
                    self.parse_call(name)
                } else {
                    Ok(Expr::Column(name))
                }
            }
            other => Err(self.fail(format!("unexpected token {other:?} in expression"))),
        }
    }

    // call := ident '(' expr (',' expr)* ')'
    fn parse_call(&mut self, name: String) -> Result<Expr, TarifaError> {
        self.expect(Token::LParen)?;
        let mut args = vec![self.parse_expr()?];
        while *self.peek() == Token::Comma {
            self.advance();
            args.push(self.parse_expr()?);
        }
        self.expect(Token::RParen)?;
        Ok(Expr::Call { name, args })
    }

    fn expect(&mut self, expected: Token) -> Result<(), TarifaError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.fail(format!("expected {expected:?}, found {:?}", self.peek())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_column() {
        assert_eq!(parse("close").unwrap(), Expr::Column("close".to_string()));
    }

    #[test]
    fn parses_call_with_multiple_args() {
        let expr = parse("ma(close, 5)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                name: "ma".to_string(),
                args: vec![Expr::Column("close".to_string()), Expr::Number(5.0)],
            }
        );
    }

    #[test]
    fn parses_comparison() {
        let expr = parse("roc(close,20) > 0.05").unwrap();
        match expr {
            Expr::BinOp { op: BinOp::Gt, .. } => {}
            other => panic!("expected Gt comparison, got {other:?}"),
        }
    }

    #[test]
    fn parses_and_or_chain() {
        let expr = parse("close > 0 and volume > 0 or pe < 10").unwrap();
        match expr {
            Expr::BinOp { op: BinOp::Or, .. } => {}
            other => panic!("expected outer Or, got {other:?}"),
        }
    }

    #[test]
    fn parses_arithmetic_precedence() {
        let expr = parse("trend_score(close,25)*0.2 + ma(volume,5)/ma(volume,19)").unwrap();
        match expr {
            Expr::BinOp { op: BinOp::Add, .. } => {}
            other => panic!("expected outer Add, got {other:?}"),
        }
    }

    #[test]
    fn parses_unary_minus() {
        let expr = parse("-5").unwrap();
        assert_eq!(expr, Expr::Neg(Box::new(Expr::Number(5.0))));
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("close)").is_err());
    }

    #[test]
    fn rejects_unknown_bare_identifier_is_allowed_at_parse_time() {
        // Unknown identifiers are syntactically valid; the evaluator is the
        // layer that rejects bare identifiers that name neither a raw
        // column nor an operator (§4.1: "bare unknown identifiers fail
        // loading of the strategy").
        assert!(parse("frobnicate").is_ok());
    }
}
