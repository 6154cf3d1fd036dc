//! The factor expression AST (§9: "a recursive-descent parser emits an AST
//! of tagged variants").

/// A parsed factor expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A numeric literal.
    Number(f64),
    /// A bare identifier naming a raw panel column (`close`, `pe`, ...).
    Column(String),
    /// A function call, e.g. `ma(close, 5)`.
    Call {
        /// Operator name.
        name: String,
        /// Positional arguments.
        args: Vec<Expr>,
    },
    /// A binary operator application.
    BinOp {
        /// The operator.
        op: BinOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// Unary negation (`-factor`).
    Neg(Box<Expr>),
}

/// A binary operator in the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `and`
    And,
    /// `or`
    Or,
}

impl BinOp {
    /// The canonical textual form of this operator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::And => "and",
            Self::Or => "or",
        }
    }

    /// Whether this operator compares or logically combines boolean
    /// panels, rather than producing a numeric panel.
    #[must_use]
    pub const fn is_boolean(self) -> bool {
        matches!(
            self,
            Self::Gt | Self::Lt | Self::Ge | Self::Le | Self::Eq | Self::Ne | Self::And | Self::Or
        )
    }
}

impl Expr {
    /// Every raw-column identifier this expression transitively reads.
    /// Used to resolve which panels must be loaded before evaluation.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Number(_) => {}
            Self::Column(name) => out.push(name),
            Self::Call { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
            Self::BinOp { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Self::Neg(inner) => inner.collect_columns(out),
        }
    }

    /// Direct children of this node (used by the cache to build a
    /// dependency DAG without re-deriving it from text).
    #[must_use]
    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Self::Number(_) | Self::Column(_) => Vec::new(),
            Self::Call { args, .. } => args.iter().collect(),
            Self::BinOp { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Self::Neg(inner) => vec![inner.as_ref()],
        }
    }
}
