/// Parse tree of a band-math formula.
///
/// Every node is exclusively owned by its parent, so a tree is write-once and
/// acyclic.
#[derive(Clone, Debug, PartialEq)]
pub enum Formula {
    // Left-associative `+ - * /` chains.
    Binary {
        lhs: Box<Formula>,
        op: BinaryOp,
        rhs: Box<Formula>,
    },

    // Unary `+` or `-`.
    Unary {
        op: UnaryOp,
        operand: Box<Formula>,
    },

    // `base ** exponent`, right-associative.
    Power {
        base: Box<Formula>,
        exponent: Box<Formula>,
    },

    // Explicit grouping, kept so it can be re-emitted verbatim.
    Parens(Box<Formula>),

    // Band identifier as written in the formula.
    Identifier(String),

    // Numeric literal.
    Number(f64),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    /// The operator exactly as it appears in formula text.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }

    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl UnaryOp {
    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Plus),
            "-" => Some(Self::Minus),
            _ => None,
        }
    }
}

impl Formula {
    pub(crate) fn binary(lhs: Formula, op: BinaryOp, rhs: Formula) -> Self {
        Self::Binary {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    pub(crate) fn unary(op: UnaryOp, operand: Formula) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub(crate) fn power(base: Formula, exponent: Formula) -> Self {
        Self::Power {
            base: Box::new(base),
            exponent: Box::new(exponent),
        }
    }

    /// Visits every identifier leaf, left to right.
    pub fn for_each_identifier<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Self::Binary { lhs, rhs, .. } => {
                lhs.for_each_identifier(f);
                rhs.for_each_identifier(f);
            }
            Self::Unary { operand, .. } => operand.for_each_identifier(f),
            Self::Power { base, exponent } => {
                base.for_each_identifier(f);
                exponent.for_each_identifier(f);
            }
            Self::Parens(inner) => inner.for_each_identifier(f),
            Self::Identifier(name) => f(name),
            Self::Number(_) => {}
        }
    }
}
