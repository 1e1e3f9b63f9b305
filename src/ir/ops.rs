use std::{
    collections::HashMap,
    fmt::{self, Display, Formatter},
};

use lazy_static::lazy_static;
use maplit::hashmap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    FloatingPointDivide,
    RoundToNegInfDivide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Bang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    EQ,
    NEQ,
    LT,
    LTEQ,
    GT,
    GTEQ,
    EQWithNA,
    NEQWithNA,
}

lazy_static! {
    static ref BINARY_OPS: HashMap<&'static str, BinaryOp> = hashmap! {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::FloatingPointDivide,
        "//" => BinaryOp::RoundToNegInfDivide,
    };
    static ref UNARY_OPS: HashMap<&'static str, UnaryOp> = hashmap! {
        "-" => UnaryOp::Negate,
        "!" => UnaryOp::Bang,
    };
    static ref COMPARISON_OPS: HashMap<&'static str, ComparisonOp> = hashmap! {
        "==" => ComparisonOp::EQ,
        "!=" => ComparisonOp::NEQ,
        "<" => ComparisonOp::LT,
        "<=" => ComparisonOp::LTEQ,
        ">" => ComparisonOp::GT,
        ">=" => ComparisonOp::GTEQ,
        "EQ" => ComparisonOp::EQ,
        "NEQ" => ComparisonOp::NEQ,
        "LT" => ComparisonOp::LT,
        "LTEQ" => ComparisonOp::LTEQ,
        "GT" => ComparisonOp::GT,
        "GTEQ" => ComparisonOp::GTEQ,
        "EQWithNA" => ComparisonOp::EQWithNA,
        "NEQWithNA" => ComparisonOp::NEQWithNA,
    };
}

impl BinaryOp {
    pub fn from_symbol(s: &str) -> Option<Self> {
        BINARY_OPS.get(s).copied()
    }
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::FloatingPointDivide => "/",
            BinaryOp::RoundToNegInfDivide => "//",
        }
    }
}
impl UnaryOp {
    pub fn from_symbol(s: &str) -> Option<Self> {
        UNARY_OPS.get(s).copied()
    }
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Bang => "!",
        }
    }
}
impl ComparisonOp {
    /// Accepts both the operator symbols and the IR names.
    pub fn from_symbol(s: &str) -> Option<Self> {
        COMPARISON_OPS.get(s).copied()
    }
    pub fn name(&self) -> &'static str {
        match self {
            ComparisonOp::EQ => "EQ",
            ComparisonOp::NEQ => "NEQ",
            ComparisonOp::LT => "LT",
            ComparisonOp::LTEQ => "LTEQ",
            ComparisonOp::GT => "GT",
            ComparisonOp::GTEQ => "GTEQ",
            ComparisonOp::EQWithNA => "EQWithNA",
            ComparisonOp::NEQWithNA => "NEQWithNA",
        }
    }
}
impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}
impl Display for ComparisonOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The shape of an `ApplyAggOp`/`ApplyScanOp` call: its children are the
/// constructor arguments, then the initializer arguments if any, then the
/// sequence arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggCall {
    pub op: String,
    pub n_ctor: usize,
    pub n_init: Option<usize>,
}
impl AggCall {
    pub fn new(op: &str, n_ctor: usize, n_init: Option<usize>) -> Self {
        AggCall {
            op: op.to_owned(),
            n_ctor,
            n_init,
        }
    }
    pub fn seq_start(&self) -> usize {
        self.n_ctor + self.n_init.unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    Ascending,
    Descending,
}
impl SortOrder {
    pub fn prefix(&self) -> char {
        match self {
            SortOrder::Ascending => 'A',
            SortOrder::Descending => 'D',
        }
    }
}
