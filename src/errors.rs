use itertools::Itertools;
use num_bigint::BigInt;
use thiserror::Error;

use crate::types::Type;

/// The type of a host value could not be determined.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImputationError {
    #[error("no integer type large enough to store {0}")]
    IntegerOverflow(BigInt),
    #[error("cannot impute type of empty {kind}; use '{constructor}' to build an empty {kind}")]
    EmptyContainer {
        kind: &'static str,
        constructor: &'static str,
    },
    #[error(
        "heterogeneous {kind}s are not supported: found {kind} with {part} of types ({})",
        .types.iter().join(", ")
    )]
    Heterogeneous {
        kind: &'static str,
        part: &'static str,
        types: Vec<Type>,
    },
    #[error("cannot impute the type of 'None'")]
    Missing,
    #[error("interval endpoints have incompatible types '{0}' and '{1}'")]
    IntervalEndpoints(Type, Type),
}

/// Expressions or types could not be brought together.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnificationError {
    #[error(
        "Cannot combine expressions from different source objects.\n    Found fields from {} objects:{}",
        .0.len(),
        .0.iter()
            .map(|(source, fields)| format!(
                "\n        {}: {}",
                source,
                fields.iter().map(|f| format!("'{}'", f)).join(", ")
            ))
            .join("")
    )]
    DifferentSources(Vec<(String, Vec<String>)>),
    #[error("Invalid '{op}' comparison, cannot compare expressions of type '{left}' and '{right}'")]
    Incomparable { op: String, left: Type, right: Type },
    #[error("'{left}' {op} '{right}'")]
    NoNumericUnification { op: String, left: Type, right: Type },
    #[error("'{0}' cannot aggregate an expression that already contains an aggregation")]
    NestedAggregation(String),
    #[error("'{0}' argument must be a constant, but it depends on '{1}'")]
    NonConstantArgument(String, String),
}

/// The type of an IR node could not be computed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeCheckError {
    #[error("unbound variable '{0}'")]
    Unbound(String),
    #[error("{node} expects {expected}, found '{found}'")]
    Mismatch {
        node: &'static str,
        expected: String,
        found: Type,
    },
    #[error("{0} depends on a relational schema")]
    Relational(&'static str),
    #[error("unknown aggregator '{0}'")]
    UnknownAggregator(String),
    #[error("{0} used outside of an aggregation scope")]
    NoAggregationScope(&'static str),
    #[error("empty {0} without an explicit type")]
    Untyped(&'static str),
    #[error("{0} has no field '{1}'")]
    NoSuchField(Type, String),
}

/// Any failure while building an `Expression`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error(transparent)]
    Imputation(#[from] ImputationError),
    #[error(transparent)]
    Unification(#[from] UnificationError),
    #[error(transparent)]
    TypeCheck(#[from] TypeCheckError),
    #[error("expected expression of type '{expected}', found expression of type '{found}'")]
    TypeMismatch { expected: Type, found: Type },
    #[error("cannot coerce an expression of type '{found}' to '{expected}'")]
    InvalidCoercion { expected: Type, found: Type },
    #[error("{value} is not a valid value of type '{expected}'")]
    NonConforming { value: String, expected: Type },
    #[error("'{method}' expects {expected}, found an expression of type '{found}'")]
    WrongReceiver {
        method: String,
        expected: &'static str,
        found: Type,
    },
    #[error("{0} has no field '{1}'")]
    NoSuchField(Type, String),
}

pub type ExprResult<T> = std::result::Result<T, ExpressionError>;
