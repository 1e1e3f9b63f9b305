//! A typed expression IR: host values are imputed a type and lifted into
//! IR trees, expressions are combined with type and source unification,
//! and trees are rendered to the textual form consumed by an execution
//! backend, with common subexpressions bound once.
pub mod backend;
pub mod cse;
pub mod errors;
pub mod expr;
pub mod impute;
pub mod ir;
pub mod parser;
pub mod types;
pub mod utils;
pub mod value;

#[cfg(test)]
mod tests;

pub use backend::{eval, Backend};
pub use cse::CseRenderer;
pub use errors::{ExprResult, ExpressionError, ImputationError, TypeCheckError, UnificationError};
pub use expr::{lift, literal, to_expr, unify_all, unify_exprs, Aggregators, Expression, SourceRef};
pub use impute::impute_type;
pub use ir::{parse_value_ir, Ir, IrKind, IrRef};
pub use types::{unify_types, unify_types_limited, Type};
pub use value::Value;
