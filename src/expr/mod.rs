//! Typed expressions: IR trees together with their type, the source and
//! axes they depend on, and the aggregations they wait for.
use std::fmt::{self, Debug, Formatter};

use either::Either;
use itertools::Itertools;
use log::*;
use num_traits::ToPrimitive;

use crate::{
    errors::{ExprResult, ExpressionError, UnificationError},
    impute::impute_type,
    ir::{Ir, IrKind, IrRef},
    types::Type,
    value::Value,
};

mod aggregation;
mod aggregators;
mod coercer;
mod indices;
mod operators;
mod uids;

pub use aggregation::{Aggregation, Aggregations};
pub use aggregators::Aggregators;
pub use coercer::Coercer;
pub use indices::{Axis, Indices, SourceKind, SourceRef};
pub use uids::Uids;

/// An IR tree with its type, indices and pending aggregations. Every
/// operation builds a new expression.
#[derive(Clone)]
pub struct Expression {
    ir: IrRef,
    dtype: Type,
    indices: Indices,
    aggregations: Aggregations,
}
impl Debug for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.dtype, self.ir)
    }
}

impl Expression {
    pub fn new(ir: IrRef, dtype: Type, indices: Indices, aggregations: Aggregations) -> Self {
        Expression {
            ir,
            dtype,
            indices,
            aggregations,
        }
    }
    /// An expression depending on nothing.
    pub fn constant(ir: IrRef, dtype: Type) -> Self {
        Expression::new(ir, dtype, Indices::default(), Aggregations::default())
    }
    /// A reference to a variable of type `dtype`, as seen from `within`.
    pub(crate) fn variable(name: &str, dtype: Type, within: &Expression) -> Self {
        Expression::new(
            Ir::reference(name),
            dtype,
            within.indices.clone(),
            Aggregations::default(),
        )
    }

    pub fn ir(&self) -> &IrRef {
        &self.ir
    }
    pub fn dtype(&self) -> &Type {
        &self.dtype
    }
    pub fn indices(&self) -> &Indices {
        &self.indices
    }
    pub fn aggregations(&self) -> &Aggregations {
        &self.aggregations
    }

    /// A human-readable summary of the expression.
    pub fn describe(&self) -> String {
        let rule = "-".repeat(56);
        let mut r = vec![
            rule.clone(),
            "Type:".to_string(),
            format!("    {}", self.dtype),
            rule.clone(),
            format!("Source:\n    {}", self.indices),
        ];
        if !self.aggregations.is_empty() {
            r.push(format!(
                "Pending aggregations:\n    {}",
                self.aggregations
                    .iter()
                    .map(|a| a.exprs.iter().map(|e| e.ir.to_string()).join(", "))
                    .join("\n    ")
            ));
        }
        r.push(rule);
        r.join("\n")
    }
}

/// The fields of `source` referred to by `e`, its pending aggregations
/// included, in order of appearance.
pub(crate) fn referenced_fields(e: &Expression, source: &SourceRef) -> Vec<String> {
    let tops = source.top_level_names();
    let mut r = Vec::new();
    let mut todo = vec![e.ir.clone()];
    for a in e.aggregations.iter() {
        todo.extend(a.exprs.iter().map(|x| x.ir.clone()));
    }
    todo.reverse();
    while let Some(n) = todo.pop() {
        if let IrKind::GetField(f) = n.kind() {
            if matches!(n.child(0).kind(), IrKind::Ref(top) if tops.contains(&top.as_str()))
                && !r.contains(f)
            {
                r.push(f.clone());
            }
        }
        todo.extend(n.children().iter().rev().cloned());
    }
    r
}

/// Combine the indices and aggregations of expressions used together.
pub fn unify_all<'a, I: IntoIterator<Item = &'a Expression>>(
    exprs: I,
) -> Result<(Indices, Aggregations), UnificationError> {
    let exprs = exprs.into_iter().collect::<Vec<_>>();
    let indices = Indices::unify(exprs.iter().map(|e| &e.indices)).map_err(|sources| {
        let mut found: Vec<(String, Vec<String>)> = sources
            .iter()
            .map(|s| (s.name().to_owned(), Vec::new()))
            .collect();
        for (source, slot) in sources.iter().zip(found.iter_mut()) {
            let users = exprs.iter().filter(|e| {
                e.indices.source.as_ref() == Some(source)
                    || e.aggregations
                        .iter()
                        .any(|a| a.indices.source.as_ref() == Some(source))
            });
            for e in users {
                for f in referenced_fields(e, source) {
                    if !slot.1.contains(&f) {
                        slot.1.push(f);
                    }
                }
            }
        }
        UnificationError::DifferentSources(found)
    })?;
    let aggregations = exprs
        .iter()
        .fold(Aggregations::default(), |acc, e| acc.concat(&e.aggregations));
    Ok((indices, aggregations))
}

/// Bring expressions to a common type. On success, the coerced expressions
/// are returned; otherwise the original ones.
pub fn unify_exprs(exprs: &[Expression]) -> (Vec<Expression>, bool) {
    let types = exprs.iter().map(|e| &e.dtype).unique().collect::<Vec<_>>();
    if types.len() <= 1 {
        return (exprs.to_vec(), true);
    }
    for t in types {
        let c = Coercer::new(t.clone());
        if exprs.iter().all(|e| c.can_coerce(&e.dtype)) {
            if let Ok(r) = exprs.iter().map(|e| c.coerce(e)).collect::<ExprResult<Vec<_>>>() {
                return (r, true);
            }
        }
    }
    warn!(
        "no common type for {}",
        exprs.iter().map(|e| e.dtype.to_string()).join(", ")
    );
    (exprs.to_vec(), false)
}

/// Lift a host value to an expression, imputing its type if `dtype` is
/// not given.
pub fn to_expr<V: Into<Value>>(value: V, dtype: Option<&Type>) -> ExprResult<Expression> {
    let value = value.into();
    if let Value::Expr(e) = value {
        return match dtype {
            Some(t) if *t != e.dtype => Err(ExpressionError::TypeMismatch {
                expected: t.clone(),
                found: e.dtype,
            }),
            _ => Ok(e),
        };
    }
    let t = match dtype {
        Some(t) => t.clone(),
        None => impute_type(&value)?,
    };
    match lift(&value, &t)? {
        Either::Left(v) => literal(&v, &t),
        Either::Right(e) => Ok(e),
    }
}

/// Lift `value` as a `t`. Values without expressions inside come back
/// unchanged; otherwise the matching constructor node is built.
pub fn lift(value: &Value, t: &Type) -> ExprResult<Either<Value, Expression>> {
    match value {
        Value::Missing => return Ok(Either::Left(Value::Missing)),
        Value::Expr(e) => return expr_as(e, t).map(Either::Right),
        v if !v.contains_expression() => return Ok(Either::Left(v.clone())),
        _ => {}
    }

    let non_conforming = || ExpressionError::NonConforming {
        value: value.to_string(),
        expected: t.clone(),
    };
    let parts = |xs: &[Value], t: &Type| -> ExprResult<Vec<Expression>> {
        xs.iter().map(|x| as_expr(x, t)).collect()
    };

    let e = match (value, t) {
        (Value::List(xs) | Value::Set(xs), Type::Array(elt) | Type::Set(elt)) => {
            let xs = parts(xs, elt)?;
            let (indices, aggregations) = unify_all(xs.iter())?;
            let array = Ir::make_array(
                xs.iter().map(|x| x.ir.clone()).collect(),
                Some(Type::array(*elt.clone())),
            );
            let ir = match t {
                Type::Set(_) => Ir::new(IrKind::ToSet, vec![array]),
                _ => array,
            };
            Expression::new(ir, t.clone(), indices, aggregations)
        }
        (Value::Tuple(xs), Type::Tuple(ts)) if xs.len() == ts.len() => {
            let xs = xs
                .iter()
                .zip(ts.iter())
                .map(|(x, t)| as_expr(x, t))
                .collect::<ExprResult<Vec<_>>>()?;
            let (indices, aggregations) = unify_all(xs.iter())?;
            Expression::new(
                Ir::make_tuple(xs.iter().map(|x| x.ir.clone()).collect()),
                t.clone(),
                indices,
                aggregations,
            )
        }
        (Value::Struct(s), Type::Struct(fs)) if s.len() == fs.len() => {
            let xs = fs
                .iter()
                .map(|(n, ft)| {
                    let v = s.get(n).ok_or_else(non_conforming)?;
                    Ok((n.clone(), as_expr(v, ft)?))
                })
                .collect::<ExprResult<Vec<_>>>()?;
            let (indices, aggregations) = unify_all(xs.iter().map(|(_, x)| x))?;
            Expression::new(
                Ir::make_struct(xs.iter().map(|(n, x)| (n.clone(), x.ir.clone())).collect()),
                t.clone(),
                indices,
                aggregations,
            )
        }
        (Value::Dict(kvs), Type::Dict(kt, vt)) => {
            let keys = as_expr(
                &Value::List(kvs.iter().map(|(k, _)| k.clone()).collect()),
                &Type::array(*kt.clone()),
            )?;
            let values = as_expr(
                &Value::List(kvs.iter().map(|(_, v)| v.clone()).collect()),
                &Type::array(*vt.clone()),
            )?;
            let (indices, aggregations) = unify_all([&keys, &values])?;
            Expression::new(
                zip_to_dict(keys.ir.clone(), values.ir.clone()),
                t.clone(),
                indices,
                aggregations,
            )
        }
        (Value::Interval(i), Type::Interval(p)) => {
            let start = as_expr(&i.start, p)?;
            let end = as_expr(&i.end, p)?;
            let (indices, aggregations) = unify_all([&start, &end])?;
            Expression::new(
                Ir::apply(
                    "Interval",
                    t.clone(),
                    vec![
                        start.ir.clone(),
                        end.ir.clone(),
                        Ir::bool(i.includes_start),
                        Ir::bool(i.includes_end),
                    ],
                ),
                t.clone(),
                indices,
                aggregations,
            )
        }
        _ => return Err(non_conforming()),
    };
    Ok(Either::Right(e))
}

/// Lift a part of a container that holds expressions: literal parts are
/// built as literal nodes.
fn as_expr(v: &Value, t: &Type) -> ExprResult<Expression> {
    match lift(v, t)? {
        Either::Left(v) => literal(&v, t),
        Either::Right(e) => Ok(e),
    }
}

/// `e` seen as a `t`, through a numeric conversion if needed.
fn expr_as(e: &Expression, t: &Type) -> ExprResult<Expression> {
    if e.dtype == *t {
        return Ok(e.clone());
    }
    if e.dtype.is_bool() && t.is_numeric() {
        let (one, zero) = (numeric_constant(1, t), numeric_constant(0, t));
        return Ok(Expression::new(
            Ir::cond(e.ir.clone(), one, zero),
            t.clone(),
            e.indices.clone(),
            e.aggregations.clone(),
        ));
    }
    let c = Coercer::new(t.clone());
    if c.can_coerce(&e.dtype) {
        c.coerce(e)
    } else {
        Err(ExpressionError::InvalidCoercion {
            expected: t.clone(),
            found: e.dtype.clone(),
        })
    }
}

pub(crate) fn numeric_constant(x: i32, t: &Type) -> IrRef {
    match t {
        Type::Int64 => Ir::i64(x.into()),
        Type::Float32 => Ir::f32(x as f32),
        Type::Float64 => Ir::f64(x.into()),
        _ => Ir::i32(x),
    }
}

/// `dict(zip(keys, values))`, from two arrays of the same length.
///
/// The binder names are fixed. Every reference to them is built here, and
/// a nested dict in `values` binds its own copies before using them.
fn zip_to_dict(keys: IrRef, values: IrRef) -> IrRef {
    let (k, v, i) = ("__zip_keys", "__zip_values", "__zip_idx");
    let pairs = Ir::new(
        IrKind::ArrayMap(i.into()),
        vec![
            Ir::new(
                IrKind::ArrayRange,
                vec![
                    Ir::i32(0),
                    Ir::new(IrKind::ArrayLen, vec![Ir::reference(k)]),
                    Ir::i32(1),
                ],
            ),
            Ir::make_tuple(vec![
                Ir::new(IrKind::ArrayRef, vec![Ir::reference(k), Ir::reference(i)]),
                Ir::new(IrKind::ArrayRef, vec![Ir::reference(v), Ir::reference(i)]),
            ]),
        ],
    );
    Ir::let_in(
        k,
        keys,
        Ir::let_in(v, values, Ir::new(IrKind::ToDict, vec![pairs])),
    )
}

/// Host booleans used as numbers become 0 or 1.
fn normalize(v: &Value, t: &Type) -> Value {
    match (v, t) {
        (Value::Bool(b), t) if t.is_numeric() => Value::Int((*b as i32).into()),
        (Value::List(xs), Type::Array(e)) => Value::List(xs.iter().map(|x| normalize(x, e)).collect()),
        (Value::Set(xs), Type::Set(e)) => Value::set(xs.iter().map(|x| normalize(x, e))),
        (Value::Tuple(xs), Type::Tuple(ts)) => {
            Value::Tuple(xs.iter().zip(ts.iter()).map(|(x, t)| normalize(x, t)).collect())
        }
        (Value::Struct(s), Type::Struct(fs)) => Value::Struct(
            s.iter()
                .map(|(n, x)| {
                    (
                        n.clone(),
                        fs.get(n).map(|t| normalize(x, t)).unwrap_or_else(|| x.clone()),
                    )
                })
                .collect(),
        ),
        (Value::Dict(kvs), Type::Dict(kt, vt)) => Value::dict(
            kvs.iter()
                .map(|(k, v)| (normalize(k, kt), normalize(v, vt))),
        ),
        _ => v.clone(),
    }
}

/// A literal node holding `value` as a `t`.
pub fn literal(value: &Value, t: &Type) -> ExprResult<Expression> {
    if value.contains_expression() {
        return to_expr(value.clone(), Some(t));
    }
    let v = normalize(value, t);
    if !v.conforms_to(t) {
        return Err(ExpressionError::NonConforming {
            value: value.to_string(),
            expected: t.clone(),
        });
    }
    let ir = match (&v, t) {
        (Value::Missing, _) => Ir::na(t.clone()),
        (Value::Bool(b), _) => Ir::bool(*b),
        (Value::Int(i), Type::Int32) => Ir::i32(i.to_i32().unwrap_or_default()),
        (Value::Int(i), Type::Int64) => Ir::i64(i.to_i64().unwrap_or_default()),
        (Value::Int(i), Type::Float32) => Ir::f32(i.to_f32().unwrap_or(f32::NAN)),
        (Value::Int(i), Type::Float64) => Ir::f64(i.to_f64().unwrap_or(f64::NAN)),
        (Value::Float(x), Type::Float32) => Ir::f32(*x as f32),
        (Value::Float(x), Type::Float64) => Ir::f64(*x),
        (Value::Str(s), _) => Ir::str(s),
        _ => Ir::literal(t.clone(), v),
    };
    Ok(Expression::constant(ir, t.clone()))
}

pub fn empty_array(element: Type) -> Expression {
    let t = Type::array(element);
    Expression::constant(Ir::make_array(vec![], Some(t.clone())), t)
}

pub fn empty_set(element: Type) -> Expression {
    let array = Ir::make_array(vec![], Some(Type::array(element.clone())));
    Expression::constant(Ir::new(IrKind::ToSet, vec![array]), Type::set(element))
}

pub fn empty_dict(key: Type, value: Type) -> Expression {
    let pairs = Type::array(Type::Tuple(vec![key.clone(), value.clone()]));
    Expression::constant(
        Ir::new(IrKind::ToDict, vec![Ir::make_array(vec![], Some(pairs))]),
        Type::dict(key, value),
    )
}
