use std::collections::HashMap;

use super::{BinaryOp, Ir, IrClass, IrKind, UnaryOp};
use crate::{
    errors::TypeCheckError,
    types::{Fields, Type},
};

type TResult = Result<Type, TypeCheckError>;

/// The bindings visible to a node: ordinary values, and the per-record
/// bindings of the enclosing aggregation and scan, if any.
#[derive(Debug, Clone, Default)]
pub struct TypeEnv {
    pub eval: HashMap<String, Type>,
    pub agg: Option<HashMap<String, Type>>,
    pub scan: Option<HashMap<String, Type>>,
}
impl TypeEnv {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn with(mut self, name: &str, t: Type) -> Self {
        self.eval.insert(name.to_owned(), t);
        self
    }
    /// Open an aggregation (and scan) context binding `bindings`.
    pub fn with_aggregation<'a, I: IntoIterator<Item = (&'a str, Type)>>(mut self, bindings: I) -> Self {
        let m: HashMap<String, Type> = bindings
            .into_iter()
            .map(|(n, t)| (n.to_owned(), t))
            .collect();
        self.agg = Some(m.clone());
        self.scan = Some(m);
        self
    }

    fn bind(&self, name: &str, t: Type) -> Self {
        self.clone().with(name, t)
    }
    /// The environment seen by the per-record arguments of an aggregation
    /// or scan: the aggregation bindings become ordinary ones.
    fn enter(&self, is_scan: bool, node: &'static str) -> Result<Self, TypeCheckError> {
        let inner = if is_scan { &self.scan } else { &self.agg };
        let inner = inner
            .clone()
            .ok_or(TypeCheckError::NoAggregationScope(node))?;
        Ok(TypeEnv {
            eval: inner,
            agg: None,
            scan: None,
        })
    }
    /// Bind a name in the aggregation (or scan) context.
    fn bind_agg(&self, is_scan: bool, name: &str, t: Type) -> Self {
        let mut r = self.clone();
        let ctx = if is_scan { &mut r.scan } else { &mut r.agg };
        if let Some(m) = ctx.as_mut() {
            m.insert(name.to_owned(), t);
        }
        r
    }
}

type AggRule = fn(&[Type], &[Type]) -> Option<Type>;

fn first(seq: &[Type]) -> Option<Type> {
    seq.first().cloned()
}
fn agg_count(_: &[Type], _: &[Type]) -> Option<Type> {
    Some(Type::Int64)
}
fn agg_sum(_: &[Type], seq: &[Type]) -> Option<Type> {
    first(seq).filter(|t| matches!(t, Type::Int64 | Type::Float64))
}
fn agg_extremum(_: &[Type], seq: &[Type]) -> Option<Type> {
    first(seq).filter(Type::is_primitive)
}
fn agg_collect(_: &[Type], seq: &[Type]) -> Option<Type> {
    first(seq).map(Type::array)
}
fn agg_collect_as_set(_: &[Type], seq: &[Type]) -> Option<Type> {
    first(seq).map(Type::set)
}
fn agg_take(ctor: &[Type], seq: &[Type]) -> Option<Type> {
    match ctor {
        [Type::Int32] => first(seq).map(Type::array),
        _ => None,
    }
}
fn agg_counter(_: &[Type], seq: &[Type]) -> Option<Type> {
    first(seq).map(|t| Type::dict(t, Type::Int64))
}
fn agg_fraction(_: &[Type], seq: &[Type]) -> Option<Type> {
    matches!(seq, [Type::Bool]).then_some(Type::Float64)
}
fn agg_statistics(_: &[Type], seq: &[Type]) -> Option<Type> {
    seq.first()
        .filter(|t| t.is_numeric())
        .map(|_| STATISTICS.clone())
}
fn agg_call_stats(_: &[Type], seq: &[Type]) -> Option<Type> {
    matches!(seq, [Type::Call]).then(|| CALL_STATS.clone())
}

lazy_static::lazy_static! {
    static ref CALL_STATS: Type = Type::tstruct([
        ("AC", Type::array(Type::Int32)),
        ("AF", Type::array(Type::Float64)),
        ("AN", Type::Int32),
        ("homozygote_count", Type::array(Type::Int32)),
    ]);
    static ref STATISTICS: Type = Type::tstruct([
        ("mean", Type::Float64),
        ("stdev", Type::Float64),
        ("min", Type::Float64),
        ("max", Type::Float64),
        ("n", Type::Int64),
        ("sum", Type::Float64),
    ]);

    /// Result types of the known aggregators, from the types of their
    /// constructor and sequence arguments.
    static ref AGGREGATORS: HashMap<&'static str, AggRule> = maplit::hashmap!{
        "Count" => agg_count as AggRule,
        "Sum" => agg_sum as AggRule,
        "Product" => agg_sum as AggRule,
        "Min" => agg_extremum as AggRule,
        "Max" => agg_extremum as AggRule,
        "Collect" => agg_collect as AggRule,
        "CollectAsSet" => agg_collect_as_set as AggRule,
        "Take" => agg_take as AggRule,
        "TakeBy" => agg_take as AggRule,
        "Counter" => agg_counter as AggRule,
        "Fraction" => agg_fraction as AggRule,
        "Statistics" => agg_statistics as AggRule,
        "CallStats" => agg_call_stats as AggRule,
    };
}

/// The result type of aggregator `op` over arguments of the given types.
pub fn aggregator_type(op: &str, ctor: &[Type], seq: &[Type]) -> TResult {
    let rule = AGGREGATORS
        .get(op)
        .ok_or_else(|| TypeCheckError::UnknownAggregator(op.to_owned()))?;
    rule(ctor, seq).ok_or_else(|| TypeCheckError::Mismatch {
        node: "ApplyAggOp",
        expected: format!("valid arguments for {}", op),
        found: Type::Tuple(seq.to_vec()),
    })
}

fn mismatch(node: &'static str, expected: &str, found: &Type) -> TypeCheckError {
    TypeCheckError::Mismatch {
        node,
        expected: expected.to_owned(),
        found: found.clone(),
    }
}

fn element(node: &'static str, t: &Type) -> TResult {
    t.element_type()
        .cloned()
        .ok_or_else(|| mismatch(node, "an array, set or ndarray", t))
}

fn array_element(node: &'static str, t: &Type) -> TResult {
    match t {
        Type::Array(e) => Ok(*e.clone()),
        _ => Err(mismatch(node, "an array", t)),
    }
}

fn struct_fields<'a>(node: &'static str, t: &'a Type) -> Result<&'a Fields, TypeCheckError> {
    t.fields().ok_or_else(|| mismatch(node, "a struct", t))
}

impl Ir {
    /// Compute the type of a value node in `env`.
    pub fn infer_type(&self, env: &TypeEnv) -> TResult {
        use IrKind::*;

        if self.class() != IrClass::Value {
            return Err(TypeCheckError::Relational(self.name()));
        }
        let child = |i: usize| self.child(i).infer_type(env);
        let children = || -> Result<Vec<Type>, TypeCheckError> {
            self.children().iter().map(|c| c.infer_type(env)).collect()
        };

        Ok(match self.kind() {
            I32(_) => Type::Int32,
            I64(_) => Type::Int64,
            F32(_) => Type::Float32,
            F64(_) => Type::Float64,
            Str(_) => Type::Str,
            True | False | IsNA | ApplyComparisonOp(_) => Type::Bool,
            Void | Begin | ArrayFor(_) | TableWrite(_) | MatrixWrite(_) | BlockMatrixWrite(_) => {
                Type::Void
            }
            Cast(t) | NA(t) | Die(t) | In { typ: t, .. } | Literal { typ: t, .. } => t.clone(),
            Apply { ret, .. } => ret.clone(),
            If => {
                let c = child(0)?;
                if c != Type::Bool {
                    return Err(mismatch("If", "a boolean condition", &c));
                }
                let (t, e) = (child(1)?, child(2)?);
                if t != e {
                    return Err(mismatch("If", &format!("branches of type '{}'", t), &e));
                }
                t
            }
            Coalesce => {
                let ts = children()?;
                if let Some(t) = ts.iter().find(|t| **t != ts[0]) {
                    return Err(mismatch("Coalesce", &format!("arguments of type '{}'", ts[0]), t));
                }
                ts[0].clone()
            }
            Let(name) => {
                let v = child(0)?;
                self.child(1).infer_type(&env.bind(name, v))?
            }
            AggLet { name, is_scan } => {
                let v = self.child(0).infer_type(&env.enter(*is_scan, "AggLet")?)?;
                self.child(1).infer_type(&env.bind_agg(*is_scan, name, v))?
            }
            Ref(name) => env
                .eval
                .get(name)
                .cloned()
                .ok_or_else(|| TypeCheckError::Unbound(name.clone()))?,
            ApplyBinaryPrimOp(op) => {
                let (l, r) = (child(0)?, child(1)?);
                if !l.is_numeric() || l != r {
                    return Err(mismatch(
                        "ApplyBinaryPrimOp",
                        &format!("two numeric operands of type '{}'", l),
                        &r,
                    ));
                }
                match op {
                    BinaryOp::FloatingPointDivide if l.is_integral() => Type::Float32,
                    _ => l,
                }
            }
            ApplyUnaryPrimOp(op) => {
                let t = child(0)?;
                match op {
                    UnaryOp::Negate if t.is_numeric() => t,
                    UnaryOp::Bang if t.is_bool() => t,
                    _ => return Err(mismatch("ApplyUnaryPrimOp", "a numeric or boolean operand", &t)),
                }
            }
            MakeArray(Some(t)) => t.clone(),
            MakeArray(None) => {
                let ts = children()?;
                let t = ts.first().ok_or(TypeCheckError::Untyped("MakeArray"))?;
                if let Some(o) = ts.iter().find(|o| *o != t) {
                    return Err(mismatch("MakeArray", &format!("elements of type '{}'", t), o));
                }
                Type::array(t.clone())
            }
            ArrayRef => array_element("ArrayRef", &child(0)?)?,
            ArrayLen | LowerBoundOnOrderedCollection { .. } => Type::Int32,
            ArrayRange => Type::array(Type::Int32),
            ArraySort { .. } | ToArray => match child(0)? {
                Type::Dict(k, v) => Type::array(Type::Tuple(vec![*k, *v])),
                t => Type::array(element(self.name(), &t)?),
            },
            ToSet => Type::set(element("ToSet", &child(0)?)?),
            ToDict | GroupByKey => {
                let t = child(0)?;
                match element(self.name(), &t)? {
                    Type::Tuple(kv) if kv.len() == 2 => {
                        let (k, v) = (kv[0].clone(), kv[1].clone());
                        if matches!(self.kind(), GroupByKey) {
                            Type::dict(k, Type::array(v))
                        } else {
                            Type::dict(k, v)
                        }
                    }
                    _ => return Err(mismatch(self.name(), "a collection of pairs", &t)),
                }
            }
            MakeNDArray => match (child(0)?, child(1)?) {
                (Type::Array(e), Type::Tuple(shape)) => Type::ndarray(*e, shape.len()),
                (d, _) => return Err(mismatch("MakeNDArray", "an array and a shape", &d)),
            },
            NDArrayShape => match child(0)? {
                Type::NDArray(_, n) => Type::Tuple(vec![Type::Int64; n]),
                t => return Err(mismatch("NDArrayShape", "an ndarray", &t)),
            },
            NDArrayReshape => match (child(0)?, child(1)?) {
                (Type::NDArray(e, _), Type::Tuple(shape)) => Type::ndarray(*e, shape.len()),
                (t, _) => return Err(mismatch("NDArrayReshape", "an ndarray and a shape", &t)),
            },
            NDArrayRef => element("NDArrayRef", &child(0)?)?,
            NDArrayMap(name) => match child(0)? {
                Type::NDArray(e, n) => {
                    Type::ndarray(self.child(1).infer_type(&env.bind(name, *e))?, n)
                }
                t => return Err(mismatch("NDArrayMap", "an ndarray", &t)),
            },
            NDArrayMatMul => match (child(0)?, child(1)?) {
                (Type::NDArray(e, l), Type::NDArray(_, r)) => Type::ndarray(
                    *e,
                    if l >= 2 && r >= 2 { l.max(r) } else { l + r - 2 },
                ),
                (t, _) => return Err(mismatch("NDArrayMatMul", "two ndarrays", &t)),
            },
            ArrayMap(name) => {
                let e = element("ArrayMap", &child(0)?)?;
                Type::array(self.child(1).infer_type(&env.bind(name, e))?)
            }
            ArrayFilter(name) => {
                let a = child(0)?;
                let c = self.child(1).infer_type(&env.bind(name, element("ArrayFilter", &a)?))?;
                if !c.is_bool() {
                    return Err(mismatch("ArrayFilter", "a boolean predicate", &c));
                }
                a
            }
            ArrayFlatMap(name) => {
                let e = element("ArrayFlatMap", &child(0)?)?;
                let body = self.child(1).infer_type(&env.bind(name, e))?;
                Type::array(element("ArrayFlatMap", &body)?)
            }
            ArrayFold { accum, value } | ArrayScan { accum, value } => {
                let e = element(self.name(), &child(0)?)?;
                let zero = child(1)?;
                let body = self
                    .child(2)
                    .infer_type(&env.bind(accum, zero.clone()).with(value, e))?;
                if body != zero {
                    return Err(mismatch(self.name(), &format!("a body of type '{}'", zero), &body));
                }
                if matches!(self.kind(), ArrayScan { .. }) {
                    Type::array(zero)
                } else {
                    zero
                }
            }
            ArrayLeftJoinDistinct { left, right } => {
                let l = element("ArrayLeftJoinDistinct", &child(0)?)?;
                let r = element("ArrayLeftJoinDistinct", &child(1)?)?;
                Type::array(self.child(3).infer_type(&env.bind(left, l).with(right, r))?)
            }
            AggFilter { is_scan } => {
                let c = self.child(0).infer_type(&env.enter(*is_scan, "AggFilter")?)?;
                if !c.is_bool() {
                    return Err(mismatch("AggFilter", "a boolean condition", &c));
                }
                child(1)?
            }
            AggExplode { name, is_scan } => {
                let a = self.child(0).infer_type(&env.enter(*is_scan, "AggExplode")?)?;
                let e = element("AggExplode", &a)?;
                self.child(1).infer_type(&env.bind_agg(*is_scan, name, e))?
            }
            AggGroupBy { is_scan } => {
                let k = self.child(0).infer_type(&env.enter(*is_scan, "AggGroupBy")?)?;
                Type::dict(k, child(1)?)
            }
            AggArrayPerElement {
                element: elt,
                index,
                is_scan,
            } => {
                let a = self
                    .child(0)
                    .infer_type(&env.enter(*is_scan, "AggArrayPerElement")?)?;
                let e = element("AggArrayPerElement", &a)?;
                let inner = env
                    .bind_agg(*is_scan, elt, e)
                    .bind_agg(*is_scan, index, Type::Int32)
                    .with(index, Type::Int32);
                Type::array(self.child(1).infer_type(&inner)?)
            }
            ApplyAggOp(call) | ApplyScanOp(call) => {
                let is_scan = matches!(self.kind(), ApplyScanOp(_));
                let inner = env.enter(is_scan, self.name())?;
                let ctor = self.children()[..call.n_ctor]
                    .iter()
                    .map(|c| c.infer_type(env))
                    .collect::<Result<Vec<_>, _>>()?;
                let seq = self.children()[call.seq_start()..]
                    .iter()
                    .map(|c| c.infer_type(&inner))
                    .collect::<Result<Vec<_>, _>>()?;
                aggregator_type(&call.op, &ctor, &seq)?
            }
            MakeStruct(names) => Type::Struct(names.iter().cloned().zip(children()?).collect()),
            SelectFields(names) => {
                let t = child(0)?;
                let fs = struct_fields("SelectFields", &t)?;
                Type::Struct(
                    names
                        .iter()
                        .map(|n| {
                            fs.get(n)
                                .map(|ft| (n.clone(), ft.clone()))
                                .ok_or_else(|| TypeCheckError::NoSuchField(t.clone(), n.clone()))
                        })
                        .collect::<Result<Fields, _>>()?,
                )
            }
            InsertFields { names, field_order } => {
                let t = child(0)?;
                let mut fields = struct_fields("InsertFields", &t)?
                    .iter()
                    .map(|(n, t)| (n.clone(), t.clone()))
                    .collect::<Vec<_>>();
                for (i, name) in names.iter().enumerate() {
                    let ft = child(i + 1)?;
                    match fields.iter_mut().find(|(n, _)| n == name) {
                        Some(slot) => slot.1 = ft,
                        None => fields.push((name.clone(), ft)),
                    }
                }
                if let Some(order) = field_order {
                    let mut ordered = Vec::with_capacity(order.len());
                    for n in order {
                        let f = fields
                            .iter()
                            .find(|(o, _)| o == n)
                            .ok_or_else(|| TypeCheckError::NoSuchField(t.clone(), n.clone()))?;
                        ordered.push(f.clone());
                    }
                    fields = ordered;
                }
                Type::Struct(Fields::new(fields))
            }
            GetField(name) => {
                let t = child(0)?;
                struct_fields("GetField", &t)?
                    .get(name)
                    .cloned()
                    .ok_or_else(|| TypeCheckError::NoSuchField(t.clone(), name.clone()))?
            }
            MakeTuple => Type::Tuple(children()?),
            GetTupleElement(i) => match child(0)? {
                Type::Tuple(ts) if *i < ts.len() => ts[*i].clone(),
                t => return Err(mismatch("GetTupleElement", &format!("a tuple of more than {} elements", i), &t)),
            },
            Uniroot(_) => Type::Float64,
            TableCount => Type::Int64,
            // TableGetGlobals, TableCollect, TableAggregate, MatrixAggregate
            _ => return Err(TypeCheckError::Relational(self.name())),
        })
    }
}
