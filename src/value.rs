use std::{
    collections::hash_map::DefaultHasher,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
    str::FromStr,
};

use anyhow::*;
use itertools::Itertools;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde_json::{json, Value as Json};

use crate::{
    errors::ImputationError,
    expr::Expression,
    impute::impute_type,
    types::{unify_types_limited, ReferenceGenome, Type},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locus {
    pub contig: String,
    pub position: i32,
    pub genome: ReferenceGenome,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: Value,
    pub end: Value,
    pub includes_start: bool,
    pub includes_end: bool,
    point_type: Type,
}
impl Interval {
    pub fn new(
        start: Value,
        end: Value,
        includes_start: bool,
        includes_end: bool,
    ) -> Result<Self, ImputationError> {
        let (ts, te) = (impute_type(&start)?, impute_type(&end)?);
        let point_type = unify_types_limited([&ts, &te])
            .ok_or_else(|| ImputationError::IntervalEndpoints(ts.clone(), te.clone()))?;
        std::result::Result::Ok(Interval {
            start,
            end,
            includes_start,
            includes_end,
            point_type,
        })
    }
    pub fn point_type(&self) -> &Type {
        &self.point_type
    }
}

/// A genotype call: allele indices, phased or not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    pub alleles: Vec<u32>,
    pub phased: bool,
}
impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.alleles.is_empty() {
            write!(f, "-")
        } else {
            write!(
                f,
                "{}",
                self.alleles.iter().join(if self.phased { "|" } else { "/" })
            )
        }
    }
}
impl FromStr for Call {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s == "-" {
            return Ok(Call {
                alleles: vec![],
                phased: false,
            });
        }
        let phased = s.contains('|');
        let alleles = s
            .split(['|', '/'])
            .map(|a| a.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| anyhow!("invalid call `{}`", s))?;
        Ok(Call { alleles, phased })
    }
}

/// A record with uniquely named fields. The field order is kept, but
/// two records with the same fields in different orders are equal.
#[derive(Debug, Clone, Default)]
pub struct Struct(Vec<(String, Value)>);
impl Struct {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter().map(|(n, v)| (n, v))
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl<S: Into<String>> FromIterator<(S, Value)> for Struct {
    /// Later fields override earlier fields of the same name.
    fn from_iter<T: IntoIterator<Item = (S, Value)>>(iter: T) -> Self {
        let mut fields: Vec<(String, Value)> = Vec::new();
        for (n, v) in iter {
            let n = n.into();
            if let Some(slot) = fields.iter_mut().find(|(m, _)| *m == n) {
                slot.1 = v;
            } else {
                fields.push((n, v));
            }
        }
        Struct(fields)
    }
}
impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(n, v)| other.get(n).map(|o| o == v).unwrap_or(false))
    }
}
impl Eq for Struct {}
impl Hash for Struct {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(unordered_hash(self.iter()));
    }
}

/// A value of the host language, as handed to the lifting machinery.
#[derive(Debug, Clone)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(BigInt),
    Float(f64),
    Str(String),
    Locus(Locus),
    Interval(Box<Interval>),
    Call(Call),
    Struct(Struct),
    Tuple(Vec<Value>),
    List(Vec<Value>),
    /// Elements are unique; see [`Value::set`].
    Set(Vec<Value>),
    /// Keys are unique; see [`Value::dict`].
    Dict(Vec<(Value, Value)>),
    /// An already-built expression embedded in a host container.
    Expr(Expression),
}

fn unordered_hash<T: Hash, I: Iterator<Item = T>>(xs: I) -> u64 {
    xs.map(|x| {
        let mut h = DefaultHasher::new();
        x.hash(&mut h);
        h.finish()
    })
    .fold(0u64, |acc, h| acc.wrapping_add(h))
}

impl Value {
    pub fn list<I: IntoIterator<Item = Value>>(xs: I) -> Value {
        Value::List(xs.into_iter().collect())
    }
    pub fn tuple<I: IntoIterator<Item = Value>>(xs: I) -> Value {
        Value::Tuple(xs.into_iter().collect())
    }
    pub fn set<I: IntoIterator<Item = Value>>(xs: I) -> Value {
        let mut r: Vec<Value> = Vec::new();
        for x in xs {
            if !r.contains(&x) {
                r.push(x);
            }
        }
        Value::Set(r)
    }
    pub fn dict<I: IntoIterator<Item = (Value, Value)>>(kvs: I) -> Value {
        let mut r: Vec<(Value, Value)> = Vec::new();
        for (k, v) in kvs {
            if let Some(slot) = r.iter_mut().find(|(o, _)| *o == k) {
                slot.1 = v;
            } else {
                r.push((k, v));
            }
        }
        Value::Dict(r)
    }
    pub fn record<S: Into<String>, I: IntoIterator<Item = (S, Value)>>(fields: I) -> Value {
        Value::Struct(fields.into_iter().collect())
    }
    pub fn locus(contig: &str, position: i32, genome: ReferenceGenome) -> Value {
        Value::Locus(Locus {
            contig: contig.to_owned(),
            position,
            genome,
        })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_expr(&self) -> Option<&Expression> {
        match self {
            Value::Expr(e) => Some(e),
            _ => None,
        }
    }

    /// Whether an expression leaf is reachable from this value.
    pub fn contains_expression(&self) -> bool {
        match self {
            Value::Expr(_) => true,
            Value::Struct(s) => s.iter().any(|(_, v)| v.contains_expression()),
            Value::Tuple(xs) | Value::List(xs) | Value::Set(xs) => {
                xs.iter().any(Value::contains_expression)
            }
            Value::Dict(kvs) => kvs
                .iter()
                .any(|(k, v)| k.contains_expression() || v.contains_expression()),
            Value::Interval(i) => i.start.contains_expression() || i.end.contains_expression(),
            _ => false,
        }
    }

    /// Whether this value is a valid literal of type `t`. Missing values
    /// conform to every type; expressions to none.
    pub fn conforms_to(&self, t: &Type) -> bool {
        match (self, t) {
            (Value::Missing, _) => true,
            (Value::Bool(_), Type::Bool) => true,
            (Value::Int(i), Type::Int32) => i.to_i32().is_some(),
            (Value::Int(i), Type::Int64) => i.to_i64().is_some(),
            (Value::Int(_), Type::Float32 | Type::Float64) => true,
            (Value::Float(_), Type::Float32 | Type::Float64) => true,
            (Value::Str(_), Type::Str) => true,
            (Value::Call(_), Type::Call) => true,
            (Value::Locus(l), Type::Locus(rg)) => l.genome == *rg,
            (Value::Interval(i), Type::Interval(p)) => {
                i.start.conforms_to(p) && i.end.conforms_to(p)
            }
            (Value::Struct(s), Type::Struct(fs)) => {
                s.len() == fs.len()
                    && s
                        .iter()
                        .all(|(n, v)| fs.get(n).map(|t| v.conforms_to(t)).unwrap_or(false))
            }
            (Value::Tuple(xs), Type::Tuple(ts)) => {
                xs.len() == ts.len() && xs.iter().zip(ts.iter()).all(|(x, t)| x.conforms_to(t))
            }
            (Value::List(xs), Type::Array(t)) | (Value::Set(xs), Type::Set(t)) => {
                xs.iter().all(|x| x.conforms_to(t))
            }
            (Value::Dict(kvs), Type::Dict(kt, vt)) => kvs
                .iter()
                .all(|(k, v)| k.conforms_to(kt) && v.conforms_to(vt)),
            _ => false,
        }
    }

    /// The JSON encoding of this value as a literal of type `t`, as carried
    /// by `Literal` nodes. Values are checked against their type when the
    /// node is built; parts that do not conform encode as `null`.
    pub fn to_json(&self, t: &Type) -> Json {
        match (self, t) {
            (Value::Bool(b), Type::Bool) => json!(b),
            (Value::Int(i), Type::Int32 | Type::Int64) => {
                i.to_i64().map(|i| json!(i)).unwrap_or(Json::Null)
            }
            (Value::Int(i), Type::Float32 | Type::Float64) => {
                i.to_f64().map(float_to_json).unwrap_or(Json::Null)
            }
            (Value::Float(x), Type::Float32 | Type::Float64) => float_to_json(*x),
            (Value::Str(s), Type::Str) => json!(s),
            (Value::Call(c), Type::Call) => json!(c.to_string()),
            (Value::Locus(l), Type::Locus(_)) => {
                json!({"contig": l.contig, "position": l.position})
            }
            (Value::Interval(i), Type::Interval(p)) => json!({
                "start": i.start.to_json(p),
                "end": i.end.to_json(p),
                "includeStart": i.includes_start,
                "includeEnd": i.includes_end,
            }),
            (Value::Struct(s), Type::Struct(fs)) => Json::Object(
                fs.iter()
                    .map(|(n, t)| {
                        (
                            n.clone(),
                            s.get(n).map(|v| v.to_json(t)).unwrap_or(Json::Null),
                        )
                    })
                    .collect(),
            ),
            (Value::Tuple(xs), Type::Tuple(ts)) => {
                Json::Array(xs.iter().zip(ts.iter()).map(|(x, t)| x.to_json(t)).collect())
            }
            (Value::List(xs), Type::Array(t)) | (Value::Set(xs), Type::Set(t)) => {
                Json::Array(xs.iter().map(|x| x.to_json(t)).collect())
            }
            (Value::Dict(kvs), Type::Dict(kt, vt)) => Json::Array(
                kvs.iter()
                    .map(|(k, v)| json!({"key": k.to_json(kt), "value": v.to_json(vt)}))
                    .collect(),
            ),
            _ => Json::Null,
        }
    }

    /// Decode a JSON value according to the type it is known to have.
    pub fn from_json(j: &Json, t: &Type) -> Result<Value> {
        if j.is_null() {
            return Ok(Value::Missing);
        }
        let mismatch = || anyhow!("`{}` is not a valid JSON encoding of {}", j, t);
        Ok(match t {
            Type::Bool => Value::Bool(j.as_bool().ok_or_else(mismatch)?),
            Type::Int32 | Type::Int64 => Value::Int(json_to_int(j).ok_or_else(mismatch)?),
            Type::Float32 | Type::Float64 => Value::Float(match j {
                Json::String(s) => match s.as_str() {
                    "NaN" => f64::NAN,
                    "Infinity" => f64::INFINITY,
                    "-Infinity" => f64::NEG_INFINITY,
                    _ => return Err(mismatch()),
                },
                j => j.as_f64().ok_or_else(mismatch)?,
            }),
            Type::Str => Value::Str(j.as_str().ok_or_else(mismatch)?.to_owned()),
            Type::Call => Value::Call(j.as_str().ok_or_else(mismatch)?.parse()?),
            Type::Locus(rg) => Value::Locus(Locus {
                contig: j["contig"].as_str().ok_or_else(mismatch)?.to_owned(),
                position: j["position"]
                    .as_i64()
                    .and_then(|p| p.to_i32())
                    .ok_or_else(mismatch)?,
                genome: rg.clone(),
            }),
            Type::Interval(p) => Value::Interval(Box::new(Interval::new(
                Value::from_json(&j["start"], p)?,
                Value::from_json(&j["end"], p)?,
                j["includeStart"].as_bool().ok_or_else(mismatch)?,
                j["includeEnd"].as_bool().ok_or_else(mismatch)?,
            )?)),
            Type::Array(e) => Value::List(
                j.as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|x| Value::from_json(x, e))
                    .collect::<Result<_>>()?,
            ),
            Type::Set(e) => Value::set(
                j.as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|x| Value::from_json(x, e))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Type::Dict(kt, vt) => Value::dict(
                j.as_array()
                    .ok_or_else(mismatch)?
                    .iter()
                    .map(|kv| {
                        Ok((
                            Value::from_json(&kv["key"], kt)?,
                            Value::from_json(&kv["value"], vt)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Type::Struct(fs) => {
                let o = j.as_object().ok_or_else(mismatch)?;
                Value::Struct(
                    fs.iter()
                        .map(|(n, t)| {
                            Ok((
                                n.clone(),
                                o.get(n)
                                    .map(|v| Value::from_json(v, t))
                                    .transpose()?
                                    .unwrap_or(Value::Missing),
                            ))
                        })
                        .collect::<Result<Vec<_>>>()?
                        .into_iter()
                        .collect(),
                )
            }
            Type::Tuple(ts) => {
                let xs = j.as_array().ok_or_else(mismatch)?;
                if xs.len() != ts.len() {
                    return Err(mismatch());
                }
                Value::Tuple(
                    xs.iter()
                        .zip(ts.iter())
                        .map(|(x, t)| Value::from_json(x, t))
                        .collect::<Result<_>>()?,
                )
            }
            Type::NDArray(..) => bail!("ndarrays have no host value representation"),
            Type::Void => bail!("void nodes have no value"),
        })
    }

    /// Decode a JSON document with no type at hand: objects become
    /// structs, arrays become lists.
    pub fn from_json_untyped(j: &Json) -> Value {
        match j {
            Json::Null => Value::Missing,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => json_to_int(j)
                .map(Value::Int)
                .unwrap_or_else(|| Value::Float(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(xs) => Value::List(xs.iter().map(Value::from_json_untyped).collect()),
            Json::Object(o) => Value::Struct(
                o.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json_untyped(v)))
                    .collect(),
            ),
        }
    }
}

fn float_to_json(x: f64) -> Json {
    if x.is_nan() {
        json!("NaN")
    } else if x.is_infinite() {
        json!(if x > 0. { "Infinity" } else { "-Infinity" })
    } else {
        json!(x)
    }
}

fn json_to_int(j: &Json) -> Option<BigInt> {
    match j {
        Json::Number(n) => n
            .as_i64()
            .map(BigInt::from)
            .or_else(|| BigInt::from_str(&n.to_string()).ok()),
        _ => None,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Missing, Value::Missing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Locus(a), Value::Locus(b)) => a == b,
            (Value::Interval(a), Value::Interval(b)) => a == b,
            (Value::Call(a), Value::Call(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) | (Value::List(a), Value::List(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Value::Dict(a), Value::Dict(b)) => a.len() == b.len() && a.iter().all(|x| b.contains(x)),
            (Value::Expr(a), Value::Expr(b)) => a.dtype() == b.dtype() && a.ir() == b.ir(),
            _ => false,
        }
    }
}
impl Eq for Value {}
impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Missing => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(x) => x.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Locus(l) => l.hash(state),
            Value::Interval(i) => i.hash(state),
            Value::Call(c) => c.hash(state),
            Value::Struct(s) => s.hash(state),
            Value::Tuple(xs) | Value::List(xs) => xs.hash(state),
            Value::Set(xs) => state.write_u64(unordered_hash(xs.iter())),
            Value::Dict(kvs) => state.write_u64(unordered_hash(kvs.iter())),
            Value::Expr(e) => {
                e.dtype().hash(state);
                e.ir().hash(state);
            }
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Value::Locus(l) => write!(f, "Locus({}:{}, {})", l.contig, l.position, l.genome),
            Value::Interval(i) => write!(
                f,
                "{}{}-{}{}",
                if i.includes_start { '[' } else { '(' },
                i.start,
                i.end,
                if i.includes_end { ']' } else { ')' }
            ),
            Value::Call(c) => write!(f, "Call({})", c),
            Value::Struct(s) => write!(
                f,
                "Struct({})",
                s.iter().map(|(n, v)| format!("{}={}", n, v)).join(", ")
            ),
            Value::Tuple(xs) if xs.len() == 1 => write!(f, "({},)", xs[0]),
            Value::Tuple(xs) => write!(f, "({})", xs.iter().join(", ")),
            Value::List(xs) => write!(f, "[{}]", xs.iter().join(", ")),
            Value::Set(xs) => write!(f, "{{{}}}", xs.iter().join(", ")),
            Value::Dict(kvs) => write!(
                f,
                "{{{}}}",
                kvs.iter().map(|(k, v)| format!("{}: {}", k, v)).join(", ")
            ),
            Value::Expr(e) => write!(f, "<{} expression>", e.dtype()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i.into())
    }
}
impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::Int(i)
    }
}
impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}
impl From<Expression> for Value {
    fn from(e: Expression) -> Self {
        Value::Expr(e)
    }
}
impl From<&Expression> for Value {
    fn from(e: &Expression) -> Self {
        Value::Expr(e.clone())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(x: Option<T>) -> Self {
        x.map(Into::into).unwrap_or(Value::Missing)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(xs: Vec<T>) -> Self {
        Value::List(xs.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip_of_nested_literal() -> Result<()> {
        let t: Type = "struct{a: array<int32>, b: dict<str, float64>, c: tuple(bool, call)}".parse()?;
        let v = Value::record([
            ("a", Value::list([1.into(), Value::Missing, 3.into()])),
            ("b", Value::dict([("x".into(), 1.5.into())])),
            (
                "c",
                Value::tuple([
                    true.into(),
                    Value::Call(Call {
                        alleles: vec![0, 1],
                        phased: true,
                    }),
                ]),
            ),
        ]);
        assert!(v.conforms_to(&t));
        let j = v.to_json(&t);
        assert_eq!(
            j.to_string(),
            r#"{"a":[1,null,3],"b":[{"key":"x","value":1.5}],"c":[true,"0|1"]}"#
        );
        assert_eq!(Value::from_json(&j, &t)?, v);
        Ok(())
    }

    #[test]
    fn sets_and_structs_ignore_order() {
        assert_eq!(
            Value::set([1.into(), 2.into(), 1.into()]),
            Value::set([2.into(), 1.into()])
        );
        assert_eq!(
            Value::record([("x", Value::from(1)), ("y", "a".into())]),
            Value::record([("y", Value::from("a")), ("x", 1.into())])
        );
        assert_ne!(
            Value::list([1.into(), 2.into()]),
            Value::list([2.into(), 1.into()])
        );
    }

    #[test]
    fn conformance() {
        assert!(Value::from(1).conforms_to(&Type::Float64));
        assert!(!Value::from(1.5).conforms_to(&Type::Int32));
        assert!(!Value::from(i64::MAX).conforms_to(&Type::Int32));
        assert!(Value::from(i64::MAX).conforms_to(&Type::Int64));
        assert!(Value::Missing.conforms_to(&Type::Str));
    }

    #[test]
    fn untyped_json() {
        let j: Json = serde_json::from_str(r#"{"a": [1, 2.5], "b": 123456789012345678901234567890}"#)
            .unwrap();
        let v = Value::from_json_untyped(&j);
        let big = BigInt::from_str("123456789012345678901234567890").unwrap();
        assert_eq!(
            v,
            Value::record([
                ("a", Value::list([1.into(), 2.5.into()])),
                ("b", Value::Int(big)),
            ])
        );
    }

    #[test]
    fn typed_json() -> Result<()> {
        let j = json!({"start": 1, "end": 5, "includeStart": true, "includeEnd": false});
        let v = Value::from_json(&j, &Type::interval(Type::Int32))?;
        let expected = Interval::new(1.into(), 5.into(), true, false)?;
        assert_eq!(v, Value::Interval(Box::new(expected)));
        assert!(Value::from_json(&json!(1), &Type::Void).is_err());
        assert_eq!(Value::from_json(&Json::Null, &Type::Void)?, Value::Missing);
        Ok(())
    }
}
