use std::{
    cmp::Ordering,
    collections::hash_map::DefaultHasher,
    fmt::{self, Display, Formatter},
    hash::{Hash, Hasher},
};

use itertools::Itertools;
use serde::Serialize;

use crate::utils::escape_id;

mod parser;
mod unify;

pub use unify::{unify_types, unify_types_limited};

/// The reference genome a locus is defined against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceGenome {
    GRCh37,
    GRCh38,
    GRCm38,
    Custom(String),
}
impl ReferenceGenome {
    pub fn name(&self) -> &str {
        match self {
            ReferenceGenome::GRCh37 => "GRCh37",
            ReferenceGenome::GRCh38 => "GRCh38",
            ReferenceGenome::GRCm38 => "GRCm38",
            ReferenceGenome::Custom(name) => name,
        }
    }
}
impl From<&str> for ReferenceGenome {
    fn from(s: &str) -> Self {
        match s {
            "GRCh37" => ReferenceGenome::GRCh37,
            "GRCh38" => ReferenceGenome::GRCh38,
            "GRCm38" => ReferenceGenome::GRCm38,
            _ => ReferenceGenome::Custom(s.to_owned()),
        }
    }
}
impl Display for ReferenceGenome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The named fields of a struct type. Names are unique; the order is kept
/// for rendering, but does not take part in equality.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Fields(Vec<(String, Type)>);
impl Fields {
    pub fn new(fields: Vec<(String, Type)>) -> Self {
        debug_assert!(fields.iter().map(|f| &f.0).all_unique());
        Fields(fields)
    }
    pub fn get(&self, name: &str) -> Option<&Type> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }
    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|(n, _)| n == name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Type)> {
        self.0.iter().map(|(n, t)| (n, t))
    }
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.0.iter().map(|(n, _)| n)
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
impl PartialEq for Fields {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .all(|(n, t)| other.get(n).map(|o| o == t).unwrap_or(false))
    }
}
impl Eq for Fields {}
impl Hash for Fields {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // order-independent combination of the per-field hashes
        let mut acc = 0u64;
        for (n, t) in self.0.iter() {
            let mut h = DefaultHasher::new();
            n.hash(&mut h);
            t.hash(&mut h);
            acc = acc.wrapping_add(h.finish());
        }
        state.write_usize(self.0.len());
        state.write_u64(acc);
    }
}
impl FromIterator<(String, Type)> for Fields {
    fn from_iter<T: IntoIterator<Item = (String, Type)>>(iter: T) -> Self {
        Fields::new(iter.into_iter().collect())
    }
}

/// The type of an expression or of an IR value node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    /// The type of side-effecting nodes; no value has it.
    Void,
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Str,
    Call,
    Locus(ReferenceGenome),
    Interval(Box<Type>),
    Array(Box<Type>),
    Set(Box<Type>),
    Dict(Box<Type>, Box<Type>),
    Struct(Fields),
    Tuple(Vec<Type>),
    NDArray(Box<Type>, usize),
}
impl Type {
    pub fn array(t: Type) -> Type {
        Type::Array(Box::new(t))
    }
    pub fn set(t: Type) -> Type {
        Type::Set(Box::new(t))
    }
    pub fn dict(k: Type, v: Type) -> Type {
        Type::Dict(Box::new(k), Box::new(v))
    }
    pub fn interval(t: Type) -> Type {
        Type::Interval(Box::new(t))
    }
    pub fn ndarray(t: Type, ndim: usize) -> Type {
        Type::NDArray(Box::new(t), ndim)
    }
    pub fn tstruct<S: Into<String>, I: IntoIterator<Item = (S, Type)>>(fields: I) -> Type {
        Type::Struct(fields.into_iter().map(|(n, t)| (n.into(), t)).collect())
    }

    /// Position in the numeric promotion order; `None` for non-numeric
    /// types. Booleans rank below every numeric type.
    pub fn numeric_rank(&self) -> Option<u8> {
        match self {
            Type::Bool => Some(0),
            Type::Int32 => Some(1),
            Type::Int64 => Some(2),
            Type::Float32 => Some(3),
            Type::Float64 => Some(4),
            _ => None,
        }
    }
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int32 | Type::Int64 | Type::Float32 | Type::Float64
        )
    }
    pub fn is_integral(&self) -> bool {
        matches!(self, Type::Int32 | Type::Int64)
    }
    pub fn is_bool(&self) -> bool {
        matches!(self, Type::Bool)
    }
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Bool | Type::Int32 | Type::Int64 | Type::Float32 | Type::Float64 | Type::Str
        )
    }
    pub fn is_compound(&self) -> bool {
        matches!(
            self,
            Type::Array(_) | Type::Set(_) | Type::Dict(..) | Type::Struct(_) | Type::Tuple(_)
        )
    }
    pub fn is_container(&self) -> bool {
        matches!(self, Type::Array(_) | Type::Set(_) | Type::Dict(..))
    }

    /// The element type of arrays, sets and ndarrays.
    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Type::Array(t) | Type::Set(t) | Type::NDArray(t, _) => Some(t),
            _ => None,
        }
    }
    pub fn fields(&self) -> Option<&Fields> {
        match self {
            Type::Struct(fs) => Some(fs),
            _ => None,
        }
    }

    /// The canonical form used in the textual IR, e.g. `Array[Int32]`.
    pub fn parsable_string(&self) -> String {
        match self {
            Type::Void => "Void".into(),
            Type::Bool => "Boolean".into(),
            Type::Int32 => "Int32".into(),
            Type::Int64 => "Int64".into(),
            Type::Float32 => "Float32".into(),
            Type::Float64 => "Float64".into(),
            Type::Str => "String".into(),
            Type::Call => "Call".into(),
            Type::Locus(rg) => format!("Locus({})", rg),
            Type::Interval(t) => format!("Interval[{}]", t.parsable_string()),
            Type::Array(t) => format!("Array[{}]", t.parsable_string()),
            Type::Set(t) => format!("Set[{}]", t.parsable_string()),
            Type::Dict(k, v) => format!("Dict[{},{}]", k.parsable_string(), v.parsable_string()),
            Type::Struct(fs) => format!(
                "Struct{{{}}}",
                fs.iter()
                    .map(|(n, t)| format!("{}:{}", escape_id(n), t.parsable_string()))
                    .join(",")
            ),
            Type::Tuple(ts) => format!("Tuple[{}]", ts.iter().map(|t| t.parsable_string()).join(",")),
            Type::NDArray(t, n) => format!("NDArray[{},{}]", t.parsable_string(), n),
        }
    }

    /// Whether the type could be used where `other` is expected without
    /// any conversion but a numeric widening.
    pub fn widens_to(&self, other: &Type) -> bool {
        self == other
            || matches!((self.numeric_rank(), other.numeric_rank()), (Some(a), Some(b)) if a <= b)
    }
}
impl PartialOrd for Type {
    /// Only numeric types are ordered, along their promotion rank.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self.numeric_rank(), other.numeric_rank()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => None,
        }
    }
}
impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::Int32 => write!(f, "int32"),
            Type::Int64 => write!(f, "int64"),
            Type::Float32 => write!(f, "float32"),
            Type::Float64 => write!(f, "float64"),
            Type::Str => write!(f, "str"),
            Type::Call => write!(f, "call"),
            Type::Locus(rg) => write!(f, "locus<{}>", rg),
            Type::Interval(t) => write!(f, "interval<{}>", t),
            Type::Array(t) => write!(f, "array<{}>", t),
            Type::Set(t) => write!(f, "set<{}>", t),
            Type::Dict(k, v) => write!(f, "dict<{}, {}>", k, v),
            Type::Struct(fs) => write!(
                f,
                "struct{{{}}}",
                fs.iter()
                    .map(|(n, t)| format!("{}: {}", escape_id(n), t))
                    .join(", ")
            ),
            Type::Tuple(ts) => write!(f, "tuple({})", ts.iter().join(", ")),
            Type::NDArray(t, n) => write!(f, "ndarray<{}, {}>", t, n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_equality_ignores_field_order() {
        let a = Type::tstruct([("x", Type::Int32), ("y", Type::Str)]);
        let b = Type::tstruct([("y", Type::Str), ("x", Type::Int32)]);
        let c = Type::tstruct([("y", Type::Str), ("x", Type::Int64)]);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let hash = |t: &Type| {
            let mut h = DefaultHasher::new();
            t.hash(&mut h);
            h.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn serialized_shape() {
        let t = Type::dict(
            Type::Str,
            Type::tstruct([("a", Type::Locus(ReferenceGenome::GRCh37)), ("b", Type::ndarray(Type::Float64, 2))]),
        );
        assert_eq!(
            serde_json::to_value(&t).unwrap(),
            serde_json::json!({
                "Dict": ["Str", {"Struct": [["a", {"Locus": "GRCh37"}], ["b", {"NDArray": ["Float64", 2]}]]}]
            })
        );
    }

    #[test]
    fn tuple_order_matters() {
        assert_ne!(
            Type::Tuple(vec![Type::Int32, Type::Str]),
            Type::Tuple(vec![Type::Str, Type::Int32])
        );
    }

    #[test]
    fn renderings() {
        let t = Type::dict(
            Type::Str,
            Type::array(Type::tstruct([("a", Type::Int32), ("b c", Type::Float64)])),
        );
        assert_eq!(t.to_string(), "dict<str, array<struct{a: int32, `b c`: float64}>>");
        assert_eq!(
            t.parsable_string(),
            "Dict[String,Array[Struct{a:Int32,`b c`:Float64}]]"
        );
        assert_eq!(
            Type::Locus(ReferenceGenome::GRCh38).parsable_string(),
            "Locus(GRCh38)"
        );
        assert_eq!(Type::ndarray(Type::Float64, 2).to_string(), "ndarray<float64, 2>");
    }

    #[test]
    fn numeric_order() {
        assert!(Type::Bool < Type::Int32);
        assert!(Type::Int64 < Type::Float32);
        assert!(Type::Float32 < Type::Float64);
        assert_eq!(Type::Str.partial_cmp(&Type::Int32), None);
        assert!(Type::Int32.widens_to(&Type::Float64));
        assert!(!Type::Float64.widens_to(&Type::Int64));
    }
}
