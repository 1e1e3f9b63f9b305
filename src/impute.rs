use itertools::Itertools;
use num_traits::ToPrimitive;

use crate::{
    errors::ImputationError,
    types::{unify_types_limited, Type},
    value::Value,
};

fn unify_elements<'a, I: Iterator<Item = &'a Value>>(
    xs: I,
    kind: &'static str,
    part: &'static str,
) -> Result<Type, ImputationError> {
    let types = xs.map(impute_type).collect::<Result<Vec<_>, _>>()?;
    unify_types_limited(types.iter()).ok_or_else(|| ImputationError::Heterogeneous {
        kind,
        part,
        types: types.into_iter().unique().collect(),
    })
}

/// Compute the type of a host value.
///
/// Containers must be non-empty, and their elements must unify under
/// numeric promotion.
pub fn impute_type(v: &Value) -> Result<Type, ImputationError> {
    Ok(match v {
        Value::Expr(e) => e.dtype().clone(),
        Value::Missing => return Err(ImputationError::Missing),
        Value::Bool(_) => Type::Bool,
        Value::Int(i) => {
            if i.to_i32().is_some() {
                Type::Int32
            } else if i.to_i64().is_some() {
                Type::Int64
            } else {
                return Err(ImputationError::IntegerOverflow(i.clone()));
            }
        }
        Value::Float(_) => Type::Float64,
        Value::Str(_) => Type::Str,
        Value::Call(_) => Type::Call,
        Value::Locus(l) => Type::Locus(l.genome.clone()),
        Value::Interval(i) => Type::interval(i.point_type().clone()),
        Value::Struct(s) => Type::Struct(
            s.iter()
                .map(|(n, v)| Ok((n.clone(), impute_type(v)?)))
                .collect::<Result<_, ImputationError>>()?,
        ),
        Value::Tuple(xs) => Type::Tuple(xs.iter().map(impute_type).collect::<Result<_, _>>()?),
        Value::List(xs) => {
            if xs.is_empty() {
                return Err(ImputationError::EmptyContainer {
                    kind: "array",
                    constructor: "empty_array",
                });
            }
            Type::array(unify_elements(xs.iter(), "array", "elements")?)
        }
        Value::Set(xs) => {
            if xs.is_empty() {
                return Err(ImputationError::EmptyContainer {
                    kind: "set",
                    constructor: "empty_set",
                });
            }
            Type::set(unify_elements(xs.iter(), "set", "elements")?)
        }
        Value::Dict(kvs) => {
            if kvs.is_empty() {
                return Err(ImputationError::EmptyContainer {
                    kind: "dict",
                    constructor: "empty_dict",
                });
            }
            Type::dict(
                unify_elements(kvs.iter().map(|(k, _)| k), "dict", "keys")?,
                unify_elements(kvs.iter().map(|(_, v)| v), "dict", "values")?,
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReferenceGenome;
    use crate::value::Interval;
    use num_bigint::BigInt;

    #[test]
    fn integers() {
        assert_eq!(impute_type(&i32::MAX.into()), Ok(Type::Int32));
        assert_eq!(impute_type(&(i32::MAX as i64 + 1).into()), Ok(Type::Int64));
        assert_eq!(impute_type(&i64::MIN.into()), Ok(Type::Int64));
        let too_big: BigInt = BigInt::from(i64::MAX) + 1;
        assert_eq!(
            impute_type(&too_big.clone().into()),
            Err(ImputationError::IntegerOverflow(too_big))
        );
    }

    #[test]
    fn containers() {
        assert_eq!(
            impute_type(&Value::list([1.into(), 2.into()])),
            Ok(Type::array(Type::Int32))
        );
        assert_eq!(
            impute_type(&Value::list([1.into(), 2.5.into(), true.into()])),
            Ok(Type::array(Type::Float64))
        );
        assert_eq!(
            impute_type(&Value::set(["a".into()])),
            Ok(Type::set(Type::Str))
        );
        assert_eq!(
            impute_type(&Value::dict([("a".into(), 1.into()), ("b".into(), i64::MAX.into())])),
            Ok(Type::dict(Type::Str, Type::Int64))
        );
        assert_eq!(
            impute_type(&Value::tuple([1.into(), "x".into()])),
            Ok(Type::Tuple(vec![Type::Int32, Type::Str]))
        );
        assert_eq!(
            impute_type(&Value::record([("a", Value::from(1)), ("b", Value::from(false))])),
            Ok(Type::tstruct([("a", Type::Int32), ("b", Type::Bool)]))
        );
    }

    #[test]
    fn domain_objects() {
        assert_eq!(
            impute_type(&Value::locus("1", 100, ReferenceGenome::GRCh37)),
            Ok(Type::Locus(ReferenceGenome::GRCh37))
        );
        let i = Interval::new(1.into(), i64::MAX.into(), true, false).unwrap();
        assert_eq!(
            impute_type(&Value::Interval(Box::new(i))),
            Ok(Type::interval(Type::Int64))
        );
        assert!(Interval::new(1.into(), "a".into(), true, false).is_err());
    }

    #[test]
    fn failures() {
        assert_eq!(impute_type(&Value::Missing), Err(ImputationError::Missing));
        assert!(matches!(
            impute_type(&Value::List(vec![])),
            Err(ImputationError::EmptyContainer { kind: "array", .. })
        ));
        assert!(matches!(
            impute_type(&Value::Set(vec![])),
            Err(ImputationError::EmptyContainer { kind: "set", .. })
        ));
        assert!(matches!(
            impute_type(&Value::set([1.into(), "a".into()])),
            Err(ImputationError::Heterogeneous { kind: "set", part: "elements", .. })
        ));
        assert!(matches!(
            impute_type(&Value::Dict(vec![])),
            Err(ImputationError::EmptyContainer { kind: "dict", .. })
        ));
        let e = impute_type(&Value::list([1.into(), "a".into(), 2.into()])).unwrap_err();
        assert_eq!(
            e.to_string(),
            "heterogeneous arrays are not supported: found array with elements of types (int32, str)"
        );
        assert!(matches!(
            impute_type(&Value::dict([(1.into(), 1.into()), ("a".into(), 1.into())])),
            Err(ImputationError::Heterogeneous { part: "keys", .. })
        ));
        assert_eq!(
            impute_type(&Value::list([Value::Missing])),
            Err(ImputationError::Missing)
        );
    }
}
