use itertools::Itertools;

use super::Type;

/// The least upper bound of `types` under numeric promotion, if any.
///
/// A single distinct type unifies to itself; a set of numeric (or
/// boolean) types unifies to its highest-ranked member, booleans being
/// promoted to `int32`. Anything else does not unify.
pub fn unify_types_limited<'a, I: IntoIterator<Item = &'a Type>>(types: I) -> Option<Type> {
    let distinct = types.into_iter().unique().collect::<Vec<_>>();
    match distinct.as_slice() {
        [] => None,
        [t] => Some((*t).clone()),
        ts if ts.iter().all(|t| t.numeric_rank().is_some()) => ts
            .iter()
            .max_by_key(|t| t.numeric_rank())
            .map(|t| match t {
                Type::Bool => Type::Int32,
                t => (*t).clone(),
            }),
        _ => None,
    }
}

/// As [`unify_types_limited`], but also unifies arrays one level deep
/// by unifying their element types.
pub fn unify_types<'a, I: IntoIterator<Item = &'a Type>>(types: I) -> Option<Type> {
    let types = types.into_iter().collect::<Vec<_>>();
    unify_types_limited(types.iter().copied()).or_else(|| {
        let elements = types
            .iter()
            .map(|t| match t {
                Type::Array(e) => Some(e.as_ref()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        unify_types_limited(elements).map(Type::array)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limited() {
        assert_eq!(
            unify_types_limited(&[Type::Int32, Type::Bool]),
            Some(Type::Int32)
        );
        assert_eq!(
            unify_types_limited(&[Type::Int32, Type::Float64]),
            Some(Type::Float64)
        );
        assert_eq!(
            unify_types_limited(&[Type::Int64, Type::Int32, Type::Bool]),
            Some(Type::Int64)
        );
        assert_eq!(
            unify_types_limited(&[Type::Float32, Type::Int64]),
            Some(Type::Float32)
        );
        assert_eq!(unify_types_limited(&[Type::Str, Type::Int32]), None);
        assert_eq!(unify_types_limited(&[Type::Bool, Type::Bool]), Some(Type::Bool));
        assert_eq!(unify_types_limited(&[]), None);
        assert_eq!(
            unify_types_limited(&[Type::array(Type::Int32), Type::array(Type::Int64)]),
            None
        );
    }

    #[test]
    fn one_level_of_arrays() {
        assert_eq!(
            unify_types(&[Type::array(Type::Int32), Type::array(Type::Float32)]),
            Some(Type::array(Type::Float32))
        );
        assert_eq!(
            unify_types(&[Type::array(Type::Int32), Type::Int32]),
            None
        );
        assert_eq!(
            unify_types(&[
                Type::array(Type::array(Type::Int32)),
                Type::array(Type::array(Type::Int64))
            ]),
            None
        );
    }
}
