use super::Expression;
use crate::{
    errors::{ExprResult, ExpressionError},
    ir::{Ir, IrKind, IrRef},
    types::Type,
};

/// Bound only around the per-element body, which refers to nothing else,
/// so nested coercions shadow it without capturing.
const ELEMENT: &str = "__coerce_elt";

/// Converts expressions to a target type, when the conversion loses no
/// information: numeric widening, applied element-wise through
/// containers.
#[derive(Debug, Clone)]
pub struct Coercer {
    target: Type,
}

impl Coercer {
    pub fn new(target: Type) -> Self {
        Coercer { target }
    }
    pub fn target(&self) -> &Type {
        &self.target
    }

    pub fn can_coerce(&self, from: &Type) -> bool {
        can_coerce(from, &self.target)
    }

    pub fn coerce(&self, e: &Expression) -> ExprResult<Expression> {
        if !self.can_coerce(e.dtype()) {
            return Err(ExpressionError::InvalidCoercion {
                expected: self.target.clone(),
                found: e.dtype().clone(),
            });
        }
        Ok(Expression::new(
            coerce_ir(e.ir().clone(), e.dtype(), &self.target),
            self.target.clone(),
            e.indices().clone(),
            e.aggregations().clone(),
        ))
    }
}

fn can_coerce(from: &Type, to: &Type) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        (f, t) if f.is_numeric() && t.is_numeric() => f.widens_to(t),
        (Type::Array(f), Type::Array(t)) | (Type::Set(f), Type::Set(t)) => can_coerce(f, t),
        (Type::NDArray(f, n), Type::NDArray(t, m)) => n == m && can_coerce(f, t),
        (Type::Dict(fk, fv), Type::Dict(tk, tv)) => can_coerce(fk, tk) && can_coerce(fv, tv),
        _ => false,
    }
}

fn coerce_ir(ir: IrRef, from: &Type, to: &Type) -> IrRef {
    if from == to {
        return ir;
    }
    let each = |f: &Type, t: &Type| coerce_ir(Ir::reference(ELEMENT), f, t);
    let map = |array: IrRef, f: &Type, t: &Type| {
        Ir::new(IrKind::ArrayMap(ELEMENT.into()), vec![array, each(f, t)])
    };
    match (from, to) {
        (Type::Array(f), Type::Array(t)) => map(ir, f, t),
        (Type::Set(f), Type::Set(t)) => Ir::new(
            IrKind::ToSet,
            vec![map(Ir::new(IrKind::ToArray, vec![ir]), f, t)],
        ),
        (Type::NDArray(f, _), Type::NDArray(t, _)) => {
            Ir::new(IrKind::NDArrayMap(ELEMENT.into()), vec![ir, each(f, t)])
        }
        (Type::Dict(fk, fv), Type::Dict(tk, tv)) => {
            let pair = Ir::reference(ELEMENT);
            let body = Ir::make_tuple(vec![
                coerce_ir(Ir::get_tuple_element(pair.clone(), 0), fk, tk),
                coerce_ir(Ir::get_tuple_element(pair, 1), fv, tv),
            ]);
            Ir::new(
                IrKind::ToDict,
                vec![Ir::new(
                    IrKind::ArrayMap(ELEMENT.into()),
                    vec![Ir::new(IrKind::ToArray, vec![ir]), body],
                )],
            )
        }
        _ => Ir::cast(to.clone(), ir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TypeEnv;

    fn var(t: Type) -> Expression {
        Expression::constant(Ir::reference("x"), t)
    }

    #[test]
    fn numeric_widening() -> ExprResult<()> {
        let c = Coercer::new(Type::Float64);
        assert!(c.can_coerce(&Type::Int32));
        assert!(!c.can_coerce(&Type::Bool));
        assert!(!c.can_coerce(&Type::Str));
        assert!(!Coercer::new(Type::Int32).can_coerce(&Type::Int64));
        let e = c.coerce(&var(Type::Int32))?;
        assert_eq!(e.ir().to_string(), "(Cast Float64 (Ref x))");
        assert_eq!(e.dtype(), &Type::Float64);
        Ok(())
    }

    #[test]
    fn element_wise() -> ExprResult<()> {
        let to = Type::dict(Type::Str, Type::array(Type::Int64));
        let from = Type::dict(Type::Str, Type::array(Type::Int32));
        let e = Coercer::new(to.clone()).coerce(&var(from.clone()))?;
        let env = TypeEnv::new().with("x", from);
        assert_eq!(e.ir().infer_type(&env), Ok(to));
        assert!(e.ir().to_string().starts_with("(ToDict (ArrayMap __coerce_elt (ToArray (Ref x))"));
        Ok(())
    }

    #[test]
    fn nested_elements() -> ExprResult<()> {
        let to = Type::array(Type::set(Type::array(Type::Float64)));
        let from = Type::array(Type::set(Type::array(Type::Int32)));
        let e = Coercer::new(to.clone()).coerce(&var(from.clone()))?;
        let env = TypeEnv::new().with("x", from);
        assert_eq!(e.ir().infer_type(&env), Ok(to));
        assert_eq!(e.ir().to_string().matches("(ArrayMap __coerce_elt").count(), 3);
        Ok(())
    }

    #[test]
    fn identity() -> ExprResult<()> {
        let t = Type::tstruct([("a", Type::Int32)]);
        let e = Coercer::new(t.clone()).coerce(&var(t))?;
        assert_eq!(e.ir().to_string(), "(Ref x)");
        assert!(Coercer::new(Type::Str).coerce(&var(Type::Int32)).is_err());
        Ok(())
    }
}
