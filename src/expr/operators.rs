use super::{expr_as, to_expr, unify_all, unify_exprs, Expression, Uids};
use crate::{
    errors::{ExprResult, ExpressionError, UnificationError},
    ir::{BinaryOp, ComparisonOp, Ir, IrKind, IrRef, UnaryOp},
    types::{unify_types_limited, Type},
    value::Value,
};

/// The scalar type taking part in numeric promotion for `t`: the element
/// type of arrays and ndarrays, booleans counting as `int32`.
fn numeric_proxy(t: &Type) -> Type {
    let t = match t {
        Type::Array(e) | Type::NDArray(e, _) => e.as_ref(),
        t => t,
    };
    match t {
        Type::Bool => Type::Int32,
        t => t.clone(),
    }
}

/// The shape of the result of an element-wise operation between `l` and
/// `r` over scalars of type `scalar`.
fn broadcast(l: &Type, r: &Type, scalar: Type) -> Type {
    match (l, r) {
        (Type::NDArray(_, n), _) | (_, Type::NDArray(_, n)) => Type::ndarray(scalar, *n),
        (Type::Array(_), _) | (_, Type::Array(_)) => Type::array(scalar),
        _ => scalar,
    }
}

/// Like the coercer's element name, closed over its own body only.
const PROMOTE: &str = "__promote_elt";

/// `e` with its scalars promoted to `t`.
fn promote(e: &Expression, t: &Type) -> ExprResult<Expression> {
    let (elt, ndim) = match e.dtype() {
        Type::Array(elt) => (elt.as_ref(), None),
        Type::NDArray(elt, n) => (elt.as_ref(), Some(*n)),
        _ => return expr_as(e, t),
    };
    if elt == t {
        return Ok(e.clone());
    }
    let body = expr_as(&Expression::variable(PROMOTE, elt.clone(), e), t)?;
    let children = vec![e.ir().clone(), body.ir().clone()];
    let (ir, dtype) = match ndim {
        Some(n) => (
            Ir::new(IrKind::NDArrayMap(PROMOTE.into()), children),
            Type::ndarray(t.clone(), n),
        ),
        None => (
            Ir::new(IrKind::ArrayMap(PROMOTE.into()), children),
            Type::array(t.clone()),
        ),
    };
    Ok(Expression::new(
        ir,
        dtype,
        e.indices().clone(),
        e.aggregations().clone(),
    ))
}

fn function_name(symbol: &str) -> &str {
    match symbol {
        "+" => "add",
        "-" => "sub",
        "*" => "mul",
        "/" => "div",
        "//" => "floordiv",
        "%" => "mod",
        "**" => "pow",
        x => x,
    }
}

fn require(e: &Expression, method: &str, expected: &'static str, ok: bool) -> ExprResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ExpressionError::WrongReceiver {
            method: method.to_owned(),
            expected,
            found: e.dtype().clone(),
        })
    }
}

impl Expression {
    /// Build the node for `self <symbol> other`, both operands being
    /// already promoted.
    fn bin_op(&self, symbol: &str, other: &Expression, ret: Type) -> ExprResult<Expression> {
        let (indices, aggregations) = unify_all([self, other])?;
        let (l, r) = (self.ir().clone(), other.ir().clone());
        let ir = match (BinaryOp::from_symbol(symbol), ComparisonOp::from_symbol(symbol)) {
            (Some(op), _) if ret.is_numeric() => Ir::binary(op, l, r),
            (_, Some(op)) => Ir::compare(op, l, r),
            _ => Ir::apply(function_name(symbol), ret.clone(), vec![l, r]),
        };
        Ok(Expression::new(ir, ret, indices, aggregations))
    }

    fn bin_op_numeric(
        &self,
        symbol: &str,
        other: impl Into<Value>,
        ret: impl Fn(&Type) -> Type,
    ) -> ExprResult<Expression> {
        let other = to_expr(other, None)?;
        let no_unification = || UnificationError::NoNumericUnification {
            op: symbol.to_owned(),
            left: self.dtype().clone(),
            right: other.dtype().clone(),
        };
        let (l, r) = (numeric_proxy(self.dtype()), numeric_proxy(other.dtype()));
        let scalar = unify_types_limited([&l, &r])
            .filter(Type::is_numeric)
            .ok_or_else(no_unification)?;
        let me = promote(self, &scalar)?;
        let other = promote(&other, &scalar)?;
        let ret = broadcast(me.dtype(), other.dtype(), ret(&scalar));
        me.bin_op(symbol, &other, ret)
    }

    pub fn add(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("+", other, Type::clone)
    }
    pub fn sub(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("-", other, Type::clone)
    }
    pub fn mul(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("*", other, Type::clone)
    }
    /// True division. Integers divide to `float32`.
    pub fn div(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("/", other, |t| {
            if t.is_integral() {
                Type::Float32
            } else {
                t.clone()
            }
        })
    }
    pub fn floordiv(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("//", other, Type::clone)
    }
    pub fn rem(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("%", other, Type::clone)
    }
    pub fn pow(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.bin_op_numeric("**", other, |_| Type::Float64)
    }

    pub fn neg(&self) -> ExprResult<Expression> {
        require(self, "neg", "a numeric expression", self.dtype().is_numeric())?;
        Ok(Expression::new(
            Ir::unary(UnaryOp::Negate, self.ir().clone()),
            self.dtype().clone(),
            self.indices().clone(),
            self.aggregations().clone(),
        ))
    }
    pub fn not(&self) -> ExprResult<Expression> {
        require(self, "not", "a boolean expression", self.dtype().is_bool())?;
        Ok(Expression::new(
            Ir::unary(UnaryOp::Bang, self.ir().clone()),
            Type::Bool,
            self.indices().clone(),
            self.aggregations().clone(),
        ))
    }

    fn compare(&self, symbol: &str, other: impl Into<Value>) -> ExprResult<Expression> {
        let other = to_expr(other, None)?;
        let (xs, ok) = unify_exprs(&[self.clone(), other.clone()]);
        if !ok {
            return Err(UnificationError::Incomparable {
                op: symbol.to_owned(),
                left: self.dtype().clone(),
                right: other.dtype().clone(),
            }
            .into());
        }
        xs[0].bin_op(symbol, &xs[1], Type::Bool)
    }
    pub fn equals(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.compare("==", other)
    }
    pub fn not_equals(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.compare("!=", other)
    }
    pub fn lt(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.compare("<", other)
    }
    pub fn le(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.compare("<=", other)
    }
    pub fn gt(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.compare(">", other)
    }
    pub fn ge(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.compare(">=", other)
    }

    fn logical(&self, function: &str, other: impl Into<Value>) -> ExprResult<Expression> {
        let other = to_expr(other, Some(&Type::Bool))?;
        require(self, function, "a boolean expression", self.dtype().is_bool())?;
        self.method(function, Type::Bool, vec![other.into()])
    }
    pub fn and(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.logical("land", other)
    }
    pub fn or(&self, other: impl Into<Value>) -> ExprResult<Expression> {
        self.logical("lor", other)
    }

    /// Apply the function `name` to `self` and `args`.
    pub fn method(&self, name: &str, ret: Type, args: Vec<Value>) -> ExprResult<Expression> {
        let args = args
            .into_iter()
            .map(|a| to_expr(a, None))
            .collect::<ExprResult<Vec<_>>>()?;
        let (indices, aggregations) = unify_all(std::iter::once(self).chain(args.iter()))?;
        let ir = Ir::apply(
            name,
            ret.clone(),
            std::iter::once(self.ir().clone())
                .chain(args.iter().map(|a| a.ir().clone()))
                .collect(),
        );
        Ok(Expression::new(ir, ret, indices, aggregations))
    }

    /// `self[i]`: array elements, dict values, tuple elements.
    pub fn index(&self, i: impl Into<Value>) -> ExprResult<Expression> {
        let i = i.into();
        match self.dtype() {
            Type::Tuple(ts) => {
                let k = match &i {
                    Value::Int(k) => num_traits::ToPrimitive::to_usize(k),
                    _ => None,
                }
                .filter(|k| *k < ts.len())
                .ok_or_else(|| ExpressionError::WrongReceiver {
                    method: "index".into(),
                    expected: "a constant index within the tuple",
                    found: self.dtype().clone(),
                })?;
                Ok(Expression::new(
                    Ir::get_tuple_element(self.ir().clone(), k),
                    ts[k].clone(),
                    self.indices().clone(),
                    self.aggregations().clone(),
                ))
            }
            Type::Array(elt) => {
                let i = to_expr(i, None)?;
                if i.dtype() != &Type::Int32 {
                    return Err(ExpressionError::TypeMismatch {
                        expected: Type::Int32,
                        found: i.dtype().clone(),
                    });
                }
                let (indices, aggregations) = unify_all([self, &i])?;
                Ok(Expression::new(
                    Ir::new(IrKind::ArrayRef, vec![self.ir().clone(), i.ir().clone()]),
                    *elt.clone(),
                    indices,
                    aggregations,
                ))
            }
            Type::Dict(k, v) => {
                let key = expr_as(&to_expr(i, None)?, k)?;
                self.method("index", *v.clone(), vec![key.into()])
            }
            _ => Err(ExpressionError::WrongReceiver {
                method: "index".into(),
                expected: "an array, a dict or a tuple",
                found: self.dtype().clone(),
            }),
        }
    }

    /// `self[start:stop]` over arrays and strings.
    pub fn slice(&self, start: Option<Value>, stop: Option<Value>) -> ExprResult<Expression> {
        require(
            self,
            "slice",
            "an array or a string",
            matches!(self.dtype(), Type::Array(_) | Type::Str),
        )?;
        let len = || match self.dtype() {
            Type::Str => self.method("length", Type::Int32, vec![]),
            _ => Ok(Expression::new(
                Ir::new(IrKind::ArrayLen, vec![self.ir().clone()]),
                Type::Int32,
                self.indices().clone(),
                self.aggregations().clone(),
            )),
        };
        let start = to_expr(start.unwrap_or_else(|| 0.into()), Some(&Type::Int32))?;
        let stop = match stop {
            Some(s) => to_expr(s, Some(&Type::Int32))?,
            None => len()?,
        };
        self.method("slice", self.dtype().clone(), vec![start.into(), stop.into()])
    }

    pub fn get_field(&self, name: &str) -> ExprResult<Expression> {
        let fields = self.dtype().fields().ok_or_else(|| ExpressionError::WrongReceiver {
            method: "get_field".into(),
            expected: "a struct",
            found: self.dtype().clone(),
        })?;
        let t = fields
            .get(name)
            .ok_or_else(|| ExpressionError::NoSuchField(self.dtype().clone(), name.to_owned()))?;
        Ok(Expression::new(
            Ir::get_field(self.ir().clone(), name),
            t.clone(),
            self.indices().clone(),
            self.aggregations().clone(),
        ))
    }

    /// Convert to `t`: numeric conversions in any direction, and any type
    /// to a string.
    pub fn cast(&self, t: &Type) -> ExprResult<Expression> {
        if self.dtype() == t {
            Ok(self.clone())
        } else if self.dtype().is_numeric() && t.is_numeric() {
            Ok(Expression::new(
                Ir::cast(t.clone(), self.ir().clone()),
                t.clone(),
                self.indices().clone(),
                self.aggregations().clone(),
            ))
        } else if *t == Type::Str {
            self.method("str", Type::Str, vec![])
        } else {
            expr_as(self, t)
        }
    }

    pub fn is_missing(&self) -> Expression {
        Expression::new(
            Ir::new(IrKind::IsNA, vec![self.ir().clone()]),
            Type::Bool,
            self.indices().clone(),
            self.aggregations().clone(),
        )
    }

    /// The elements of an array or set, as an array, with their type.
    fn elements(&self, method: &str) -> ExprResult<(IrRef, Type)> {
        match self.dtype() {
            Type::Array(e) => Ok((self.ir().clone(), *e.clone())),
            Type::Set(e) => Ok((Ir::new(IrKind::ToArray, vec![self.ir().clone()]), *e.clone())),
            _ => Err(ExpressionError::WrongReceiver {
                method: method.to_owned(),
                expected: "an array or a set",
                found: self.dtype().clone(),
            }),
        }
    }
    /// An array of `elt` built from the elements of `self`, as a set if
    /// `self` is one.
    fn same_collection(&self, array: IrRef, elt: Type) -> (IrRef, Type) {
        match self.dtype() {
            Type::Set(_) => (Ir::new(IrKind::ToSet, vec![array]), Type::set(elt)),
            _ => (array, Type::array(elt)),
        }
    }
    fn with_body(&self, ir: IrRef, dtype: Type, parts: &[&Expression]) -> ExprResult<Expression> {
        let (indices, aggregations) = unify_all(std::iter::once(self).chain(parts.iter().copied()))?;
        Ok(Expression::new(ir, dtype, indices, aggregations))
    }

    pub fn map<F>(&self, uids: &mut Uids, f: F) -> ExprResult<Expression>
    where
        F: FnOnce(&mut Uids, Expression) -> ExprResult<Value>,
    {
        let (array, elt) = self.elements("map")?;
        let name = uids.fresh();
        let body = to_expr(f(uids, Expression::variable(&name, elt, self))?, None)?;
        let (ir, t) = self.same_collection(
            Ir::new(IrKind::ArrayMap(name), vec![array, body.ir().clone()]),
            body.dtype().clone(),
        );
        self.with_body(ir, t, &[&body])
    }

    pub fn filter<F>(&self, uids: &mut Uids, f: F) -> ExprResult<Expression>
    where
        F: FnOnce(&mut Uids, Expression) -> ExprResult<Value>,
    {
        let (array, elt) = self.elements("filter")?;
        let name = uids.fresh();
        let cond = to_expr(f(uids, Expression::variable(&name, elt.clone(), self))?, Some(&Type::Bool))?;
        let (ir, t) = self.same_collection(
            Ir::new(IrKind::ArrayFilter(name), vec![array, cond.ir().clone()]),
            elt,
        );
        self.with_body(ir, t, &[&cond])
    }

    pub fn flat_map<F>(&self, uids: &mut Uids, f: F) -> ExprResult<Expression>
    where
        F: FnOnce(&mut Uids, Expression) -> ExprResult<Value>,
    {
        let (array, elt) = self.elements("flat_map")?;
        let name = uids.fresh();
        let body = to_expr(f(uids, Expression::variable(&name, elt, self))?, None)?;
        let (inner, inner_elt) = body.elements("flat_map")?;
        let (ir, t) = self.same_collection(
            Ir::new(IrKind::ArrayFlatMap(name), vec![array, inner]),
            inner_elt,
        );
        self.with_body(ir, t, &[&body])
    }

    pub fn fold<F>(&self, uids: &mut Uids, zero: impl Into<Value>, f: F) -> ExprResult<Expression>
    where
        F: FnOnce(&mut Uids, Expression, Expression) -> ExprResult<Value>,
    {
        let (array, elt) = self.elements("fold")?;
        let zero = to_expr(zero, None)?;
        let (accum, value) = (uids.fresh(), uids.fresh());
        let body = f(
            uids,
            Expression::variable(&accum, zero.dtype().clone(), self),
            Expression::variable(&value, elt, self),
        )?;
        let body = expr_as(&to_expr(body, None)?, zero.dtype())?;
        self.with_body(
            Ir::new(
                IrKind::ArrayFold { accum, value },
                vec![array, zero.ir().clone(), body.ir().clone()],
            ),
            zero.dtype().clone(),
            &[&zero, &body],
        )
    }

    pub fn any<F>(&self, uids: &mut Uids, f: F) -> ExprResult<Expression>
    where
        F: FnOnce(&mut Uids, Expression) -> ExprResult<Value>,
    {
        self.fold(uids, false, |uids, acc, x| Ok(acc.or(f(uids, x)?)?.into()))
    }

    pub fn all<F>(&self, uids: &mut Uids, f: F) -> ExprResult<Expression>
    where
        F: FnOnce(&mut Uids, Expression) -> ExprResult<Value>,
    {
        self.fold(uids, true, |uids, acc, x| Ok(acc.and(f(uids, x)?)?.into()))
    }

    /// Sort the elements by the key computed by `key`.
    pub fn sort_by<F>(&self, uids: &mut Uids, key: F, ascending: bool) -> ExprResult<Expression>
    where
        F: Fn(&mut Uids, Expression) -> ExprResult<Value>,
    {
        let (array, elt) = self.elements("sort_by")?;
        let (left, right) = (uids.fresh(), uids.fresh());
        let l = to_expr(key(uids, Expression::variable(&left, elt.clone(), self))?, None)?;
        let r = to_expr(key(uids, Expression::variable(&right, elt.clone(), self))?, None)?;
        let less = if ascending { l.lt(&r)? } else { l.gt(&r)? };
        self.with_body(
            Ir::new(IrKind::ArraySort { left, right }, vec![array, less.ir().clone()]),
            Type::array(elt),
            &[&less],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expr::literal, ir::TypeEnv};

    fn int(x: i32) -> Expression {
        literal(&x.into(), &Type::Int32).unwrap()
    }

    #[test]
    fn division() -> ExprResult<()> {
        let q = int(6).div(int(4))?;
        assert_eq!(q.dtype(), &Type::Float32);
        assert_eq!(q.ir().to_string(), "(ApplyBinaryPrimOp `/` (I32 6) (I32 4))");
        assert_eq!(q.ir().infer_type(&TypeEnv::new()), Ok(Type::Float32));

        let q = literal(&6.0.into(), &Type::Float64)?.div(int(4))?;
        assert_eq!(q.dtype(), &Type::Float64);
        assert_eq!(
            q.ir().to_string(),
            "(ApplyBinaryPrimOp `/` (F64 6.0) (Cast Float64 (I32 4)))"
        );
        Ok(())
    }

    #[test]
    fn promotion() -> ExprResult<()> {
        let x = int(1).add(i64::MAX)?;
        assert_eq!(x.dtype(), &Type::Int64);
        let b = literal(&true.into(), &Type::Bool)?.add(1)?;
        assert_eq!(b.dtype(), &Type::Int32);
        assert_eq!(
            b.ir().to_string(),
            "(ApplyBinaryPrimOp `+` (If (True) (I32 1) (I32 0)) (I32 1))"
        );
        assert!(matches!(
            int(1).add("a"),
            Err(ExpressionError::Unification(UnificationError::NoNumericUnification { .. }))
        ));
        assert_eq!(int(2).pow(3)?.dtype(), &Type::Float64);
        Ok(())
    }

    #[test]
    fn broadcasting() -> ExprResult<()> {
        let xs = super::super::to_expr(Value::list([1.into(), 2.into()]), None)?;
        let ys = xs.mul(2.5)?;
        assert_eq!(ys.dtype(), &Type::array(Type::Float64));
        assert!(ys.ir().to_string().starts_with("(Apply mul Array[Float64] (ArrayMap __promote_elt"));
        Ok(())
    }

    #[test]
    fn comparisons() -> ExprResult<()> {
        let c = int(1).lt(2.5)?;
        assert_eq!(c.dtype(), &Type::Bool);
        assert_eq!(
            c.ir().to_string(),
            "(ApplyComparisonOp LT (Cast Float64 (I32 1)) (F64 2.5))"
        );
        let e = int(1).equals("a").unwrap_err();
        assert_eq!(
            e.to_string(),
            "Invalid '==' comparison, cannot compare expressions of type 'int32' and 'str'"
        );
        Ok(())
    }

    #[test]
    fn lambdas() -> ExprResult<()> {
        let mut uids = Uids::new();
        let xs = super::super::to_expr(Value::list([1.into(), 2.into(), 3.into()]), None)?;
        let doubled = xs.map(&mut uids, |_, x| Ok(x.mul(2)?.into()))?;
        assert_eq!(
            doubled.ir().to_string(),
            "(ArrayMap __uid_1 (Literal Array[Int32] \"[1,2,3]\") \
             (ApplyBinaryPrimOp `*` (Ref __uid_1) (I32 2)))"
        );
        let big = xs.filter(&mut uids, |_, x| Ok(x.gt(1)?.into()))?;
        assert_eq!(big.dtype(), &Type::array(Type::Int32));
        let any = xs.any(&mut uids, |_, x| Ok(x.equals(3)?.into()))?;
        assert_eq!(any.dtype(), &Type::Bool);
        assert_eq!(any.ir().infer_type(&TypeEnv::new()), Ok(Type::Bool));
        let total = xs.fold(&mut uids, 0i64, |_, acc, x| Ok(acc.add(x)?.into()))?;
        assert_eq!(total.ir().infer_type(&TypeEnv::new()), Ok(Type::Int64));
        let sorted = xs.sort_by(&mut uids, |_, x| Ok(x.neg()?.into()), true)?;
        assert_eq!(sorted.ir().infer_type(&TypeEnv::new()), Ok(Type::array(Type::Int32)));
        assert!(int(1).map(&mut uids, |_, x| Ok(x.into())).is_err());
        Ok(())
    }

    #[test]
    fn accessors() -> ExprResult<()> {
        let s = super::super::to_expr(
            Value::record([("a", Value::from(1)), ("b", Value::tuple(["x".into(), 2.5.into()]))]),
            None,
        )?;
        assert_eq!(s.get_field("a")?.dtype(), &Type::Int32);
        assert_eq!(s.get_field("b")?.index(1)?.dtype(), &Type::Float64);
        assert!(matches!(s.get_field("c"), Err(ExpressionError::NoSuchField(..))));
        let d = super::super::to_expr(Value::dict([("k".into(), 1.into())]), None)?;
        assert_eq!(d.index("k")?.dtype(), &Type::Int32);
        assert_eq!(int(3).cast(&Type::Str)?.dtype(), &Type::Str);
        assert!(int(3).not().is_err());
        Ok(())
    }
}
