use crate::{
    errors::TypeCheckError,
    expr::{lift, to_expr, Aggregators, Expression, SourceRef, Uids},
    ir::TypeEnv,
    impute::impute_type,
    types::Type,
    value::{Interval, Value},
};
use anyhow::*;
use std::result::Result::Ok;

fn row_env() -> TypeEnv {
    TypeEnv::new()
        .with("row", Type::tstruct([("idx", Type::Int32)]))
        .with_aggregation([("row", Type::tstruct([("idx", Type::Int32)]))])
}

/// Check that the type of `e` is the one its IR computes to.
fn check(e: &Expression) -> Result<()> {
    let t = e.ir().infer_type(&row_env())?;
    if &t != e.dtype() {
        bail!("{:?} computes to {}", e, t)
    }
    Ok(())
}

fn must_lift(v: Value) -> Expression {
    let r = to_expr(v, None);
    if let Err(err) = &r {
        eprintln!("{}", err);
    }
    let e = r.unwrap();
    if let Err(err) = check(&e) {
        panic!("{}", err);
    }
    e
}

fn must_fail(v: Value, msg: &str) {
    let r = to_expr(v, None);
    assert_eq!(r.map_err(|e| e.to_string()).unwrap_err(), msg);
}

#[test]
fn literals_stay_literals() {
    let e = must_lift(Value::list([1.into(), 2.into()]));
    assert_eq!(e.ir().to_string(), r#"(Literal Array[Int32] "[1,2]")"#);
    assert!(e.indices().is_constant());

    let e = must_lift(Value::list([true.into(), 2.into()]));
    assert_eq!(e.ir().to_string(), r#"(Literal Array[Int32] "[1,2]")"#);

    assert_eq!(must_lift(5.into()).ir().to_string(), "(I32 5)");
    assert_eq!(must_lift(i64::MAX.into()).dtype(), &Type::Int64);
}

#[test]
fn literal_values_round_trip() -> Result<()> {
    let v = Value::record([
        ("a", Value::list([1.into(), 2.into()])),
        ("b", Value::tuple(["x".into(), Value::set([2.5.into()])])),
        ("c", Value::dict([("k".into(), Value::list([true.into()]))])),
    ]);
    let t = impute_type(&v)?;
    assert_eq!(lift(&v, &t)?.left(), Some(v));
    Ok(())
}

#[test]
fn arrays_with_expressions() -> Result<()> {
    let t = SourceRef::range_table("t", 10, None);
    let idx = t.row("idx")?;
    let e = must_lift(Value::list([idx.into(), 2.5.into()]));
    assert_eq!(e.dtype(), &Type::array(Type::Float64));
    assert_eq!(
        e.ir().to_string(),
        "(MakeArray Array[Float64] (Cast Float64 (GetField idx (Ref row))) (F64 2.5))"
    );
    assert_eq!(e.indices().to_string(), "t (row)");
    Ok(())
}

#[test]
fn containers_with_expressions() -> Result<()> {
    let t = SourceRef::range_table("t", 10, None);
    let idx = t.row("idx")?;

    let s = must_lift(Value::set([idx.clone().into(), 1.into()]));
    assert_eq!(s.dtype(), &Type::set(Type::Int32));
    assert!(s.ir().to_string().starts_with("(ToSet (MakeArray"));

    let d = must_lift(Value::dict([("a".into(), idx.clone().into())]));
    assert_eq!(d.dtype(), &Type::dict(Type::Str, Type::Int32));

    let r = must_lift(Value::record([("a", idx.clone().into()), ("b", "x".into())]));
    assert_eq!(
        r.ir().to_string(),
        r#"(MakeStruct (a (GetField idx (Ref row))) (b (Str "x")))"#
    );

    let tup = must_lift(Value::tuple([idx.clone().into(), Value::list([1.into()])]));
    assert_eq!(
        tup.ir().to_string(),
        r#"(MakeTuple (GetField idx (Ref row)) (Literal Array[Int32] "[1]"))"#
    );

    let i = must_lift(Value::Interval(Box::new(Interval::new(
        1.into(),
        idx.into(),
        true,
        false,
    )?)));
    assert_eq!(i.dtype(), &Type::interval(Type::Int32));
    Ok(())
}

#[test]
fn nested_containers_with_expressions() -> Result<()> {
    let t = SourceRef::range_table("t", 10, None);
    let idx = t.row("idx")?;
    let inner = Value::dict([("x".into(), idx.clone().into())]);
    let literal = Value::dict([("y".into(), 3.into())]);
    let d = must_lift(Value::dict([("a".into(), inner), ("b".into(), literal)]));
    assert_eq!(d.dtype(), &Type::dict(Type::Str, Type::dict(Type::Str, Type::Int32)));
    assert_eq!(d.ir().to_string().matches("(Let __zip_keys").count(), 2);

    let a = must_lift(Value::list([Value::list([idx.into()]), Value::list([2.5.into()])]));
    assert_eq!(a.dtype(), &Type::array(Type::array(Type::Float64)));
    Ok(())
}

#[test]
fn explicit_types() -> Result<()> {
    let e = to_expr(1, Some(&Type::Float64))?;
    assert_eq!(e.ir().to_string(), "(F64 1.0)");
    let e = to_expr(Value::Missing, Some(&Type::Str))?;
    assert_eq!(e.ir().to_string(), "(NA String)");
    let x = to_expr(1, None)?;
    assert_eq!(
        to_expr(&x, Some(&Type::Int64)).unwrap_err().to_string(),
        "expected expression of type 'int64', found expression of type 'int32'"
    );
    assert!(to_expr("a", Some(&Type::Int32)).is_err());
    Ok(())
}

#[test]
fn imputation_failures() {
    must_fail(Value::Missing, "cannot impute the type of 'None'");
    must_fail(
        Value::List(vec![]),
        "cannot impute type of empty array; use 'empty_array' to build an empty array",
    );
}

#[test]
fn different_sources() -> Result<()> {
    let t1 = SourceRef::range_table("t1", 10, None);
    let t2 = SourceRef::range_table("t2", 10, None);
    let e = t1.row("idx")?.add(t2.row("idx")?).unwrap_err();
    assert_eq!(
        e.to_string(),
        "Cannot combine expressions from different source objects.\n    \
         Found fields from 2 objects:\n        t1: 'idx'\n        t2: 'idx'"
    );
    Ok(())
}

#[test]
fn division_is_floating() -> Result<()> {
    let t = SourceRef::range_table("t", 10, None);
    let idx = t.row("idx")?;
    for (e, expected) in [
        (idx.div(2)?, Type::Float32),
        (idx.div(2i64 << 40)?, Type::Float32),
        (idx.div(2.0)?, Type::Float64),
        (idx.floordiv(2)?, Type::Int32),
        (idx.rem(2)?, Type::Int32),
    ] {
        assert_eq!(e.dtype(), &expected);
        check(&e)?;
    }
    Ok(())
}

#[test]
fn expressions_type_check() -> Result<()> {
    let t = SourceRef::range_table("t", 10, None);
    let idx = t.row("idx")?;
    let mut uids = Uids::new();
    let xs = to_expr(Value::list([idx.clone().into(), 3.into()]), None)?;
    let built = [
        idx.add(1)?.mul(2.5)?,
        idx.lt(3)?.and(idx.gt(0)?)?,
        idx.neg()?.cast(&Type::Float64)?,
        idx.is_missing(),
        xs.map(&mut uids, |_, x| Ok(x.div(2)?.into()))?,
        xs.filter(&mut uids, |_, x| Ok(x.not_equals(1)?.into()))?,
        xs.index(0)?,
        xs.all(&mut uids, |_, x| Ok(x.ge(0)?.into()))?,
        xs.flat_map(&mut uids, |_, x| Ok(Value::list([x.into(), 0.into()])))?,
        Aggregators::AGG.collect(&idx)?,
        Aggregators::AGG.stats(&idx)?,
    ];
    for e in built.iter() {
        check(e)?;
    }
    Ok(())
}

#[test]
fn aggregate_tables() -> Result<()> {
    let t = SourceRef::range_table("t", 10, None);
    let idx = t.row("idx")?;
    let mean = Aggregators::AGG
        .sum(&idx)?
        .div(Aggregators::AGG.count()?)?;
    assert_eq!(mean.dtype(), &Type::Float32);
    assert_eq!(mean.aggregations().len(), 2);
    let total = t.aggregate(&mean)?;
    assert!(total.indices().is_constant());
    assert!(matches!(
        total.ir().infer_type(&TypeEnv::new()),
        Err(TypeCheckError::Relational("TableAggregate"))
    ));
    assert!(t.aggregate(&idx).is_err());
    Ok(())
}
