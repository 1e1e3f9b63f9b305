use anyhow::*;
use hail_ir::{
    cse::{self, CseRenderer},
    expr::{Aggregators, SourceRef},
    ir::{BinaryOp, Ir, IrRef},
    parse_value_ir,
};
use rayon::prelude::*;

/// An input tree and its expected rendering.
struct Scenario {
    name: &'static str,
    tree: fn() -> Result<IrRef>,
    expected: &'static str,
}

fn add(l: IrRef, r: IrRef) -> IrRef {
    Ir::binary(BinaryOp::Add, l, r)
}

fn shared_leaf() -> Result<IrRef> {
    Ok(add(Ir::i32(5), Ir::i32(5)))
}

fn nested() -> Result<IrRef> {
    let sum = add(Ir::i32(5), Ir::i32(5));
    Ok(Ir::binary(
        BinaryOp::FloatingPointDivide,
        Ir::binary(BinaryOp::Mul, sum.clone(), Ir::i32(4)),
        sum,
    ))
}

fn conditional() -> Result<IrRef> {
    Ok(Ir::cond(Ir::bool(true), add(Ir::i32(1), Ir::i32(1)), Ir::i32(5)))
}

fn aggregation() -> Result<IrRef> {
    let t = SourceRef::range_table("t", 5, Some(1));
    let idx = t.row("idx")?;
    let s = Aggregators::AGG.sum(&idx.add(&idx)?)?;
    Ok(t.aggregate(&s.add(&s)?)?.ir().clone())
}

/// One subtree used as constructor, initializer and sequence argument of
/// the same aggregator, and once more outside of it.
fn aggregator_arguments() -> Result<IrRef> {
    let sum = add(Ir::i32(5), Ir::i32(5));
    let agg = Ir::apply_agg_op(
        "CallStats",
        vec![sum.clone()],
        Some(vec![sum.clone()]),
        vec![sum.clone()],
    );
    Ok(add(sum, agg))
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "shared leaf",
        tree: shared_leaf,
        expected: "(Let __cse_1 (I32 5) (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1)))",
    },
    Scenario {
        name: "nested sharing",
        tree: nested,
        expected: "(Let __cse_1 (I32 5) \
                   (Let __cse_2 (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1)) \
                   (ApplyBinaryPrimOp `/` (ApplyBinaryPrimOp `*` (Ref __cse_2) (I32 4)) (Ref __cse_2))))",
    },
    Scenario {
        name: "conditional branch",
        tree: conditional,
        expected: "(If (True) \
                   (Let __cse_1 (I32 1) (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1))) \
                   (I32 5))",
    },
    Scenario {
        name: "aggregation boundary",
        tree: aggregation,
        expected: "(TableAggregate (TableRange 5 1) \
                   (AggLet __cse_1 False (GetField idx (Ref row)) \
                   (Let __cse_2 (ApplyAggOp Sum () None \
                   ((Cast Int64 (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1))))) \
                   (ApplyBinaryPrimOp `+` (Ref __cse_2) (Ref __cse_2)))))",
    },
    Scenario {
        name: "aggregator arguments",
        tree: aggregator_arguments,
        expected: "(Let __cse_1 (I32 5) (AggLet __cse_2 False (I32 5) \
                   (ApplyBinaryPrimOp `+` (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1)) \
                   (ApplyAggOp CallStats \
                   ((Let __cse_3 (I32 5) (ApplyBinaryPrimOp `+` (Ref __cse_3) (Ref __cse_3)))) \
                   ((Let __cse_4 (I32 5) (ApplyBinaryPrimOp `+` (Ref __cse_4) (Ref __cse_4)))) \
                   ((ApplyBinaryPrimOp `+` (Ref __cse_2) (Ref __cse_2)))))))",
    },
];

#[test]
fn scenarios() -> Result<()> {
    for s in SCENARIOS {
        let tree = (s.tree)()?;
        assert_eq!(cse::render(&tree), s.expected, "{}", s.name);
    }
    Ok(())
}

#[test]
fn rendering_is_idempotent() -> Result<()> {
    for s in SCENARIOS {
        let once = cse::render(&(s.tree)()?);
        let reparsed = parse_value_ir(&once).with_context(|| anyhow!("parsing {}", s.name))?;
        assert_eq!(cse::render(&reparsed), once, "{}", s.name);
    }
    Ok(())
}

#[test]
fn plain_rendering_shares_nothing() -> Result<()> {
    assert_eq!(
        nested()?.to_string(),
        "(ApplyBinaryPrimOp `/` \
         (ApplyBinaryPrimOp `*` (ApplyBinaryPrimOp `+` (I32 5) (I32 5)) (I32 4)) \
         (ApplyBinaryPrimOp `+` (I32 5) (I32 5)))"
    );
    Ok(())
}

#[test]
fn renders_are_independent() -> Result<()> {
    let renderer = CseRenderer::new();
    let trees = SCENARIOS
        .iter()
        .map(|s| (s.tree)())
        .collect::<Result<Vec<_>>>()?;
    let rendered = trees
        .par_iter()
        .map(|t| renderer.render(t))
        .collect::<Vec<_>>();
    for (r, s) in rendered.iter().zip(SCENARIOS) {
        assert_eq!(r, s.expected);
    }
    Ok(())
}
