use std::collections::HashMap;

use anyhow::*;

use super::{AggCall, BinaryOp, ComparisonOp, Ir, IrKind, IrRef, SortOrder, UnaryOp};
use crate::{
    parser::{parse_sexps, Sexp},
    types::Type,
    utils::unescape_id,
    value::Value,
};

lazy_static::lazy_static! {
    /// Node kinds that carry no payload.
    static ref PLAIN: HashMap<&'static str, IrKind> = maplit::hashmap!{
        "True" => IrKind::True,
        "False" => IrKind::False,
        "Void" => IrKind::Void,
        "IsNA" => IrKind::IsNA,
        "If" => IrKind::If,
        "Coalesce" => IrKind::Coalesce,
        "ArrayRef" => IrKind::ArrayRef,
        "ArrayLen" => IrKind::ArrayLen,
        "ArrayRange" => IrKind::ArrayRange,
        "ToSet" => IrKind::ToSet,
        "ToDict" => IrKind::ToDict,
        "ToArray" => IrKind::ToArray,
        "GroupByKey" => IrKind::GroupByKey,
        "MakeNDArray" => IrKind::MakeNDArray,
        "NDArrayShape" => IrKind::NDArrayShape,
        "NDArrayReshape" => IrKind::NDArrayReshape,
        "NDArrayRef" => IrKind::NDArrayRef,
        "NDArrayMatMul" => IrKind::NDArrayMatMul,
        "Begin" => IrKind::Begin,
        "MakeTuple" => IrKind::MakeTuple,
        "TableCount" => IrKind::TableCount,
        "TableGetGlobals" => IrKind::TableGetGlobals,
        "TableCollect" => IrKind::TableCollect,
        "TableAggregate" => IrKind::TableAggregate,
        "MatrixAggregate" => IrKind::MatrixAggregate,
        "TableFilter" => IrKind::TableFilter,
        "TableMapRows" => IrKind::TableMapRows,
        "TableMapGlobals" => IrKind::TableMapGlobals,
        "TableDistinct" => IrKind::TableDistinct,
        "TableUnion" => IrKind::TableUnion,
        "TableAggregateByKey" => IrKind::TableAggregateByKey,
        "MatrixRowsTable" => IrKind::MatrixRowsTable,
        "MatrixColsTable" => IrKind::MatrixColsTable,
        "MatrixEntriesTable" => IrKind::MatrixEntriesTable,
        "MatrixFilterRows" => IrKind::MatrixFilterRows,
        "MatrixFilterCols" => IrKind::MatrixFilterCols,
        "MatrixFilterEntries" => IrKind::MatrixFilterEntries,
        "MatrixMapRows" => IrKind::MatrixMapRows,
        "MatrixMapEntries" => IrKind::MatrixMapEntries,
        "MatrixMapGlobals" => IrKind::MatrixMapGlobals,
        "MatrixAggregateRowsByKey" => IrKind::MatrixAggregateRowsByKey,
        "MatrixAggregateColsByKey" => IrKind::MatrixAggregateColsByKey,
        "MatrixUnionRows" => IrKind::MatrixUnionRows,
        "BlockMatrixMap" => IrKind::BlockMatrixMap,
        "BlockMatrixMap2" => IrKind::BlockMatrixMap2,
        "BlockMatrixDot" => IrKind::BlockMatrixDot,
    };
}

/// Walks the items of a node's S-expression, head excluded.
struct Items<'a> {
    head: &'a str,
    items: &'a [Sexp],
}
impl<'a> Items<'a> {
    fn next(&mut self) -> Result<&'a Sexp> {
        let (first, rest) = self
            .items
            .split_first()
            .with_context(|| anyhow!("{}: missing argument", self.head))?;
        self.items = rest;
        Ok(first)
    }
    fn ident(&mut self) -> Result<String> {
        self.next()?.ident()
    }
    fn flag(&mut self) -> Result<bool> {
        self.next()?.boolean()
    }
    fn string(&mut self) -> Result<String> {
        Ok(self.next()?.string()?.to_owned())
    }
    fn typ(&mut self) -> Result<Type> {
        Type::parse_ir(self.next()?.atom()?)
    }
    fn num<T: std::str::FromStr>(&mut self) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.next()?.parse_atom()
    }
    fn idents(&mut self) -> Result<Vec<String>> {
        self.next()?.list()?.iter().map(Sexp::ident).collect()
    }
    fn nums<T: std::str::FromStr>(&mut self) -> Result<Vec<T>>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.next()?.list()?.iter().map(|x| x.parse_atom()).collect()
    }
    /// An optional payload, written `None` when absent.
    fn maybe<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<Option<T>> {
        if self.items.first().map(Sexp::is_none).unwrap_or(false) {
            self.items = &self.items[1..];
            Ok(None)
        } else {
            f(self).map(Some)
        }
    }
    fn children(&mut self) -> Result<Vec<IrRef>> {
        let r = self.items.iter().map(parse_ir).collect();
        self.items = &[];
        r
    }
    fn child_list(&mut self) -> Result<Vec<IrRef>> {
        self.next()?.list()?.iter().map(parse_ir).collect()
    }
    /// `(name child)` pairs up to the end of the node.
    fn pairs(&mut self) -> Result<(Vec<String>, Vec<IrRef>)> {
        let mut names = Vec::new();
        let mut children = Vec::new();
        while !self.items.is_empty() {
            match self.next()?.list()? {
                [name, child] => {
                    names.push(name.ident()?);
                    children.push(parse_ir(child)?);
                }
                x => bail!("{}: expected a (name value) pair, found {} items", self.head, x.len()),
            }
        }
        Ok((names, children))
    }
}

fn op<T>(head: &str, symbol: &str, f: fn(&str) -> Option<T>) -> Result<T> {
    f(symbol).with_context(|| anyhow!("{}: unknown operator `{}`", head, symbol))
}

/// Build a node from its textual form.
pub fn parse_ir(sexp: &Sexp) -> Result<IrRef> {
    use IrKind::*;

    let list = sexp.list()?;
    let (head, items) = list
        .split_first()
        .with_context(|| anyhow!("empty node"))?;
    let head = head.atom()?;
    let mut xs = Items { head, items };

    let kind = if let Some(kind) = PLAIN.get(head) {
        kind.clone()
    } else {
        match head {
            "I32" => I32(xs.num()?),
            "I64" => I64(xs.num()?),
            "F32" => F32(xs.num::<f32>()?.to_bits()),
            "F64" => F64(xs.num::<f64>()?.to_bits()),
            "Str" => Str(xs.string()?),
            "Cast" => Cast(xs.typ()?),
            "NA" => NA(xs.typ()?),
            "Die" => Die(xs.typ()?),
            "Let" => Let(xs.ident()?),
            "Ref" => Ref(xs.ident()?),
            "GetField" => GetField(xs.ident()?),
            "NDArrayMap" => NDArrayMap(xs.ident()?),
            "ArrayMap" => ArrayMap(xs.ident()?),
            "ArrayFilter" => ArrayFilter(xs.ident()?),
            "ArrayFlatMap" => ArrayFlatMap(xs.ident()?),
            "ArrayFor" => ArrayFor(xs.ident()?),
            "Uniroot" => Uniroot(xs.ident()?),
            "AggLet" => AggLet {
                name: xs.ident()?,
                is_scan: xs.flag()?,
            },
            "AggExplode" => AggExplode {
                name: xs.ident()?,
                is_scan: xs.flag()?,
            },
            "ApplyBinaryPrimOp" => ApplyBinaryPrimOp(op(head, &xs.ident()?, BinaryOp::from_symbol)?),
            "ApplyUnaryPrimOp" => ApplyUnaryPrimOp(op(head, &xs.ident()?, UnaryOp::from_symbol)?),
            "ApplyComparisonOp" => {
                ApplyComparisonOp(op(head, &xs.ident()?, ComparisonOp::from_symbol)?)
            }
            "MakeArray" => MakeArray(xs.maybe(Items::typ)?),
            "ArraySort" => ArraySort {
                left: xs.ident()?,
                right: xs.ident()?,
            },
            "ArrayLeftJoinDistinct" => ArrayLeftJoinDistinct {
                left: xs.ident()?,
                right: xs.ident()?,
            },
            "ArrayFold" => ArrayFold {
                accum: xs.ident()?,
                value: xs.ident()?,
            },
            "ArrayScan" => ArrayScan {
                accum: xs.ident()?,
                value: xs.ident()?,
            },
            "LowerBoundOnOrderedCollection" => LowerBoundOnOrderedCollection {
                on_key: xs.flag()?,
            },
            "AggFilter" => AggFilter {
                is_scan: xs.flag()?,
            },
            "AggGroupBy" => AggGroupBy {
                is_scan: xs.flag()?,
            },
            "AggArrayPerElement" => AggArrayPerElement {
                element: xs.ident()?,
                index: xs.ident()?,
                is_scan: xs.flag()?,
            },
            "ApplyAggOp" | "ApplyScanOp" => {
                let name = xs.ident()?;
                let ctor = xs.child_list()?;
                let init = xs.maybe(Items::child_list)?;
                let seq = xs.child_list()?;
                if !xs.items.is_empty() {
                    bail!("{}: trailing arguments", head)
                }
                return Ok(if head == "ApplyAggOp" {
                    Ir::apply_agg_op(&name, ctor, init, seq)
                } else {
                    Ir::apply_scan_op(&name, ctor, init, seq)
                });
            }
            "MakeStruct" => {
                let (names, children) = xs.pairs()?;
                return Ir::try_new(MakeStruct(names), children);
            }
            "SelectFields" => SelectFields(xs.idents()?),
            "InsertFields" => {
                let base = parse_ir(xs.next()?)?;
                let field_order = xs.maybe(Items::idents)?;
                let (names, mut children) = xs.pairs()?;
                children.insert(0, base);
                return Ir::try_new(InsertFields { names, field_order }, children);
            }
            "GetTupleElement" => GetTupleElement(xs.num()?),
            "In" => In {
                typ: xs.typ()?,
                index: xs.num()?,
            },
            "Apply" => Apply {
                function: xs.ident()?,
                ret: xs.typ()?,
            },
            "Literal" => {
                let typ = xs.typ()?;
                let json: serde_json::Value = serde_json::from_str(&xs.string()?)?;
                let value = Value::from_json(&json, &typ)?;
                Literal { typ, value }
            }
            "TableWrite" => TableWrite(xs.string()?),
            "MatrixWrite" => MatrixWrite(xs.string()?),
            "BlockMatrixWrite" => BlockMatrixWrite(xs.string()?),
            "BlockMatrixRead" => BlockMatrixRead(xs.string()?),
            "TableRange" => TableRange {
                n: xs.num()?,
                n_partitions: xs.maybe(Items::num)?,
            },
            "TableRead" => TableRead {
                drop_rows: xs.flag()?,
                reader: xs.string()?,
            },
            "TableKeyBy" => TableKeyBy {
                keys: xs.idents()?,
                is_sorted: xs.flag()?,
            },
            "MatrixKeyRowsBy" => MatrixKeyRowsBy {
                keys: xs.idents()?,
                is_sorted: xs.flag()?,
            },
            "TableHead" => TableHead(xs.num()?),
            "MatrixRowsHead" => MatrixRowsHead(xs.num()?),
            "MatrixColsHead" => MatrixColsHead(xs.num()?),
            "TableExplode" => TableExplode(xs.idents()?),
            "TableOrderBy" => TableOrderBy(
                xs.next()?
                    .list()?
                    .iter()
                    .map(|f| {
                        let f = f.atom()?;
                        let order = match f.chars().next() {
                            Some('A') => SortOrder::Ascending,
                            Some('D') => SortOrder::Descending,
                            _ => bail!("invalid sort field `{}`", f),
                        };
                        Ok((unescape_id(&f[1..])?, order))
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            "TableJoin" => TableJoin {
                join_type: xs.ident()?,
                join_key: xs.num()?,
            },
            "TableParallelize" => TableParallelize(xs.maybe(Items::num)?),
            "TableRename" => {
                let mut renames = || -> Result<Vec<(String, String)>> {
                    let old = xs.idents()?;
                    let new = xs.idents()?;
                    if old.len() != new.len() {
                        bail!("TableRename: mismatched rename lists")
                    }
                    Ok(old.into_iter().zip(new).collect())
                };
                let rows = renames()?;
                let globals = renames()?;
                TableRename { rows, globals }
            }
            "MatrixRead" => MatrixRead {
                drop_cols: xs.flag()?,
                drop_rows: xs.flag()?,
                reader: xs.string()?,
            },
            "MatrixMapCols" => MatrixMapCols(xs.maybe(Items::idents)?),
            "MatrixChooseCols" => MatrixChooseCols(xs.nums()?),
            "MatrixAnnotateRowsTable" => MatrixAnnotateRowsTable(xs.string()?),
            "MatrixAnnotateColsTable" => MatrixAnnotateColsTable(xs.string()?),
            "BlockMatrixBroadcast" => BlockMatrixBroadcast {
                in_index_expr: xs.nums()?,
                shape: xs.nums()?,
                block_size: xs.num()?,
            },
            "ValueToBlockMatrix" => ValueToBlockMatrix {
                shape: xs.nums()?,
                block_size: xs.num()?,
            },
            _ => bail!("unknown node `{}`", head),
        }
    };
    let children = xs.children()?;
    Ir::try_new(kind, children)
}

/// Parse a single IR node from its textual form.
pub fn parse_value_ir(source: &str) -> Result<IrRef> {
    let sexps = parse_sexps(source)?;
    match sexps.as_slice() {
        [x] => parse_ir(x).with_context(|| anyhow!("while parsing `{}`", x)),
        _ => bail!("expected exactly one node, found {}", sexps.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) -> Result<()> {
        assert_eq!(parse_value_ir(s)?.to_string(), s);
        Ok(())
    }

    #[test]
    fn scalars_and_ops() -> Result<()> {
        roundtrip("(ApplyBinaryPrimOp `+` (I32 5) (F64 2.5))")?;
        roundtrip("(ApplyComparisonOp LT (I64 -3) (Cast Int64 (I32 2)))")?;
        roundtrip("(ApplyUnaryPrimOp `!` (True))")?;
        roundtrip("(Str \"a \\\"quoted\\\" word\")")?;
        roundtrip("(F32 NaN)")?;
        Ok(())
    }

    #[test]
    fn bindings_and_aggregations() -> Result<()> {
        roundtrip("(Let __cse_1 (I32 5) (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1)))")?;
        roundtrip(
            "(TableAggregate (TableRange 5 1) (AggLet __cse_1 False (GetField idx (Ref row)) \
             (ApplyAggOp Take ((I32 5)) None ((Ref __cse_1)))))",
        )?;
        roundtrip("(ApplyScanOp Count () () ())")?;
        Ok(())
    }

    #[test]
    fn structs_and_literals() -> Result<()> {
        roundtrip("(MakeStruct (a (I32 1)) (`b c` (Str \"x\")))")?;
        roundtrip("(InsertFields (Ref s) None (x (True)))")?;
        roundtrip("(Literal Array[Int32] \"[1,2,3]\")")?;
        roundtrip("(MakeArray Array[Int64] (I64 1))")?;
        roundtrip("(MakeArray None)")?;
        roundtrip("(TableOrderBy (Aidx Dvalue) (TableRange 10 None))")?;
        Ok(())
    }

    #[test]
    fn rejects_malformed() {
        assert!(parse_value_ir("(Frobnicate)").is_err());
        assert!(parse_value_ir("(I32 five)").is_err());
        assert!(parse_value_ir("(If (True) (I32 1))").is_err());
        assert!(parse_value_ir("(I32 1) (I32 2)").is_err());
        assert!(parse_value_ir("(ApplyBinaryPrimOp `%` (I32 1) (I32 2))").is_err());
    }
}
