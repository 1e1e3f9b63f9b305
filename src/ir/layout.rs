use super::{Ir, IrKind};
use crate::{
    types::Type,
    utils::{escape_id, escape_str},
};

/// One item of the S-expression a node renders to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Text(String),
    Child(usize),
    List(Vec<Piece>),
}

fn text<T: ToString>(x: T) -> Piece {
    Piece::Text(x.to_string())
}
fn id(s: &str) -> Piece {
    Piece::Text(escape_id(s))
}
fn ids(names: &[String]) -> Piece {
    Piece::List(names.iter().map(|n| id(n)).collect())
}
fn flag(b: bool) -> Piece {
    text(if b { "True" } else { "False" })
}
fn ty(t: &Type) -> Piece {
    Piece::Text(t.parsable_string())
}
fn or_none<T, F: FnOnce(&T) -> Piece>(x: &Option<T>, f: F) -> Piece {
    x.as_ref().map(f).unwrap_or_else(|| text("None"))
}
fn children(range: std::ops::Range<usize>) -> Vec<Piece> {
    range.map(Piece::Child).collect()
}

impl Ir {
    /// The items of the S-expression for this node: its head, its payload,
    /// then its children, grouped the way the textual IR expects.
    pub fn layout(&self) -> Vec<Piece> {
        use IrKind::*;

        let n = self.children().len();
        let mut r = vec![text(self.name())];
        match self.kind() {
            I32(x) => r.push(text(x)),
            I64(x) => r.push(text(x)),
            F32(bits) => r.push(text(format!("{:?}", f32::from_bits(*bits)))),
            F64(bits) => r.push(text(format!("{:?}", f64::from_bits(*bits)))),
            Str(s) => r.push(Piece::Text(escape_str(s))),
            Cast(t) | NA(t) | Die(t) => r.push(ty(t)),
            Let(name) | Ref(name) | GetField(name) => r.push(id(name)),
            NDArrayMap(name) | ArrayMap(name) | ArrayFilter(name) | ArrayFlatMap(name)
            | ArrayFor(name) | Uniroot(name) => r.push(id(name)),
            AggLet { name, is_scan } | AggExplode { name, is_scan } => {
                r.push(id(name));
                r.push(flag(*is_scan));
            }
            ApplyBinaryPrimOp(op) => r.push(id(op.symbol())),
            ApplyUnaryPrimOp(op) => r.push(id(op.symbol())),
            ApplyComparisonOp(op) => r.push(id(op.name())),
            MakeArray(t) => r.push(or_none(t, ty)),
            ArraySort { left, right } | ArrayLeftJoinDistinct { left, right } => {
                r.push(id(left));
                r.push(id(right));
            }
            ArrayFold { accum, value } | ArrayScan { accum, value } => {
                r.push(id(accum));
                r.push(id(value));
            }
            LowerBoundOnOrderedCollection { on_key } => r.push(flag(*on_key)),
            AggFilter { is_scan } | AggGroupBy { is_scan } => r.push(flag(*is_scan)),
            AggArrayPerElement {
                element,
                index,
                is_scan,
            } => {
                r.push(id(element));
                r.push(id(index));
                r.push(flag(*is_scan));
            }
            ApplyAggOp(call) | ApplyScanOp(call) => {
                r.push(id(&call.op));
                r.push(Piece::List(children(0..call.n_ctor)));
                r.push(match call.n_init {
                    Some(k) => Piece::List(children(call.n_ctor..call.n_ctor + k)),
                    None => text("None"),
                });
                r.push(Piece::List(children(call.seq_start()..n)));
                return r;
            }
            MakeStruct(names) => {
                r.extend(
                    names
                        .iter()
                        .enumerate()
                        .map(|(i, name)| Piece::List(vec![id(name), Piece::Child(i)])),
                );
                return r;
            }
            SelectFields(names) => r.push(ids(names)),
            InsertFields { names, field_order } => {
                r.push(Piece::Child(0));
                r.push(or_none(field_order, |o| ids(o)));
                r.extend(
                    names
                        .iter()
                        .enumerate()
                        .map(|(i, name)| Piece::List(vec![id(name), Piece::Child(i + 1)])),
                );
                return r;
            }
            GetTupleElement(i) => r.push(text(i)),
            In { index, typ } => {
                r.push(ty(typ));
                r.push(text(index));
            }
            Apply { function, ret } => {
                r.push(id(function));
                r.push(ty(ret));
            }
            Literal { typ, value } => {
                r.push(ty(typ));
                r.push(Piece::Text(escape_str(&value.to_json(typ).to_string())));
            }
            TableWrite(config) | MatrixWrite(config) | BlockMatrixWrite(config)
            | BlockMatrixRead(config) => r.push(Piece::Text(escape_str(config))),
            TableRange { n, n_partitions } => {
                r.push(text(n));
                r.push(or_none(n_partitions, |n| text(n)));
            }
            TableRead { reader, drop_rows } => {
                r.push(flag(*drop_rows));
                r.push(Piece::Text(escape_str(reader)));
            }
            TableKeyBy { keys, is_sorted } | MatrixKeyRowsBy { keys, is_sorted } => {
                r.push(ids(keys));
                r.push(flag(*is_sorted));
            }
            TableHead(k) | MatrixRowsHead(k) => r.push(text(k)),
            MatrixColsHead(k) => r.push(text(k)),
            TableExplode(path) => r.push(ids(path)),
            TableOrderBy(fields) => r.push(Piece::List(
                fields
                    .iter()
                    .map(|(f, o)| text(format!("{}{}", o.prefix(), escape_id(f))))
                    .collect(),
            )),
            TableJoin {
                join_type,
                join_key,
            } => {
                r.push(id(join_type));
                r.push(text(join_key));
            }
            TableParallelize(k) => r.push(or_none(k, |k| text(k))),
            TableRename { rows, globals } => {
                for renames in [rows, globals] {
                    r.push(Piece::List(renames.iter().map(|(o, _)| id(o)).collect()));
                    r.push(Piece::List(renames.iter().map(|(_, n)| id(n)).collect()));
                }
            }
            MatrixRead {
                reader,
                drop_cols,
                drop_rows,
            } => {
                r.push(flag(*drop_cols));
                r.push(flag(*drop_rows));
                r.push(Piece::Text(escape_str(reader)));
            }
            MatrixMapCols(new_key) => r.push(or_none(new_key, |k| ids(k))),
            MatrixChooseCols(indices) => r.push(Piece::List(indices.iter().map(text).collect())),
            MatrixAnnotateRowsTable(root) | MatrixAnnotateColsTable(root) => {
                r.push(Piece::Text(escape_str(root)))
            }
            BlockMatrixBroadcast {
                in_index_expr,
                shape,
                block_size,
            } => {
                r.push(Piece::List(in_index_expr.iter().map(text).collect()));
                r.push(Piece::List(shape.iter().map(text).collect()));
                r.push(text(block_size));
            }
            ValueToBlockMatrix { shape, block_size } => {
                r.push(Piece::List(shape.iter().map(text).collect()));
                r.push(text(block_size));
            }
            _ => {}
        }
        r.extend(children(0..n));
        r
    }

    pub(crate) fn render_plain(&self, out: &mut String) {
        write_pieces(out, &self.layout(), &mut |out, i| {
            self.children()[i].render_plain(out)
        });
    }
}

/// Write `pieces` as one parenthesized list, delegating children to
/// `child`.
pub fn write_pieces(out: &mut String, pieces: &[Piece], child: &mut dyn FnMut(&mut String, usize)) {
    out.push('(');
    for (k, p) in pieces.iter().enumerate() {
        if k > 0 {
            out.push(' ');
        }
        match p {
            Piece::Text(s) => out.push_str(s),
            Piece::Child(i) => child(out, *i),
            Piece::List(xs) => write_pieces(out, xs, child),
        }
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::value::Value;

    #[test]
    fn scalars() {
        assert_eq!(Ir::i32(5).to_string(), "(I32 5)");
        assert_eq!(Ir::f64(3.0).to_string(), "(F64 3.0)");
        assert_eq!(Ir::f32(0.5).to_string(), "(F32 0.5)");
        assert_eq!(Ir::str("a \"b\"").to_string(), r#"(Str "a \"b\"")"#);
        assert_eq!(Ir::bool(true).to_string(), "(True)");
        assert_eq!(Ir::na(Type::array(Type::Int32)).to_string(), "(NA Array[Int32])");
    }

    #[test]
    fn grouped_children() {
        let agg = Ir::apply_agg_op(
            "CallStats",
            vec![Ir::i32(2)],
            None,
            vec![Ir::reference("x")],
        );
        assert_eq!(
            agg.to_string(),
            "(ApplyAggOp CallStats ((I32 2)) None ((Ref x)))"
        );
        let agg = Ir::apply_scan_op("Sum", vec![], Some(vec![]), vec![Ir::i64(1)]);
        assert_eq!(agg.to_string(), "(ApplyScanOp Sum () () ((I64 1)))");

        let s = Ir::make_struct(vec![("x".into(), Ir::i32(1)), ("a b".into(), Ir::str("c"))]);
        assert_eq!(s.to_string(), r#"(MakeStruct (x (I32 1)) (`a b` (Str "c")))"#);

        let ins = Ir::new(
            IrKind::InsertFields {
                names: vec!["y".into()],
                field_order: None,
            },
            vec![Ir::reference("s"), Ir::i32(2)],
        );
        assert_eq!(ins.to_string(), "(InsertFields (Ref s) None (y (I32 2)))");
    }

    #[test]
    fn payloads() {
        let lit = Ir::literal(
            Type::array(Type::Int32),
            Value::list([1.into(), Value::Missing]),
        );
        assert_eq!(lit.to_string(), r#"(Literal Array[Int32] "[1,null]")"#);

        let sort = Ir::new(
            IrKind::TableOrderBy(vec![
                ("idx".into(), SortOrder::Ascending),
                ("x".into(), SortOrder::Descending),
            ]),
            vec![Ir::table_range(10, None)],
        );
        assert_eq!(sort.to_string(), "(TableOrderBy (Aidx Dx) (TableRange 10 None))");

        assert_eq!(Ir::table_range(5, Some(2)).to_string(), "(TableRange 5 2)");
        let par = Ir::new(IrKind::TableParallelize(None), vec![Ir::reference("rows")]);
        assert_eq!(par.to_string(), "(TableParallelize None (Ref rows))");
        let par = Ir::new(IrKind::TableParallelize(Some(4)), vec![Ir::reference("rows")]);
        assert_eq!(par.to_string(), "(TableParallelize 4 (Ref rows))");

        let cmp = Ir::compare(ComparisonOp::LTEQ, Ir::i32(1), Ir::i32(2));
        assert_eq!(cmp.to_string(), "(ApplyComparisonOp LTEQ (I32 1) (I32 2))");
    }
}
