use std::{
    collections::hash_map::DefaultHasher,
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

use anyhow::*;

use crate::{types::Type, value::Value};

mod layout;
mod ops;
mod parser;
mod scopes;
mod typing;

pub use layout::{write_pieces, Piece};
pub use ops::{AggCall, BinaryOp, ComparisonOp, SortOrder, UnaryOp};
pub use parser::{parse_ir, parse_value_ir};
pub use scopes::ChildScope;
pub use typing::{aggregator_type, TypeEnv};

pub type IrRef = Arc<Ir>;

/// Which of the four IR languages a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrClass {
    Value,
    Table,
    Matrix,
    BlockMatrix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exactly(usize),
    AtLeast(usize),
}
impl Arity {
    pub fn validate(&self, l: usize) -> Result<()> {
        match self {
            Arity::Exactly(n) if l != *n => bail!("expected {} children, found {}", n, l),
            Arity::AtLeast(n) if l < *n => bail!("expected at least {} children, found {}", n, l),
            _ => Ok(()),
        }
    }
}

/// The kind of a node, together with its non-IR payload. Floats are kept
/// as their bit pattern; reader and writer configurations as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrKind {
    I32(i32),
    I64(i64),
    F32(u32),
    F64(u64),
    Str(String),
    True,
    False,
    Void,
    Cast(Type),
    NA(Type),
    IsNA,
    If,
    Coalesce,
    Let(String),
    AggLet { name: String, is_scan: bool },
    Ref(String),
    ApplyBinaryPrimOp(BinaryOp),
    ApplyUnaryPrimOp(UnaryOp),
    ApplyComparisonOp(ComparisonOp),
    MakeArray(Option<Type>),
    ArrayRef,
    ArrayLen,
    ArrayRange,
    ArraySort { left: String, right: String },
    ToSet,
    ToDict,
    ToArray,
    LowerBoundOnOrderedCollection { on_key: bool },
    GroupByKey,
    MakeNDArray,
    NDArrayShape,
    NDArrayReshape,
    NDArrayRef,
    NDArrayMap(String),
    NDArrayMatMul,
    ArrayMap(String),
    ArrayFilter(String),
    ArrayFlatMap(String),
    ArrayFold { accum: String, value: String },
    ArrayScan { accum: String, value: String },
    ArrayLeftJoinDistinct { left: String, right: String },
    ArrayFor(String),
    AggFilter { is_scan: bool },
    AggExplode { name: String, is_scan: bool },
    AggGroupBy { is_scan: bool },
    AggArrayPerElement { element: String, index: String, is_scan: bool },
    ApplyAggOp(AggCall),
    ApplyScanOp(AggCall),
    Begin,
    MakeStruct(Vec<String>),
    SelectFields(Vec<String>),
    InsertFields { names: Vec<String>, field_order: Option<Vec<String>> },
    GetField(String),
    MakeTuple,
    GetTupleElement(usize),
    In { index: usize, typ: Type },
    Die(Type),
    Apply { function: String, ret: Type },
    Uniroot(String),
    Literal { typ: Type, value: Value },
    TableCount,
    TableGetGlobals,
    TableCollect,
    TableAggregate,
    MatrixAggregate,
    TableWrite(String),
    MatrixWrite(String),
    BlockMatrixWrite(String),

    TableRange { n: i32, n_partitions: Option<i32> },
    TableRead { reader: String, drop_rows: bool },
    TableKeyBy { keys: Vec<String>, is_sorted: bool },
    TableFilter,
    TableMapRows,
    TableMapGlobals,
    TableHead(i64),
    TableDistinct,
    TableUnion,
    TableExplode(Vec<String>),
    TableOrderBy(Vec<(String, SortOrder)>),
    TableJoin { join_type: String, join_key: i32 },
    TableAggregateByKey,
    TableParallelize(Option<i32>),
    TableRename { rows: Vec<(String, String)>, globals: Vec<(String, String)> },
    MatrixRowsTable,
    MatrixColsTable,
    MatrixEntriesTable,

    MatrixRead { reader: String, drop_cols: bool, drop_rows: bool },
    MatrixFilterRows,
    MatrixFilterCols,
    MatrixFilterEntries,
    MatrixMapRows,
    MatrixMapCols(Option<Vec<String>>),
    MatrixMapEntries,
    MatrixMapGlobals,
    MatrixKeyRowsBy { keys: Vec<String>, is_sorted: bool },
    MatrixAggregateRowsByKey,
    MatrixAggregateColsByKey,
    MatrixUnionRows,
    MatrixRowsHead(i64),
    MatrixColsHead(i32),
    MatrixChooseCols(Vec<i32>),
    MatrixAnnotateRowsTable(String),
    MatrixAnnotateColsTable(String),

    BlockMatrixRead(String),
    BlockMatrixMap,
    BlockMatrixMap2,
    BlockMatrixDot,
    BlockMatrixBroadcast { in_index_expr: Vec<i32>, shape: Vec<i64>, block_size: i32 },
    ValueToBlockMatrix { shape: Vec<i64>, block_size: i32 },
}

impl IrKind {
    /// The head of the node in the textual form.
    pub fn name(&self) -> &'static str {
        use IrKind::*;
        match self {
            I32(_) => "I32",
            I64(_) => "I64",
            F32(_) => "F32",
            F64(_) => "F64",
            Str(_) => "Str",
            True => "True",
            False => "False",
            Void => "Void",
            Cast(_) => "Cast",
            NA(_) => "NA",
            IsNA => "IsNA",
            If => "If",
            Coalesce => "Coalesce",
            Let(_) => "Let",
            AggLet { .. } => "AggLet",
            Ref(_) => "Ref",
            ApplyBinaryPrimOp(_) => "ApplyBinaryPrimOp",
            ApplyUnaryPrimOp(_) => "ApplyUnaryPrimOp",
            ApplyComparisonOp(_) => "ApplyComparisonOp",
            MakeArray(_) => "MakeArray",
            ArrayRef => "ArrayRef",
            ArrayLen => "ArrayLen",
            ArrayRange => "ArrayRange",
            ArraySort { .. } => "ArraySort",
            ToSet => "ToSet",
            ToDict => "ToDict",
            ToArray => "ToArray",
            LowerBoundOnOrderedCollection { .. } => "LowerBoundOnOrderedCollection",
            GroupByKey => "GroupByKey",
            MakeNDArray => "MakeNDArray",
            NDArrayShape => "NDArrayShape",
            NDArrayReshape => "NDArrayReshape",
            NDArrayRef => "NDArrayRef",
            NDArrayMap(_) => "NDArrayMap",
            NDArrayMatMul => "NDArrayMatMul",
            ArrayMap(_) => "ArrayMap",
            ArrayFilter(_) => "ArrayFilter",
            ArrayFlatMap(_) => "ArrayFlatMap",
            ArrayFold { .. } => "ArrayFold",
            ArrayScan { .. } => "ArrayScan",
            ArrayLeftJoinDistinct { .. } => "ArrayLeftJoinDistinct",
            ArrayFor(_) => "ArrayFor",
            AggFilter { .. } => "AggFilter",
            AggExplode { .. } => "AggExplode",
            AggGroupBy { .. } => "AggGroupBy",
            AggArrayPerElement { .. } => "AggArrayPerElement",
            ApplyAggOp(_) => "ApplyAggOp",
            ApplyScanOp(_) => "ApplyScanOp",
            Begin => "Begin",
            MakeStruct(_) => "MakeStruct",
            SelectFields(_) => "SelectFields",
            InsertFields { .. } => "InsertFields",
            GetField(_) => "GetField",
            MakeTuple => "MakeTuple",
            GetTupleElement(_) => "GetTupleElement",
            In { .. } => "In",
            Die(_) => "Die",
            Apply { .. } => "Apply",
            Uniroot(_) => "Uniroot",
            Literal { .. } => "Literal",
            TableCount => "TableCount",
            TableGetGlobals => "TableGetGlobals",
            TableCollect => "TableCollect",
            TableAggregate => "TableAggregate",
            MatrixAggregate => "MatrixAggregate",
            TableWrite(_) => "TableWrite",
            MatrixWrite(_) => "MatrixWrite",
            BlockMatrixWrite(_) => "BlockMatrixWrite",
            TableRange { .. } => "TableRange",
            TableRead { .. } => "TableRead",
            TableKeyBy { .. } => "TableKeyBy",
            TableFilter => "TableFilter",
            TableMapRows => "TableMapRows",
            TableMapGlobals => "TableMapGlobals",
            TableHead(_) => "TableHead",
            TableDistinct => "TableDistinct",
            TableUnion => "TableUnion",
            TableExplode(_) => "TableExplode",
            TableOrderBy(_) => "TableOrderBy",
            TableJoin { .. } => "TableJoin",
            TableAggregateByKey => "TableAggregateByKey",
            TableParallelize(_) => "TableParallelize",
            TableRename { .. } => "TableRename",
            MatrixRowsTable => "MatrixRowsTable",
            MatrixColsTable => "MatrixColsTable",
            MatrixEntriesTable => "MatrixEntriesTable",
            MatrixRead { .. } => "MatrixRead",
            MatrixFilterRows => "MatrixFilterRows",
            MatrixFilterCols => "MatrixFilterCols",
            MatrixFilterEntries => "MatrixFilterEntries",
            MatrixMapRows => "MatrixMapRows",
            MatrixMapCols(_) => "MatrixMapCols",
            MatrixMapEntries => "MatrixMapEntries",
            MatrixMapGlobals => "MatrixMapGlobals",
            MatrixKeyRowsBy { .. } => "MatrixKeyRowsBy",
            MatrixAggregateRowsByKey => "MatrixAggregateRowsByKey",
            MatrixAggregateColsByKey => "MatrixAggregateColsByKey",
            MatrixUnionRows => "MatrixUnionRows",
            MatrixRowsHead(_) => "MatrixRowsHead",
            MatrixColsHead(_) => "MatrixColsHead",
            MatrixChooseCols(_) => "MatrixChooseCols",
            MatrixAnnotateRowsTable(_) => "MatrixAnnotateRowsTable",
            MatrixAnnotateColsTable(_) => "MatrixAnnotateColsTable",
            BlockMatrixRead(_) => "BlockMatrixRead",
            BlockMatrixMap => "BlockMatrixMap",
            BlockMatrixMap2 => "BlockMatrixMap2",
            BlockMatrixDot => "BlockMatrixDot",
            BlockMatrixBroadcast { .. } => "BlockMatrixBroadcast",
            ValueToBlockMatrix { .. } => "ValueToBlockMatrix",
        }
    }

    pub fn class(&self) -> IrClass {
        use IrKind::*;
        match self {
            TableRange { .. }
            | TableRead { .. }
            | TableKeyBy { .. }
            | TableFilter
            | TableMapRows
            | TableMapGlobals
            | TableHead(_)
            | TableDistinct
            | TableUnion
            | TableExplode(_)
            | TableOrderBy(_)
            | TableJoin { .. }
            | TableAggregateByKey
            | TableParallelize(_)
            | TableRename { .. }
            | MatrixRowsTable
            | MatrixColsTable
            | MatrixEntriesTable => IrClass::Table,
            MatrixRead { .. }
            | MatrixFilterRows
            | MatrixFilterCols
            | MatrixFilterEntries
            | MatrixMapRows
            | MatrixMapCols(_)
            | MatrixMapEntries
            | MatrixMapGlobals
            | MatrixKeyRowsBy { .. }
            | MatrixAggregateRowsByKey
            | MatrixAggregateColsByKey
            | MatrixUnionRows
            | MatrixRowsHead(_)
            | MatrixColsHead(_)
            | MatrixChooseCols(_)
            | MatrixAnnotateRowsTable(_)
            | MatrixAnnotateColsTable(_) => IrClass::Matrix,
            BlockMatrixRead(_)
            | BlockMatrixMap
            | BlockMatrixMap2
            | BlockMatrixDot
            | BlockMatrixBroadcast { .. }
            | ValueToBlockMatrix { .. } => IrClass::BlockMatrix,
            _ => IrClass::Value,
        }
    }

    pub fn arity(&self) -> Arity {
        use IrKind::*;
        match self {
            I32(_) | I64(_) | F32(_) | F64(_) | Str(_) | True | False | Void | NA(_) | Ref(_)
            | In { .. } | Literal { .. } | TableRange { .. } | TableRead { .. }
            | MatrixRead { .. } | BlockMatrixRead(_) => Arity::Exactly(0),
            Cast(_) | IsNA | ArrayLen | ToSet | ToDict | ToArray | GroupByKey | NDArrayShape
            | SelectFields(_) | GetField(_) | GetTupleElement(_) | Die(_) | TableCount
            | TableGetGlobals | TableCollect | TableWrite(_) | MatrixWrite(_)
            | BlockMatrixWrite(_) | TableKeyBy { .. } | TableHead(_) | TableDistinct
            | TableExplode(_) | TableOrderBy(_) | TableParallelize(_) | TableRename { .. }
            | MatrixRowsTable | MatrixColsTable | MatrixEntriesTable | MatrixKeyRowsBy { .. }
            | MatrixRowsHead(_) | MatrixColsHead(_) | MatrixChooseCols(_)
            | BlockMatrixBroadcast { .. } | ValueToBlockMatrix { .. } => Arity::Exactly(1),
            Let(_) | AggLet { .. } | ApplyBinaryPrimOp(_) | ApplyComparisonOp(_) | ArrayRef
            | ArraySort { .. } | LowerBoundOnOrderedCollection { .. } | NDArrayReshape
            | NDArrayMap(_) | NDArrayMatMul | ArrayMap(_) | ArrayFilter(_) | ArrayFlatMap(_)
            | ArrayFor(_) | AggFilter { .. } | AggExplode { .. } | AggGroupBy { .. }
            | AggArrayPerElement { .. } | TableAggregate | MatrixAggregate | TableFilter
            | TableMapRows | TableMapGlobals | TableJoin { .. } | TableAggregateByKey
            | MatrixFilterRows | MatrixFilterCols | MatrixFilterEntries | MatrixMapRows
            | MatrixMapCols(_) | MatrixMapEntries | MatrixMapGlobals
            | MatrixAnnotateRowsTable(_) | MatrixAnnotateColsTable(_) | BlockMatrixMap
            | BlockMatrixDot => Arity::Exactly(2),
            If | ArrayRange | MakeNDArray | ArrayFold { .. } | ArrayScan { .. } | Uniroot(_)
            | MatrixAggregateRowsByKey | MatrixAggregateColsByKey | BlockMatrixMap2 => {
                Arity::Exactly(3)
            }
            ArrayLeftJoinDistinct { .. } => Arity::Exactly(4),
            ApplyUnaryPrimOp(_) => Arity::Exactly(1),
            MakeStruct(names) => Arity::Exactly(names.len()),
            InsertFields { names, .. } => Arity::Exactly(names.len() + 1),
            ApplyAggOp(call) | ApplyScanOp(call) => Arity::AtLeast(call.seq_start()),
            Coalesce | NDArrayRef | TableUnion | MatrixUnionRows => Arity::AtLeast(1),
            MakeArray(_) | Begin | MakeTuple | Apply { .. } => Arity::AtLeast(0),
        }
    }
}

/// An immutable IR node. Equality and hashing are structural; the hash of
/// every subtree is computed once, when the node is built.
#[derive(Clone)]
pub struct Ir {
    kind: IrKind,
    children: Vec<IrRef>,
    digest: u64,
}

impl Ir {
    /// Build a node, checking its arity.
    pub fn try_new(kind: IrKind, children: Vec<IrRef>) -> Result<IrRef> {
        kind.arity()
            .validate(children.len())
            .with_context(|| anyhow!("while building {}", kind.name()))?;
        let mut h = DefaultHasher::new();
        kind.hash(&mut h);
        for c in children.iter() {
            h.write_u64(c.digest);
        }
        Ok(Arc::new(Ir {
            digest: h.finish(),
            kind,
            children,
        }))
    }

    /// Build a node whose arity is known to be right by construction.
    pub fn new(kind: IrKind, children: Vec<IrRef>) -> IrRef {
        debug_assert!(kind.arity().validate(children.len()).is_ok());
        let mut h = DefaultHasher::new();
        kind.hash(&mut h);
        for c in children.iter() {
            h.write_u64(c.digest);
        }
        Arc::new(Ir {
            digest: h.finish(),
            kind,
            children,
        })
    }

    pub fn leaf(kind: IrKind) -> IrRef {
        Ir::new(kind, vec![])
    }

    pub fn kind(&self) -> &IrKind {
        &self.kind
    }
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
    pub fn class(&self) -> IrClass {
        self.kind.class()
    }
    pub fn children(&self) -> &[IrRef] {
        &self.children
    }
    pub fn child(&self, i: usize) -> &IrRef {
        &self.children[i]
    }

    /// A node of the same kind and payload over new children.
    pub fn copy(&self, children: Vec<IrRef>) -> Result<IrRef> {
        Ir::try_new(self.kind.clone(), children)
    }

    /// Rebuild the tree bottom-up, applying `f` to every rebuilt node.
    pub fn map_bottom_up(node: &IrRef, f: &mut dyn FnMut(IrRef) -> IrRef) -> IrRef {
        let children = node
            .children
            .iter()
            .map(|c| Ir::map_bottom_up(c, f))
            .collect::<Vec<_>>();
        let node = if children
            .iter()
            .zip(node.children.iter())
            .all(|(a, b)| Arc::ptr_eq(a, b))
        {
            node.clone()
        } else {
            Ir::new(node.kind.clone(), children)
        };
        f(node)
    }

    pub fn size(&self) -> usize {
        1 + self.children.iter().map(|c| c.size()).sum::<usize>()
    }

    /// Whether a repeated occurrence of this subtree may be bound once
    /// and referred to by name.
    pub fn is_shareable(&self) -> bool {
        self.class() == IrClass::Value
            && !matches!(self.kind, IrKind::Ref(_) | IrKind::Void | IrKind::Die(_))
    }

    pub fn i32(x: i32) -> IrRef {
        Ir::leaf(IrKind::I32(x))
    }
    pub fn i64(x: i64) -> IrRef {
        Ir::leaf(IrKind::I64(x))
    }
    pub fn f32(x: f32) -> IrRef {
        Ir::leaf(IrKind::F32(x.to_bits()))
    }
    pub fn f64(x: f64) -> IrRef {
        Ir::leaf(IrKind::F64(x.to_bits()))
    }
    pub fn str(s: &str) -> IrRef {
        Ir::leaf(IrKind::Str(s.to_owned()))
    }
    pub fn bool(b: bool) -> IrRef {
        Ir::leaf(if b { IrKind::True } else { IrKind::False })
    }
    pub fn na(t: Type) -> IrRef {
        Ir::leaf(IrKind::NA(t))
    }
    pub fn reference(name: &str) -> IrRef {
        Ir::leaf(IrKind::Ref(name.to_owned()))
    }
    pub fn cast(t: Type, x: IrRef) -> IrRef {
        Ir::new(IrKind::Cast(t), vec![x])
    }
    pub fn cond(c: IrRef, then: IrRef, otherwise: IrRef) -> IrRef {
        Ir::new(IrKind::If, vec![c, then, otherwise])
    }
    pub fn let_in(name: &str, value: IrRef, body: IrRef) -> IrRef {
        Ir::new(IrKind::Let(name.to_owned()), vec![value, body])
    }
    pub fn agg_let_in(name: &str, value: IrRef, body: IrRef, is_scan: bool) -> IrRef {
        Ir::new(
            IrKind::AggLet {
                name: name.to_owned(),
                is_scan,
            },
            vec![value, body],
        )
    }
    pub fn binary(op: BinaryOp, l: IrRef, r: IrRef) -> IrRef {
        Ir::new(IrKind::ApplyBinaryPrimOp(op), vec![l, r])
    }
    pub fn unary(op: UnaryOp, x: IrRef) -> IrRef {
        Ir::new(IrKind::ApplyUnaryPrimOp(op), vec![x])
    }
    pub fn compare(op: ComparisonOp, l: IrRef, r: IrRef) -> IrRef {
        Ir::new(IrKind::ApplyComparisonOp(op), vec![l, r])
    }
    pub fn make_array(items: Vec<IrRef>, typ: Option<Type>) -> IrRef {
        Ir::new(IrKind::MakeArray(typ), items)
    }
    pub fn make_struct(fields: Vec<(String, IrRef)>) -> IrRef {
        let (names, children) = fields.into_iter().unzip();
        Ir::new(IrKind::MakeStruct(names), children)
    }
    pub fn make_tuple(items: Vec<IrRef>) -> IrRef {
        Ir::new(IrKind::MakeTuple, items)
    }
    pub fn get_field(x: IrRef, name: &str) -> IrRef {
        Ir::new(IrKind::GetField(name.to_owned()), vec![x])
    }
    pub fn get_tuple_element(x: IrRef, i: usize) -> IrRef {
        Ir::new(IrKind::GetTupleElement(i), vec![x])
    }
    pub fn apply(function: &str, ret: Type, args: Vec<IrRef>) -> IrRef {
        Ir::new(
            IrKind::Apply {
                function: function.to_owned(),
                ret,
            },
            args,
        )
    }
    pub fn literal(typ: Type, value: Value) -> IrRef {
        Ir::leaf(IrKind::Literal { typ, value })
    }

    fn agg_call(
        op: &str,
        ctor: Vec<IrRef>,
        init: Option<Vec<IrRef>>,
        seq: Vec<IrRef>,
        is_scan: bool,
    ) -> IrRef {
        let call = AggCall::new(op, ctor.len(), init.as_ref().map(Vec::len));
        let children = ctor
            .into_iter()
            .chain(init.into_iter().flatten())
            .chain(seq)
            .collect();
        Ir::new(
            if is_scan {
                IrKind::ApplyScanOp(call)
            } else {
                IrKind::ApplyAggOp(call)
            },
            children,
        )
    }
    pub fn apply_agg_op(
        op: &str,
        ctor: Vec<IrRef>,
        init: Option<Vec<IrRef>>,
        seq: Vec<IrRef>,
    ) -> IrRef {
        Ir::agg_call(op, ctor, init, seq, false)
    }
    pub fn apply_scan_op(
        op: &str,
        ctor: Vec<IrRef>,
        init: Option<Vec<IrRef>>,
        seq: Vec<IrRef>,
    ) -> IrRef {
        Ir::agg_call(op, ctor, init, seq, true)
    }

    pub fn table_range(n: i32, n_partitions: Option<i32>) -> IrRef {
        Ir::leaf(IrKind::TableRange { n, n_partitions })
    }
    pub fn table_aggregate(table: IrRef, query: IrRef) -> IrRef {
        Ir::new(IrKind::TableAggregate, vec![table, query])
    }
}

impl PartialEq for Ir {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.digest == other.digest
                && self.kind == other.kind
                && self.children == other.children)
    }
}
impl Eq for Ir {}
impl Hash for Ir {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.digest);
    }
}

impl Display for Ir {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.render_plain(&mut out);
        write!(f, "{}", out)
    }
}
impl Debug for Ir {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_identity() {
        let a = Ir::binary(BinaryOp::Add, Ir::i32(5), Ir::reference("x"));
        let b = Ir::binary(BinaryOp::Add, Ir::i32(5), Ir::reference("x"));
        let c = Ir::binary(BinaryOp::Add, Ir::i32(5), Ir::reference("y"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut seen = std::collections::HashSet::new();
        seen.insert(a.clone());
        assert!(seen.contains(&b));
        assert!(!seen.contains(&c));
    }

    #[test]
    fn copy_with_new_children() -> Result<()> {
        let a = Ir::binary(BinaryOp::Mul, Ir::i32(1), Ir::i32(2));
        let b = a.copy(vec![Ir::i32(3), Ir::i32(4)])?;
        assert_eq!(b.kind(), a.kind());
        assert_eq!(b.to_string(), "(ApplyBinaryPrimOp `*` (I32 3) (I32 4))");
        assert!(a.copy(vec![Ir::i32(3)]).is_err());
        Ok(())
    }

    #[test]
    fn bottom_up_rewrite() {
        let x = Ir::let_in(
            "v",
            Ir::i32(1),
            Ir::binary(BinaryOp::Add, Ir::reference("v"), Ir::i32(1)),
        );
        let y = Ir::map_bottom_up(&x, &mut |n| match n.kind() {
            IrKind::I32(1) => Ir::i64(1),
            _ => n,
        });
        assert_eq!(
            y.to_string(),
            "(Let v (I64 1) (ApplyBinaryPrimOp `+` (Ref v) (I64 1)))"
        );
        assert_eq!(y.size(), 5);
    }

    #[test]
    fn shareability() {
        assert!(Ir::i32(5).is_shareable());
        assert!(!Ir::reference("x").is_shareable());
        assert!(!Ir::table_range(5, Some(1)).is_shareable());
        assert!(Ir::new(IrKind::TableCount, vec![Ir::table_range(5, None)]).is_shareable());
    }
}
