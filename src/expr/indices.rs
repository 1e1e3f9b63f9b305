use std::{
    collections::BTreeSet,
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

use itertools::Itertools;

use super::{referenced_fields, Aggregations, Expression};
use crate::{
    errors::{ExprResult, ExpressionError, UnificationError},
    ir::{Ir, IrKind, IrRef},
    types::{Fields, Type},
};

/// The data axes an expression may vary along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    Row,
    Col,
}
impl Display for Axis {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Col => write!(f, "column"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Table,
    Matrix,
}

/// A table or matrix expressions may be built from.
#[derive(Debug)]
pub struct Source {
    name: String,
    kind: SourceKind,
    ir: IrRef,
    globals: Fields,
    rows: Fields,
    cols: Fields,
    entries: Fields,
}

/// A shared handle on a [`Source`]; two handles are the same source only
/// if they point to the same object.
#[derive(Clone)]
pub struct SourceRef(Arc<Source>);
impl PartialEq for SourceRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for SourceRef {}
impl Debug for SourceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?} {}>", self.0.kind, self.0.name)
    }
}

fn fields_of(t: Type) -> Fields {
    match t {
        Type::Struct(fs) => fs,
        _ => Fields::default(),
    }
}

impl SourceRef {
    pub fn table(name: &str, ir: IrRef, globals: Type, rows: Type) -> SourceRef {
        SourceRef(Arc::new(Source {
            name: name.to_owned(),
            kind: SourceKind::Table,
            ir,
            globals: fields_of(globals),
            rows: fields_of(rows),
            cols: Fields::default(),
            entries: Fields::default(),
        }))
    }

    pub fn matrix(name: &str, ir: IrRef, globals: Type, rows: Type, cols: Type, entries: Type) -> SourceRef {
        SourceRef(Arc::new(Source {
            name: name.to_owned(),
            kind: SourceKind::Matrix,
            ir,
            globals: fields_of(globals),
            rows: fields_of(rows),
            cols: fields_of(cols),
            entries: fields_of(entries),
        }))
    }

    /// A table of `n` rows with a single `idx` field.
    pub fn range_table(name: &str, n: i32, n_partitions: Option<i32>) -> SourceRef {
        SourceRef::table(
            name,
            Ir::table_range(n, n_partitions),
            Type::tstruct::<&str, _>([]),
            Type::tstruct([("idx", Type::Int32)]),
        )
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }
    pub fn kind(&self) -> SourceKind {
        self.0.kind
    }
    pub fn ir(&self) -> &IrRef {
        &self.0.ir
    }

    /// The names under which the parts of a record of this source are
    /// visible to the expressions built on it.
    pub fn top_level_names(&self) -> &'static [&'static str] {
        match self.0.kind {
            SourceKind::Table => &["global", "row"],
            SourceKind::Matrix => &["global", "va", "sa", "g"],
        }
    }

    fn field(&self, part: &Fields, top: &str, name: &str, axes: &[Axis]) -> ExprResult<Expression> {
        let t = part
            .get(name)
            .ok_or_else(|| ExpressionError::NoSuchField(Type::Struct(part.clone()), name.to_owned()))?;
        Ok(Expression::new(
            Ir::get_field(Ir::reference(top), name),
            t.clone(),
            Indices::new(Some(self.clone()), axes.iter().copied()),
            Aggregations::default(),
        ))
    }
    pub fn global(&self, name: &str) -> ExprResult<Expression> {
        self.field(&self.0.globals, "global", name, &[])
    }
    pub fn row(&self, name: &str) -> ExprResult<Expression> {
        let top = match self.0.kind {
            SourceKind::Table => "row",
            SourceKind::Matrix => "va",
        };
        self.field(&self.0.rows, top, name, &[Axis::Row])
    }
    pub fn col(&self, name: &str) -> ExprResult<Expression> {
        self.field(&self.0.cols, "sa", name, &[Axis::Col])
    }
    pub fn entry(&self, name: &str) -> ExprResult<Expression> {
        self.field(&self.0.entries, "g", name, &[Axis::Row, Axis::Col])
    }

    /// Aggregate over every record of the source, yielding a value that
    /// does not depend on it.
    pub fn aggregate(&self, query: &Expression) -> ExprResult<Expression> {
        if let Some(other) = query.indices().source.as_ref().filter(|s| *s != self) {
            return Err(UnificationError::DifferentSources(vec![
                (other.name().to_owned(), referenced_fields(query, other)),
                (self.name().to_owned(), vec![]),
            ])
            .into());
        }
        if !query.indices().axes.is_empty() {
            return Err(ExpressionError::WrongReceiver {
                method: "aggregate".into(),
                expected: "an expression not varying along rows or columns",
                found: query.dtype().clone(),
            });
        }
        let kind = match self.0.kind {
            SourceKind::Table => IrKind::TableAggregate,
            SourceKind::Matrix => IrKind::MatrixAggregate,
        };
        Ok(Expression::new(
            Ir::new(kind, vec![self.0.ir.clone(), query.ir().clone()]),
            query.dtype().clone(),
            Indices::default(),
            Aggregations::default(),
        ))
    }
}

/// Where an expression comes from, and along which of its source's axes
/// it varies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Indices {
    pub source: Option<SourceRef>,
    pub axes: BTreeSet<Axis>,
}
impl Indices {
    pub fn new<I: IntoIterator<Item = Axis>>(source: Option<SourceRef>, axes: I) -> Self {
        Indices {
            source,
            axes: axes.into_iter().collect(),
        }
    }

    /// Combine the indices of expressions used together: they must share
    /// their source, if any, and vary along the union of their axes. On
    /// failure, the distinct sources found are returned.
    pub fn unify<'a, I: IntoIterator<Item = &'a Indices>>(xs: I) -> Result<Indices, Vec<SourceRef>> {
        let mut sources: Vec<SourceRef> = Vec::new();
        let mut axes = BTreeSet::new();
        for i in xs {
            if let Some(s) = i.source.as_ref() {
                if !sources.contains(s) {
                    sources.push(s.clone());
                }
            }
            axes.extend(i.axes.iter().copied());
        }
        if sources.len() > 1 {
            return Err(sources);
        }
        Ok(Indices {
            source: sources.pop(),
            axes,
        })
    }

    pub fn is_constant(&self) -> bool {
        self.source.is_none() && self.axes.is_empty()
    }
}
impl Display for Indices {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.source {
            None => write!(f, "None"),
            Some(s) if self.axes.is_empty() => write!(f, "{} (global)", s.name()),
            Some(s) => write!(f, "{} ({})", s.name(), self.axes.iter().join(", ")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_source_unifies() {
        let t = SourceRef::range_table("t", 10, None);
        let a = Indices::new(Some(t.clone()), [Axis::Row]);
        let b = Indices::new(None, []);
        let c = Indices::new(Some(t.clone()), []);
        let u = Indices::unify([&a, &b, &c]).ok();
        assert_eq!(u, Some(Indices::new(Some(t), [Axis::Row])));
    }

    #[test]
    fn identity_is_by_handle() {
        let t1 = SourceRef::range_table("t", 10, None);
        let t2 = SourceRef::range_table("t", 10, None);
        assert_ne!(t1, t2);
        assert_eq!(t1, t1.clone());
        let r = Indices::unify([
            &Indices::new(Some(t1), []),
            &Indices::new(Some(t2), []),
        ]);
        assert_eq!(r.map_err(|s| s.len()), Err(2));
    }

    #[test]
    fn field_references() -> ExprResult<()> {
        let t = SourceRef::range_table("t", 10, None);
        let idx = t.row("idx")?;
        assert_eq!(idx.dtype(), &Type::Int32);
        assert_eq!(idx.ir().to_string(), "(GetField idx (Ref row))");
        assert_eq!(idx.indices().to_string(), "t (row)");
        assert!(matches!(t.row("nope"), Err(ExpressionError::NoSuchField(..))));
        assert!(t.entry("x").is_err());
        Ok(())
    }
}
