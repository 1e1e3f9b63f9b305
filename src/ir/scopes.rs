use std::collections::{BTreeSet, HashMap};

use super::{Ir, IrClass, IrKind, IrRef};

/// The environment a child is evaluated in, relative to its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildScope {
    /// The parent's environment.
    Same,
    /// The parent's environment extended with `binds`. A barrier is
    /// evaluated conditionally or repeatedly: nothing computed inside it
    /// may be moved out.
    Bind { binds: Vec<String>, barrier: bool },
    /// Evaluated once per aggregated record, in the aggregation
    /// environment of the enclosing aggregating node.
    Agg { is_scan: bool },
    /// A new environment set up by a relational node.
    Fresh { binds: Vec<String> },
    /// A table, matrix or block matrix child.
    Relational,
}

fn names(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|x| x.to_string()).collect()
}
fn lambda(xs: &[&String]) -> ChildScope {
    ChildScope::Bind {
        binds: xs.iter().map(|x| x.to_string()).collect(),
        barrier: true,
    }
}
fn branch() -> ChildScope {
    ChildScope::Bind {
        binds: vec![],
        barrier: true,
    }
}
fn fresh(xs: &[&str]) -> ChildScope {
    ChildScope::Fresh { binds: names(xs) }
}

const TABLE_ROW: &[&str] = &["global", "row"];
const MATRIX_ROW: &[&str] = &["global", "va"];
const MATRIX_COL: &[&str] = &["global", "sa"];
const MATRIX_ENTRY: &[&str] = &["global", "va", "sa", "g"];

impl Ir {
    /// The scope of the `i`-th child.
    pub fn child_scope(&self, i: usize) -> ChildScope {
        use IrKind::*;

        if self.child(i).class() != IrClass::Value {
            return ChildScope::Relational;
        }
        match self.kind() {
            If if i > 0 => branch(),
            Coalesce if i > 0 => branch(),
            Let(name) if i == 1 => ChildScope::Bind {
                binds: vec![name.clone()],
                barrier: false,
            },
            AggLet { is_scan, .. } if i == 0 => ChildScope::Agg { is_scan: *is_scan },
            AggLet { name, .. } if i == 1 => ChildScope::Bind {
                binds: vec![name.clone()],
                barrier: false,
            },
            ArraySort { left, right } if i == 1 => lambda(&[left, right]),
            ArrayLeftJoinDistinct { left, right } if i >= 2 => lambda(&[left, right]),
            NDArrayMap(name) | ArrayMap(name) | ArrayFilter(name) | ArrayFlatMap(name)
            | ArrayFor(name)
                if i == 1 =>
            {
                lambda(&[name])
            }
            ArrayFold { accum, value } | ArrayScan { accum, value } if i == 2 => {
                lambda(&[accum, value])
            }
            Uniroot(name) if i == 0 => lambda(&[name]),
            AggFilter { is_scan } | AggGroupBy { is_scan } => match i {
                0 => ChildScope::Agg { is_scan: *is_scan },
                _ => branch(),
            },
            AggExplode { name, is_scan } => match i {
                0 => ChildScope::Agg { is_scan: *is_scan },
                _ => lambda(&[name]),
            },
            AggArrayPerElement {
                element,
                index,
                is_scan,
            } => match i {
                0 => ChildScope::Agg { is_scan: *is_scan },
                _ => lambda(&[element, index]),
            },
            ApplyAggOp(call) | ApplyScanOp(call) => {
                if i < call.seq_start() {
                    branch()
                } else {
                    ChildScope::Agg {
                        is_scan: matches!(self.kind(), ApplyScanOp(_)),
                    }
                }
            }
            TableAggregate | TableFilter | TableMapRows | TableAggregateByKey => fresh(TABLE_ROW),
            TableMapGlobals | MatrixMapGlobals => fresh(&["global"]),
            TableParallelize(_) | ValueToBlockMatrix { .. } => fresh(&[]),
            MatrixAggregate | MatrixFilterEntries | MatrixMapEntries | MatrixMapRows
            | MatrixMapCols(_) => fresh(MATRIX_ENTRY),
            MatrixFilterRows => fresh(MATRIX_ROW),
            MatrixFilterCols => fresh(MATRIX_COL),
            MatrixAggregateRowsByKey => match i {
                1 => fresh(MATRIX_ENTRY),
                _ => fresh(MATRIX_ROW),
            },
            MatrixAggregateColsByKey => match i {
                1 => fresh(MATRIX_ENTRY),
                _ => fresh(MATRIX_COL),
            },
            BlockMatrixMap => fresh(&["element"]),
            BlockMatrixMap2 => fresh(&["l", "r"]),
            _ => ChildScope::Same,
        }
    }

    /// The names this node refers to but does not bind.
    pub fn free_vars(&self) -> BTreeSet<String> {
        self.free_vars_cached(&mut HashMap::new())
    }

    /// As [`Ir::free_vars`], memoizing the sets of the subtrees in `cache`.
    pub(crate) fn free_vars_cached(
        &self,
        cache: &mut HashMap<IrRef, BTreeSet<String>>,
    ) -> BTreeSet<String> {
        if let IrKind::Ref(name) = self.kind() {
            return BTreeSet::from([name.clone()]);
        }
        let mut r = BTreeSet::new();
        for (i, c) in self.children().iter().enumerate() {
            let mut fv = match cache.get(c) {
                Some(fv) => fv.clone(),
                None => {
                    let fv = c.free_vars_cached(cache);
                    cache.insert(c.clone(), fv.clone());
                    fv
                }
            };
            match self.child_scope(i) {
                ChildScope::Bind { binds, .. } | ChildScope::Fresh { binds } => {
                    for b in binds.iter() {
                        fv.remove(b);
                    }
                }
                _ => {}
            }
            r.append(&mut fv);
        }
        r
    }

    /// Every name bound or referred to anywhere in the tree.
    pub fn all_names(&self) -> BTreeSet<String> {
        let mut r = BTreeSet::new();
        let mut todo = vec![self];
        while let Some(n) = todo.pop() {
            if let IrKind::Ref(name) = n.kind() {
                r.insert(name.clone());
            }
            for (i, c) in n.children().iter().enumerate() {
                if let ChildScope::Bind { binds, .. } | ChildScope::Fresh { binds } = n.child_scope(i) {
                    r.extend(binds);
                }
                todo.push(c);
            }
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use super::*;

    #[test]
    fn lambda_binds_its_names() {
        let body = Ir::binary(BinaryOp::Add, Ir::reference("x"), Ir::reference("y"));
        let map = Ir::new(
            IrKind::ArrayMap("x".into()),
            vec![Ir::reference("a"), body],
        );
        assert_eq!(
            map.free_vars(),
            BTreeSet::from(["a".to_string(), "y".to_string()])
        );
        assert_eq!(
            map.child_scope(1),
            ChildScope::Bind {
                binds: vec!["x".into()],
                barrier: true
            }
        );
        assert_eq!(map.child_scope(0), ChildScope::Same);
    }

    #[test]
    fn aggregation_scopes() {
        let agg = Ir::apply_agg_op(
            "Take",
            vec![Ir::i32(5)],
            Some(vec![Ir::i32(1)]),
            vec![Ir::get_field(Ir::reference("row"), "x")],
        );
        assert_eq!(
            agg.child_scope(0),
            ChildScope::Bind {
                binds: vec![],
                barrier: true
            }
        );
        assert_eq!(agg.child_scope(2), ChildScope::Agg { is_scan: false });

        let q = Ir::table_aggregate(Ir::table_range(5, Some(1)), agg);
        assert_eq!(q.child_scope(0), ChildScope::Relational);
        assert!(q.free_vars().is_empty());
    }

    #[test]
    fn let_shadowing() {
        let x = Ir::let_in(
            "x",
            Ir::reference("x"),
            Ir::binary(BinaryOp::Mul, Ir::reference("x"), Ir::reference("z")),
        );
        assert_eq!(
            x.free_vars(),
            BTreeSet::from(["x".to_string(), "z".to_string()])
        );
    }
}
