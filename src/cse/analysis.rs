use std::collections::{BTreeSet, HashMap};

use log::*;

use crate::ir::{ChildScope, IrRef};

pub(crate) type ScopeId = usize;
pub(crate) type OccurrenceId = usize;
pub(crate) type BindingId = usize;

/// A region of the tree where bindings may be introduced, at its root.
pub(crate) struct Scope {
    /// How the scope was opened; `None` for the root of the tree.
    pub kind: Option<ChildScope>,
    pub parent: Option<ScopeId>,
    /// The bindings homed here, in the post-order of their first
    /// occurrence.
    pub candidates: Vec<BindingId>,
}

/// A subtree together with the place it could be bound at. Structurally
/// equal subtrees sharing a home and an aggregation context are the same
/// candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    ir: IrRef,
    home: ScopeId,
    /// `Some(is_scan)` when the subtree is evaluated in the aggregation
    /// (or scan) context of its home.
    agg: Option<bool>,
}

pub(crate) struct Binding {
    pub agg: Option<bool>,
    pub count: usize,
    pub first: OccurrenceId,
}

/// One visited node of the tree.
pub(crate) struct Occurrence {
    pub ir: IrRef,
    pub binding: Option<BindingId>,
    /// Repeated occurrences are not descended into.
    pub children: Vec<OccurrenceId>,
    /// For each child, the scope it opens if it does not live in ours.
    pub scopes: Vec<Option<ScopeId>>,
}

/// The counting pass: every node is visited once per lexical context, and
/// each shareable subtree is keyed by the outermost scope it may be
/// hoisted to.
pub(crate) struct Analysis {
    pub scopes: Vec<Scope>,
    pub occurrences: Vec<Occurrence>,
    pub bindings: Vec<Binding>,
    pub root: OccurrenceId,
    index: HashMap<Key, BindingId>,
    free: HashMap<IrRef, BTreeSet<String>>,
}

impl Analysis {
    pub fn run(ir: &IrRef) -> Analysis {
        let mut r = Analysis {
            scopes: vec![Scope {
                kind: None,
                parent: None,
                candidates: Vec::new(),
            }],
            occurrences: Vec::new(),
            bindings: Vec::new(),
            root: 0,
            index: HashMap::new(),
            free: HashMap::new(),
        };
        r.root = r.visit(ir, 0);
        r
    }

    pub fn shared(&self, b: BindingId) -> bool {
        self.bindings[b].count > 1
    }

    /// Where a node with free variables `fv` seen in `scope` should be
    /// bound, and in which aggregation context. `None` if it must stay
    /// where it is.
    fn home(&self, fv: &BTreeSet<String>, scope: ScopeId) -> Option<(ScopeId, Option<bool>)> {
        let mut current = scope;
        let mut agg = None;
        loop {
            let s = &self.scopes[current];
            let parent = match (&s.kind, s.parent) {
                (None, _) | (_, None) => return Some((current, agg)),
                (Some(kind), Some(parent)) => match kind {
                    ChildScope::Relational => return None,
                    ChildScope::Fresh { .. } => return Some((current, agg)),
                    ChildScope::Bind { binds, barrier } => {
                        if *barrier || binds.iter().any(|b| fv.contains(b)) {
                            return Some((current, agg));
                        }
                        parent
                    }
                    ChildScope::Agg { is_scan } => {
                        if agg.is_some() {
                            return None;
                        }
                        agg = Some(*is_scan);
                        parent
                    }
                    ChildScope::Same => parent,
                },
            };
            current = parent;
        }
    }

    fn open(&mut self, kind: ChildScope, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            kind: Some(kind),
            parent: Some(parent),
            candidates: Vec::new(),
        });
        self.scopes.len() - 1
    }

    fn visit(&mut self, ir: &IrRef, scope: ScopeId) -> OccurrenceId {
        let id = self.occurrences.len();
        self.occurrences.push(Occurrence {
            ir: ir.clone(),
            binding: None,
            children: Vec::new(),
            scopes: Vec::new(),
        });

        let key = if ir.is_shareable() {
            let fv = ir.free_vars_cached(&mut self.free);
            self.home(&fv, scope).map(|(home, agg)| Key {
                ir: ir.clone(),
                home,
                agg,
            })
        } else {
            None
        };

        if let Some(b) = key.as_ref().and_then(|k| self.index.get(k).copied()) {
            self.bindings[b].count += 1;
            self.occurrences[id].binding = Some(b);
            trace!("{} seen {} times", ir.name(), self.bindings[b].count);
            return id;
        }

        let mut children = Vec::with_capacity(ir.children().len());
        let mut scopes = Vec::with_capacity(ir.children().len());
        for (i, c) in ir.children().iter().enumerate() {
            let (child_scope, opened) = match ir.child_scope(i) {
                ChildScope::Same => (scope, None),
                kind => {
                    let s = self.open(kind, scope);
                    (s, Some(s))
                }
            };
            children.push(self.visit(c, child_scope));
            scopes.push(opened);
        }
        self.occurrences[id].children = children;
        self.occurrences[id].scopes = scopes;

        if let Some(key) = key {
            let b = self.bindings.len();
            self.bindings.push(Binding {
                agg: key.agg,
                count: 1,
                first: id,
            });
            self.scopes[key.home].candidates.push(b);
            self.occurrences[id].binding = Some(b);
            self.index.insert(key, b);
        }
        id
    }
}
