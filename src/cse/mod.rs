//! Rendering of IR trees to their textual form, binding every subtree that
//! occurs more than once in a lexical context to a `Let` (or, in an
//! aggregation context, an `AggLet`) placed at the root of the outermost
//! scope it may be evaluated in.
use std::collections::BTreeSet;

use log::*;
use logging_timer::time;

use crate::{
    ir::{write_pieces, IrRef},
    utils::escape_id,
};

mod analysis;

use analysis::{Analysis, BindingId, OccurrenceId, ScopeId};

pub const DEFAULT_PREFIX: &str = "__cse_";

/// Renders IR trees with common subexpressions bound once. The renderer
/// holds no state between calls: names are numbered from 1 for every
/// tree, so one renderer may be shared between threads.
#[derive(Debug, Clone)]
pub struct CseRenderer {
    prefix: String,
}
impl Default for CseRenderer {
    fn default() -> Self {
        CseRenderer {
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }
}

impl CseRenderer {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn with_prefix(prefix: &str) -> Self {
        CseRenderer {
            prefix: prefix.to_owned(),
        }
    }

    #[time("debug", "CSE rendering")]
    pub fn render(&self, ir: &IrRef) -> String {
        let analysis = Analysis::run(ir);
        let mut ctx = Context {
            analysis: &analysis,
            prefix: &self.prefix,
            taken: ir.all_names(),
            counter: 0,
            names: vec![None; analysis.bindings.len()],
        };
        let mut out = String::new();
        ctx.scope(&mut out, 0, analysis.root);
        debug!(
            "{} nodes, {} scopes, {} bindings",
            analysis.occurrences.len(),
            analysis.scopes.len(),
            ctx.counter
        );
        out
    }
}

/// Render `ir` with the default renderer.
pub fn render(ir: &IrRef) -> String {
    CseRenderer::new().render(ir)
}

/// The state of a single rendering.
struct Context<'a> {
    analysis: &'a Analysis,
    prefix: &'a str,
    /// Names already used in the tree, that new bindings must not shadow.
    taken: BTreeSet<String>,
    counter: usize,
    names: Vec<Option<String>>,
}

impl<'a> Context<'a> {
    fn fresh_name(&mut self) -> String {
        loop {
            self.counter += 1;
            let name = format!("{}{}", self.prefix, self.counter);
            if !self.taken.contains(&name) {
                return name;
            }
        }
    }

    /// Render the root of scope `s`, whose body is `body`: first the
    /// bindings homed in `s`, then the body.
    fn scope(&mut self, out: &mut String, s: ScopeId, body: OccurrenceId) {
        let analysis = self.analysis;
        let mut closing = 0;
        for &b in analysis.scopes[s].candidates.iter() {
            if !analysis.shared(b) {
                continue;
            }
            let name = self.fresh_name();
            let binding = &analysis.bindings[b];
            trace!(
                "binding {} to {} uses of {}",
                name,
                binding.count,
                analysis.occurrences[binding.first].ir.name()
            );
            match binding.agg {
                None => out.push_str(&format!("(Let {} ", escape_id(&name))),
                Some(is_scan) => out.push_str(&format!(
                    "(AggLet {} {} ",
                    escape_id(&name),
                    if is_scan { "True" } else { "False" }
                )),
            }
            self.node(out, binding.first);
            out.push(' ');
            self.names[b] = Some(name);
            closing += 1;
        }
        self.occurrence(out, body);
        for _ in 0..closing {
            out.push(')');
        }
    }

    fn occurrence(&mut self, out: &mut String, o: OccurrenceId) {
        let bound = self.analysis.occurrences[o]
            .binding
            .filter(|b| self.analysis.shared(*b))
            .and_then(|b: BindingId| self.names[b].clone());
        match bound {
            Some(name) => out.push_str(&format!("(Ref {})", escape_id(&name))),
            None => self.node(out, o),
        }
    }

    /// Render an occurrence in full, whether it is bound or not.
    fn node(&mut self, out: &mut String, o: OccurrenceId) {
        let analysis = self.analysis;
        let occurrence = &analysis.occurrences[o];
        write_pieces(out, &occurrence.ir.layout(), &mut |out, i| {
            let child = occurrence.children[i];
            match occurrence.scopes[i] {
                Some(s) => self.scope(out, s, child),
                None => self.occurrence(out, child),
            }
        });
    }
}
