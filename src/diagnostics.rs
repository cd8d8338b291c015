// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Buffering, sorting, and witness-path narration of diagnostics raised
//! by rule outcomes.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::context::RuleContext;
use crate::exploded_graph::{ExplodedGraph, ExplodedNodeId};
use crate::ir::IrProvider;
use crate::pattern::Match;

/// Where the engine sends user-facing text. The engine never writes to
/// stdout itself; every diagnostic goes through one of these two
/// channels.
pub trait DiagnosticSink<L> {
    fn error(&mut self, loc: &L, msg: &str);
    fn note(&mut self, loc: &L, msg: &str);
}

/// An in-memory sink, mainly useful for tests: records every call rather
/// than printing it anywhere.
#[derive(Debug, Default)]
pub struct RecordingSink<L> {
    pub errors: Vec<(L, String)>,
    pub notes: Vec<(L, String)>,
}

impl<L: Clone> DiagnosticSink<L> for RecordingSink<L> {
    fn error(&mut self, loc: &L, msg: &str) {
        self.errors.push((loc.clone(), msg.to_string()));
    }

    fn note(&mut self, loc: &L, msg: &str) {
        self.notes.push((loc.clone(), msg.to_string()));
    }
}

struct BufferedError<P: IrProvider> {
    node: ExplodedNodeId,
    m: Option<Match<P>>,
    msg: String,
    loc: P::Loc,
}

impl<P: IrProvider> PartialEq for BufferedError<P> {
    fn eq(&self, other: &Self) -> bool {
        self.loc == other.loc
    }
}
impl<P: IrProvider> Eq for BufferedError<P> {}
impl<P: IrProvider> PartialOrd for BufferedError<P> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<P: IrProvider> Ord for BufferedError<P> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.loc.cmp(&other.loc)
    }
}

/// Buffers (or immediately emits) errors raised while the solver runs,
/// and turns buffered errors into sorted, witness-path-narrated output at
/// the end of [`crate::solve`].
pub struct Reporter<P: IrProvider> {
    cache_errors: bool,
    buffered: Vec<BufferedError<P>>,
    sink: Box<dyn DiagnosticSink<P::Loc>>,
}

impl<P: IrProvider> Reporter<P> {
    pub fn new(cache_errors: bool, sink: Box<dyn DiagnosticSink<P::Loc>>) -> Self {
        Reporter { cache_errors, buffered: Vec::new(), sink }
    }

    /// Called from [`crate::pattern::Outcome::apply`] (with a triggering
    /// [`Match`]) and from the exit transfer's own leak check (with
    /// `None`, since a leak has no single pattern match to narrate).
    /// When caching is disabled the error goes straight to the sink
    /// (aids debugging internal crashes, at the cost of sorted/grouped
    /// output); otherwise it's buffered for [`Self::emit_all`].
    pub fn add_error(
        &mut self,
        graph: &ExplodedGraph<P>,
        ir: &P,
        node: ExplodedNodeId,
        m: Option<Match<P>>,
        msg: String,
    ) {
        let loc = node_location(ir, graph, node);
        if self.cache_errors {
            self.buffered.push(BufferedError { node, m, msg, loc });
        } else {
            self.sink.error(&loc, &msg);
        }
    }

    /// Sorts buffered errors by location, groups consecutive errors by
    /// function, and for each one narrates the shortest witness path from
    /// an entrypoint. A no-op when caching is disabled (those errors were
    /// already emitted as they were found).
    pub fn emit_all(&mut self, graph: &ExplodedGraph<P>, ir: &P, ctx: &RuleContext<P>) {
        if !self.cache_errors {
            return;
        }
        self.buffered.sort();

        let mut current_group: Option<(P::Function, String)> = None;
        for err in &self.buffered {
            let inner = graph.inner_of(err.node);
            let group = (ir.function_of(inner), ir.file_of(inner));
            if current_group.as_ref() != Some(&group) {
                self.sink.note(&err.loc, &format!("in function {:?}, file {}", group.0, group.1));
                current_group = Some(group);
            }

            self.sink.error(&err.loc, &err.msg);

            let path = shortest_witness_path(graph, err.node);
            let Some(ref m) = err.m else { continue };
            let var = m.stateful_var(ctx);
            for &edge_idx in &path {
                let edge = &graph.edges()[edge_idx];
                // LIMITATION: compares the matched variable's state by
                // identity, not the specific StateCell of interest, so an
                // aliasing rename across a call can go unnoted on the
                // witness path. Mirrors the known gap in the original's
                // path renderer; preserved rather than silently patched.
                let src_state = graph.shape_of(edge.src).get_state(&var);
                let dst_state = graph.shape_of(edge.dst).get_state(&var);
                if src_state != dst_state {
                    if let Some(edge_m) = &edge.m {
                        // The note belongs at the statement that matched
                        // (e.g. the `free(p)` call), which sits on the
                        // edge's source node, not where it transitions to.
                        let loc = node_location(ir, graph, edge.src);
                        self.sink.note(&loc, edge_m.description());
                    }
                }
            }
            if path.len() > 1 {
                self.sink.error(&err.loc, &err.msg);
            }
        }
    }
}

fn node_location<P: IrProvider>(ir: &P, graph: &ExplodedGraph<P>, node: ExplodedNodeId) -> P::Loc {
    let inner = graph.inner_of(node);
    match ir.location_of(inner) {
        Some(loc) => loc,
        None => ir.function_end_location(&ir.function_of(inner)),
    }
}

/// Breadth-first search from every entrypoint simultaneously, so the path
/// found is shortest across all of them, not just the first one tried.
/// Returns the sequence of edge indices (in [`ExplodedGraph::edges`])
/// from the entrypoint to `target`, or empty if `target` is itself an
/// entrypoint (or unreachable, which should not happen for a node the
/// solver actually interned).
fn shortest_witness_path<P: IrProvider>(graph: &ExplodedGraph<P>, target: ExplodedNodeId) -> Vec<usize> {
    let mut visited: HashSet<ExplodedNodeId> = HashSet::new();
    let mut prev: HashMap<ExplodedNodeId, usize> = HashMap::new();
    let mut queue: VecDeque<ExplodedNodeId> = VecDeque::new();

    for &e in graph.entrypoints() {
        if visited.insert(e) {
            queue.push_back(e);
        }
    }

    while let Some(node) = queue.pop_front() {
        if node == target {
            break;
        }
        for (edge_idx, edge) in graph.edges_from(node) {
            if visited.insert(edge.dst) {
                prev.insert(edge.dst, edge_idx);
                queue.push_back(edge.dst);
            }
        }
    }

    let mut path = Vec::new();
    let mut cur = target;
    while let Some(&edge_idx) = prev.get(&cur) {
        path.push(edge_idx);
        cur = graph.edges()[edge_idx].src;
    }
    path.reverse();
    path
}
