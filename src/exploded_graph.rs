// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The product graph of `(IR node, Shape)`, built by worklist fixpoint,
//! and the transfer function that drives its construction.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::context::RuleContext;
use crate::diagnostics::Reporter;
use crate::ir::{EdgeKind, IrProvider, StmtKind};
use crate::pattern::{Match, MatchContext};
use crate::shape::{Shape, ShapeChange};

pub type ExplodedNodeId = usize;

struct ExplodedNode<P: IrProvider> {
    inner: P::Node,
    shape: Shape<P::Var>,
}

pub struct ExplodedEdgeRec<P: IrProvider> {
    pub src: ExplodedNodeId,
    pub dst: ExplodedNodeId,
    pub inner_edge: P::Edge,
    pub m: Option<Match<P>>,
}

/// The exploded graph under construction (or, once `solve` returns,
/// finished). Node interning mirrors the original's `_nodedict`:
/// re-entering an already-seen `(inner node, Shape)` pair is a no-op
/// rather than growing the graph, which is what makes the worklist
/// terminate. Edge identity additionally includes the firing `Match` (per
/// spec.md §3: "identity includes the match and shape-change so that
/// distinct rule firings produce distinct edges") -- two rules that fire
/// on the same `(src, dst, inner edge)` triple with different matches
/// (different stateful variable or description) must not collapse into
/// one edge, or the second rule's diagnostic note would be silently
/// dropped from the witness path. The shape-change half of that identity
/// is already carried by `dst`: `dst`'s Shape *is* the result of the
/// shape-change that produced it, and Shape equality is structural
/// (spec.md §3), so two shape-changes that land on an equal Shape are
/// rightly the same destination rather than spuriously distinct edges.
pub struct ExplodedGraph<P: IrProvider> {
    nodes: Vec<ExplodedNode<P>>,
    node_index: HashMap<(P::Node, Shape<P::Var>), ExplodedNodeId>,
    edges: Vec<ExplodedEdgeRec<P>>,
    edge_index: HashSet<(ExplodedNodeId, ExplodedNodeId, P::Edge, Option<Match<P>>)>,
    adjacency: HashMap<ExplodedNodeId, Vec<usize>>,
    entrypoints: Vec<ExplodedNodeId>,
    worklist: Vec<ExplodedNodeId>,
}

impl<P: IrProvider> ExplodedGraph<P> {
    fn new() -> Self {
        ExplodedGraph {
            nodes: Vec::new(),
            node_index: HashMap::new(),
            edges: Vec::new(),
            edge_index: HashSet::new(),
            adjacency: HashMap::new(),
            entrypoints: Vec::new(),
            worklist: Vec::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn inner_of(&self, id: ExplodedNodeId) -> &P::Node {
        &self.nodes[id].inner
    }

    pub fn shape_of(&self, id: ExplodedNodeId) -> &Shape<P::Var> {
        &self.nodes[id].shape
    }

    pub fn entrypoints(&self) -> &[ExplodedNodeId] {
        &self.entrypoints
    }

    pub fn edges(&self) -> &[ExplodedEdgeRec<P>] {
        &self.edges
    }

    pub fn edges_from(&self, node: ExplodedNodeId) -> impl Iterator<Item = (usize, &ExplodedEdgeRec<P>)> {
        self.adjacency
            .get(&node)
            .into_iter()
            .flatten()
            .map(move |&idx| (idx, &self.edges[idx]))
    }

    fn intern_node(&mut self, inner: P::Node, shape: Shape<P::Var>) -> ExplodedNodeId {
        let key = (inner.clone(), shape.clone());
        if let Some(&id) = self.node_index.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(ExplodedNode { inner, shape });
        self.node_index.insert(key, id);
        self.worklist.push(id);
        id
    }

    fn intern_edge(&mut self, src: ExplodedNodeId, dst: ExplodedNodeId, inner_edge: P::Edge, m: Option<Match<P>>) {
        let key = (src, dst, inner_edge.clone(), m.clone());
        if self.edge_index.contains(&key) {
            return;
        }
        self.edge_index.insert(key);
        let idx = self.edges.len();
        self.edges.push(ExplodedEdgeRec { src, dst, inner_edge, m });
        self.adjacency.entry(src).or_default().push(idx);
    }

    /// Interns the destination `(inner node, shape)` reached by following
    /// `inner_edge` out of `src`, then interns the exploded edge itself.
    /// The single point every transfer-function branch and every
    /// [`crate::pattern::Outcome`] goes through to grow the graph.
    pub fn intern_successor(
        &mut self,
        ir: &P,
        src: ExplodedNodeId,
        inner_edge: P::Edge,
        m: Option<Match<P>>,
        dst_shape: Shape<P::Var>,
    ) -> ExplodedNodeId {
        let dst_inner = ir.edge_dest(&inner_edge);
        let dst = self.intern_node(dst_inner, dst_shape);
        self.intern_edge(src, dst, inner_edge, m);
        dst
    }

    fn add_entrypoint(&mut self, id: ExplodedNodeId) {
        self.entrypoints.push(id);
    }

    fn pop_worklist(&mut self) -> Option<ExplodedNodeId> {
        self.worklist.pop()
    }
}

/// Builds the exploded graph over `ir` under the rules of `ctx`, buffering
/// or emitting diagnostics through `reporter` as rule outcomes fire.
pub fn solve<P: IrProvider>(ir: &P, ctx: &RuleContext<P>, reporter: &mut Reporter<P>) -> ExplodedGraph<P> {
    let mut graph = ExplodedGraph::new();

    let entries = ir.entry_nodes();
    debug!(entries = entries.len(), "running solve for entry nodes");
    for entry in entries {
        let shape = Shape::new(ctx.default_state());
        let id = graph.intern_node(entry, shape);
        graph.add_entrypoint(id);
    }

    while let Some(src_id) = graph.pop_worklist() {
        let src_inner = graph.inner_of(src_id).clone();
        let src_shape = graph.shape_of(src_id).clone();
        for edge in ir.successors(&src_inner) {
            trace!(node = src_id, "stepping edge");
            step_edge(ir, ctx, reporter, &mut graph, src_id, &src_inner, &src_shape, edge);
        }
    }

    debug!(nodes = graph.node_count(), edges = graph.edges().len(), "interned exploded nodes");
    graph
}

fn step_edge<P: IrProvider>(
    ir: &P,
    ctx: &RuleContext<P>,
    reporter: &mut Reporter<P>,
    graph: &mut ExplodedGraph<P>,
    src_id: ExplodedNodeId,
    src_inner: &P::Node,
    src_shape: &Shape<P::Var>,
    edge: P::Edge,
) {
    match ir.edge_kind(&edge) {
        EdgeKind::CallToReturnSite => {
            // Skipped: the interprocedural call/exit pair handles this
            // call's effect; re-examining it here would double it up. No
            // edge is interned at all, so there is nothing for
            // `iter_expedge_matches` to re-examine either.
            return;
        }
        EdgeKind::CallToCalleeEntry => {
            let mut change = ShapeChange::new(src_shape);
            for (param, arg) in ir.call_args(&edge) {
                if ctx.is_stateful_var(ir, &arg) {
                    change.assign_var(param, arg);
                }
            }
            graph.intern_successor(ir, src_id, edge.clone(), None, change.into_dst_shape());
        }
        EdgeKind::ExitToReturnSite => {
            let mut change = ShapeChange::new(src_shape);
            let exit = ir.exit_values(&edge);
            if let (Some(lhs), Some(retval)) = (exit.caller_lhs, exit.callee_retval) {
                if ctx.is_stateful_var(ir, &retval) {
                    change.assign_var(lhs, retval);
                }
            }
            let callee = ir.callee_function(&edge);
            let locals = ir.locals_and_params(&callee);
            change.purge_locals(&locals);

            // A variable whose last alias is dropped by this purge while
            // still in a non-default state never reached a "released"
            // state before going out of scope: a leak. Not itself a rule
            // outcome (ShapeChange.iter_leaks is a primitive the exit
            // transfer itself consumes), so it's reported directly rather
            // than through a matched pattern.
            for var in change.iter_leaks() {
                let state = change.src_shape().get_state(&var);
                if state != ctx.default_state() {
                    reporter.add_error(graph, ir, src_id, None, format!("leaked value held by `{:?}`", var));
                }
            }

            graph.intern_successor(ir, src_id, edge.clone(), None, change.into_dst_shape());
        }
        EdgeKind::Intraprocedural => {
            step_intraprocedural(ir, ctx, reporter, graph, src_id, src_inner, src_shape, edge.clone());
        }
    }

    // spec.md §4.4: "After any exploded edge is interned, the engine
    // re-examines rule clauses" -- unconditionally, for every edge kind
    // that actually got interned above, not only statement-less nodes.
    // This can add further edges/diagnostics on top of whatever the
    // ordinary transfer already installed; it never replaces it.
    run_expedge_matching(ir, ctx, reporter, graph, src_id, src_shape, &edge);
}

fn step_intraprocedural<P: IrProvider>(
    ir: &P,
    ctx: &RuleContext<P>,
    reporter: &mut Reporter<P>,
    graph: &mut ExplodedGraph<P>,
    src_id: ExplodedNodeId,
    src_inner: &P::Node,
    src_shape: &Shape<P::Var>,
    edge: P::Edge,
) {
    let Some(stmt) = ir.stmt_at(src_inner) else {
        // ENTRY/EXIT and other statement-less nodes: no statement to match
        // against. The caller (`step_edge`) still re-examines this edge via
        // `iter_expedge_matches` afterward, so a branch condition folded
        // into edge metadata rather than a statement can still fire.
        graph.intern_successor(ir, src_id, edge, None, src_shape.clone());
        return;
    };

    trace!(kind = ?ir.stmt_kind(&stmt), "transferring statement");
    match ir.stmt_kind(&stmt) {
        StmtKind::AssignCopy => {
            let a = ir.assignment(&stmt);
            let mut change = ShapeChange::new(src_shape);
            change.assign_var(a.lhs, a.rhs);
            graph.intern_successor(ir, src_id, edge, None, change.into_dst_shape());
        }
        StmtKind::AssignField => {
            let a = ir.assignment(&stmt);
            if src_shape.var_has_state(&a.rhs) {
                // LIMITATION: aliasing the l-value onto the container's
                // cell collapses field-level state into container-level
                // state. Whether this is intended modelling or a
                // placeholder approximation is unclear upstream; preserved
                // as-is rather than guessed at.
                let mut change = ShapeChange::new(src_shape);
                change.assign_var(a.lhs, a.rhs);
                graph.intern_successor(ir, src_id, edge, None, change.into_dst_shape());
            } else {
                run_rule_matching(ir, ctx, reporter, graph, src_id, src_shape, edge, stmt);
            }
        }
        StmtKind::Phi => {
            let rhs = ir.phi_rhs(&stmt, &edge);
            let lhs = ir.phi_lhs(&stmt);
            let mut change = ShapeChange::new(src_shape);
            change.assign_var(lhs, rhs);
            graph.intern_successor(ir, src_id, edge, None, change.into_dst_shape());
        }
        StmtKind::AssignOther | StmtKind::Other => {
            run_rule_matching(ir, ctx, reporter, graph, src_id, src_shape, edge, stmt);
        }
    }
}

fn run_rule_matching<P: IrProvider>(
    ir: &P,
    ctx: &RuleContext<P>,
    reporter: &mut Reporter<P>,
    graph: &mut ExplodedGraph<P>,
    src_id: ExplodedNodeId,
    src_shape: &Shape<P::Var>,
    edge: P::Edge,
    stmt: P::Stmt,
) {
    let mut fired = false;
    for sc in ctx.state_clauses() {
        for pr in sc.rules() {
            let matches = pr.pattern.iter_matches(&stmt, &edge, ctx);
            for m in matches {
                let stateful_var = m.stateful_var(ctx);
                let src_state = src_shape.get_state(&stateful_var);
                if sc.states().contains(&src_state) {
                    fired = true;
                    debug!(state = %src_state, pattern = %m.description(), "rule matched");
                    for outcome in &pr.outcomes {
                        let mut mc = MatchContext {
                            ir,
                            ctx,
                            graph,
                            reporter,
                            src: src_id,
                            edge: edge.clone(),
                            m: m.clone(),
                        };
                        outcome.apply(&mut mc);
                    }
                }
            }
        }
    }
    if !fired {
        graph.intern_successor(ir, src_id, edge, None, src_shape.clone());
    }
}


/// Like [`run_rule_matching`] but for [`Pattern::iter_expedge_matches`],
/// run unconditionally after every edge the ordinary transfer interns
/// (see the call site in `step_edge`). Unlike statement matching, a fired
/// expedge match never suppresses a neutral successor -- the ordinary
/// transfer has already installed whatever it was going to install by the
/// time this runs, so there is nothing to gate.
fn run_expedge_matching<P: IrProvider>(
    ir: &P,
    ctx: &RuleContext<P>,
    reporter: &mut Reporter<P>,
    graph: &mut ExplodedGraph<P>,
    src_id: ExplodedNodeId,
    src_shape: &Shape<P::Var>,
    edge: &P::Edge,
) {
    for sc in ctx.state_clauses() {
        for pr in sc.rules() {
            let matches = pr.pattern.iter_expedge_matches(ir, edge, graph, ctx);
            for m in matches {
                let stateful_var = m.stateful_var(ctx);
                let src_state = src_shape.get_state(&stateful_var);
                if sc.states().contains(&src_state) {
                    debug!(state = %src_state, pattern = %m.description(), "expedge rule matched");
                    for outcome in &pr.outcomes {
                        let mut mc = MatchContext {
                            ir,
                            ctx,
                            graph,
                            reporter,
                            src: src_id,
                            edge: edge.clone(),
                            m: m.clone(),
                        };
                        outcome.apply(&mut mc);
                    }
                }
            }
        }
    }
}
