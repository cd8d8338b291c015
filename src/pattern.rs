// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Pattern matching against IR statements and edges, and the closed set
//! of effects ([`Outcome`]) a matched rule may apply. Replaces the
//! original's dynamic dispatch on outcome objects with a closed enum, per
//! the design notes on statically-typed reimplementations.

use std::rc::Rc;

use crate::context::RuleContext;
use crate::diagnostics::Reporter;
use crate::exploded_graph::{ExplodedGraph, ExplodedNodeId};
use crate::ir::IrProvider;
use crate::shape::{ShapeChange, State};

/// A single match of a pattern against a statement or edge.
pub struct Match<P: IrProvider> {
    stateful_var: P::Var,
    description: String,
}

impl<P: IrProvider> Match<P> {
    pub fn new(stateful_var: P::Var, description: impl Into<String>) -> Self {
        Match { stateful_var, description: description.into() }
    }

    /// The variable whose state this match cares about. Takes `ctx` for
    /// symmetry with the original (where resolving the bound variable
    /// could, for named patterns, require a context lookup); concrete
    /// matches in this engine always carry the variable directly.
    pub fn stateful_var(&self, _ctx: &RuleContext<P>) -> P::Var {
        self.stateful_var.clone()
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl<P: IrProvider> Clone for Match<P> {
    fn clone(&self) -> Self {
        Match { stateful_var: self.stateful_var.clone(), description: self.description.clone() }
    }
}

impl<P: IrProvider> PartialEq for Match<P> {
    fn eq(&self, other: &Self) -> bool {
        self.stateful_var == other.stateful_var && self.description == other.description
    }
}

impl<P: IrProvider> Eq for Match<P> {}

impl<P: IrProvider> std::hash::Hash for Match<P> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.stateful_var.hash(state);
        self.description.hash(state);
    }
}

/// A rule's left-hand side.
pub trait Pattern<P: IrProvider> {
    /// Matches against a statement reached via `edge`.
    fn iter_matches(&self, stmt: &P::Stmt, edge: &P::Edge, ctx: &RuleContext<P>) -> Vec<Match<P>>;

    /// Matches purely on an edge with no statement of its own at its
    /// source (e.g. a branch condition such as `p != NULL` that a host IR
    /// encodes as edge metadata on a terminator rather than as a
    /// statement). `ir` is handed separately from the edge so an
    /// implementation can resolve the edge's source node (via
    /// [`IrProvider::edge_source`]) when it needs more than the edge
    /// handle itself. Most patterns never fire here.
    fn iter_expedge_matches(
        &self,
        _ir: &P,
        _edge: &P::Edge,
        _graph: &ExplodedGraph<P>,
        _ctx: &RuleContext<P>,
    ) -> Vec<Match<P>> {
        Vec::new()
    }
}

/// Everything an [`Outcome`] needs to mutate the exploded graph or report
/// a diagnostic for one match.
pub struct MatchContext<'a, P: IrProvider> {
    pub ir: &'a P,
    pub ctx: &'a RuleContext<P>,
    pub graph: &'a mut ExplodedGraph<P>,
    pub reporter: &'a mut Reporter<P>,
    pub src: ExplodedNodeId,
    pub edge: P::Edge,
    pub m: Match<P>,
}

/// A closed set of rule effects.
pub enum Outcome<P: IrProvider> {
    /// Moves the matched variable to a new state, installing the
    /// resulting exploded node and edge.
    TransitionToState(State),
    /// Buffers (or immediately emits) a diagnostic, optionally also
    /// transitioning the matched variable — e.g. to a terminal `error`
    /// state later rules can key off of.
    EmitDiagnostic { message: String, then_state: Option<State> },
    /// Runs a checker-supplied closure against the match context; the
    /// escape hatch for effects the other two variants can't express.
    RunScript(Rc<dyn Fn(&mut MatchContext<P>)>),
}

impl<P: IrProvider> Outcome<P> {
    /// Every state this outcome might produce, needed by
    /// [`RuleContext::compile`]'s reachability closure. `RunScript` is
    /// opaque to static analysis and contributes nothing.
    pub fn iter_reachable_states(&self) -> Vec<State> {
        match self {
            Outcome::TransitionToState(state) => vec![state.clone()],
            Outcome::EmitDiagnostic { then_state, .. } => then_state.iter().cloned().collect(),
            Outcome::RunScript(_) => Vec::new(),
        }
    }

    pub fn apply(&self, mc: &mut MatchContext<P>) {
        match self {
            Outcome::TransitionToState(state) => transition(mc, state.clone()),
            Outcome::EmitDiagnostic { message, then_state } => {
                mc.reporter.add_error(mc.graph, mc.ir, mc.src, Some(mc.m.clone()), message.clone());
                if let Some(state) = then_state {
                    transition(mc, state.clone());
                }
            }
            Outcome::RunScript(f) => f(mc),
        }
    }
}

fn transition<P: IrProvider>(mc: &mut MatchContext<P>, state: State) {
    let mut change = ShapeChange::new(mc.graph.shape_of(mc.src));
    change.set_state(mc.m.stateful_var(mc.ctx), state);
    let dst_shape = change.into_dst_shape();
    mc.graph.intern_successor(mc.ir, mc.src, mc.edge.clone(), Some(mc.m.clone()), dst_shape);
}

/// A pattern paired with the outcomes applied on every match, in declared
/// order.
pub struct PatternRule<P: IrProvider> {
    pub pattern: Rc<dyn Pattern<P>>,
    pub outcomes: Vec<Outcome<P>>,
}
