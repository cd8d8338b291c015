// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The contract this engine expects from an IR provider.
//!
//! Everything in this module is a seam: the real host compiler implements
//! these traits over its own intermediate representation (statements,
//! basic blocks, interprocedural call/return edges). The solver in
//! [`crate::exploded_graph`] is generic over them and knows nothing about
//! any concrete IR.

use std::fmt::Debug;
use std::hash::Hash;

/// A handle to an IR variable declaration (local, parameter, or SSA name
/// already canonicalised to its underlying declaration).
///
/// `Ord` is required so that [`crate::shape::Shape::iter_aliases`] can
/// yield a deterministic, sorted order — diagnostic output must be
/// reproducible across runs.
pub trait Variable: Eq + Ord + Hash + Clone + Debug {}
impl<T: Eq + Ord + Hash + Clone + Debug> Variable for T {}

/// A source location (file, line, column), ordered so that diagnostics can
/// be sorted into source order.
pub trait Location: Eq + Ord + Clone + Debug {}
impl<T: Eq + Ord + Clone + Debug> Location for T {}

/// How an interprocedural or intraprocedural edge should be treated by the
/// transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// The intraprocedural continuation of a call statement to its
    /// return site; skipped, since the interprocedural path handles it.
    CallToReturnSite,
    /// From a call statement to the callee's entry node.
    CallToCalleeEntry,
    /// From a callee's exit node back to the caller's return site.
    ExitToReturnSite,
    /// Any other edge within a single function.
    Intraprocedural,
}

/// How a statement should be treated by the transfer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    /// `x = y`, a bare variable-to-variable copy.
    AssignCopy,
    /// `x = obj.field`, a field projection.
    AssignField,
    /// Any other kind of assignment (not state-propagating by itself).
    AssignOther,
    /// An SSA phi node with a single predecessor value in view.
    Phi,
    /// Anything else: the candidate for rule matching.
    Other,
}

/// The pairing of a call's formal parameters with its actual arguments,
/// used on [`EdgeKind::CallToCalleeEntry`] edges.
pub struct CallArgs<'a, V> {
    pub params_and_args: &'a [(V, V)],
}

/// The l-value of the original call (if any) and the callee's return
/// variable (if any), used on [`EdgeKind::ExitToReturnSite`] edges.
#[derive(Debug, Clone)]
pub struct ExitValues<V> {
    pub caller_lhs: Option<V>,
    pub callee_retval: Option<V>,
}

/// The l-value and r-value of a copy/field assignment.
#[derive(Debug, Clone)]
pub struct Assignment<V> {
    pub lhs: V,
    /// For [`StmtKind::AssignCopy`] this is the source variable; for
    /// [`StmtKind::AssignField`] this is the container variable being
    /// projected into.
    pub rhs: V,
}

/// The interprocedural + intraprocedural statement graph the solver walks.
///
/// `Node` and `Edge` are opaque handles (typically indices) that the
/// provider hands back out of its own graph; the engine never constructs
/// them, only stores and compares them.
pub trait IrProvider {
    type Var: Variable;
    type Loc: Location;
    type Node: Eq + Hash + Clone + Debug;
    type Edge: Eq + Hash + Clone + Debug;
    type Function: Eq + Hash + Clone + Debug;
    /// Opaque handle to a single statement at a node, for rule matching.
    type Stmt: Clone + Debug;

    /// Every entry node of the supergraph (one per function with no
    /// callers modeled, typically just the harness/main entry points).
    fn entry_nodes(&self) -> Vec<Self::Node>;

    /// Outgoing edges of a node, in declaration order.
    fn successors(&self, node: &Self::Node) -> Vec<Self::Edge>;

    fn edge_kind(&self, edge: &Self::Edge) -> EdgeKind;
    fn edge_source(&self, edge: &Self::Edge) -> Self::Node;
    fn edge_dest(&self, edge: &Self::Edge) -> Self::Node;

    /// The statement occupying a node, if any (`ENTRY`/`EXIT` nodes have
    /// none).
    fn stmt_at(&self, node: &Self::Node) -> Option<Self::Stmt>;
    fn stmt_kind(&self, stmt: &Self::Stmt) -> StmtKind;

    /// Valid only when [`Self::stmt_kind`] returned [`StmtKind::AssignCopy`]
    /// or [`StmtKind::AssignField`].
    fn assignment(&self, stmt: &Self::Stmt) -> Assignment<Self::Var>;

    /// Valid only for [`StmtKind::Phi`]: the single predecessor value in
    /// view for this edge.
    fn phi_rhs(&self, stmt: &Self::Stmt, edge: &Self::Edge) -> Self::Var;

    /// Valid only for [`StmtKind::Phi`]: the variable the phi node
    /// assigns.
    fn phi_lhs(&self, stmt: &Self::Stmt) -> Self::Var;

    /// Valid only on [`EdgeKind::CallToCalleeEntry`] edges.
    fn call_args(&self, edge: &Self::Edge) -> Vec<(Self::Var, Self::Var)>;

    /// Valid only on [`EdgeKind::ExitToReturnSite`] edges.
    fn exit_values(&self, edge: &Self::Edge) -> ExitValues<Self::Var>;

    /// The callee being returned from, on an [`EdgeKind::ExitToReturnSite`]
    /// edge; used to purge its locals and parameters from the shape.
    fn callee_function(&self, edge: &Self::Edge) -> Self::Function;

    /// Every local declaration and parameter of a function, purged from
    /// the shape on return.
    fn locals_and_params(&self, function: &Self::Function) -> Vec<Self::Var>;

    /// The function a node belongs to, used to group diagnostics and to
    /// fall back to a function's end location.
    fn function_of(&self, node: &Self::Node) -> Self::Function;

    /// The source file a node's location belongs to. Tracked independently
    /// of [`Self::function_of`] when grouping diagnostics: a function's
    /// body can itself span more than one physical file (macro expansion,
    /// header-inlined definitions), so the two are not interchangeable.
    fn file_of(&self, node: &Self::Node) -> String;

    /// Best-effort location of a node; `None` for synthetic nodes with no
    /// source mapping. Callers fall back to the enclosing function's end
    /// location in that case.
    fn location_of(&self, node: &Self::Node) -> Option<Self::Loc>;
    fn function_end_location(&self, function: &Self::Function) -> Self::Loc;

    /// Is this a kind of expression that carries checker state at all? The
    /// default rule-of-thumb is "pointer-typed"; a concrete checker
    /// definition narrows this further via its stateful declaration's
    /// matcher (see [`crate::context::RuleContext::is_stateful_var`]).
    fn is_stateful_var(&self, var: &Self::Var) -> bool;
}
