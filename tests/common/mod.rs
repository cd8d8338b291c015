// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! A minimal, hand-built IR provider used to exercise the solver
//! end-to-end without a real host compiler.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use smcheck::ir::{Assignment, EdgeKind, ExitValues, IrProvider, StmtKind};
pub use smcheck::diagnostics::RecordingSink;
use smcheck::DiagnosticSink;

pub type Var = &'static str;
pub type Loc = (u32, u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    Call { lhs: Option<Var>, callee: &'static str, args: Vec<Var> },
    AssignCopy { lhs: Var, rhs: Var },
    Deref { var: Var },
    /// A branch condition `var != NULL`; classified as `StmtKind::Other`
    /// so patterns decide true/false by inspecting the edge they're
    /// handed, the same way they'd inspect any other statement's edge.
    Cond { var: Var },
}

#[derive(Default)]
struct NodeData {
    function: &'static str,
    loc: Option<Loc>,
    stmt: Option<Stmt>,
}

struct EdgeData {
    src: usize,
    dst: usize,
    kind: EdgeKind,
    call_args: Vec<(Var, Var)>,
    exit: Option<ExitValues<Var>>,
    callee_fn: Option<&'static str>,
}

/// Builds a [`FakeIr`] node-by-node and edge-by-edge; every e2e scenario
/// wires up its own tiny supergraph this way.
#[derive(Default)]
pub struct FakeIrBuilder {
    nodes: Vec<NodeData>,
    edges: Vec<EdgeData>,
    locals: HashMap<&'static str, Vec<Var>>,
    fn_end_loc: HashMap<&'static str, Loc>,
    stateful_vars: HashSet<Var>,
}

impl FakeIrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&mut self, function: &'static str, loc: Option<Loc>, stmt: Option<Stmt>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(NodeData { function, loc, stmt });
        id
    }

    pub fn edge_intra(&mut self, src: usize, dst: usize) -> usize {
        self.push_edge(src, dst, EdgeKind::Intraprocedural, Vec::new(), None, None)
    }

    pub fn edge_call_to_return(&mut self, src: usize, dst: usize) {
        self.push_edge(src, dst, EdgeKind::CallToReturnSite, Vec::new(), None, None);
    }

    pub fn edge_call_to_entry(&mut self, src: usize, dst: usize, call_args: Vec<(Var, Var)>) {
        self.push_edge(src, dst, EdgeKind::CallToCalleeEntry, call_args, None, None);
    }

    pub fn edge_exit_to_return(&mut self, src: usize, dst: usize, exit: ExitValues<Var>, callee_fn: &'static str) {
        self.push_edge(src, dst, EdgeKind::ExitToReturnSite, Vec::new(), Some(exit), Some(callee_fn));
    }

    fn push_edge(
        &mut self,
        src: usize,
        dst: usize,
        kind: EdgeKind,
        call_args: Vec<(Var, Var)>,
        exit: Option<ExitValues<Var>>,
        callee_fn: Option<&'static str>,
    ) -> usize {
        let id = self.edges.len();
        self.edges.push(EdgeData { src, dst, kind, call_args, exit, callee_fn });
        id
    }

    pub fn set_locals(&mut self, function: &'static str, locals: Vec<Var>) {
        self.locals.insert(function, locals);
    }

    pub fn set_fn_end(&mut self, function: &'static str, loc: Loc) {
        self.fn_end_loc.insert(function, loc);
    }

    pub fn mark_stateful(&mut self, var: Var) {
        self.stateful_vars.insert(var);
    }

    pub fn build(self, entries: Vec<usize>) -> FakeIr {
        let mut successors: HashMap<usize, Vec<usize>> = HashMap::new();
        for (idx, edge) in self.edges.iter().enumerate() {
            successors.entry(edge.src).or_default().push(idx);
        }
        FakeIr {
            nodes: self.nodes,
            edges: self.edges,
            entries,
            successors,
            locals: self.locals,
            fn_end_loc: self.fn_end_loc,
            stateful_vars: self.stateful_vars,
        }
    }
}

pub struct FakeIr {
    nodes: Vec<NodeData>,
    edges: Vec<EdgeData>,
    entries: Vec<usize>,
    successors: HashMap<usize, Vec<usize>>,
    locals: HashMap<&'static str, Vec<Var>>,
    fn_end_loc: HashMap<&'static str, Loc>,
    stateful_vars: HashSet<Var>,
}

impl fmt::Debug for FakeIr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeIr").field("nodes", &self.nodes.len()).field("edges", &self.edges.len()).finish()
    }
}

impl fmt::Debug for NodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeData").field("function", &self.function).field("stmt", &self.stmt).finish()
    }
}

impl IrProvider for FakeIr {
    type Var = Var;
    type Loc = Loc;
    type Node = usize;
    type Edge = usize;
    type Function = &'static str;
    type Stmt = Stmt;

    fn entry_nodes(&self) -> Vec<usize> {
        self.entries.clone()
    }

    fn successors(&self, node: &usize) -> Vec<usize> {
        self.successors.get(node).cloned().unwrap_or_default()
    }

    fn edge_kind(&self, edge: &usize) -> EdgeKind {
        self.edges[*edge].kind
    }

    fn edge_source(&self, edge: &usize) -> usize {
        self.edges[*edge].src
    }

    fn edge_dest(&self, edge: &usize) -> usize {
        self.edges[*edge].dst
    }

    fn stmt_at(&self, node: &usize) -> Option<Stmt> {
        self.nodes[*node].stmt.clone()
    }

    fn stmt_kind(&self, stmt: &Stmt) -> StmtKind {
        match stmt {
            Stmt::AssignCopy { .. } => StmtKind::AssignCopy,
            Stmt::Call { .. } | Stmt::Deref { .. } | Stmt::Cond { .. } => StmtKind::Other,
        }
    }

    fn assignment(&self, stmt: &Stmt) -> Assignment<Var> {
        match stmt {
            Stmt::AssignCopy { lhs, rhs } => Assignment { lhs: *lhs, rhs: *rhs },
            _ => panic!("assignment() called on a non-assignment statement"),
        }
    }

    fn phi_rhs(&self, _stmt: &Stmt, _edge: &usize) -> Var {
        unreachable!("this fake IR never produces phi nodes")
    }

    fn phi_lhs(&self, _stmt: &Stmt) -> Var {
        unreachable!("this fake IR never produces phi nodes")
    }

    fn call_args(&self, edge: &usize) -> Vec<(Var, Var)> {
        self.edges[*edge].call_args.clone()
    }

    fn exit_values(&self, edge: &usize) -> ExitValues<Var> {
        self.edges[*edge]
            .exit
            .clone()
            .expect("exit_values() called on a non-exit-to-return edge")
    }

    fn callee_function(&self, edge: &usize) -> &'static str {
        self.edges[*edge].callee_fn.expect("callee_function() called on a non-exit-to-return edge")
    }

    fn locals_and_params(&self, function: &&'static str) -> Vec<Var> {
        self.locals.get(function).cloned().unwrap_or_default()
    }

    fn function_of(&self, node: &usize) -> &'static str {
        self.nodes[*node].function
    }

    fn file_of(&self, node: &usize) -> String {
        format!("{}.c", self.nodes[*node].function)
    }

    fn location_of(&self, node: &usize) -> Option<Loc> {
        self.nodes[*node].loc
    }

    fn function_end_location(&self, function: &&'static str) -> Loc {
        self.fn_end_loc.get(function).copied().unwrap_or((u32::MAX, 0))
    }

    fn is_stateful_var(&self, var: &Var) -> bool {
        self.stateful_vars.contains(var)
    }
}

/// A [`DiagnosticSink`] that forwards to a [`RecordingSink`] shared with the
/// caller, so a test can still inspect what was recorded after `solve`
/// takes ownership of the boxed sink it's handed.
pub struct SharedSink<L> {
    inner: Rc<RefCell<RecordingSink<L>>>,
}

impl<L> SharedSink<L> {
    pub fn new() -> (Self, Rc<RefCell<RecordingSink<L>>>) {
        let inner = Rc::new(RefCell::new(RecordingSink::default()));
        (SharedSink { inner: inner.clone() }, inner)
    }
}

impl<L: Clone> DiagnosticSink<L> for SharedSink<L> {
    fn error(&mut self, loc: &L, msg: &str) {
        self.inner.borrow_mut().error(loc, msg);
    }

    fn note(&mut self, loc: &L, msg: &str) {
        self.inner.borrow_mut().note(loc, msg);
    }
}
