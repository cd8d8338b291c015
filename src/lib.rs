// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! A rule-driven, exploded-graph dataflow engine for building small
//! state-machine checkers over an arbitrary host compiler's IR.
//!
//! The engine owns none of: the IR itself ([`ir::IrProvider`] is the
//! seam a host compiler implements), a rule-file parser (rule files are
//! assembled in Rust via [`context::RuleFile`]), or diagnostic rendering
//! (consumers implement [`diagnostics::DiagnosticSink`]). What it owns is
//! the solver: worklist fixpoint over `(IR node, Shape)` pairs, rule
//! matching, and witness-path-narrated error reporting.

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod exploded_graph;
pub mod ir;
pub mod pattern;
pub mod shape;

pub use config::{Config, GraphRenderer, NoopRenderer};
pub use context::{RuleContext, RuleFile};
pub use diagnostics::{DiagnosticSink, Reporter};
pub use error::{EngineError, ValidationError};
pub use exploded_graph::{ExplodedGraph, ExplodedNodeId};
pub use ir::IrProvider;
pub use pattern::{Match, MatchContext, Outcome, Pattern, PatternRule};
pub use shape::{Shape, ShapeChange, State, StateCell};

use tracing::{debug, trace};

/// Validates `file` into a [`RuleContext`], solves the exploded graph
/// over `ir`, and emits whatever diagnostics the rules raised through
/// `sink`. Returns the finished graph so callers can additionally render
/// it when [`Config::dump_exploded_graph`] is set.
///
/// The only fallible step is rule-file validation; once that succeeds the
/// solver itself cannot fail (an unrecognised IR feature falls back to
/// the neutral transfer, not an error).
pub fn solve<P: IrProvider>(
    ir: &P,
    file: RuleFile<P>,
    config: &Config,
    sink: Box<dyn DiagnosticSink<P::Loc>>,
    renderer: &dyn GraphRenderer<P>,
) -> Result<ExplodedGraph<P>, EngineError> {
    let ctx = RuleContext::compile(file)?;
    debug!(
        states = ctx.state_names().len(),
        clauses = ctx.state_clauses().len(),
        "rule context compiled"
    );

    let mut reporter = Reporter::new(config.cache_errors, sink);
    let graph = exploded_graph::solve(ir, &ctx, &mut reporter);
    trace!(nodes = graph.node_count(), "exploded graph built");

    reporter.emit_all(&graph, ir, &ctx);

    if config.dump_exploded_graph {
        renderer.render(&graph);
    }

    Ok(graph)
}
