// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Recognised configuration options and the graph-visualisation seam.

use crate::exploded_graph::ExplodedGraph;
use crate::ir::IrProvider;

/// Options the engine itself understands. Everything else (CLI flags,
/// rule-file discovery, output formatting) is the host driver's concern.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// When true, buffer errors and emit them sorted at the end; when
    /// false, emit immediately (aids debugging of internal crashes).
    pub cache_errors: bool,
    /// When true, render the finished exploded graph via a
    /// [`GraphRenderer`] collaborator.
    pub dump_exploded_graph: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config { cache_errors: true, dump_exploded_graph: false }
    }
}

/// Visualises a finished exploded graph; out of scope to implement here
/// (no renderer is defined by this engine), but the seam is part of the
/// external interface so a host can plug one in.
pub trait GraphRenderer<P: IrProvider> {
    fn render(&self, graph: &ExplodedGraph<P>);
}

/// The default: does nothing. Used whenever `dump_exploded_graph` is
/// false, and as a placeholder for hosts that don't need visualisation.
pub struct NoopRenderer;

impl<P: IrProvider> GraphRenderer<P> for NoopRenderer {
    fn render(&self, _graph: &ExplodedGraph<P>) {}
}
