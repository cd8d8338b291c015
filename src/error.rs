// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Structured, two-tier error model: rule-file validation failures are
//! recoverable (reported once, then refuse to run); internal invariant
//! breaks stay `panic!`/`debug_assert!`, exactly as the engine's own
//! asserted invariants do.

use thiserror::Error;

/// A rule file failed validation. Fatal to [`crate::solve`]: the engine
/// never attempts to run against an invalid rule context.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("state `{state}` is referenced in a state clause but is not `default_state` and not produced by any rule outcome")]
    UnreachableState { state: String },

    #[error("unknown declaration `{name}`")]
    UnknownDecl { name: String },

    #[error("unknown named pattern `{name}`")]
    UnknownNamedPattern { name: String },

    #[error("state clauses are declared but no declaration is marked as carrying state")]
    MissingStatefulDecl,
}

/// The single fallible entry point's error type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}
