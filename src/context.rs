// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The compiled state machine a rule file describes: declarations, named
//! patterns, and state clauses, validated once so the solver never has to
//! handle a malformed rule file mid-run.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::ValidationError;
use crate::ir::IrProvider;
use crate::pattern::{Pattern, PatternRule};
use crate::shape::State;

/// A declaration: a name a rule file can refer to, backed by a predicate
/// over the embedding checker's variable handles. `has_state` marks (at
/// most) one declaration as the one whose aliasing carries the monitored
/// state.
pub struct DeclSpec<V> {
    pub name: String,
    pub has_state: bool,
    pub matches: Rc<dyn Fn(&V) -> bool>,
}

/// A declarative initialisation fragment, executed once at
/// [`RuleContext::compile`] time. Rule files in this engine cannot embed
/// arbitrary code (see the crate-level docs' discussion of that
/// trade-off); only this closed set of seed operations is supported.
pub enum InitFragment {
    /// Seeds a named scratch table with a fixed set of strings, e.g. the
    /// names of standard allocator functions a checker wants to treat
    /// uniformly.
    SeedNames { table: String, names: Vec<String> },
}

#[derive(Debug, Clone)]
pub enum ScratchValue {
    Set(BTreeSet<String>),
    Flag(bool),
}

/// Read-only (post-construction) scratch storage populated by
/// [`InitFragment`]s, consulted by pattern/decl matchers at match time.
#[derive(Debug, Default)]
pub struct ScratchStore(HashMap<String, ScratchValue>);

impl ScratchStore {
    fn apply(fragments: &[InitFragment]) -> Self {
        let mut table = HashMap::new();
        for frag in fragments {
            match frag {
                InitFragment::SeedNames { table: name, names } => {
                    table.insert(name.clone(), ScratchValue::Set(names.iter().cloned().collect()));
                }
            }
        }
        ScratchStore(table)
    }

    pub fn get(&self, table: &str) -> Option<&ScratchValue> {
        self.0.get(table)
    }

    /// Convenience for the common case: is `name` a member of the named
    /// table (which must have been seeded as a [`ScratchValue::Set`])?
    pub fn contains(&self, table: &str, name: &str) -> bool {
        matches!(self.0.get(table), Some(ScratchValue::Set(names)) if names.contains(name))
    }
}

/// One `(state-set { pattern => outcome* })` group, in declared order.
pub struct StateClause<P: IrProvider> {
    states: HashSet<State>,
    rules: Vec<PatternRule<P>>,
}

impl<P: IrProvider> StateClause<P> {
    pub fn states(&self) -> &HashSet<State> {
        &self.states
    }

    pub fn rules(&self) -> &[PatternRule<P>] {
        &self.rules
    }
}

/// The not-yet-validated contents of a rule file, assembled by the
/// embedding checker (there is no textual rule-file parser here — see
/// the external-interfaces note on the rule-file language being consumed,
/// not defined, by this engine).
pub struct RuleFile<P: IrProvider> {
    /// `state_names[0]` is `default_state`.
    pub state_names: Vec<State>,
    pub decls: Vec<DeclSpec<P::Var>>,
    pub named_patterns: Vec<(String, Rc<dyn Pattern<P>>)>,
    pub state_clauses: Vec<RawStateClause<P>>,
    pub init_fragments: Vec<InitFragment>,
}

/// A [`StateClause`] before its guard states have been checked against
/// the reachability closure.
pub struct RawStateClause<P: IrProvider> {
    pub states: Vec<State>,
    pub rules: Vec<PatternRule<P>>,
}

/// The compiled, validated state machine. Immutable once built; every
/// reference the solver and pattern matchers need is resolved up front.
pub struct RuleContext<P: IrProvider> {
    state_names: Vec<State>,
    decls: HashMap<String, DeclSpec<P::Var>>,
    stateful_decl: Option<String>,
    named_patterns: HashMap<String, Rc<dyn Pattern<P>>>,
    state_clauses: Vec<StateClause<P>>,
    reachable_states: HashSet<State>,
    scratch: ScratchStore,
}

impl<P: IrProvider> RuleContext<P> {
    /// Two-pass construction, mirroring the original: pass one computes
    /// the reachability closure over every state any outcome can produce;
    /// pass two checks every clause guard against it before the solver
    /// ever runs.
    pub fn compile(file: RuleFile<P>) -> Result<Self, ValidationError> {
        debug_assert!(!file.state_names.is_empty(), "a rule file must declare at least one state");
        debug!(
            states = file.state_names.len(),
            clauses = file.state_clauses.len(),
            decls = file.decls.len(),
            "compiling rule context"
        );

        let mut reachable_states: HashSet<State> = HashSet::new();
        reachable_states.insert(file.state_names[0].clone());
        for clause in &file.state_clauses {
            for rule in &clause.rules {
                for outcome in &rule.outcomes {
                    reachable_states.extend(outcome.iter_reachable_states());
                }
            }
        }
        trace!(reachable = reachable_states.len(), "computed reachable-states closure");

        let mut decls = HashMap::new();
        let mut stateful_decl = None;
        for decl in file.decls {
            if decl.has_state {
                trace!(decl = %decl.name, "declaration marked as stateful");
                stateful_decl = Some(decl.name.clone());
            }
            decls.insert(decl.name.clone(), decl);
        }

        if !file.state_clauses.is_empty() && stateful_decl.is_none() {
            return Err(ValidationError::MissingStatefulDecl);
        }

        let mut state_clauses = Vec::with_capacity(file.state_clauses.len());
        for raw in file.state_clauses {
            let mut states = HashSet::with_capacity(raw.states.len());
            for state in raw.states {
                if !reachable_states.contains(&state) {
                    debug!(%state, "state clause guard references an unreachable state");
                    return Err(ValidationError::UnreachableState { state: state.to_string() });
                }
                states.insert(state);
            }
            state_clauses.push(StateClause { states, rules: raw.rules });
        }

        let named_patterns = file.named_patterns.into_iter().collect();
        let scratch = ScratchStore::apply(&file.init_fragments);

        debug!("rule context validated");
        Ok(RuleContext {
            state_names: file.state_names,
            decls,
            stateful_decl,
            named_patterns,
            state_clauses,
            reachable_states,
            scratch,
        })
    }

    pub fn default_state(&self) -> State {
        self.state_names[0].clone()
    }

    pub fn state_names(&self) -> &[State] {
        &self.state_names
    }

    pub fn reachable_states(&self) -> &HashSet<State> {
        &self.reachable_states
    }

    pub fn state_clauses(&self) -> &[StateClause<P>] {
        &self.state_clauses
    }

    pub fn scratch(&self) -> &ScratchStore {
        &self.scratch
    }

    pub fn lookup_decl(&self, name: &str) -> Result<&DeclSpec<P::Var>, ValidationError> {
        trace!(decl = name, "looking up declaration");
        self.decls
            .get(name)
            .ok_or_else(|| ValidationError::UnknownDecl { name: name.to_string() })
    }

    pub fn lookup_pattern(&self, name: &str) -> Result<&Rc<dyn Pattern<P>>, ValidationError> {
        trace!(pattern = name, "looking up named pattern");
        self.named_patterns
            .get(name)
            .ok_or_else(|| ValidationError::UnknownNamedPattern { name: name.to_string() })
    }

    /// True for whatever the IR provider's own default considers
    /// stateful (typically "pointer-typed"), further narrowed by the
    /// stateful declaration's matcher when one is declared.
    pub fn is_stateful_var(&self, ir: &P, var: &P::Var) -> bool {
        if !ir.is_stateful_var(var) {
            return false;
        }
        match self.stateful_decl.as_deref().and_then(|name| self.decls.get(name)) {
            Some(decl) => (decl.matches)(var),
            None => true,
        }
    }
}
