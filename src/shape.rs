// Copyright Kani Contributors
// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The per-node abstract state: a mapping from variables to shared,
//! mutable state cells, with aliasing.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::ir::Variable;

/// An opaque, finite-set-valued state name declared by the rule file.
/// `Rc<str>` rather than `String` so that cloning a state value (which
/// happens on every `Shape` lookup) is a refcount bump, not an allocation.
pub type State = Rc<str>;

/// A mutable cell holding a single [`State`]. Multiple variables may
/// reference the same cell within one [`Shape`] (aliasing). Cell
/// *identity* is reference identity; cell *value* is what `Shape`
/// equality and hashing look at.
#[derive(Debug, Clone)]
pub struct StateCell(Rc<std::cell::RefCell<State>>);

impl StateCell {
    fn new(state: State) -> Self {
        StateCell(Rc::new(std::cell::RefCell::new(state)))
    }

    pub fn get(&self) -> State {
        self.0.borrow().clone()
    }

    fn set(&self, state: State) {
        *self.0.borrow_mut() = state;
    }

    /// Identity comparison: are these the *same* cell (so that writing
    /// through one is observed through the other)?
    pub fn is_same_cell(&self, other: &StateCell) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

/// A finite mapping `V -> StateCell`. A variable absent from the map is
/// in `default_state`, with an implicit private cell of its own.
#[derive(Debug, Clone)]
pub struct Shape<V: Variable> {
    cells: HashMap<V, StateCell>,
    default_state: State,
}

impl<V: Variable> Shape<V> {
    pub fn new(default_state: State) -> Self {
        Shape { cells: HashMap::new(), default_state }
    }

    pub fn default_state(&self) -> State {
        self.default_state.clone()
    }

    /// Returns `default_state` if `v` has no explicit entry.
    pub fn get_state(&self, v: &V) -> State {
        match self.cells.get(v) {
            Some(cell) => cell.get(),
            None => self.default_state.clone(),
        }
    }

    pub fn var_has_state(&self, v: &V) -> bool {
        self.cells.contains_key(v)
    }

    /// Writes `state` into `v`'s existing cell (visible to every alias),
    /// or installs a fresh cell if `v` has none yet.
    pub fn set_state(&mut self, v: V, state: State) {
        if let Some(cell) = self.cells.get(&v) {
            cell.set(state);
        } else {
            self.cells.insert(v, StateCell::new(state));
        }
    }

    /// Every variable referencing `cell`, in deterministic (sorted) order,
    /// so diagnostic output is reproducible.
    pub fn iter_aliases(&self, cell: &StateCell) -> Vec<V> {
        let mut vars: Vec<V> = self
            .cells
            .iter()
            .filter(|(_, c)| c.is_same_cell(cell))
            .map(|(v, _)| v.clone())
            .collect();
        vars.sort();
        vars
    }

    fn cell_of(&self, v: &V) -> Option<StateCell> {
        self.cells.get(v).cloned()
    }

    /// Aliases `dst` onto `src`'s cell. If `src` has no cell yet, one
    /// holding `default_state` is installed first, so the aliasing becomes
    /// observable.
    pub fn assign(&mut self, dst: V, src: V) {
        if !self.cells.contains_key(&src) {
            self.set_state(src.clone(), self.default_state.clone());
        }
        let cell = self.cells.get(&src).unwrap().clone();
        self.cells.insert(dst, cell);
    }

    /// Removes every local and parameter of `vars` from the map (invoked
    /// on return transitions).
    pub fn purge_locals(&mut self, vars: &[V]) {
        for v in vars {
            self.cells.remove(v);
        }
    }

    /// Deep copy: fresh cells, but two variables that aliased the same
    /// cell in `self` alias the same (new) cell in the result. Returns the
    /// clone plus a map from the original cells' identities to their new
    /// counterparts, so callers (see [`ShapeChange`])
    /// can track which source cells survived.
    pub fn deep_clone(&self) -> (Shape<V>, HashMap<usize, StateCell>) {
        let mut old_to_new: HashMap<usize, StateCell> = HashMap::new();
        let mut new_cells: HashMap<V, StateCell> = HashMap::new();
        for (v, cell) in &self.cells {
            let new_cell = old_to_new
                .entry(cell.id())
                .or_insert_with(|| StateCell::new(cell.get()))
                .clone();
            new_cells.insert(v.clone(), new_cell);
        }
        (Shape { cells: new_cells, default_state: self.default_state.clone() }, old_to_new)
    }

    fn cell_ids(&self) -> HashSet<usize> {
        self.cells.values().map(StateCell::id).collect()
    }
}

impl<V: Variable> PartialEq for Shape<V> {
    /// Structural: same keys, same `(variable, state)` pairs. Cell
    /// identity is not part of equality, only the cell's current value.
    fn eq(&self, other: &Self) -> bool {
        self.cells.len() == other.cells.len()
            && self
                .cells
                .iter()
                .all(|(v, cell)| other.cells.get(v).map_or(false, |oc| oc.get() == cell.get()))
    }
}

impl<V: Variable> Eq for Shape<V> {}

impl<V: Variable> Hash for Shape<V> {
    /// Insertion-order-independent: XOR-sum of `hash(var) ^ hash(state)`
    /// per entry, so two Shapes built by inserting the same pairs in any
    /// order hash identically (required for use as a `HashMap` key).
    fn hash<H: Hasher>(&self, state: &mut H) {
        let mut acc: u64 = 0;
        for (v, cell) in &self.cells {
            let mut vh = DefaultHasher::new();
            v.hash(&mut vh);
            let mut sh = DefaultHasher::new();
            cell.get().hash(&mut sh);
            acc ^= vh.finish() ^ sh.finish();
        }
        acc.hash(state);
    }
}

/// Captures the aliasing + state changes applied to a fresh clone of a
/// source [`Shape`] along a single exploded-graph edge. Does not itself
/// mutate the source.
pub struct ShapeChange<V: Variable> {
    src_shape: Shape<V>,
    dst_shape: Shape<V>,
    old_to_new: HashMap<usize, StateCell>,
}

impl<V: Variable> ShapeChange<V> {
    pub fn new(src_shape: &Shape<V>) -> Self {
        let (dst_shape, old_to_new) = src_shape.deep_clone();
        ShapeChange { src_shape: src_shape.clone(), dst_shape, old_to_new }
    }

    pub fn assign_var(&mut self, dst: V, src: V) {
        self.dst_shape.assign(dst, src);
    }

    pub fn set_state(&mut self, v: V, state: State) {
        self.dst_shape.set_state(v, state);
    }

    pub fn purge_locals(&mut self, vars: &[V]) {
        self.dst_shape.purge_locals(vars);
    }

    pub fn src_shape(&self) -> &Shape<V> {
        &self.src_shape
    }

    pub fn dst_shape(&self) -> &Shape<V> {
        &self.dst_shape
    }

    pub fn into_dst_shape(self) -> Shape<V> {
        self.dst_shape
    }

    /// Cells present in the source but whose clone is referenced by
    /// nothing in the destination — i.e. the last alias was overwritten
    /// or purged. Yields every source-side alias of each such cell
    /// exactly once, in deterministic order.
    pub fn iter_leaks(&self) -> Vec<V> {
        let dst_ids = self.dst_shape.cell_ids();
        let mut seen_src_cells: HashSet<usize> = HashSet::new();
        let mut src_vars: Vec<&V> = self.src_shape.cells.keys().collect();
        src_vars.sort();

        let mut leaked = Vec::new();
        for v in src_vars {
            let cell = self.src_shape.cell_of(v).unwrap();
            let id = cell.id();
            if !seen_src_cells.insert(id) {
                continue;
            }
            if let Some(new_cell) = self.old_to_new.get(&id) {
                if !dst_ids.contains(&new_cell.id()) {
                    leaked.extend(self.src_shape.iter_aliases(&cell));
                }
            }
        }
        leaked
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn st(s: &str) -> State {
        Rc::from(s)
    }

    #[test]
    fn default_state_transparency() {
        let shape: Shape<&'static str> = Shape::new(st("start"));
        assert_eq!(shape.get_state(&"p"), st("start"));
        assert!(!shape.var_has_state(&"p"));
    }

    #[test]
    fn set_state_visible_through_alias() {
        let mut shape: Shape<&'static str> = Shape::new(st("start"));
        shape.set_state("p", st("freed"));
        shape.assign("q", "p");
        assert_eq!(shape.get_state(&"q").as_ref(), "freed");
        shape.set_state("q", st("other"));
        // writing through q's alias is visible through p too
        assert_eq!(shape.get_state(&"p"), st("other"));
    }

    #[test]
    fn equality_is_structural_not_identity() {
        let mut a: Shape<&'static str> = Shape::new(st("start"));
        let mut b: Shape<&'static str> = Shape::new(st("start"));
        a.set_state("p", st("freed"));
        b.set_state("p", st("freed"));
        assert_eq!(a, b);

        use std::collections::hash_map::DefaultHasher;
        let mut ha = DefaultHasher::new();
        a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn hash_is_order_independent() {
        let mut a: Shape<&'static str> = Shape::new(st("start"));
        a.set_state("p", st("freed"));
        a.set_state("q", st("allocated"));

        let mut b: Shape<&'static str> = Shape::new(st("start"));
        b.set_state("q", st("allocated"));
        b.set_state("p", st("freed"));

        assert_eq!(a, b);
        let mut ha = DefaultHasher::new();
        a.hash(&mut ha);
        let mut hb = DefaultHasher::new();
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn deep_clone_preserves_aliasing_and_decouples_mutation() {
        let mut shape: Shape<&'static str> = Shape::new(st("start"));
        shape.set_state("p", st("allocated"));
        shape.assign("q", "p");

        let (clone, _) = shape.deep_clone();
        assert_eq!(clone.get_state(&"q"), st("allocated"));

        // mutate the clone through one alias...
        let cell = clone.cell_of(&"q").unwrap();
        cell.set(st("freed"));
        // ...the other alias in the clone observes it (aliasing preserved)
        assert_eq!(clone.get_state(&"p"), st("freed"));
        // ...but the original is untouched (mutation decoupled)
        assert_eq!(shape.get_state(&"p"), st("allocated"));
        assert_eq!(shape.get_state(&"q"), st("allocated"));
    }

    #[test]
    fn iter_leaks_yields_each_alias_once() {
        let mut shape: Shape<&'static str> = Shape::new(st("start"));
        shape.set_state("p", st("allocated"));
        shape.assign("q", "p");

        let mut change = ShapeChange::new(&shape);
        // purge both aliases: the cell has no surviving reference in dst
        change.purge_locals(&["p", "q"]);

        let mut leaked = change.iter_leaks();
        leaked.sort();
        assert_eq!(leaked, vec!["p", "q"]);
    }

    #[test]
    fn iter_leaks_empty_when_alias_survives() {
        let mut shape: Shape<&'static str> = Shape::new(st("start"));
        shape.set_state("p", st("allocated"));
        shape.assign("q", "p");

        let mut change = ShapeChange::new(&shape);
        // only purge p; q still references the cell, so nothing leaked
        change.purge_locals(&["p"]);

        assert!(change.iter_leaks().is_empty());
    }

    const VAR_POOL: [&str; 4] = ["a", "b", "c", "d"];
    const STATE_POOL: [&str; 3] = ["start", "freed", "allocated"];

    fn small_var() -> impl Strategy<Value = &'static str> {
        prop::sample::select(&VAR_POOL[..])
    }

    fn small_state() -> impl Strategy<Value = State> {
        prop::sample::select(&STATE_POOL[..]).prop_map(st)
    }

    #[derive(Debug, Clone)]
    enum ShapeOp {
        Set(&'static str, State),
        Assign(&'static str, &'static str),
    }

    fn shape_op() -> impl Strategy<Value = ShapeOp> {
        prop_oneof![
            (small_var(), small_state()).prop_map(|(v, s)| ShapeOp::Set(v, s)),
            (small_var(), small_var()).prop_map(|(d, s)| ShapeOp::Assign(d, s)),
        ]
    }

    fn alias_eq(shape: &Shape<&'static str>, v1: &'static str, v2: &'static str) -> bool {
        match (shape.cell_of(&v1), shape.cell_of(&v2)) {
            (Some(a), Some(b)) => a.is_same_cell(&b),
            _ => false,
        }
    }

    proptest! {
        /// Invariant 1: canonicalisation. Two Shapes built from the same
        /// set of (unique-per-variable) assignments, inserted in either
        /// order, are equal and hash equal.
        #[test]
        fn prop_shape_canonical_regardless_of_insertion_order(
            assignments in prop::collection::hash_map(small_var(), small_state(), 0..4)
        ) {
            let pairs: Vec<(&'static str, State)> = assignments.into_iter().collect();

            let mut forward: Shape<&'static str> = Shape::new(st("start"));
            for (v, s) in &pairs {
                forward.set_state(*v, s.clone());
            }
            let mut backward: Shape<&'static str> = Shape::new(st("start"));
            for (v, s) in pairs.iter().rev() {
                backward.set_state(*v, s.clone());
            }

            prop_assert_eq!(&forward, &backward);
            let mut hf = DefaultHasher::new();
            forward.hash(&mut hf);
            let mut hb = DefaultHasher::new();
            backward.hash(&mut hb);
            prop_assert_eq!(hf.finish(), hb.finish());
        }

        /// Invariants 2 and 3: clone preserves exactly the aliasing graph
        /// of the source, and mutating the clone never mutates the
        /// source's cells.
        #[test]
        fn prop_clone_preserves_aliasing_and_decouples_mutation(
            ops in prop::collection::vec(shape_op(), 0..8)
        ) {
            let mut shape: Shape<&'static str> = Shape::new(st("start"));
            for op in ops {
                match op {
                    ShapeOp::Set(v, s) => shape.set_state(v, s),
                    ShapeOp::Assign(dst, src) => shape.assign(dst, src),
                }
            }

            let (clone, _) = shape.deep_clone();

            for &v1 in VAR_POOL.iter() {
                for &v2 in VAR_POOL.iter() {
                    if v1 == v2 {
                        continue;
                    }
                    prop_assert_eq!(alias_eq(&shape, v1, v2), alias_eq(&clone, v1, v2));
                }
            }

            if let Some(cell) = clone.cell_of(&VAR_POOL[0]) {
                let before = shape.get_state(&VAR_POOL[0]);
                cell.set(st("mutated-via-clone-only"));
                prop_assert_eq!(shape.get_state(&VAR_POOL[0]), before);
            }
        }

        /// Invariant 4: default-state transparency. For an arbitrary
        /// sequence of operations that never names `excluded`, `excluded`
        /// stays at `default_state` throughout -- it never picked up an
        /// entry in the map by accident (e.g. via some other variable's
        /// `assign`).
        #[test]
        fn prop_default_state_transparent_for_untouched_var(
            excluded in small_var(),
            ops in prop::collection::vec(shape_op(), 0..8).prop_filter(
                "ops must not reference the excluded var",
                move |ops| ops.iter().all(|op| match op {
                    ShapeOp::Set(v, _) => *v != excluded,
                    ShapeOp::Assign(dst, src) => *dst != excluded && *src != excluded,
                }),
            ),
        ) {
            let mut shape: Shape<&'static str> = Shape::new(st("start"));
            for op in ops {
                match op {
                    ShapeOp::Set(v, s) => shape.set_state(v, s),
                    ShapeOp::Assign(dst, src) => shape.assign(dst, src),
                }
            }
            prop_assert_eq!(shape.get_state(&excluded), st("start"));
            prop_assert!(!shape.var_has_state(&excluded));
        }
    }
}
