// SPDX-License-Identifier: MPL-2.0

//! Core state of the conflict-driven solver: the package/incompatibility
//! tables, unit propagation and conflict resolution.

use std::collections::HashSet;
use std::sync::Arc;

use xbps_version::{Constraint, Version};

use crate::internal::arena::{Arena, Id};
use crate::internal::incompatibility::{IncompId, Incompatibility, Relation};
use crate::internal::partial_solution::{DecisionLevel, PartialSolution, SatisfierSearch};
use crate::report::DerivationTree;
use crate::Map;

/// Current state of the solving algorithm.
pub(crate) struct State {
    root_package: String,
    root_version: Version,

    /// Ids of the incompatibilities mentioning each package. They are
    /// consulted in reverse order during propagation so learned clauses fire
    /// before facts.
    incompatibilities: Map<String, Vec<IncompId>>,

    /// Incompatibilities that are already contradicted, together with the
    /// decision level at which this was found. They stay contradicted until
    /// we backtrack beyond that level.
    contradicted_incompatibilities: Map<IncompId, DecisionLevel>,

    /// Partial solution.
    pub(crate) partial_solution: PartialSolution,

    /// The store is the reference storage for all incompatibilities.
    pub(crate) incompatibility_store: Arena<Incompatibility>,

    /// Work still to be done in `unit_propagation`; kept here to reuse the
    /// allocation.
    unit_propagation_buffer: Vec<String>,

    /// Number of decisions taken right after a backtrack; a measure of how
    /// much searching the solve needed.
    pub(crate) attempts: u64,
    backtracking: bool,
}

impl State {
    /// Initialization of the solver state.
    pub(crate) fn init(root_package: String, root_version: Version) -> Self {
        let mut incompatibility_store = Arena::new();
        let not_root_id = incompatibility_store.alloc(Incompatibility::not_root(
            root_package.clone(),
            root_version.clone(),
        ));
        let mut incompatibilities = Map::default();
        incompatibilities.insert(root_package.clone(), vec![not_root_id]);
        Self {
            root_package,
            root_version,
            incompatibilities,
            contradicted_incompatibilities: Map::default(),
            partial_solution: PartialSolution::empty(),
            incompatibility_store,
            unit_propagation_buffer: Vec::new(),
            attempts: 0,
            backtracking: false,
        }
    }

    /// Add an incompatibility to the state.
    pub(crate) fn add_incompatibility(&mut self, incompat: Incompatibility) {
        let id = self.incompatibility_store.alloc(incompat);
        self.register_incompatibility(id);
    }

    /// Add incompatibilities for every dependency of a package version and
    /// return the allocated range.
    pub(crate) fn add_incompatibility_from_dependencies(
        &mut self,
        package: String,
        version: Version,
        deps: impl IntoIterator<Item = (String, Constraint)>,
    ) -> std::ops::Range<IncompId> {
        let new_incompats_id_range = self.incompatibility_store.alloc_iter(
            deps.into_iter().map(|dep| {
                Incompatibility::from_dependency(
                    package.clone(),
                    Constraint::exactly(version.clone()),
                    dep,
                )
            }),
        );
        for id in Id::range_to_iter(new_incompats_id_range.clone()) {
            self.register_incompatibility(id);
        }
        new_incompats_id_range
    }

    /// Mark that a decision was taken; the first one after each backtrack
    /// counts as a new attempt.
    pub(crate) fn decision_made(&mut self) {
        if self.backtracking {
            self.attempts += 1;
            self.backtracking = false;
        }
    }

    /// Unit propagation is the core mechanism of the solving algorithm.
    pub(crate) fn unit_propagation(&mut self, package: String) -> Result<(), DerivationTree> {
        self.unit_propagation_buffer.clear();
        self.unit_propagation_buffer.push(package);
        while let Some(current_package) = self.unit_propagation_buffer.pop() {
            // Iterate over incompatibilities in reverse order
            // to evaluate first the newest incompatibilities.
            let mut conflict_id = None;
            for &incompat_id in self.incompatibilities[&current_package].iter().rev() {
                if self
                    .contradicted_incompatibilities
                    .contains_key(&incompat_id)
                {
                    continue;
                }
                let current_incompat = &self.incompatibility_store[incompat_id];
                match self.partial_solution.relation(current_incompat) {
                    // If the partial solution satisfies the incompatibility
                    // we must perform conflict resolution.
                    Relation::Satisfied => {
                        log::info!(
                            "start conflict resolution because incompat satisfied:\n   {}",
                            current_incompat
                        );
                        conflict_id = Some(incompat_id);
                        break;
                    }
                    Relation::AlmostSatisfied(package_almost) => {
                        // Add `package_almost` to the propagation queue.
                        // The buffer is small enough that a linear scan
                        // beats allocating a set.
                        if !self.unit_propagation_buffer.contains(&package_almost) {
                            self.unit_propagation_buffer.push(package_almost.clone());
                        }
                        // Add (not term) to the partial solution with
                        // incompat as cause.
                        self.partial_solution.add_derivation(
                            package_almost,
                            incompat_id,
                            &self.incompatibility_store,
                        );
                        // With the partial solution updated, the
                        // incompatibility is now contradicted.
                        self.contradicted_incompatibilities
                            .insert(incompat_id, self.partial_solution.current_decision_level());
                    }
                    Relation::Contradicted(_) => {
                        self.contradicted_incompatibilities
                            .insert(incompat_id, self.partial_solution.current_decision_level());
                    }
                    Relation::Inconclusive => {}
                }
            }
            if let Some(incompat_id) = conflict_id {
                let (package_almost, root_cause) = self
                    .conflict_resolution(incompat_id)
                    .map_err(|terminal_incompat_id| {
                        self.build_derivation_tree(terminal_incompat_id)
                    })?;
                self.unit_propagation_buffer.clear();
                self.unit_propagation_buffer.push(package_almost.clone());
                // Add to the partial solution with incompat as cause.
                self.partial_solution.add_derivation(
                    package_almost,
                    root_cause,
                    &self.incompatibility_store,
                );
                // After conflict resolution and the partial solution update,
                // the root cause incompatibility is now contradicted.
                self.contradicted_incompatibilities
                    .insert(root_cause, self.partial_solution.current_decision_level());
            }
        }
        // If there are no more changed packages, unit propagation is done.
        Ok(())
    }

    /// Return the root cause or the terminal incompatibility.
    fn conflict_resolution(
        &mut self,
        incompatibility: IncompId,
    ) -> Result<(String, IncompId), IncompId> {
        let mut current_incompat_id = incompatibility;
        let mut current_incompat_changed = false;
        loop {
            if self.incompatibility_store[current_incompat_id]
                .is_terminal(&self.root_package, &self.root_version)
            {
                return Err(current_incompat_id);
            }
            let (package, satisfier_search_result) = self.partial_solution.satisfier_search(
                &self.incompatibility_store[current_incompat_id],
                &self.incompatibility_store,
            );
            match satisfier_search_result {
                SatisfierSearch::DifferentDecisionLevels {
                    previous_satisfier_level,
                } => {
                    let package = package.clone();
                    self.backtrack(
                        current_incompat_id,
                        current_incompat_changed,
                        previous_satisfier_level,
                    );
                    log::info!("backtrack to {:?}", previous_satisfier_level);
                    return Ok((package, current_incompat_id));
                }
                SatisfierSearch::SameDecisionLevels { satisfier_cause } => {
                    let prior_cause = Incompatibility::prior_cause(
                        current_incompat_id,
                        satisfier_cause,
                        package,
                        &self.incompatibility_store,
                    );
                    log::info!("prior cause: {}", prior_cause);
                    current_incompat_id = self.incompatibility_store.alloc(prior_cause);
                    current_incompat_changed = true;
                }
            }
        }
    }

    /// Backtracking.
    fn backtrack(
        &mut self,
        incompat: IncompId,
        incompat_changed: bool,
        decision_level: DecisionLevel,
    ) {
        self.partial_solution.backtrack(decision_level);
        self.backtracking = true;
        // Remove contradicted incompatibilities that depend on decisions we
        // just backtracked away.
        self.contradicted_incompatibilities
            .retain(|_, dl| *dl <= decision_level);
        if incompat_changed {
            self.register_incompatibility(incompat);
        }
    }

    /// Register this incompatibility on every package it mentions.
    fn register_incompatibility(&mut self, id: IncompId) {
        for (pkg, term) in self.incompatibility_store[id].iter() {
            if cfg!(debug_assertions) {
                assert_ne!(term, &crate::term::Term::any());
            }
            self.incompatibilities
                .entry(pkg.clone())
                .or_default()
                .push(id);
        }
    }

    // Error reporting ########################################################

    fn build_derivation_tree(&self, incompat: IncompId) -> DerivationTree {
        let mut all_ids: HashSet<IncompId> = HashSet::default();
        let mut shared_ids = crate::Set::default();
        let mut stack = vec![incompat];
        while let Some(i) = stack.pop() {
            if let Some((id1, id2)) = self.incompatibility_store[i].causes() {
                if all_ids.contains(&i) {
                    shared_ids.insert(i);
                } else {
                    stack.push(id1);
                    stack.push(id2);
                }
            }
            all_ids.insert(i);
        }
        // To avoid recursion we generate trees in topological order: causes
        // are processed before the incompatibility they affect, and sorting
        // by id maintains this property.
        let mut sorted_ids = all_ids.into_iter().collect::<Vec<_>>();
        sorted_ids.sort_unstable_by_key(|id| id.into_raw());
        let mut precomputed = Map::default();
        for id in sorted_ids {
            let tree = Incompatibility::build_derivation_tree(
                id,
                &shared_ids,
                &self.incompatibility_store,
                &precomputed,
            );
            precomputed.insert(id, Arc::new(tree));
        }
        // Now the user can refer to the entire tree from its root.
        Arc::into_inner(
            precomputed
                .remove(&incompat)
                .expect("the root incompatibility is in the tree"),
        )
        .expect("the root tree has a single owner")
    }
}
