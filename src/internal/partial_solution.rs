// SPDX-License-Identifier: MPL-2.0

//! The partial solution is the ordered list of all assignments made so far,
//! with per-package indices over the terms currently in force.

use std::cmp::Reverse;
use std::fmt;
use std::hash::BuildHasherDefault;

use indexmap::map::Entry;
use indexmap::IndexMap;
use priority_queue::PriorityQueue;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use xbps_version::{Constraint, Version};

use crate::internal::arena::Arena;
use crate::internal::incompatibility::{IncompId, Incompatibility, Relation};
use crate::term::Term;
use crate::SelectedDependencies;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(crate) struct DecisionLevel(pub(crate) u32);

impl DecisionLevel {
    pub(crate) fn increment(self) -> Self {
        Self(self.0 + 1)
    }
}

/// The partial solution contains all package assignments,
/// organized by package and historically ordered.
#[derive(Clone, Debug)]
pub(crate) struct PartialSolution {
    next_global_index: u32,
    current_decision_level: DecisionLevel,
    /// `package_assignments` is primarily a map from a package to its
    /// `PackageAssignments`, but it also keeps the entries ordered in three
    /// sections:
    /// 1. `[..current_decision_level]` contains packages that have a
    ///    decision, sorted by decision level. This makes it very efficient
    ///    to extract the solution and to backtrack to a particular level.
    /// 2. `[current_decision_level..changed_this_decision_level]` are
    ///    packages whose assignments did not change since the last call to
    ///    `prioritize`.
    /// 3. `[changed_this_decision_level..]` contains all packages whose
    ///    assignments may have changed since then.
    package_assignments: FxIndexMap<String, PackageAssignments>,
    /// Packages that have no decision yet but a positive term in force,
    /// keyed by priority (fewest matching candidate versions first).
    prioritized_potential_packages:
        PriorityQueue<String, Reverse<usize>, BuildHasherDefault<FxHasher>>,
    changed_this_decision_level: usize,
}

impl fmt::Display for PartialSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut assignments: Vec<_> = self
            .package_assignments
            .iter()
            .map(|(p, pa)| format!("{}: {}", p, pa))
            .collect();
        assignments.sort();
        write!(
            f,
            "next_global_index: {}\ncurrent_decision_level: {:?}\npackage_assignments:\n{}",
            self.next_global_index,
            self.current_decision_level,
            assignments.join("\t\n")
        )
    }
}

/// Package assignments contain the potential decision and derivations made
/// for a given package, as well as the intersection of all their terms.
#[derive(Clone, Debug)]
struct PackageAssignments {
    smallest_decision_level: DecisionLevel,
    highest_decision_level: DecisionLevel,
    dated_derivations: SmallVec<[DatedDerivation; 1]>,
    assignments_intersection: AssignmentsIntersection,
}

impl fmt::Display for PackageAssignments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let derivations: Vec<_> = self
            .dated_derivations
            .iter()
            .map(|dd| dd.to_string())
            .collect();
        write!(
            f,
            "decision range: {:?}..{:?}\nderivations:\n  {}\n,assignments_intersection: {}",
            self.smallest_decision_level,
            self.highest_decision_level,
            derivations.join("\n  "),
            self.assignments_intersection
        )
    }
}

#[derive(Clone, Debug)]
struct DatedDerivation {
    global_index: u32,
    decision_level: DecisionLevel,
    cause: IncompId,
    accumulated_intersection: Term,
}

impl fmt::Display for DatedDerivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}, cause: {:?}", self.decision_level, self.cause)
    }
}

#[derive(Clone, Debug)]
enum AssignmentsIntersection {
    Decision((u32, Version, Term)),
    Derivations(Term),
}

impl fmt::Display for AssignmentsIntersection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision((lvl, version, _)) => {
                write!(f, "Decision: level {}, v = {}", lvl, version)
            }
            Self::Derivations(term) => write!(f, "Derivations term: {}", term),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) enum SatisfierSearch {
    DifferentDecisionLevels {
        previous_satisfier_level: DecisionLevel,
    },
    SameDecisionLevels {
        satisfier_cause: IncompId,
    },
}

type Satisfier = (Option<IncompId>, u32, DecisionLevel);
type SatisfiedMap<'i> = SmallVec<[(&'i String, Satisfier); 2]>;

fn satisfied_get<'i>(map: &SatisfiedMap<'i>, package: &str) -> Option<Satisfier> {
    map.iter()
        .find(|(p, _)| p.as_str() == package)
        .map(|(_, s)| *s)
}

fn satisfied_insert<'i>(map: &mut SatisfiedMap<'i>, package: &'i String, satisfier: Satisfier) {
    match map.iter_mut().find(|(p, _)| p.as_str() == package) {
        Some((_, s)) => *s = satisfier,
        None => map.push((package, satisfier)),
    }
}

impl PartialSolution {
    /// Initialize an empty PartialSolution.
    pub(crate) fn empty() -> Self {
        Self {
            next_global_index: 0,
            current_decision_level: DecisionLevel(0),
            package_assignments: FxIndexMap::default(),
            prioritized_potential_packages: PriorityQueue::default(),
            changed_this_decision_level: 0,
        }
    }

    /// Add a decision.
    pub(crate) fn add_decision(&mut self, package: String, version: Version) {
        // Check that add_decision is never used in the wrong context.
        if cfg!(debug_assertions) {
            match self.package_assignments.get_mut(&package) {
                None => panic!("derivations must already exist"),
                Some(pa) => match &pa.assignments_intersection {
                    // cannot be called when a decision has already been taken
                    AssignmentsIntersection::Decision(_) => panic!("already existing decision"),
                    // cannot be called if the version is not contained in the
                    // terms' intersection
                    AssignmentsIntersection::Derivations(term) => {
                        debug_assert!(
                            term.contains(&version),
                            "{}: {} was expected to be contained in {}",
                            package,
                            version,
                            term,
                        )
                    }
                },
            }
            assert_eq!(
                self.changed_this_decision_level,
                self.package_assignments.len()
            );
        }
        let new_idx = self.current_decision_level.0 as usize;
        self.current_decision_level = self.current_decision_level.increment();
        let (old_idx, _, pa) = self
            .package_assignments
            .get_full_mut(&package)
            .expect("derivations must already exist");
        pa.highest_decision_level = self.current_decision_level;
        pa.assignments_intersection = AssignmentsIntersection::Decision((
            self.next_global_index,
            version.clone(),
            Term::exact(version),
        ));
        // maintain that the beginning of `package_assignments` has all
        // decisions in sorted order
        if new_idx != old_idx {
            self.package_assignments.swap_indices(new_idx, old_idx);
        }
        self.next_global_index += 1;
    }

    /// Add a derivation.
    pub(crate) fn add_derivation(
        &mut self,
        package: String,
        cause: IncompId,
        store: &Arena<Incompatibility>,
    ) {
        let mut dated_derivation = DatedDerivation {
            global_index: self.next_global_index,
            decision_level: self.current_decision_level,
            cause,
            accumulated_intersection: store[cause].get(&package).unwrap().negate(),
        };
        self.next_global_index += 1;
        let pa_last_index = self.package_assignments.len().saturating_sub(1);
        match self.package_assignments.entry(package) {
            Entry::Occupied(mut occupied) => {
                let idx = occupied.index();
                let pa = occupied.get_mut();
                pa.highest_decision_level = self.current_decision_level;
                match &mut pa.assignments_intersection {
                    // check that add_derivation is never called in the wrong
                    // context
                    AssignmentsIntersection::Decision(_) => {
                        panic!("add_derivation should not be called after a decision")
                    }
                    AssignmentsIntersection::Derivations(t) => {
                        *t = t.intersection(&dated_derivation.accumulated_intersection);
                        dated_derivation.accumulated_intersection = t.clone();
                        if t.is_positive() {
                            self.changed_this_decision_level =
                                std::cmp::min(self.changed_this_decision_level, idx);
                        }
                    }
                }
                pa.dated_derivations.push(dated_derivation);
            }
            Entry::Vacant(v) => {
                let term = dated_derivation.accumulated_intersection.clone();
                if term.is_positive() {
                    self.changed_this_decision_level =
                        std::cmp::min(self.changed_this_decision_level, pa_last_index);
                }
                v.insert(PackageAssignments {
                    smallest_decision_level: self.current_decision_level,
                    highest_decision_level: self.current_decision_level,
                    dated_derivations: SmallVec::from_elem(dated_derivation, 1),
                    assignments_intersection: AssignmentsIntersection::Derivations(term),
                });
            }
        }
    }

    /// Pick the undecided package with the highest priority, i.e. the fewest
    /// candidate versions matching its term intersection, so that conflicts
    /// are forced as early as possible.
    pub(crate) fn pick_highest_priority_pkg(
        &mut self,
        prioritizer: impl Fn(&str, &Constraint) -> Reverse<usize>,
    ) -> Option<String> {
        let check_all = self.changed_this_decision_level
            == self.current_decision_level.0.saturating_sub(1) as usize;
        let current_decision_level = self.current_decision_level;
        let prioritized_potential_packages = &mut self.prioritized_potential_packages;
        self.package_assignments
            .get_range(self.changed_this_decision_level..)
            .unwrap()
            .iter()
            .filter(|(_, pa)| {
                // we only need to update the priority of a package if it has
                // been changed since the last time prioritize was called
                check_all || pa.highest_decision_level == current_decision_level
            })
            .filter_map(|(p, pa)| pa.assignments_intersection.potential_package_filter(p))
            .for_each(|(p, c)| {
                let priority = prioritizer(p, c);
                prioritized_potential_packages.push(p.clone(), priority);
            });
        self.changed_this_decision_level = self.package_assignments.len();
        prioritized_potential_packages.pop().map(|(p, _)| p)
    }

    /// If the partial solution has, for every positive derivation, a
    /// corresponding decision that satisfies that assignment, it's a total
    /// solution and version solving has succeeded.
    pub(crate) fn extract_solution(&self) -> SelectedDependencies {
        self.package_assignments
            .iter()
            .take(self.current_decision_level.0 as usize)
            .map(|(p, pa)| match &pa.assignments_intersection {
                AssignmentsIntersection::Decision((_, v, _)) => (p.clone(), v.clone()),
                AssignmentsIntersection::Derivations(_) => {
                    panic!("derivations in the decision part")
                }
            })
            .collect()
    }

    /// Backtrack the partial solution to a given decision level.
    pub(crate) fn backtrack(&mut self, decision_level: DecisionLevel) {
        self.current_decision_level = decision_level;
        self.package_assignments.retain(|_p, pa| {
            if pa.smallest_decision_level > decision_level {
                // remove all entries whose smallest decision level sits
                // beyond the backtrack target
                false
            } else if pa.highest_decision_level <= decision_level {
                // entries older than the backtrack target are unchanged
                true
            } else {
                // smallest_decision_level <= decision_level < highest_decision_level
                //
                // There can be no decision in this package's assignments
                // after backtracking, because such a decision would have
                // been the last assignment and it would have the
                // highest_decision_level.

                // truncate the history
                while pa.dated_derivations.last().map(|dd| dd.decision_level) > Some(decision_level)
                {
                    pa.dated_derivations.pop();
                }
                debug_assert!(!pa.dated_derivations.is_empty());

                let last = pa.dated_derivations.last().unwrap();
                pa.highest_decision_level = last.decision_level;
                // reset the in-force term to the surviving intersection
                pa.assignments_intersection =
                    AssignmentsIntersection::Derivations(last.accumulated_intersection.clone());
                true
            }
        });
        // throw away all stored priority levels, and mark them all for
        // recomputation
        self.prioritized_potential_packages.clear();
        self.changed_this_decision_level = self.current_decision_level.0.saturating_sub(1) as usize;
    }

    /// Add the version as a decision if it does not conflict with the new
    /// incompatibilities built from its dependencies. Returns whether the
    /// decision was taken; when it is not, the next propagation round
    /// resolves the conflict instead.
    pub(crate) fn add_version(
        &mut self,
        package: String,
        version: Version,
        new_incompatibilities: std::ops::Range<IncompId>,
        store: &Arena<Incompatibility>,
    ) -> bool {
        let exact = Term::exact(version.clone());
        let not_satisfied = |incompat: &Incompatibility| {
            incompat.relation(|p| {
                if p == package {
                    Some(&exact)
                } else {
                    self.term_intersection_for_package(p)
                }
            }) != Relation::Satisfied
        };

        if store[new_incompatibilities].iter().all(not_satisfied) {
            log::info!("add_decision: {} @ {}", package, version);
            self.add_decision(package, version);
            true
        } else {
            log::info!(
                "not adding {} @ {} because of its dependencies",
                package,
                version
            );
            false
        }
    }

    /// Check if the terms in the partial solution satisfy the incompatibility.
    pub(crate) fn relation(&self, incompat: &Incompatibility) -> Relation {
        incompat.relation(|package| self.term_intersection_for_package(package))
    }

    /// Retrieve the intersection of terms in force for a package.
    pub(crate) fn term_intersection_for_package(&self, package: &str) -> Option<&Term> {
        self.package_assignments
            .get(package)
            .map(|pa| pa.assignments_intersection.term())
    }

    /// Figure out if the satisfier and previous satisfier are of different
    /// decision levels.
    pub(crate) fn satisfier_search<'i>(
        &self,
        incompat: &'i Incompatibility,
        store: &Arena<Incompatibility>,
    ) -> (&'i String, SatisfierSearch) {
        let satisfied_map = Self::find_satisfier(incompat, &self.package_assignments);
        let (satisfier_package, (satisfier_cause, _, satisfier_decision_level)) = satisfied_map
            .iter()
            .max_by_key(|(_p, (_, global_index, _))| *global_index)
            .map(|(p, s)| (*p, *s))
            .expect("incompatibility must have satisfiers");
        let previous_satisfier_level = Self::find_previous_satisfier(
            incompat,
            satisfier_package,
            satisfied_map,
            &self.package_assignments,
            store,
        );
        let search_result = if previous_satisfier_level >= satisfier_decision_level {
            SatisfierSearch::SameDecisionLevels {
                satisfier_cause: satisfier_cause
                    .expect("satisfiers at the same level derive from an incompatibility"),
            }
        } else {
            SatisfierSearch::DifferentDecisionLevels {
                previous_satisfier_level,
            }
        };
        (satisfier_package, search_result)
    }

    /// A satisfier is the earliest assignment in the partial solution such
    /// that the incompatibility is satisfied by the partial solution up to
    /// and including that assignment.
    ///
    /// Returns a map indicating for each package term when it was first
    /// satisfied in history. If a satisfier was effectively found, the
    /// returned map has the same size as the incompatibility.
    fn find_satisfier<'i>(
        incompat: &'i Incompatibility,
        package_assignments: &FxIndexMap<String, PackageAssignments>,
    ) -> SatisfiedMap<'i> {
        let mut satisfied = SatisfiedMap::new();
        for (package, incompat_term) in incompat.iter() {
            let pa = package_assignments.get(package).expect("must exist");
            satisfied_insert(
                &mut satisfied,
                package,
                pa.satisfier(package, &incompat_term.negate()),
            );
        }
        satisfied
    }

    /// Earliest assignment in the partial solution before satisfier such
    /// that the incompatibility is satisfied by the partial solution up to
    /// and including that assignment plus satisfier.
    fn find_previous_satisfier<'i>(
        incompat: &Incompatibility,
        satisfier_package: &'i String,
        mut satisfied_map: SatisfiedMap<'i>,
        package_assignments: &FxIndexMap<String, PackageAssignments>,
        store: &Arena<Incompatibility>,
    ) -> DecisionLevel {
        // retrieve the satisfier's previous derivations and the initial
        // accumulated term
        let satisfier_pa = package_assignments.get(satisfier_package).unwrap();
        let (satisfier_cause, _gidx, _dl) =
            satisfied_get(&satisfied_map, satisfier_package).unwrap();

        let accum_term = if let Some(cause) = satisfier_cause {
            store[cause].get(satisfier_package).unwrap().negate()
        } else {
            match &satisfier_pa.assignments_intersection {
                AssignmentsIntersection::Derivations(_) => panic!("must be a decision"),
                AssignmentsIntersection::Decision((_, _, term)) => term.clone(),
            }
        };

        let incompat_term = incompat
            .get(satisfier_package)
            .expect("satisfier package not in incompat");

        satisfied_insert(
            &mut satisfied_map,
            satisfier_package,
            satisfier_pa.satisfier(
                satisfier_package,
                &accum_term.intersection(&incompat_term.negate()),
            ),
        );

        // finally, identify the decision level of that previous satisfier
        let (_, (_, _, decision_level)) = satisfied_map
            .iter()
            .max_by_key(|(_p, (_, global_index, _))| *global_index)
            .unwrap();
        (*decision_level).max(DecisionLevel(1))
    }

    pub(crate) fn current_decision_level(&self) -> DecisionLevel {
        self.current_decision_level
    }
}

impl PackageAssignments {
    fn satisfier(&self, package: &str, start_term: &Term) -> (Option<IncompId>, u32, DecisionLevel) {
        // find a satisfier in the derivation history, otherwise it has to be
        // the decision
        let idx = self
            .dated_derivations
            .as_slice()
            .partition_point(|dd| !dd.accumulated_intersection.is_disjoint(start_term));
        if let Some(dd) = self.dated_derivations.get(idx) {
            debug_assert!(dd.accumulated_intersection.is_disjoint(start_term));
            return (Some(dd.cause), dd.global_index, dd.decision_level);
        }
        match &self.assignments_intersection {
            AssignmentsIntersection::Decision((global_index, _, _)) => {
                (None, *global_index, self.highest_decision_level)
            }
            AssignmentsIntersection::Derivations(accumulated_intersection) => {
                unreachable!(
                    "while processing package {}: accum_term = {} has overlap \
                     with incompat_term = {}, which means the last assignment \
                     should have been a decision, but instead it was a derivation",
                    package, accumulated_intersection, start_term
                )
            }
        }
    }
}

impl AssignmentsIntersection {
    /// The term intersection of all assignments (decision included).
    fn term(&self) -> &Term {
        match self {
            Self::Decision((_, _, term)) => term,
            Self::Derivations(term) => term,
        }
    }

    /// A package is a potential pick if there isn't an already selected
    /// version (no decision) and the intersection of terms in force is
    /// positive.
    fn potential_package_filter<'a>(&'a self, package: &'a String) -> Option<(&'a String, &'a Constraint)> {
        match self {
            Self::Decision(_) => None,
            Self::Derivations(term_intersection) => {
                if term_intersection.is_positive() {
                    Some((package, term_intersection.unwrap_positive()))
                } else {
                    None
                }
            }
        }
    }
}
