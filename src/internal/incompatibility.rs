// SPDX-License-Identifier: MPL-2.0

//! An incompatibility is a set of terms for different packages
//! that should never be satisfied all together.

use std::fmt;
use std::sync::Arc;

use smallvec::{smallvec, SmallVec};
use xbps_version::{Constraint, Version};

use crate::internal::arena::{Arena, Id};
use crate::report::{DerivationTree, Derived, External};
use crate::term::{self, Term};
use crate::{Map, Set};

/// An incompatibility is a set of terms for different packages
/// that should never be satisfied all together.
///
/// An incompatibility usually originates from a package dependency: if vim
/// at version 8 depends on libX >= 2, you can never have both terms
/// `vim = 8` and `not libX >= 2` satisfied at the same time in a partial
/// solution; the set `{ vim = 8, not libX >= 2 }` is an incompatibility.
///
/// Incompatibilities can also be derived from two other incompatibilities
/// during conflict resolution, in which case the cause records both parents.
#[derive(Debug, Clone)]
pub(crate) struct Incompatibility {
    package_terms: SmallVec<[(String, Term); 2]>,
    cause: Cause,
}

pub(crate) type IncompId = Id<Incompatibility>;

/// What proved the terms of an incompatibility contradictory.
#[derive(Debug, Clone)]
pub(crate) enum Cause {
    /// Initial incompatibility forcing the root choice.
    Root(String, Version),
    /// The depender, at the given versions, requires the dependee inside the
    /// given constraint.
    Dependency(String, Constraint, String, Constraint),
    /// No candidate version matches the constraint.
    NoVersion(String, Constraint),
    /// The package has no candidate versions at all.
    NotFound(String),
    /// The pinned version of a held package is excluded by the constraint.
    Held(String, Version, Constraint),
    /// The package was requested to be removed.
    Removed(String),
    /// Derived from two other incompatibilities during conflict resolution.
    Conflict(IncompId, IncompId),
}

/// A Relation describes how a set of terms can be compared to an
/// incompatibility. Typically, the set of terms comes from the partial
/// solution.
#[derive(Debug, Eq, PartialEq)]
pub(crate) enum Relation {
    /// We say that a set of terms S satisfies an incompatibility I
    /// if S satisfies every term in I.
    Satisfied,
    /// We say that S contradicts I if S contradicts at least one term in I.
    Contradicted(String),
    /// If S satisfies all but one of I's terms and is inconclusive for the
    /// remaining term, we say S "almost satisfies" I and we call the
    /// remaining term the "unsatisfied term".
    AlmostSatisfied(String),
    /// Otherwise, we say that their relation is inconclusive.
    Inconclusive,
}

impl Incompatibility {
    /// Create the initial "not root" incompatibility.
    pub(crate) fn not_root(package: String, version: Version) -> Self {
        Self {
            package_terms: smallvec![(
                package.clone(),
                Term::Negative(Constraint::exactly(version.clone())),
            )],
            cause: Cause::Root(package, version),
        }
    }

    /// Create an incompatibility to remember that a given set does not
    /// contain any version.
    pub(crate) fn no_versions(package: String, term: Term) -> Self {
        let set = match &term {
            Term::Positive(c) => c.clone(),
            Term::Negative(_) => panic!("no_versions requires a positive term"),
        };
        Self {
            package_terms: smallvec![(package.clone(), term)],
            cause: Cause::NoVersion(package, set),
        }
    }

    /// Create an incompatibility to remember that a package
    /// has no candidate version anywhere.
    pub(crate) fn not_found(package: String) -> Self {
        Self {
            package_terms: smallvec![(
                package.clone(),
                Term::Positive(Constraint::any()),
            )],
            cause: Cause::NotFound(package),
        }
    }

    /// Create an incompatibility to remember that the pinned version of a
    /// held package is excluded by the requesting constraint.
    pub(crate) fn held(package: String, version: Version, term: Term) -> Self {
        let set = match &term {
            Term::Positive(c) => c.clone(),
            Term::Negative(_) => panic!("held requires a positive term"),
        };
        Self {
            package_terms: smallvec![(package.clone(), term)],
            cause: Cause::Held(package, version, set),
        }
    }

    /// Create an incompatibility excluding every version of a package the
    /// user asked to remove: the root and any version of the package cannot
    /// be selected together.
    pub(crate) fn removed(root: String, root_version: Version, package: String) -> Self {
        Self {
            package_terms: smallvec![
                (root, Term::Positive(Constraint::exactly(root_version))),
                (package.clone(), Term::Positive(Constraint::any())),
            ],
            cause: Cause::Removed(package),
        }
    }

    /// Build an incompatibility from a given dependency.
    pub(crate) fn from_dependency(
        package: String,
        versions: Constraint,
        dep: (String, Constraint),
    ) -> Self {
        let (dep_package, dep_constraint) = dep;
        // a dependency on the empty set makes the depender itself
        // unselectable, and `not ∅` carries no information
        let package_terms = if dep_constraint.is_empty() {
            smallvec![(package.clone(), Term::Positive(versions.clone()))]
        } else {
            smallvec![
                (package.clone(), Term::Positive(versions.clone())),
                (dep_package.clone(), Term::Negative(dep_constraint.clone())),
            ]
        };
        Self {
            package_terms,
            cause: Cause::Dependency(package, versions, dep_package, dep_constraint),
        }
    }

    /// Prior cause of two incompatibilities using the rule of resolution.
    pub(crate) fn prior_cause(
        incompat: IncompId,
        satisfier_cause: IncompId,
        package: &str,
        store: &Arena<Incompatibility>,
    ) -> Self {
        let cause = Cause::Conflict(incompat, satisfier_cause);
        // terms of both parents, minus the shared package, with duplicates
        // intersected
        let mut package_terms: SmallVec<[(String, Term); 2]> = store[incompat]
            .package_terms
            .iter()
            .filter(|(p, _)| p != package)
            .cloned()
            .collect();
        for (p, t) in &store[satisfier_cause].package_terms {
            if p == package {
                continue;
            }
            match package_terms.iter_mut().find(|(q, _)| q == p) {
                Some((_, existing)) => *existing = existing.intersection(t),
                None => package_terms.push((p.clone(), t.clone())),
            }
        }
        // the shared package gets the union of its terms, unless that union
        // is trivially true
        let t1 = store[incompat].get(package).unwrap();
        let t2 = store[satisfier_cause].get(package).unwrap();
        let term = t1.union(t2);
        if term != Term::any() {
            package_terms.push((package.to_string(), term));
        }
        Self {
            package_terms,
            cause,
        }
    }

    /// CF definition of Relation enum.
    pub(crate) fn relation<'t>(
        &self,
        mut terms: impl FnMut(&str) -> Option<&'t Term>,
    ) -> Relation {
        let mut relation = Relation::Satisfied;
        for (package, incompat_term) in &self.package_terms {
            match terms(package).map(|term| incompat_term.relation_with(term)) {
                Some(term::Relation::Satisfied) => {}
                Some(term::Relation::Contradicted) => {
                    return Relation::Contradicted(package.clone());
                }
                None | Some(term::Relation::Inconclusive) => {
                    // If a package is not present, the intersection is the
                    // same as the always-true term, which is inconclusive.
                    if relation == Relation::Satisfied {
                        relation = Relation::AlmostSatisfied(package.clone());
                    } else {
                        relation = Relation::Inconclusive;
                    }
                }
            }
        }
        relation
    }

    /// Check if an incompatibility should mark the end of the algorithm
    /// because it satisfies the root package.
    pub(crate) fn is_terminal(&self, root_package: &str, root_version: &Version) -> bool {
        if self.package_terms.is_empty() {
            true
        } else if self.package_terms.len() > 1 {
            false
        } else {
            let (package, term) = &self.package_terms[0];
            package == root_package && term.contains(root_version)
        }
    }

    /// Get the term related to a given package (if it exists).
    pub(crate) fn get(&self, package: &str) -> Option<&Term> {
        self.package_terms
            .iter()
            .find(|(p, _)| p == package)
            .map(|(_, t)| t)
    }

    /// Iterate over packages.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &Term)> {
        self.package_terms.iter().map(|(p, t)| (p, t))
    }

    // Reporting ##############################################################

    /// Retrieve parent causes if of type Conflict.
    pub(crate) fn causes(&self) -> Option<(IncompId, IncompId)> {
        match self.cause {
            Cause::Conflict(id1, id2) => Some((id1, id2)),
            _ => None,
        }
    }

    /// Build a derivation tree for error reporting.
    pub(crate) fn build_derivation_tree(
        self_id: IncompId,
        shared_ids: &Set<IncompId>,
        store: &Arena<Incompatibility>,
        precomputed: &Map<IncompId, Arc<DerivationTree>>,
    ) -> DerivationTree {
        match &store[self_id].cause {
            Cause::Conflict(id1, id2) => {
                let derived = Derived {
                    terms: store[self_id]
                        .iter()
                        .map(|(p, t)| (p.clone(), t.clone()))
                        .collect(),
                    shared_id: shared_ids.contains(&self_id).then(|| self_id.into_raw()),
                    cause1: precomputed
                        .get(id1)
                        .expect("causes are processed before their effects")
                        .clone(),
                    cause2: precomputed
                        .get(id2)
                        .expect("causes are processed before their effects")
                        .clone(),
                };
                DerivationTree::Derived(derived)
            }
            Cause::Root(package, version) => {
                DerivationTree::External(External::NotRoot(package.clone(), version.clone()))
            }
            Cause::NoVersion(package, set) => {
                DerivationTree::External(External::NoVersions(package.clone(), set.clone()))
            }
            Cause::NotFound(package) => {
                DerivationTree::External(External::NotFound(package.clone()))
            }
            Cause::Held(package, version, set) => DerivationTree::External(External::Held(
                package.clone(),
                version.clone(),
                set.clone(),
            )),
            Cause::Removed(package) => {
                DerivationTree::External(External::Removed(package.clone()))
            }
            Cause::Dependency(package, versions, dep, dep_set) => {
                DerivationTree::External(External::FromDependencyOf(
                    package.clone(),
                    versions.clone(),
                    dep.clone(),
                    dep_set.clone(),
                ))
            }
        }
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Map<String, Term> = self
            .iter()
            .map(|(p, t)| (p.clone(), t.clone()))
            .collect();
        write!(f, "{}", crate::report::terms_sentence(&terms))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::term::tests::strategy as term_strategy;

    proptest! {
        /// For any three different packages p1, p2 and p3, for any three
        /// terms t1, t2 and t3, if we have the two incompatibilities
        /// `{p1: t1, p2: not t2}` and `{p2: t2, p3: t3}`, the rule of
        /// resolution lets us deduce `{p1: t1, p3: t3}`.
        #[test]
        fn rule_of_resolution(t1 in term_strategy(), t2 in term_strategy(), t3 in term_strategy()) {
            let mut store = Arena::new();
            let i1 = store.alloc(Incompatibility {
                package_terms: smallvec![
                    ("p1".to_string(), t1.clone()),
                    ("p2".to_string(), t2.negate()),
                ],
                cause: Cause::NotFound("p1".to_string()),
            });
            let i2 = store.alloc(Incompatibility {
                package_terms: smallvec![
                    ("p2".to_string(), t2.clone()),
                    ("p3".to_string(), t3.clone()),
                ],
                cause: Cause::NotFound("p2".to_string()),
            });

            let mut expected = Map::default();
            expected.insert("p1".to_string(), t1);
            expected.insert("p3".to_string(), t3);

            let resolved = Incompatibility::prior_cause(i1, i2, "p2", &store);
            let actual: Map<String, Term> =
                resolved.iter().map(|(p, t)| (p.clone(), t.clone())).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
