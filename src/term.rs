// SPDX-License-Identifier: MPL-2.0

//! A term is the fundamental unit of operation of the solver.
//! It is a positive or negative expression regarding a set of versions.

use std::fmt;

use xbps_version::{Constraint, Version};

/// A positive or negative expression regarding a set of versions.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Term {
    /// For example, `vim >=8<9` is a positive expression that is evaluated
    /// true if a version of vim is selected and lies in the interval.
    Positive(Constraint),
    /// The term `not vim <8` is a negative expression that is evaluated true
    /// if a version >= 8 is selected or if no version is selected at all.
    Negative(Constraint),
}

impl Term {
    /// A term that is always true.
    pub(crate) fn any() -> Self {
        Self::Negative(Constraint::empty())
    }

    /// A positive term containing exactly that version.
    pub(crate) fn exact(version: Version) -> Self {
        Self::Positive(Constraint::exactly(version))
    }

    pub(crate) fn is_positive(&self) -> bool {
        match self {
            Self::Positive(_) => true,
            Self::Negative(_) => false,
        }
    }

    /// Negate a term. Evaluation of a negated term always returns the
    /// opposite of the evaluation of the original one.
    pub(crate) fn negate(&self) -> Self {
        match self {
            Self::Positive(set) => Self::Negative(set.clone()),
            Self::Negative(set) => Self::Positive(set.clone()),
        }
    }

    /// Evaluate a term regarding a given choice of version.
    pub(crate) fn contains(&self, v: &Version) -> bool {
        match self {
            Self::Positive(set) => set.contains(v),
            Self::Negative(set) => !set.contains(v),
        }
    }

    /// The constraint of a positive term.
    /// Will panic if used on a negative term.
    pub(crate) fn unwrap_positive(&self) -> &Constraint {
        match self {
            Self::Positive(set) => set,
            Self::Negative(_) => panic!("negative term cannot unwrap positive constraint"),
        }
    }

    /// Compute the intersection of two terms.
    /// If at least one term is positive, the intersection is also positive.
    pub(crate) fn intersection(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Positive(c1), Self::Positive(c2)) => Self::Positive(c1.intersection(c2)),
            (Self::Positive(c1), Self::Negative(c2)) => Self::Positive(c1.difference(c2)),
            (Self::Negative(c1), Self::Positive(c2)) => Self::Positive(c2.difference(c1)),
            (Self::Negative(c1), Self::Negative(c2)) => Self::Negative(c1.union(c2)),
        }
    }

    /// Check if two terms are mutually exclusive.
    ///
    /// An optimization for the native implementation of checking whether the
    /// intersection of two terms is never satisfiable.
    pub(crate) fn is_disjoint(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Positive(c1), Self::Positive(c2)) => c1.is_disjoint(c2),
            (Self::Negative(c1), Self::Positive(c2)) => c2.subset_of(c1),
            (Self::Positive(c1), Self::Negative(c2)) => c1.subset_of(c2),
            // the intersection of two negative terms is always satisfiable
            (Self::Negative(_), Self::Negative(_)) => false,
        }
    }

    /// Compute the union of two terms.
    /// If at least one term is negative, the union is also negative.
    pub(crate) fn union(&self, other: &Self) -> Self {
        self.negate().intersection(&other.negate()).negate()
    }

    /// Indicate if this term is a subset of another term.
    /// Just like for sets, t1 is a subset of t2 if and only if t1 ∩ t2 = t1.
    pub(crate) fn subset_of(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Positive(c1), Self::Positive(c2)) => c1.subset_of(c2),
            (Self::Positive(c1), Self::Negative(c2)) => c1.is_disjoint(c2),
            // a negative term admits "no version selected", which no
            // positive term does
            (Self::Negative(_), Self::Positive(_)) => false,
            (Self::Negative(c1), Self::Negative(c2)) => c2.subset_of(c1),
        }
    }
}

/// Describe a relation between a set of terms S and another term t.
///
/// As a shorthand, we say that a term v satisfies or contradicts a term t if
/// `{v}` satisfies or contradicts it.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Relation {
    /// We say that a set of terms S "satisfies" a term t if t must be true
    /// whenever every term in S is true.
    Satisfied,
    /// Conversely, S "contradicts" t if t must be false whenever every term
    /// in S is true.
    Contradicted,
    /// If neither of these is true we say that S is "inconclusive" for t.
    Inconclusive,
}

impl Term {
    /// Check if a set of terms satisfies or contradicts this term, where the
    /// set is given by its intersection. Otherwise the relation is
    /// inconclusive:
    ///
    /// - S satisfies t if and only if ⋂ S ⊆ t
    /// - S contradicts t if and only if (⋂ S) ⋂ t = ∅
    pub(crate) fn relation_with(&self, other_terms_intersection: &Term) -> Relation {
        if other_terms_intersection.subset_of(self) {
            Relation::Satisfied
        } else if self.is_disjoint(other_terms_intersection) {
            Relation::Contradicted
        } else {
            Relation::Inconclusive
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive(set) => write!(f, "{set}"),
            Self::Negative(set) => write!(f, "not {set}"),
        }
    }
}
