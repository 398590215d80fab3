// SPDX-License-Identifier: MPL-2.0

//! Build a report as clear as possible as to why dependency solving failed.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use xbps_version::{Constraint, Version};

use crate::term::Term;
use crate::Map;

/// Reporter trait.
pub trait Reporter {
    /// Output type of the report.
    type Output;

    /// Generate a report from the derivation tree describing the resolution
    /// failure using the default formatter.
    fn report(derivation_tree: &DerivationTree) -> Self::Output;

    /// Generate a report from the derivation tree describing the resolution
    /// failure using a custom formatter.
    fn report_with_formatter(
        derivation_tree: &DerivationTree,
        formatter: &impl ReportFormatter<Output = Self::Output>,
    ) -> Self::Output;
}

/// Derivation tree resulting in the impossibility to solve the dependencies
/// of the transaction root.
#[derive(Debug, Clone)]
pub enum DerivationTree {
    /// External incompatibility.
    External(External),
    /// Incompatibility derived from two others.
    Derived(Derived),
}

/// Incompatibilities that are not derived from others: they have their own
/// reason.
#[derive(Debug, Clone)]
pub enum External {
    /// Initial incompatibility aiming at picking the root package for the
    /// first decision.
    NotRoot(String, Version),
    /// There are no versions in the given set for this package.
    NoVersions(String, Constraint),
    /// The package has no candidate version in the pool or the database.
    NotFound(String),
    /// The package is pinned to a version outside the given set.
    Held(String, Version, Constraint),
    /// The package was requested to be removed.
    Removed(String),
    /// Incompatibility coming from the dependencies of a given package.
    FromDependencyOf(String, Constraint, String, Constraint),
}

/// Incompatibility derived from two others.
#[derive(Debug, Clone)]
pub struct Derived {
    /// Terms of the incompatibility.
    pub terms: Map<String, Term>,
    /// Indicate if that incompatibility is present multiple times in the
    /// derivation tree. If that is the case, it has a unique id, provided in
    /// that option. Then, we may want to only explain it once, and refer to
    /// the explanation for the other times.
    pub shared_id: Option<usize>,
    /// First cause.
    pub cause1: Arc<DerivationTree>,
    /// Second cause.
    pub cause2: Arc<DerivationTree>,
}

impl DerivationTree {
    /// Merge the [NoVersions](External::NoVersions) external
    /// incompatibilities with the other one they are matched with in a
    /// derived incompatibility. This cleans up the generated report.
    pub fn collapse_no_versions(&mut self) {
        match self {
            DerivationTree::External(_) => {}
            DerivationTree::Derived(derived) => {
                match (
                    Arc::make_mut(&mut derived.cause1),
                    Arc::make_mut(&mut derived.cause2),
                ) {
                    (DerivationTree::External(External::NoVersions(p, set)), cause2) => {
                        cause2.collapse_no_versions();
                        *self = cause2
                            .clone()
                            .merge_no_versions(p.to_owned(), set.to_owned())
                            .unwrap_or_else(|| self.to_owned());
                    }
                    (cause1, DerivationTree::External(External::NoVersions(p, set))) => {
                        cause1.collapse_no_versions();
                        *self = cause1
                            .clone()
                            .merge_no_versions(p.to_owned(), set.to_owned())
                            .unwrap_or_else(|| self.to_owned());
                    }
                    (cause1, cause2) => {
                        cause1.collapse_no_versions();
                        cause2.collapse_no_versions();
                    }
                }
            }
        }
    }

    fn merge_no_versions(self, package: String, set: Constraint) -> Option<Self> {
        match self {
            DerivationTree::Derived(_) => Some(self),
            DerivationTree::External(External::NotRoot(..)) => {
                panic!("how did we end up with a NoVersions merged with a NotRoot?")
            }
            DerivationTree::External(External::NoVersions(_, set2)) => Some(
                DerivationTree::External(External::NoVersions(package, set.union(&set2))),
            ),
            // cannot be merged because the reason may not match
            DerivationTree::External(External::NotFound(_))
            | DerivationTree::External(External::Held(..))
            | DerivationTree::External(External::Removed(_)) => None,
            DerivationTree::External(External::FromDependencyOf(p1, set1, p2, set2)) => {
                if p1 == package {
                    Some(DerivationTree::External(External::FromDependencyOf(
                        p1,
                        set1.union(&set),
                        p2,
                        set2,
                    )))
                } else {
                    Some(DerivationTree::External(External::FromDependencyOf(
                        p1,
                        set1,
                        p2,
                        set2.union(&set),
                    )))
                }
            }
        }
    }
}

// The synthetic root package never reaches user output under its internal
// name.
fn display_name(package: &str) -> &str {
    if package == crate::solver::ROOT_PKG {
        "the transaction"
    } else {
        package
    }
}

impl fmt::Display for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRoot(package, version) => {
                if package == crate::solver::ROOT_PKG {
                    write!(f, "we are solving the transaction")
                } else {
                    write!(f, "{} {} is the transaction root", package, version)
                }
            }
            Self::NoVersions(package, set) => {
                if set.is_any() {
                    write!(f, "there is no available version for {}", package)
                } else {
                    write!(f, "no version of {} matches {}", package, set)
                }
            }
            Self::NotFound(package) => {
                write!(f, "{} doesn't exist", package)
            }
            Self::Held(package, version, set) => {
                if set.is_any() {
                    write!(f, "{} is held at {}", package, version)
                } else {
                    write!(f, "{} is held at {} which is outside {}", package, version, set)
                }
            }
            Self::Removed(package) => {
                write!(f, "{} is marked for removal", package)
            }
            Self::FromDependencyOf(package, set, dep, dep_set) => {
                if package == crate::solver::ROOT_PKG {
                    if dep_set.is_any() {
                        write!(f, "the transaction requires {}", dep)
                    } else {
                        write!(f, "the transaction requires {} {}", dep, dep_set)
                    }
                } else if set.is_any() && dep_set.is_any() {
                    write!(f, "{} depends on {}", package, dep)
                } else if set.is_any() {
                    write!(f, "{} depends on {} {}", package, dep, dep_set)
                } else if dep_set.is_any() {
                    write!(f, "{} {} depends on {}", package, set, dep)
                } else {
                    write!(f, "{} {} depends on {} {}", package, set, dep, dep_set)
                }
            }
        }
    }
}

/// Render an incompatibility's term set as a sentence, specialised on the
/// common shapes: "a depends on b", "either a or b", "x requires y or z",
/// "if a and b then c or d".
pub(crate) fn terms_sentence(terms: &Map<String, Term>) -> String {
    let mut terms_vec: Vec<_> = terms.iter().collect();
    terms_vec.sort_by(|(p1, _), (p2, _)| p1.cmp(p2));
    let name = |package: &String, term: &Term| match term {
        Term::Positive(c) | Term::Negative(c) => {
            if c.is_any() {
                display_name(package).to_string()
            } else {
                format!("{} {}", display_name(package), c)
            }
        }
    };
    match terms_vec.as_slice() {
        [] => "version solving failed".into(),
        [(package, Term::Positive(_))] if package.as_str() == crate::solver::ROOT_PKG => {
            "version solving failed".into()
        }
        [(package, Term::Positive(set))] => {
            if set.is_any() {
                format!("{} is forbidden", package)
            } else {
                format!("{} {} is forbidden", package, set)
            }
        }
        [(package, Term::Negative(set))] => {
            if set.is_any() {
                format!("{} is required", package)
            } else {
                format!("{} {} is required", package, set)
            }
        }
        [(p1, Term::Positive(set1)), (p2, Term::Negative(set2))] => {
            External::FromDependencyOf(
                p1.to_string(),
                set1.clone(),
                p2.to_string(),
                set2.clone(),
            )
            .to_string()
        }
        [(p1, Term::Negative(set1)), (p2, Term::Positive(set2))] => {
            External::FromDependencyOf(
                p2.to_string(),
                set2.clone(),
                p1.to_string(),
                set1.clone(),
            )
            .to_string()
        }
        [(p1, t1 @ Term::Positive(_)), (p2, t2 @ Term::Positive(_))] => {
            format!("{} is incompatible with {}", name(p1, t1), name(p2, t2))
        }
        [(p1, t1 @ Term::Negative(_)), (p2, t2 @ Term::Negative(_))] => {
            format!("either {} or {}", name(p1, t1), name(p2, t2))
        }
        slice => {
            let (positive, negative): (Vec<_>, Vec<_>) =
                slice.iter().partition(|(_, t)| t.is_positive());
            let positive: Vec<String> = positive.iter().map(|(p, t)| name(p, t)).collect();
            let negative: Vec<String> = negative.iter().map(|(p, t)| name(p, t)).collect();
            if !positive.is_empty() && !negative.is_empty() {
                if positive.len() == 1 {
                    format!("{} requires {}", positive[0], negative.join(" or "))
                } else {
                    format!(
                        "if {} then {}",
                        positive.join(" and "),
                        negative.join(" or ")
                    )
                }
            } else if !positive.is_empty() {
                format!("one of {} must be false", positive.join(" or "))
            } else {
                format!("one of {} must be true", negative.join(" or "))
            }
        }
    }
}

/// Trait for formatting outputs in the reporter.
pub trait ReportFormatter {
    /// Output type of the report.
    type Output;

    /// Format an [External] incompatibility.
    fn format_external(&self, external: &External) -> Self::Output;

    /// Format the terms of an incompatibility.
    fn format_terms(&self, terms: &Map<String, Term>) -> Self::Output;

    /// Simplest case, we just combine two external incompatibilities.
    fn explain_both_external(
        &self,
        external1: &External,
        external2: &External,
        current_terms: &Map<String, Term>,
    ) -> Self::Output;

    /// Both causes have already been explained so we use their refs.
    fn explain_both_ref(
        &self,
        ref_id1: usize,
        derived1: &Derived,
        ref_id2: usize,
        derived2: &Derived,
        current_terms: &Map<String, Term>,
    ) -> Self::Output;

    /// One cause is derived (already explained so one-line), the other is an
    /// external cause, and finally we conclude with the current
    /// incompatibility.
    fn explain_ref_and_external(
        &self,
        ref_id: usize,
        derived: &Derived,
        external: &External,
        current_terms: &Map<String, Term>,
    ) -> Self::Output;

    /// Add an external cause to the chain of explanations.
    fn and_explain_external(
        &self,
        external: &External,
        current_terms: &Map<String, Term>,
    ) -> Self::Output;

    /// Add an already explained incompat to the chain of explanations.
    fn and_explain_ref(
        &self,
        ref_id: usize,
        derived: &Derived,
        current_terms: &Map<String, Term>,
    ) -> Self::Output;

    /// Add an already explained incompat and an external cause to the chain
    /// of explanations.
    fn and_explain_prior_and_external(
        &self,
        prior_external: &External,
        external: &External,
        current_terms: &Map<String, Term>,
    ) -> Self::Output;
}

/// Default formatter for the default reporter.
#[derive(Default, Debug)]
pub struct DefaultStringReportFormatter;

impl ReportFormatter for DefaultStringReportFormatter {
    type Output = String;

    fn format_external(&self, external: &External) -> String {
        external.to_string()
    }

    fn format_terms(&self, terms: &Map<String, Term>) -> String {
        terms_sentence(terms)
    }

    fn explain_both_external(
        &self,
        external1: &External,
        external2: &External,
        current_terms: &Map<String, Term>,
    ) -> String {
        format!(
            "Because {} and {}, {}.",
            self.format_external(external1),
            self.format_external(external2),
            self.format_terms(current_terms)
        )
    }

    fn explain_both_ref(
        &self,
        ref_id1: usize,
        derived1: &Derived,
        ref_id2: usize,
        derived2: &Derived,
        current_terms: &Map<String, Term>,
    ) -> String {
        format!(
            "Because {} ({}) and {} ({}), {}.",
            self.format_terms(&derived1.terms),
            ref_id1,
            self.format_terms(&derived2.terms),
            ref_id2,
            self.format_terms(current_terms)
        )
    }

    fn explain_ref_and_external(
        &self,
        ref_id: usize,
        derived: &Derived,
        external: &External,
        current_terms: &Map<String, Term>,
    ) -> String {
        format!(
            "Because {} ({}) and {}, {}.",
            self.format_terms(&derived.terms),
            ref_id,
            self.format_external(external),
            self.format_terms(current_terms)
        )
    }

    fn and_explain_external(
        &self,
        external: &External,
        current_terms: &Map<String, Term>,
    ) -> String {
        format!(
            "And because {}, {}.",
            self.format_external(external),
            self.format_terms(current_terms)
        )
    }

    fn and_explain_ref(
        &self,
        ref_id: usize,
        derived: &Derived,
        current_terms: &Map<String, Term>,
    ) -> String {
        format!(
            "And because {} ({}), {}.",
            self.format_terms(&derived.terms),
            ref_id,
            self.format_terms(current_terms)
        )
    }

    fn and_explain_prior_and_external(
        &self,
        prior_external: &External,
        external: &External,
        current_terms: &Map<String, Term>,
    ) -> String {
        format!(
            "And because {} and {}, {}.",
            self.format_external(prior_external),
            self.format_external(external),
            self.format_terms(current_terms)
        )
    }
}

/// Default reporter able to generate an explanation as a [String].
pub struct DefaultStringReporter {
    /// Number of explanations already with a line reference.
    ref_count: usize,
    /// Shared nodes that have already been marked with a line reference.
    /// The incompatibility ids are the keys, and the line references are the
    /// values.
    shared_with_ref: Map<usize, usize>,
    /// Accumulated lines of the report already generated.
    lines: Vec<String>,
}

impl DefaultStringReporter {
    fn new() -> Self {
        Self {
            ref_count: 0,
            shared_with_ref: Map::default(),
            lines: Vec::new(),
        }
    }

    fn build_recursive<F: ReportFormatter<Output = String>>(
        &mut self,
        derived: &Derived,
        formatter: &F,
    ) {
        self.build_recursive_helper(derived, formatter);
        if let Some(id) = derived.shared_id {
            if self.shared_with_ref.get(&id).is_none() {
                self.add_line_ref();
                self.shared_with_ref.insert(id, self.ref_count);
            }
        };
    }

    fn build_recursive_helper<F: ReportFormatter<Output = String>>(
        &mut self,
        current: &Derived,
        formatter: &F,
    ) {
        match (current.cause1.deref(), current.cause2.deref()) {
            (DerivationTree::External(external1), DerivationTree::External(external2)) => {
                // Simplest case, we just combine two external incompatibilities.
                self.lines.push(formatter.explain_both_external(
                    external1,
                    external2,
                    &current.terms,
                ));
            }
            (DerivationTree::Derived(derived), DerivationTree::External(external)) => {
                // One cause is derived, so we explain this first, then we add
                // the external part and finally conclude with the current
                // incompatibility.
                self.report_one_each(derived, external, &current.terms, formatter);
            }
            (DerivationTree::External(external), DerivationTree::Derived(derived)) => {
                self.report_one_each(derived, external, &current.terms, formatter);
            }
            (DerivationTree::Derived(derived1), DerivationTree::Derived(derived2)) => {
                // This is the most complex case since both causes are also
                // derived.
                match (
                    self.line_ref_of(derived1.shared_id),
                    self.line_ref_of(derived2.shared_id),
                ) {
                    // If both causes already have been referenced
                    // (shared_id), the explanation simply uses those
                    // references.
                    (Some(ref1), Some(ref2)) => self.lines.push(formatter.explain_both_ref(
                        ref1,
                        derived1,
                        ref2,
                        derived2,
                        &current.terms,
                    )),
                    // Otherwise, if one only has a line number reference, we
                    // recursively call the one without reference and then add
                    // the one with reference to conclude.
                    (Some(ref1), None) => {
                        self.build_recursive(derived2, formatter);
                        self.lines
                            .push(formatter.and_explain_ref(ref1, derived1, &current.terms));
                    }
                    (None, Some(ref2)) => {
                        self.build_recursive(derived1, formatter);
                        self.lines
                            .push(formatter.and_explain_ref(ref2, derived2, &current.terms));
                    }
                    // Finally, if no line reference exists yet, we call
                    // recursively the first one and then,
                    //   - if this was a shared node, it will get a line ref
                    //     and we can simply recall this with the current node.
                    //   - otherwise, we add a line reference to it,
                    //     recursively call on the second node,
                    //     and finally conclude.
                    (None, None) => {
                        self.build_recursive(derived1, formatter);
                        if derived1.shared_id.is_some() {
                            self.lines.push("".into());
                            self.build_recursive(current, formatter);
                        } else {
                            self.add_line_ref();
                            let ref1 = self.ref_count;
                            self.lines.push("".into());
                            self.build_recursive(derived2, formatter);
                            self.lines.push(formatter.and_explain_ref(
                                ref1,
                                derived1,
                                &current.terms,
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Report a derived and an external incompatibility.
    ///
    /// The result will depend on whether the derived incompatibility has
    /// already been explained or not.
    fn report_one_each<F: ReportFormatter<Output = String>>(
        &mut self,
        derived: &Derived,
        external: &External,
        current_terms: &Map<String, Term>,
        formatter: &F,
    ) {
        match self.line_ref_of(derived.shared_id) {
            Some(ref_id) => self.lines.push(formatter.explain_ref_and_external(
                ref_id,
                derived,
                external,
                current_terms,
            )),
            None => self.report_recurse_one_each(derived, external, current_terms, formatter),
        }
    }

    /// Report one derived (without a line ref yet) and one external.
    fn report_recurse_one_each<F: ReportFormatter<Output = String>>(
        &mut self,
        derived: &Derived,
        external: &External,
        current_terms: &Map<String, Term>,
        formatter: &F,
    ) {
        match (derived.cause1.deref(), derived.cause2.deref()) {
            // If the derived cause has itself one external prior cause, we
            // can chain the external explanations.
            (DerivationTree::Derived(prior_derived), DerivationTree::External(prior_external)) => {
                self.build_recursive(prior_derived, formatter);
                self.lines.push(formatter.and_explain_prior_and_external(
                    prior_external,
                    external,
                    current_terms,
                ));
            }
            (DerivationTree::External(prior_external), DerivationTree::Derived(prior_derived)) => {
                self.build_recursive(prior_derived, formatter);
                self.lines.push(formatter.and_explain_prior_and_external(
                    prior_external,
                    external,
                    current_terms,
                ));
            }
            _ => {
                self.build_recursive(derived, formatter);
                self.lines
                    .push(formatter.and_explain_external(external, current_terms));
            }
        }
    }

    // Helper functions #######################################################

    fn add_line_ref(&mut self) {
        let new_count = self.ref_count + 1;
        self.ref_count = new_count;
        if let Some(line) = self.lines.last_mut() {
            *line = format!("{} ({})", line, new_count);
        }
    }

    fn line_ref_of(&self, shared_id: Option<usize>) -> Option<usize> {
        shared_id.and_then(|id| self.shared_with_ref.get(&id).cloned())
    }
}

impl Reporter for DefaultStringReporter {
    type Output = String;

    fn report(derivation_tree: &DerivationTree) -> Self::Output {
        let formatter = DefaultStringReportFormatter;
        match derivation_tree {
            DerivationTree::External(external) => formatter.format_external(external),
            DerivationTree::Derived(derived) => {
                let mut reporter = Self::new();
                reporter.build_recursive(derived, &formatter);
                reporter.lines.join("\n")
            }
        }
    }

    fn report_with_formatter(
        derivation_tree: &DerivationTree,
        formatter: &impl ReportFormatter<Output = Self::Output>,
    ) -> Self::Output {
        match derivation_tree {
            DerivationTree::External(external) => formatter.format_external(external),
            DerivationTree::Derived(derived) => {
                let mut reporter = Self::new();
                reporter.build_recursive(derived, formatter);
                reporter.lines.join("\n")
            }
        }
    }
}
