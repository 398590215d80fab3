// SPDX-License-Identifier: MPL-2.0

//! The outer solving loop: alternate unit propagation and decision making
//! until the positive term set is fully decided or a conflict proves the
//! requests unsatisfiable.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use xbps_version::{Constraint, Version};

use crate::error::SolveError;
use crate::internal::{Incompatibility, State};
use crate::universe::{CandidateError, Universe};
use crate::{Map, SelectedDependencies};

/// Name of the synthetic root package whose dependencies are the user
/// requests. Uses the reserved prefix so it can never collide with a real
/// package.
pub(crate) const ROOT_PKG: &str = "_XBPS_ROOT_";

/// Version of the synthetic root package.
pub(crate) fn root_version() -> Version {
    Version::from("0")
}

/// Find a set of package versions satisfying the root dependencies, or
/// explain why none exists.
///
/// `removals` name installed packages no version of which may appear in the
/// solution.
pub(crate) fn resolve(
    universe: &Universe,
    root_deps: Vec<(String, Constraint)>,
    removals: &[String],
) -> Result<SelectedDependencies, SolveError> {
    let root = ROOT_PKG.to_string();
    let root_version = root_version();
    let mut state = State::init(root.clone(), root_version.clone());
    for name in removals {
        state.add_incompatibility(Incompatibility::removed(
            root.clone(),
            root_version.clone(),
            name.clone(),
        ));
    }

    let mut added_dependencies: Map<String, BTreeSet<Version>> = Map::default();
    let mut next = root;
    loop {
        log::info!("unit_propagation: {}", &next);
        state
            .unit_propagation(next)
            .map_err(|tree| SolveError::NoSolution(Box::new(tree)))?;

        let Some(highest_priority_pkg) =
            state.partial_solution.pick_highest_priority_pkg(|p, c| {
                if p == ROOT_PKG {
                    Reverse(1)
                } else {
                    Reverse(universe.count_versions(p, c))
                }
            })
        else {
            // No undecided package with a positive term remains: success.
            log::debug!("solved after {} conflict attempts", state.attempts);
            let mut solution = state.partial_solution.extract_solution();
            solution.remove(ROOT_PKG);
            return Ok(solution);
        };
        next = highest_priority_pkg;

        let term_intersection = state
            .partial_solution
            .term_intersection_for_package(&next)
            .ok_or_else(|| {
                SolveError::Failure("a package was chosen but we don't have a term".into())
            })?;

        let v = if next == ROOT_PKG {
            root_version.clone()
        } else {
            match universe.best_version(&next, term_intersection.unwrap_positive()) {
                Ok(v) => v,
                Err(CandidateError::NoVersion) => {
                    let inc =
                        Incompatibility::no_versions(next.clone(), term_intersection.clone());
                    state.add_incompatibility(inc);
                    continue;
                }
                Err(CandidateError::NotFound) => {
                    state.add_incompatibility(Incompatibility::not_found(next.clone()));
                    continue;
                }
                Err(CandidateError::Held(version)) => {
                    let inc = Incompatibility::held(
                        next.clone(),
                        version,
                        term_intersection.clone(),
                    );
                    state.add_incompatibility(inc);
                    continue;
                }
            }
        };
        log::info!("chose: {} @ {}", next, v);

        if !term_intersection.contains(&v) {
            return Err(SolveError::Failure(
                "best_version picked a version outside its constraint".into(),
            ));
        }

        let is_new_dependency = added_dependencies
            .entry(next.clone())
            .or_default()
            .insert(v.clone());

        if is_new_dependency {
            let dependencies = if next == ROOT_PKG {
                root_deps.clone()
            } else {
                universe.dependencies_of(&next, &v).ok_or_else(|| {
                    SolveError::Failure(format!("could not retrieve dependencies of {next}-{v}"))
                })?
            };

            // Add the package's dependency incompatibilities, then the
            // decision itself if those are not already conflicting.
            let dep_incompats =
                state.add_incompatibility_from_dependencies(next.clone(), v.clone(), dependencies);
            if state.partial_solution.add_version(
                next.clone(),
                v.clone(),
                dep_incompats,
                &state.incompatibility_store,
            ) {
                state.decision_made();
            }
        } else {
            // The dependency incompatibilities are already registered, so
            // no satisfied term can be among them.
            log::info!("add_decision (not first time): {} @ {}", next, v);
            state.partial_solution.add_decision(next.clone(), v);
            state.decision_made();
        }
    }
}
