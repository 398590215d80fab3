// SPDX-License-Identifier: MPL-2.0

//! Version algebra for the xbps transaction solver.
//!
//! Three pieces live here, all operating on plain strings without any
//! knowledge of databases or repositories:
//!
//! - [Version] and [version_cmp]: dewey-compatible version comparison and
//!   `name-version` string dissection;
//! - [pattern_match] and friends: package pattern (`NAME>=A<B`, `NAME-V`,
//!   globs) parsing and matching;
//! - [Constraint]: sets of versions represented as unions of disjoint
//!   intervals, with the set operations the solver reasons with.

mod constraint;
mod pattern;
mod version;

pub use constraint::Constraint;
#[cfg(any(feature = "proptest", test))]
pub use constraint::proptest_strategy;
pub use pattern::{dep_name, parse_dep, pattern_match, pattern_name};
pub use version::{
    pkg_name, pkg_revision, pkg_version, pkgver_cmp, pkgver_parts, version_cmp, Version,
};
