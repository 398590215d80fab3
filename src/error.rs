// SPDX-License-Identifier: MPL-2.0

//! Errors are values with a tag and context.

use std::path::PathBuf;

use thiserror::Error;
use xbps_version::Version;

use crate::report::DerivationTree;

/// Errors that may occur while solving a transaction.
#[derive(Error, Debug)]
pub enum SolveError {
    /// There is no solution for this set of requests. The derivation tree
    /// explains why; render it with a
    /// [Reporter](crate::report::Reporter).
    #[error("version solving failed")]
    NoSolution(Box<DerivationTree>),

    /// A directly requested package has no candidate in the pool or the
    /// database.
    #[error("package {0} not found")]
    NotFound(String),

    /// A held package cannot change and its pinned version is excluded by
    /// the request.
    #[error("{package} is held at version {version}")]
    Hold {
        /// The held package.
        package: String,
        /// The version it is pinned to.
        version: Version,
    },

    /// A package requested for removal is not installed.
    #[error("package {0} is not installed")]
    NotInstalled(String),

    /// An internal invariant was violated; this is a bug.
    #[error("{0}")]
    Failure(String),
}

/// Errors raised while turning a solution into a concrete transaction.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Solving failed.
    #[error(transparent)]
    Solve(#[from] SolveError),

    /// A run-time dependency is missing from the repository pool.
    #[error("{pkgver}: missing dependency '{dependency}'")]
    MissingDependency {
        /// The package whose dependency is missing.
        pkgver: String,
        /// The dependency expression that could not be resolved.
        dependency: String,
    },

    /// The dependency graph contains a cycle through the named package.
    #[error("dependency cycle through {0}")]
    DependencyCycle(String),

    /// A mountpoint does not have enough free space for the net size delta
    /// of the transaction.
    #[error(
        "not enough free space on {mountpoint}: {required} bytes required, {available} available"
    )]
    InsufficientSpace {
        /// The mountpoint that would overflow.
        mountpoint: PathBuf,
        /// Net bytes the transaction needs on that mountpoint.
        required: u64,
        /// Free bytes currently available there.
        available: u64,
    },

    /// Reading a binary package archive or the mount table failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
