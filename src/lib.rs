// SPDX-License-Identifier: MPL-2.0

//! Transaction solver for the xbps binary package manager.
//!
//! Given the installed package database, a pool of repositories and a set
//! of user requests (install, update, remove), the solver computes a
//! consistent set of package versions satisfying every run-time dependency
//! constraint, or explains why none exists.
//!
//! The resolver is conflict-driven: it alternates unit propagation and
//! decision phases over package-version constraints, learns a new
//! incompatibility from every conflict and backtracks, in the manner of the
//! PubGrub version solving algorithm. A successful solution is linearised
//! into install order, and the resulting transaction can be checked for
//! per-mountpoint disk space and alternatives-symlink consistency.
//!
//! # Basic example
//!
//! ```
//! use xbps_solve::{PackageRecord, PkgDb, Repository, RepositoryPool, Transaction, Universe};
//!
//! let mut repo = Repository::new("https://repo/current");
//! let mut vim = PackageRecord::new("vim-8.2_1");
//! vim.run_depends = vec!["libvim>=8.0".to_string()];
//! repo.insert(vim);
//! repo.insert(PackageRecord::new("libvim-8.2_1"));
//!
//! let mut rpool = RepositoryPool::new();
//! rpool.push(repo);
//! let universe = Universe::new(PkgDb::new(), rpool);
//!
//! let mut txn = Transaction::new(&universe);
//! txn.install("vim").unwrap();
//! let plan = txn.solve().unwrap();
//!
//! // dependencies come first in the action list
//! let order: Vec<&str> = plan.entries.iter().map(|e| e.pkgver.as_str()).collect();
//! assert_eq!(order, ["libvim-8.2_1", "vim-8.2_1"]);
//! ```
//!
//! # Failure reporting
//!
//! When the requests cannot be satisfied, [Transaction::solve] returns
//! [SolveError::NoSolution] carrying a [DerivationTree]: the full chain of
//! reasons, ready to be rendered with a [Reporter]:
//!
//! ```
//! use xbps_solve::{
//!     DefaultStringReporter, PackageRecord, PkgDb, Repository, RepositoryPool, Reporter,
//!     SolveError, Transaction, TransactionError, Universe,
//! };
//!
//! let mut repo = Repository::new("https://repo/current");
//! let mut a = PackageRecord::new("A-1.0_1");
//! a.run_depends = vec!["B>=2.0".to_string()];
//! repo.insert(a);
//! repo.insert(PackageRecord::new("B-1.0_1"));
//! let mut rpool = RepositoryPool::new();
//! rpool.push(repo);
//! let universe = Universe::new(PkgDb::new(), rpool);
//!
//! let mut txn = Transaction::new(&universe);
//! txn.install("A").unwrap();
//! match txn.solve() {
//!     Err(TransactionError::Solve(SolveError::NoSolution(mut tree))) => {
//!         tree.collapse_no_versions();
//!         eprintln!("{}", DefaultStringReporter::report(&tree));
//!     }
//!     other => panic!("expected no solution, got {:?}", other.map(|_| ())),
//! }
//! ```

#![warn(missing_docs)]

mod alternatives;
mod config;
mod deptree;
mod error;
mod internal;
mod report;
mod solver;
mod term;
mod transaction;
mod universe;

pub use alternatives::{check_pkg_alternatives, LinkIssue, LinkIssueKind};
pub use config::{Config, Flags};
pub use deptree::{fulldeptree, DepSource};
pub use error::{SolveError, TransactionError};
pub use report::{
    DefaultStringReportFormatter, DefaultStringReporter, DerivationTree, Derived, External,
    ReportFormatter, Reporter,
};
pub use term::Term;
pub use transaction::{
    system_mountpoints, transaction_diskspace, BinpkgProvider, CachedBinpkgs, Mountpoint,
    Transaction, TransactionEntry, TransactionKind, TransactionSet,
};
pub use universe::{
    FileEntry, PackageRecord, PkgDb, Repository, RepositoryPool, Universe, ALTERNATIVES_KEY,
    RESERVED_PREFIX,
};

pub use xbps_version::{Constraint, Version};

/// Map implementation used by the library.
pub type Map<K, V> = rustc_hash::FxHashMap<K, V>;

/// Set implementation used by the library.
pub type Set<V> = rustc_hash::FxHashSet<V>;

/// The (package name → version) choices of a successful solve.
pub type SelectedDependencies = Map<String, xbps_version::Version>;
