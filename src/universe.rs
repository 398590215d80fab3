// SPDX-License-Identifier: MPL-2.0

//! The package universe the solver draws candidates from: the installed
//! database and the pool of repositories.

use std::collections::BTreeMap;

use xbps_version::{dep_name, parse_dep, pkgver_parts, Constraint, Version};

/// Reserved key prefix for synthetic (non package) database entries.
pub const RESERVED_PREFIX: &str = "_XBPS_";

/// Database key of the alternatives registry.
pub const ALTERNATIVES_KEY: &str = "_XBPS_ALTERNATIVES_";

/// A single file or directory owned by a package, with its size in bytes.
#[derive(Debug, Clone, Default)]
pub struct FileEntry {
    /// Absolute path of the file.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
}

/// One package as the solver sees it, either installed or offered by a
/// repository.
#[derive(Debug, Clone, Default)]
pub struct PackageRecord {
    /// `name-version` string identifying the package.
    pub pkgver: String,
    /// Run-time dependency expressions, each a pattern.
    pub run_depends: Vec<String>,
    /// Virtual `name-version` strings this package provides.
    pub provides: Vec<String>,
    /// Installed only because it was a transitive dependency.
    pub automatic_install: bool,
    /// The version is pinned by user policy and may not change.
    pub hold: bool,
    /// Update must keep the old files on disk.
    pub preserve: bool,
    /// Alternatives groups: group name to `linkpath:target` link list.
    pub alternatives: BTreeMap<String, Vec<String>>,
    /// Files owned by the package, used for remove size accounting.
    pub files: Vec<FileEntry>,
    /// Architecture of the binary package.
    pub architecture: String,
}

impl PackageRecord {
    /// A record with only a pkgver, for tests and simple pools.
    pub fn new(pkgver: impl Into<String>) -> Self {
        Self {
            pkgver: pkgver.into(),
            ..Self::default()
        }
    }

    /// The package name part of the pkgver.
    pub fn name(&self) -> &str {
        pkgver_parts(&self.pkgver).map_or(&self.pkgver, |(n, _)| n)
    }

    /// The version part of the pkgver.
    pub fn version(&self) -> Version {
        Version::from(pkgver_parts(&self.pkgver).map_or("", |(_, v)| v))
    }

    /// Whether one of the provides entries names the given virtual package.
    fn provides_name(&self, name: &str) -> bool {
        self.provides
            .iter()
            .any(|p| dep_name(p) == Some(name) || p == name)
    }
}

/// The installed package database: a name-keyed record mapping plus the
/// alternatives registry from the `_XBPS_ALTERNATIVES_` synthetic entry.
#[derive(Debug, Clone, Default)]
pub struct PkgDb {
    records: BTreeMap<String, PackageRecord>,
    alternatives: BTreeMap<String, Vec<String>>,
}

impl PkgDb {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an installed package, keyed by its name.
    pub fn insert(&mut self, record: PackageRecord) {
        self.records.insert(record.name().to_string(), record);
    }

    /// Look up an installed package by name.
    pub fn get_pkg(&self, name: &str) -> Option<&PackageRecord> {
        if name.starts_with(RESERVED_PREFIX) {
            return None;
        }
        self.records.get(name)
    }

    /// Look up the installed package providing a virtual name.
    pub fn get_virtualpkg(&self, name: &str) -> Option<&PackageRecord> {
        self.records
            .values()
            .find(|record| record.provides_name(name))
    }

    /// Iterate over installed records, skipping synthetic entries.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PackageRecord)> {
        self.records
            .iter()
            .filter(|(name, _)| !name.starts_with(RESERVED_PREFIX))
    }

    /// Replace the alternatives registry: group name to ordered provider
    /// list, the head being the active provider.
    pub fn set_alternatives(&mut self, registry: BTreeMap<String, Vec<String>>) {
        self.alternatives = registry;
    }

    /// The alternatives registry.
    pub fn alternatives(&self) -> &BTreeMap<String, Vec<String>> {
        &self.alternatives
    }
}

/// One repository of available packages.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    /// Identifier of the repository (url or path), for diagnostics.
    pub uri: String,
    records: BTreeMap<String, PackageRecord>,
}

impl Repository {
    /// An empty repository.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            records: BTreeMap::new(),
        }
    }

    /// Add a package to the repository index.
    pub fn insert(&mut self, record: PackageRecord) {
        self.records.insert(record.name().to_string(), record);
    }

    /// Look up a package by name.
    pub fn get_pkg(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    /// Look up the package providing a virtual name.
    pub fn get_virtualpkg(&self, name: &str) -> Option<&PackageRecord> {
        self.records
            .values()
            .find(|record| record.provides_name(name))
    }
}

/// The ordered sequence of repositories the solver queries.
#[derive(Debug, Clone, Default)]
pub struct RepositoryPool {
    repositories: Vec<Repository>,
}

impl RepositoryPool {
    /// An empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a repository; earlier repositories take precedence.
    pub fn push(&mut self, repository: Repository) {
        self.repositories.push(repository);
    }

    /// Repositories in declared order.
    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Look up a package by name, first concrete across the pool, then
    /// virtual.
    pub fn get_pkg(&self, name: &str) -> Option<&PackageRecord> {
        self.repositories.iter().find_map(|r| r.get_pkg(name))
    }

    /// Look up the package providing a virtual name across the pool.
    pub fn get_virtualpkg(&self, name: &str) -> Option<&PackageRecord> {
        self.repositories
            .iter()
            .find_map(|r| r.get_virtualpkg(name))
    }
}

/// Why a candidate version could not be produced for a package.
#[derive(Debug)]
pub(crate) enum CandidateError {
    /// The package exists but no candidate matches the constraint.
    NoVersion,
    /// The package has no candidates anywhere.
    NotFound,
    /// The package is held at a version the constraint excludes.
    Held(Version),
}

/// The installed database plus the repository pool.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// Installed package database.
    pub pkgdb: PkgDb,
    /// Pool of repositories.
    pub rpool: RepositoryPool,
}

impl Universe {
    /// Build a universe from its parts.
    pub fn new(pkgdb: PkgDb, rpool: RepositoryPool) -> Self {
        Self { pkgdb, rpool }
    }

    /// Candidate versions for a package: the installed version first, then
    /// each repository's version in pool order, de-duplicated. Virtual
    /// providers are consulted when no concrete package exists under the
    /// name.
    pub(crate) fn candidates(&self, name: &str) -> Vec<(Version, &PackageRecord)> {
        fn add<'r>(record: &'r PackageRecord, out: &mut Vec<(Version, &'r PackageRecord)>) {
            let version = record.version();
            if !out.iter().any(|(v, _)| *v == version) {
                out.push((version, record));
            }
        }
        let mut candidates: Vec<(Version, &PackageRecord)> = Vec::new();
        if let Some(record) = self
            .pkgdb
            .get_pkg(name)
            .or_else(|| self.pkgdb.get_virtualpkg(name))
        {
            add(record, &mut candidates);
        }
        let mut repo_hit = false;
        for repository in self.rpool.repositories() {
            if let Some(record) = repository.get_pkg(name) {
                repo_hit = true;
                add(record, &mut candidates);
            }
        }
        if !repo_hit {
            for repository in self.rpool.repositories() {
                if let Some(record) = repository.get_virtualpkg(name) {
                    add(record, &mut candidates);
                }
            }
        }
        candidates
    }

    /// The installed record a solved package name refers to, following
    /// virtual names.
    pub(crate) fn installed(&self, name: &str) -> Option<&PackageRecord> {
        self.pkgdb
            .get_pkg(name)
            .or_else(|| self.pkgdb.get_virtualpkg(name))
    }

    /// The record backing a chosen (name, version) pair.
    pub(crate) fn record_for(&self, name: &str, version: &Version) -> Option<&PackageRecord> {
        self.candidates(name)
            .into_iter()
            .find(|(v, _)| v == version)
            .map(|(_, record)| record)
    }

    /// The best version of a package allowed by a constraint.
    ///
    /// A held package only ever offers its pinned version. Otherwise the
    /// highest allowed candidate version wins.
    pub(crate) fn best_version(
        &self,
        name: &str,
        constraint: &Constraint,
    ) -> Result<Version, CandidateError> {
        if let Some(installed) = self.installed(name) {
            if installed.hold {
                let version = installed.version();
                if constraint.contains(&version) {
                    return Ok(version);
                }
                return Err(CandidateError::Held(version));
            }
        }
        let candidates = self.candidates(name);
        if candidates.is_empty() {
            return Err(CandidateError::NotFound);
        }
        candidates
            .into_iter()
            .filter(|(v, _)| constraint.contains(v))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(v, _)| v)
            .ok_or(CandidateError::NoVersion)
    }

    /// The number of candidate versions allowed by a constraint, used to
    /// prioritize decisions.
    pub(crate) fn count_versions(&self, name: &str, constraint: &Constraint) -> usize {
        if let Some(installed) = self.installed(name) {
            if installed.hold {
                return usize::from(constraint.contains(&installed.version()));
            }
        }
        self.candidates(name)
            .iter()
            .filter(|(v, _)| constraint.contains(v))
            .count()
    }

    /// The dependencies declared by a package at a version, as (name,
    /// constraint) pairs. Dependency expressions that carry no interval
    /// (globs) constrain the target to any version.
    pub(crate) fn dependencies_of(
        &self,
        name: &str,
        version: &Version,
    ) -> Option<Vec<(String, Constraint)>> {
        let record = self.record_for(name, version)?;
        let mut deps = Vec::with_capacity(record.run_depends.len());
        for dep in &record.run_depends {
            let parsed = parse_dep(dep)
                .map(|(dep_name, constraint)| (dep_name.to_string(), constraint))
                .or_else(|| dep_name(dep).map(|n| (n.to_string(), Constraint::any())));
            match parsed {
                Some((dep_name, _)) if dep_name == name => {
                    log::debug!("{}: ignoring dependency on itself", record.pkgver);
                }
                Some(parsed) => deps.push(parsed),
                None => {
                    log::warn!("{}: unparseable dependency '{}'", record.pkgver, dep);
                }
            }
        }
        Some(deps)
    }
}
