// SPDX-License-Identifier: MPL-2.0

//! Transaction planning: turn user requests into a solved, ordered set of
//! install/update/remove actions, and account the disk space the set needs
//! per mountpoint.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use xbps_version::{dep_name, parse_dep, pkgver_parts, Constraint, Version};

use crate::config::Config;
use crate::deptree;
use crate::error::{SolveError, TransactionError};
use crate::solver;
use crate::universe::Universe;
use crate::SelectedDependencies;

/// What a transaction entry does to a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// The package is not installed yet.
    Install,
    /// The installed version is replaced by a higher one.
    Update,
    /// The installed version is replaced by a lower one.
    Downgrade,
    /// The package is removed.
    Remove,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Downgrade => "downgrade",
            Self::Remove => "remove",
        })
    }
}

/// One action of a planned transaction.
#[derive(Debug, Clone)]
pub struct TransactionEntry {
    /// Package name.
    pub name: String,
    /// Target pkgver; for removals, the installed pkgver.
    pub pkgver: String,
    /// Action to perform.
    pub kind: TransactionKind,
    /// Previously installed version, for updates and downgrades.
    pub from: Option<Version>,
    /// Update keeps the old files on disk, so removal earns no space back.
    pub preserve: bool,
}

/// A solved transaction: the decided versions and the ordered action list
/// (installs and updates in dependency order, removals last).
#[derive(Debug, Clone)]
pub struct TransactionSet {
    /// One version per package, as decided by the solver.
    pub decisions: SelectedDependencies,
    /// Actions in execution order.
    pub entries: Vec<TransactionEntry>,
}

impl TransactionSet {
    /// Whether the transaction has nothing to do.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builder for a transaction over a package universe.
///
/// Requests are accumulated with [install](Transaction::install),
/// [remove](Transaction::remove) and [update_all](Transaction::update_all),
/// then resolved by [solve](Transaction::solve). A single solve per
/// transaction; the builder is consumed.
pub struct Transaction<'a> {
    universe: &'a Universe,
    requests: Vec<(String, Constraint)>,
    removals: BTreeSet<String>,
    reconcile: bool,
}

impl<'a> Transaction<'a> {
    /// Start an empty transaction.
    pub fn new(universe: &'a Universe) -> Self {
        Self {
            universe,
            requests: Vec::new(),
            removals: BTreeSet::new(),
            reconcile: false,
        }
    }

    /// Request installation (or update) of the package named by a pattern:
    /// `vim`, `vim>=8`, `vim-8.2_1`.
    ///
    /// Requesting a version range that excludes the pinned version of a held
    /// package fails right away.
    pub fn install(&mut self, pattern: &str) -> Result<(), SolveError> {
        let (name, constraint) =
            parse_dep(pattern).ok_or_else(|| SolveError::NotFound(pattern.to_string()))?;
        if let Some(installed) = self.universe.installed(name) {
            if installed.hold && !constraint.contains(&installed.version()) {
                return Err(SolveError::Hold {
                    package: name.to_string(),
                    version: installed.version(),
                });
            }
        }
        log::debug!("requested {} {}", name, constraint);
        self.requests.push((name.to_string(), constraint));
        Ok(())
    }

    /// Request removal of an installed package. With `recursive`, installed
    /// packages that transitively depend on it are removed as well;
    /// without, a remaining dependent makes the solve fail with an
    /// explanation.
    pub fn remove(&mut self, name: &str, recursive: bool) -> Result<(), SolveError> {
        if self.universe.pkgdb.get_pkg(name).is_none() {
            return Err(SolveError::NotInstalled(name.to_string()));
        }
        self.removals.insert(name.to_string());
        if recursive {
            for dependent in self.installed_dependents(name) {
                self.removals.insert(dependent);
            }
        }
        // removing must leave the rest of the system consistent
        self.reconcile = true;
        Ok(())
    }

    /// Reconcile the whole installed set: every non-automatic installed
    /// package becomes part of the request, at its best available version.
    pub fn update_all(&mut self) {
        self.reconcile = true;
    }

    // Installed packages depending, directly or transitively, on `name`.
    fn installed_dependents(&self, name: &str) -> BTreeSet<String> {
        let mut closure: BTreeSet<String> = BTreeSet::new();
        closure.insert(name.to_string());
        loop {
            // names satisfied by the closure, including virtual ones
            let mut satisfied: BTreeSet<String> = BTreeSet::new();
            for member in &closure {
                satisfied.insert(member.clone());
                if let Some(record) = self.universe.pkgdb.get_pkg(member) {
                    satisfied.extend(
                        record
                            .provides
                            .iter()
                            .filter_map(|p| dep_name(p).map(str::to_string)),
                    );
                }
            }
            let mut additions = Vec::new();
            for (pkgname, record) in self.universe.pkgdb.iter() {
                if closure.contains(pkgname) {
                    continue;
                }
                let depends = record
                    .run_depends
                    .iter()
                    .filter_map(|dep| dep_name(dep))
                    .any(|dep| satisfied.contains(dep));
                if depends {
                    additions.push(pkgname.clone());
                }
            }
            if additions.is_empty() {
                break;
            }
            closure.extend(additions);
        }
        closure.remove(name);
        closure
    }

    /// Resolve the accumulated requests into an ordered transaction set.
    pub fn solve(self) -> Result<TransactionSet, TransactionError> {
        let mut root_deps = self.requests.clone();
        if self.reconcile {
            for (name, record) in self.universe.pkgdb.iter() {
                if record.automatic_install || self.removals.contains(name) {
                    continue;
                }
                if root_deps.iter().any(|(n, _)| n == name) {
                    continue;
                }
                root_deps.push((name.clone(), Constraint::any()));
            }
        }
        let removals: Vec<String> = self.removals.iter().cloned().collect();
        let decisions = solver::resolve(self.universe, root_deps, &removals)?;
        let sorted = deptree::sort_solution(self.universe, &decisions)?;

        let mut entries = Vec::new();
        let mut seen: BTreeSet<String> = BTreeSet::new();
        for pkgver in &sorted {
            let Some((name, version)) = pkgver_parts(pkgver) else {
                continue;
            };
            let version = Version::from(version);
            let record = self
                .universe
                .record_for(name, &version)
                .ok_or_else(|| SolveError::Failure(format!("no record backing {}", pkgver)))
                .map_err(TransactionError::Solve)?;
            // virtual and concrete names may resolve to the same package
            if !seen.insert(record.pkgver.clone()) {
                continue;
            }
            let real_name = record.name().to_string();
            let target_version = record.version();
            match self.universe.pkgdb.get_pkg(&real_name) {
                None => entries.push(TransactionEntry {
                    name: real_name,
                    pkgver: record.pkgver.clone(),
                    kind: TransactionKind::Install,
                    from: None,
                    preserve: false,
                }),
                Some(installed) => {
                    let installed_version = installed.version();
                    if installed_version == target_version {
                        // already satisfied
                        continue;
                    }
                    let kind = if target_version > installed_version {
                        TransactionKind::Update
                    } else {
                        TransactionKind::Downgrade
                    };
                    entries.push(TransactionEntry {
                        name: real_name,
                        pkgver: record.pkgver.clone(),
                        kind,
                        from: Some(installed_version),
                        preserve: installed.preserve,
                    });
                }
            }
        }
        for name in &self.removals {
            if let Some(installed) = self.universe.pkgdb.get_pkg(name) {
                entries.push(TransactionEntry {
                    name: name.clone(),
                    pkgver: installed.pkgver.clone(),
                    kind: TransactionKind::Remove,
                    from: Some(installed.version()),
                    preserve: false,
                });
            }
        }

        Ok(TransactionSet { decisions, entries })
    }
}

// Disk space accounting ######################################################

/// A mountpoint with its free space and the bytes the transaction would
/// install to and remove from it.
#[derive(Debug, Clone)]
pub struct Mountpoint {
    /// Mount directory.
    pub path: String,
    /// Free bytes available.
    pub free: u64,
    /// Bytes the transaction installs under this mountpoint.
    pub install_size: u64,
    /// Bytes the transaction removes from this mountpoint.
    pub remove_size: u64,
}

impl Mountpoint {
    /// A mountpoint with zeroed tallies.
    pub fn new(path: impl Into<String>, free: u64) -> Self {
        Self {
            path: path.into(),
            free,
            install_size: 0,
            remove_size: 0,
        }
    }

    /// Net bytes the transaction needs on this mountpoint.
    pub fn required(&self) -> u64 {
        self.install_size.saturating_sub(self.remove_size)
    }
}

// well-known ephemeral mounts never worth accounting
const IGNORED_MOUNTS: [&str; 5] = ["/dev", "/proc", "/run", "/sys", "/tmp"];

fn parse_mount_table<R: BufRead>(reader: R) -> io::Result<Vec<String>> {
    let mut dirs = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let Some(dir) = line.split_whitespace().nth(1) else {
            continue;
        };
        if IGNORED_MOUNTS.iter().any(|ignored| dir.starts_with(ignored)) {
            continue;
        }
        dirs.push(dir.to_string());
    }
    Ok(dirs)
}

/// Enumerate the system's mountpoints with their free space, skipping
/// well-known ephemeral mounts.
pub fn system_mountpoints() -> io::Result<Vec<Mountpoint>> {
    let file = File::open("/proc/mounts")?;
    let dirs = parse_mount_table(BufReader::new(file))?;
    let mut mounts = Vec::with_capacity(dirs.len());
    for dir in dirs {
        let free = match nix::sys::statvfs::statvfs(Path::new(&dir)) {
            Ok(stat) => stat.blocks_available() as u64 * stat.fragment_size() as u64,
            Err(err) => {
                log::debug!("statvfs {}: {}", dir, err);
                continue;
            }
        };
        mounts.push(Mountpoint::new(dir, free));
    }
    Ok(mounts)
}

// Longest-prefix match finds the deepest mount; `mounts` must be sorted
// deepest first.
fn find_mountpoint<'m>(mounts: &'m mut [Mountpoint], path: &str) -> Option<&'m mut Mountpoint> {
    mounts.iter_mut().find(|m| {
        path.starts_with(&m.path)
            && (m.path == "/"
                || path.len() == m.path.len()
                || path.as_bytes()[m.path.len()] == b'/')
    })
}

/// Provides the file listing of binary packages for install size accounting.
pub trait BinpkgProvider {
    /// Paths and sizes of the files inside the binary package of a pkgver.
    fn entry_sizes(&self, pkgver: &str, architecture: &str) -> io::Result<Vec<(String, u64)>>;
}

/// Reads binary package archives from the configured cache directory.
pub struct CachedBinpkgs {
    cache_dir: PathBuf,
}

impl CachedBinpkgs {
    /// Binary packages under the config's cache directory.
    pub fn new(config: &Config) -> Self {
        Self {
            cache_dir: config.cache_dir.clone(),
        }
    }
}

impl BinpkgProvider for CachedBinpkgs {
    fn entry_sizes(&self, pkgver: &str, architecture: &str) -> io::Result<Vec<(String, u64)>> {
        let arch = if architecture.is_empty() {
            "noarch"
        } else {
            architecture
        };
        let path = self.cache_dir.join(format!("{}.{}.xbps", pkgver, arch));
        archive_entry_sizes(&path)
    }
}

// Walk a (possibly compressed) tar archive and list entry paths with their
// sizes. Compression is sniffed from the magic bytes.
fn archive_entry_sizes(path: &Path) -> io::Result<Vec<(String, u64)>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 6];
    let got = file.read(&mut magic)?;
    file.rewind()?;
    let reader: Box<dyn Read> = if got >= 2 && magic[..2] == [0x1f, 0x8b] {
        Box::new(flate2::read::GzDecoder::new(file))
    } else if got >= 3 && magic[..3] == [0x42, 0x5a, 0x68] {
        Box::new(bzip2::read::BzDecoder::new(file))
    } else if got >= 6 && magic == [0xfd, b'7', b'z', b'X', b'Z', 0x00] {
        Box::new(xz2::read::XzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut archive = tar::Archive::new(reader);
    let mut sizes = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        let entry_path = entry.path()?;
        let name = entry_path.to_string_lossy();
        // entries are archived as ./usr/...
        let name = name.strip_prefix('.').unwrap_or(&name);
        if name.is_empty() || name == "/" {
            continue;
        }
        sizes.push((name.to_string(), entry.header().size()?));
    }
    Ok(sizes)
}

/// Account the transaction's size deltas into the given mountpoints and
/// check them against the available space.
///
/// Install and update entries walk the binary package archive; remove
/// entries and non-preserving updates credit the installed files. The
/// tallies stay in `mounts` for reporting; the first mountpoint whose free
/// space cannot cover its net delta aborts with
/// [InsufficientSpace](TransactionError::InsufficientSpace).
pub fn transaction_diskspace(
    universe: &Universe,
    txn: &TransactionSet,
    mounts: &mut [Mountpoint],
    binpkgs: &impl BinpkgProvider,
) -> Result<(), TransactionError> {
    if mounts.is_empty() {
        return Ok(());
    }
    mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()).then(a.path.cmp(&b.path)));

    for entry in &txn.entries {
        if matches!(
            entry.kind,
            TransactionKind::Install | TransactionKind::Update | TransactionKind::Downgrade
        ) {
            let architecture = pkgver_parts(&entry.pkgver)
                .map(|(name, version)| (name, Version::from(version)))
                .and_then(|(name, version)| universe.record_for(name, &version))
                .map(|record| record.architecture.clone())
                .unwrap_or_default();
            for (file, size) in binpkgs.entry_sizes(&entry.pkgver, &architecture)? {
                if let Some(mountpoint) = find_mountpoint(mounts, &file) {
                    mountpoint.install_size += size;
                }
            }
        }

        let removes_files = matches!(entry.kind, TransactionKind::Remove)
            || (matches!(
                entry.kind,
                TransactionKind::Update | TransactionKind::Downgrade
            ) && !entry.preserve);
        if removes_files {
            let Some(installed) = universe.pkgdb.get_pkg(&entry.name) else {
                continue;
            };
            for file in &installed.files {
                if let Some(mountpoint) = find_mountpoint(mounts, &file.path) {
                    mountpoint.remove_size += file.size;
                }
            }
        }
    }

    for mountpoint in mounts.iter() {
        let required = mountpoint.required();
        if required > mountpoint.free {
            return Err(TransactionError::InsufficientSpace {
                mountpoint: PathBuf::from(&mountpoint.path),
                required,
                available: mountpoint.free,
            });
        }
    }
    Ok(())
}
