// SPDX-License-Identifier: MPL-2.0

//! Verification of alternatives-group symlinks.
//!
//! The installed database keeps, under the `_XBPS_ALTERNATIVES_` synthetic
//! entry, a registry mapping each alternatives group to the ordered list of
//! packages that may provide it; the head of the list is the active
//! provider. Only the active provider's links are expected on disk.

use std::path::{Component, Path, PathBuf};

use crate::config::Config;
use crate::universe::PkgDb;

/// A problem found while verifying one alternatives link.
#[derive(Debug, Clone)]
pub struct LinkIssue {
    /// Package owning the link.
    pub package: String,
    /// Alternatives group the link belongs to.
    pub group: String,
    /// Link path, root-relative.
    pub link: PathBuf,
    /// What went wrong.
    pub kind: LinkIssueKind,
}

/// The ways an alternatives link can be wrong.
#[derive(Debug, Clone)]
pub enum LinkIssueKind {
    /// The entry is not of the `linkpath:target` form.
    Malformed(String),
    /// The symlink cannot be read.
    Unreadable(String),
    /// The symlink points somewhere else.
    WrongTarget {
        /// Target the registry expects.
        expected: PathBuf,
        /// Target found on disk.
        found: PathBuf,
    },
}

impl std::fmt::Display for LinkIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            LinkIssueKind::Malformed(entry) => {
                write!(f, "{}: invalid alternative {}", self.package, entry)
            }
            LinkIssueKind::Unreadable(err) => write!(
                f,
                "{}: alternatives group {} symlink {}: {}",
                self.package,
                self.group,
                self.link.display(),
                err
            ),
            LinkIssueKind::WrongTarget { expected, found } => write!(
                f,
                "{}: alternatives group {} symlink {} has wrong target {} (expected {})",
                self.package,
                self.group,
                self.link.display(),
                found.display(),
                expected.display()
            ),
        }
    }
}

// Lexically normalize "." and ".." away so link paths built by joining
// stay comparable.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            c => out.push(c),
        }
    }
    out
}

fn root_readlink(config: &Config, path: &Path) -> std::io::Result<PathBuf> {
    let relative = path.strip_prefix("/").unwrap_or(path);
    std::fs::read_link(config.root_dir.join(relative))
}

/// Verify the alternatives symlinks of one installed package.
///
/// Only groups where the package heads the registry's provider list are
/// checked. Broken links are collected and reported; verification always
/// continues with the remaining links.
pub fn check_pkg_alternatives(config: &Config, pkgdb: &PkgDb, pkgname: &str) -> Vec<LinkIssue> {
    let mut issues = Vec::new();
    let registry = pkgdb.alternatives();
    if registry.is_empty() {
        return issues;
    }
    let Some(record) = pkgdb.get_pkg(pkgname) else {
        return issues;
    };

    for (group, links) in &record.alternatives {
        // only the head of the group's provider list owns the links
        let Some(providers) = registry.get(group) else {
            continue;
        };
        if providers.first().map(String::as_str) != Some(pkgname) {
            continue;
        }

        for entry in links {
            let Some((linkpath, target)) = entry.split_once(':') else {
                issues.push(LinkIssue {
                    package: pkgname.to_string(),
                    group: group.clone(),
                    link: PathBuf::new(),
                    kind: LinkIssueKind::Malformed(entry.clone()),
                });
                continue;
            };

            // a relative link path lives in the target's directory
            let mut linkpath = PathBuf::from(linkpath);
            if linkpath.is_relative() {
                let dir = Path::new(target).parent().unwrap_or(Path::new("/"));
                linkpath = dir.join(linkpath);
            }

            // absolute targets are recorded relative to the link
            let target = Path::new(target);
            let expected = if target.is_absolute() {
                let dir = linkpath.parent().unwrap_or(Path::new("/"));
                pathdiff::diff_paths(normalize(target), normalize(dir))
                    .unwrap_or_else(|| target.to_path_buf())
            } else {
                target.to_path_buf()
            };

            match root_readlink(config, &linkpath) {
                Err(err) => issues.push(LinkIssue {
                    package: pkgname.to_string(),
                    group: group.clone(),
                    link: linkpath.clone(),
                    kind: LinkIssueKind::Unreadable(err.to_string()),
                }),
                Ok(found) if found != expected => issues.push(LinkIssue {
                    package: pkgname.to_string(),
                    group: group.clone(),
                    link: linkpath.clone(),
                    kind: LinkIssueKind::WrongTarget {
                        expected: expected.clone(),
                        found,
                    },
                }),
                Ok(_) => {}
            }
        }
    }

    issues
}
