// SPDX-License-Identifier: MPL-2.0

//! Runtime configuration shared by the library entry points.

use std::path::PathBuf;

use bitflags::bitflags;

bitflags! {
    /// Behaviour toggles.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// Print debug output to stderr.
        const DEBUG = 1 << 0;
        /// Ignore repositories defined in the configuration directory.
        const IGNORE_CONF_REPOS = 1 << 1;
        /// Fetch remote repository data into memory, ignoring on-disk
        /// repodata archives.
        const REPOS_MEMSYNC = 1 << 2;
        /// Verbose messages.
        const VERBOSE = 1 << 3;
    }
}

/// Directories and flags a transaction operates under.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory all package paths are relative to.
    pub root_dir: PathBuf,
    /// Directory holding downloaded binary packages.
    pub cache_dir: PathBuf,
    /// Configuration directory (xbps.d).
    pub config_dir: PathBuf,
    /// Behaviour toggles.
    pub flags: Flags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("/"),
            cache_dir: PathBuf::from("/var/cache/xbps"),
            config_dir: PathBuf::from("/etc/xbps.d"),
            flags: Flags::empty(),
        }
    }
}

impl Config {
    /// A config rooted at the given directory, with cache and configuration
    /// directories below it.
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        let root_dir = root.into();
        Self {
            cache_dir: root_dir.join("var/cache/xbps"),
            config_dir: root_dir.join("etc/xbps.d"),
            root_dir,
            flags: Flags::empty(),
        }
    }
}
