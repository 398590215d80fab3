// SPDX-License-Identifier: MPL-2.0

use std::collections::BTreeMap;
use std::io;

use xbps_solve::{
    check_pkg_alternatives, transaction_diskspace, BinpkgProvider, Config, FileEntry,
    LinkIssueKind, Mountpoint, PackageRecord, PkgDb, RepositoryPool, SelectedDependencies,
    TransactionEntry, TransactionError, TransactionKind, TransactionSet, Universe, Version,
};

fn installed(pkgver: &str, files: &[(&str, u64)]) -> PackageRecord {
    let mut record = PackageRecord::new(pkgver);
    record.files = files
        .iter()
        .map(|(path, size)| FileEntry {
            path: path.to_string(),
            size: *size,
        })
        .collect();
    record
}

fn entry(pkgver: &str, kind: TransactionKind) -> TransactionEntry {
    let (name, _) = pkgver.rsplit_once('-').unwrap();
    TransactionEntry {
        name: name.to_string(),
        pkgver: pkgver.to_string(),
        kind,
        from: None,
        preserve: false,
    }
}

fn plan(entries: Vec<TransactionEntry>) -> TransactionSet {
    TransactionSet {
        decisions: SelectedDependencies::default(),
        entries,
    }
}

/// Binary package listings served from memory.
struct FakeBinpkgs(BTreeMap<String, Vec<(String, u64)>>);

impl FakeBinpkgs {
    fn new(packages: &[(&str, &[(&str, u64)])]) -> Self {
        Self(
            packages
                .iter()
                .map(|(pkgver, files)| {
                    (
                        pkgver.to_string(),
                        files
                            .iter()
                            .map(|(path, size)| (path.to_string(), *size))
                            .collect(),
                    )
                })
                .collect(),
        )
    }
}

impl BinpkgProvider for FakeBinpkgs {
    fn entry_sizes(&self, pkgver: &str, _architecture: &str) -> io::Result<Vec<(String, u64)>> {
        self.0
            .get(pkgver)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, pkgver.to_string()))
    }
}

#[test]
fn install_sizes_land_on_the_covering_mountpoint() {
    let universe = Universe::default();
    let txn = plan(vec![entry("app-1.0_1", TransactionKind::Install)]);
    let binpkgs = FakeBinpkgs::new(&[(
        "app-1.0_1",
        &[
            ("/usr/bin/app", 1000),
            ("/usr/share/app/data", 2000),
            ("/home/app/seed", 500),
        ],
    )]);
    let mut mounts = vec![Mountpoint::new("/", 10_000), Mountpoint::new("/home", 10_000)];
    transaction_diskspace(&universe, &txn, &mut mounts, &binpkgs).unwrap();

    let root = mounts.iter().find(|m| m.path == "/").unwrap();
    let home = mounts.iter().find(|m| m.path == "/home").unwrap();
    assert_eq!(root.install_size, 3000);
    assert_eq!(home.install_size, 500);
    assert_eq!(root.remove_size, 0);
}

#[test]
fn removals_credit_the_installed_files() {
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(installed(
        "old-1.0_1",
        &[("/usr/lib/libold.so", 4000), ("/home/old/cache", 100)],
    ));
    let universe = Universe::new(pkgdb, RepositoryPool::new());
    let txn = plan(vec![entry("old-1.0_1", TransactionKind::Remove)]);
    let binpkgs = FakeBinpkgs::new(&[]);
    let mut mounts = vec![Mountpoint::new("/", 0), Mountpoint::new("/home", 0)];
    transaction_diskspace(&universe, &txn, &mut mounts, &binpkgs).unwrap();

    let root = mounts.iter().find(|m| m.path == "/").unwrap();
    let home = mounts.iter().find(|m| m.path == "/home").unwrap();
    assert_eq!(root.remove_size, 4000);
    assert_eq!(home.remove_size, 100);
    assert_eq!(root.install_size, 0);
}

#[test]
fn update_nets_install_against_removed_files() {
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(installed("app-1.0_1", &[("/usr/bin/app", 3000)]));
    let universe = Universe::new(pkgdb, RepositoryPool::new());
    let mut update = entry("app-1.1_1", TransactionKind::Update);
    update.from = Some(Version::from("1.0_1"));
    let txn = plan(vec![update]);
    let binpkgs = FakeBinpkgs::new(&[("app-1.1_1", &[("/usr/bin/app", 3500)])]);

    // 3500 in, 3000 back: fits in 600 free
    let mut mounts = vec![Mountpoint::new("/", 600)];
    transaction_diskspace(&universe, &txn, &mut mounts, &binpkgs).unwrap();
    assert_eq!(mounts[0].required(), 500);
}

#[test]
fn preserved_updates_earn_no_space_back() {
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(installed("app-1.0_1", &[("/usr/bin/app", 3000)]));
    let universe = Universe::new(pkgdb, RepositoryPool::new());
    let mut update = entry("app-1.1_1", TransactionKind::Update);
    update.preserve = true;
    let txn = plan(vec![update]);
    let binpkgs = FakeBinpkgs::new(&[("app-1.1_1", &[("/usr/bin/app", 3500)])]);

    let mut mounts = vec![Mountpoint::new("/", 600)];
    let err = transaction_diskspace(&universe, &txn, &mut mounts, &binpkgs).unwrap_err();
    assert!(matches!(
        err,
        TransactionError::InsufficientSpace { required: 3500, available: 600, .. }
    ));
}

#[test]
fn insufficient_space_names_the_mountpoint() {
    let universe = Universe::default();
    let txn = plan(vec![entry("app-1.0_1", TransactionKind::Install)]);
    let binpkgs = FakeBinpkgs::new(&[("app-1.0_1", &[("/home/app/data", 9000)])]);
    let mut mounts = vec![Mountpoint::new("/", 100_000), Mountpoint::new("/home", 100)];
    let err = transaction_diskspace(&universe, &txn, &mut mounts, &binpkgs).unwrap_err();
    match err {
        TransactionError::InsufficientSpace {
            mountpoint,
            required,
            available,
        } => {
            assert_eq!(mountpoint.to_str(), Some("/home"));
            assert_eq!(required, 9000);
            assert_eq!(available, 100);
        }
        other => panic!("expected InsufficientSpace, got {other:?}"),
    }
}

#[cfg(unix)]
mod binpkg_archives {
    use std::fs::File;

    use flate2::write::GzEncoder;
    use flate2::Compression;
    use xbps_solve::CachedBinpkgs;

    use super::*;

    fn write_binpkg(dir: &std::path::Path, name: &str, files: &[(&str, u64)]) {
        let file = File::create(dir.join(name)).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, size) in files {
            let data = vec![0u8; *size as usize];
            let mut header = tar::Header::new_gnu();
            header.set_size(*size);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, format!(".{path}"), data.as_slice())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn cached_binpkgs_list_archive_entries() {
        let cache = tempfile::tempdir().unwrap();
        write_binpkg(
            cache.path(),
            "app-1.0_1.x86_64.xbps",
            &[("/usr/bin/app", 1234), ("/usr/share/app/readme", 10)],
        );
        let config = Config {
            cache_dir: cache.path().to_path_buf(),
            ..Config::default()
        };
        let binpkgs = CachedBinpkgs::new(&config);
        let mut sizes = binpkgs.entry_sizes("app-1.0_1", "x86_64").unwrap();
        sizes.sort();
        assert_eq!(
            sizes,
            vec![
                ("/usr/bin/app".to_string(), 1234),
                ("/usr/share/app/readme".to_string(), 10)
            ]
        );
    }
}

#[cfg(unix)]
mod alternatives {
    use std::os::unix::fs::symlink;

    use super::*;

    fn universe_with_alternatives() -> PkgDb {
        let mut vim = PackageRecord::new("vim-8.2_1");
        vim.alternatives.insert(
            "editor".to_string(),
            vec!["/usr/bin/editor:/usr/bin/vim".to_string()],
        );
        let mut nano = PackageRecord::new("nano-5.0_1");
        nano.alternatives.insert(
            "editor".to_string(),
            vec!["/usr/bin/editor:/usr/bin/nano".to_string()],
        );
        let mut pkgdb = PkgDb::new();
        pkgdb.insert(vim);
        pkgdb.insert(nano);
        let mut registry = BTreeMap::new();
        registry.insert(
            "editor".to_string(),
            vec!["vim".to_string(), "nano".to_string()],
        );
        pkgdb.set_alternatives(registry);
        pkgdb
    }

    #[test]
    fn active_provider_with_correct_link_passes() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        symlink("vim", root.path().join("usr/bin/editor")).unwrap();

        let config = Config::rooted_at(root.path());
        let pkgdb = universe_with_alternatives();
        assert!(check_pkg_alternatives(&config, &pkgdb, "vim").is_empty());
    }

    #[test]
    fn non_head_providers_are_not_checked() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        // no symlink exists at all, but nano does not head the group
        let config = Config::rooted_at(root.path());
        let pkgdb = universe_with_alternatives();
        assert!(check_pkg_alternatives(&config, &pkgdb, "nano").is_empty());
    }

    #[test]
    fn wrong_target_is_reported() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        symlink("emacs", root.path().join("usr/bin/editor")).unwrap();

        let config = Config::rooted_at(root.path());
        let pkgdb = universe_with_alternatives();
        let issues = check_pkg_alternatives(&config, &pkgdb, "vim");
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            &issues[0].kind,
            LinkIssueKind::WrongTarget { found, .. } if found.to_str() == Some("emacs")
        ));
    }

    #[test]
    fn missing_link_is_reported_and_checking_continues() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        symlink("vim", root.path().join("usr/bin/gvi")).unwrap();

        let mut vim = PackageRecord::new("vim-8.2_1");
        vim.alternatives.insert(
            "editor".to_string(),
            vec![
                "/usr/bin/editor:/usr/bin/vim".to_string(),
                "gvi:/usr/bin/vim".to_string(),
            ],
        );
        let mut pkgdb = PkgDb::new();
        pkgdb.insert(vim);
        let mut registry = BTreeMap::new();
        registry.insert("editor".to_string(), vec!["vim".to_string()]);
        pkgdb.set_alternatives(registry);

        let config = Config::rooted_at(root.path());
        let issues = check_pkg_alternatives(&config, &pkgdb, "vim");
        // the missing /usr/bin/editor link is reported, the relative gvi
        // link still verifies
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].kind, LinkIssueKind::Unreadable(_)));
        assert_eq!(issues[0].link.to_str(), Some("/usr/bin/editor"));
    }

    #[test]
    fn relative_link_paths_resolve_against_the_target_directory() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("usr/bin")).unwrap();
        symlink("vim", root.path().join("usr/bin/editor")).unwrap();

        let mut vim = PackageRecord::new("vim-8.2_1");
        vim.alternatives.insert(
            "editor".to_string(),
            vec!["editor:/usr/bin/vim".to_string()],
        );
        let mut pkgdb = PkgDb::new();
        pkgdb.insert(vim);
        let mut registry = BTreeMap::new();
        registry.insert("editor".to_string(), vec!["vim".to_string()]);
        pkgdb.set_alternatives(registry);

        let config = Config::rooted_at(root.path());
        assert!(check_pkg_alternatives(&config, &pkgdb, "vim").is_empty());
    }

    #[test]
    fn malformed_entries_are_reported() {
        let root = tempfile::tempdir().unwrap();
        let mut vim = PackageRecord::new("vim-8.2_1");
        vim.alternatives
            .insert("editor".to_string(), vec!["no-colon-here".to_string()]);
        let mut pkgdb = PkgDb::new();
        pkgdb.insert(vim);
        let mut registry = BTreeMap::new();
        registry.insert("editor".to_string(), vec!["vim".to_string()]);
        pkgdb.set_alternatives(registry);

        let config = Config::rooted_at(root.path());
        let issues = check_pkg_alternatives(&config, &pkgdb, "vim");
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0].kind, LinkIssueKind::Malformed(_)));
    }
}
