// SPDX-License-Identifier: MPL-2.0

use xbps_solve::{
    fulldeptree, DepSource, PackageRecord, PkgDb, Repository, RepositoryPool, TransactionError,
    Universe,
};

fn pkg(pkgver: &str, deps: &[&str]) -> PackageRecord {
    let mut record = PackageRecord::new(pkgver);
    record.run_depends = deps.iter().map(|d| d.to_string()).collect();
    record
}

fn pool_universe(packages: Vec<PackageRecord>) -> Universe {
    let mut repo = Repository::new("https://repo/test");
    for package in packages {
        repo.insert(package);
    }
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    Universe::new(PkgDb::new(), rpool)
}

fn db_universe(packages: Vec<PackageRecord>) -> Universe {
    let mut pkgdb = PkgDb::new();
    for package in packages {
        pkgdb.insert(package);
    }
    Universe::new(pkgdb, RepositoryPool::new())
}

#[test]
fn dependencies_come_before_their_dependers() {
    let universe = pool_universe(vec![
        pkg("app-1.0_1", &["liba>=1.0", "libb>=1.0"]),
        pkg("liba-1.0_1", &["base>=1.0"]),
        pkg("libb-1.0_1", &["base>=1.0"]),
        pkg("base-1.0_1", &[]),
    ]);
    let order = fulldeptree(&universe, "app", DepSource::Pool).unwrap();
    assert_eq!(order, ["base-1.0_1", "liba-1.0_1", "libb-1.0_1"]);
}

#[test]
fn chains_unwind_from_the_leaves() {
    let universe = pool_universe(vec![
        pkg("a-1_1", &["b>=1"]),
        pkg("b-1_1", &["c>=1"]),
        pkg("c-1_1", &[]),
    ]);
    let order = fulldeptree(&universe, "a", DepSource::Pool).unwrap();
    assert_eq!(order, ["c-1_1", "b-1_1"]);
}

#[test]
fn provides_satisfied_dependencies_are_skipped() {
    let mut provider = pkg("app-1.0_1", &["libfoo"]);
    provider.provides = vec!["libfoo-1.0_1".to_string()];
    let universe = pool_universe(vec![provider]);
    let order = fulldeptree(&universe, "app", DepSource::Pool).unwrap();
    assert!(order.is_empty());
}

#[test]
fn missing_dependency_is_fatal_in_the_pool() {
    let universe = pool_universe(vec![pkg("app-1.0_1", &["ghost>=1.0"])]);
    let err = fulldeptree(&universe, "app", DepSource::Pool).unwrap_err();
    assert!(matches!(
        err,
        TransactionError::MissingDependency { pkgver, dependency }
            if pkgver == "app-1.0_1" && dependency == "ghost>=1.0"
    ));
}

#[test]
fn missing_dependency_is_skipped_in_the_installed_db() {
    let universe = db_universe(vec![pkg("app-1.0_1", &["ghost>=1.0"])]);
    let order = fulldeptree(&universe, "app", DepSource::InstalledDb).unwrap();
    assert!(order.is_empty());
}

#[test]
fn virtual_dependencies_follow_their_provider() {
    let mut vim = pkg("vim-8.2_1", &[]);
    vim.provides = vec!["editor-1.0_1".to_string()];
    let universe = pool_universe(vec![pkg("app-1.0_1", &["editor"]), vim]);
    let order = fulldeptree(&universe, "app", DepSource::Pool).unwrap();
    assert_eq!(order, ["vim-8.2_1"]);
}

#[test]
fn a_cycle_is_reported_by_name() {
    let universe = pool_universe(vec![
        pkg("app-1.0_1", &["b>=1.0"]),
        pkg("b-1.0_1", &["c>=1.0"]),
        pkg("c-1.0_1", &["b>=1.0"]),
    ]);
    let err = fulldeptree(&universe, "app", DepSource::Pool).unwrap_err();
    match err {
        TransactionError::DependencyCycle(pkgver) => {
            assert!(pkgver == "b-1.0_1" || pkgver == "c-1.0_1", "got {pkgver}");
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
}

#[test]
fn unknown_package_is_not_found() {
    let universe = pool_universe(vec![]);
    assert!(fulldeptree(&universe, "ghost", DepSource::Pool).is_err());
}
