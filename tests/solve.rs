// SPDX-License-Identifier: MPL-2.0

use std::io::Write;

use log::LevelFilter;
use xbps_solve::{
    DefaultStringReporter, PackageRecord, PkgDb, Repository, RepositoryPool, Reporter,
    SolveError, Transaction, TransactionError, TransactionKind, Universe, Version,
};

fn init_log() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Trace)
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .is_test(true)
        .try_init();
}

fn pkg(pkgver: &str, deps: &[&str]) -> PackageRecord {
    let mut record = PackageRecord::new(pkgver);
    record.run_depends = deps.iter().map(|d| d.to_string()).collect();
    record
}

fn single_repo(packages: Vec<PackageRecord>) -> Universe {
    let mut repo = Repository::new("https://repo/test");
    for package in packages {
        repo.insert(package);
    }
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    Universe::new(PkgDb::new(), rpool)
}

fn report_of(err: TransactionError) -> String {
    match err {
        TransactionError::Solve(SolveError::NoSolution(tree)) => {
            DefaultStringReporter::report(&tree)
        }
        other => panic!("expected NoSolution, got: {other:?}"),
    }
}

fn record_of<'u>(universe: &'u Universe, pkgver: &str) -> Option<&'u PackageRecord> {
    let (name, _) = pkgver.rsplit_once('-')?;
    universe
        .pkgdb
        .get_pkg(name)
        .filter(|r| r.pkgver == pkgver)
        .or_else(|| {
            universe
                .rpool
                .repositories()
                .iter()
                .find_map(|repo| repo.get_pkg(name).filter(|r| r.pkgver == pkgver))
        })
}

/// Every decision must satisfy every run_depends constraint of every other
/// decision.
fn assert_solution_sound(universe: &Universe, plan: &xbps_solve::TransactionSet) {
    for (name, version) in plan.decisions.iter() {
        let pkgver = format!("{}-{}", name, version);
        let Some(record) = record_of(universe, &pkgver) else {
            // virtual names carry no record of their own
            continue;
        };
        for dep in &record.run_depends {
            let Some((dep_name, constraint)) = xbps_version::parse_dep(dep) else {
                continue;
            };
            let decided = plan
                .decisions
                .get(dep_name)
                .unwrap_or_else(|| panic!("{pkgver}: dependency {dep} not decided"));
            assert!(
                constraint.contains(decided),
                "{pkgver}: decision {decided} violates {dep}"
            );
        }
    }
}

#[test]
fn empty_request_over_empty_pool() {
    init_log();
    let universe = Universe::default();
    let plan = Transaction::new(&universe).solve().unwrap();
    assert!(plan.is_empty());
    assert!(plan.decisions.is_empty());
}

#[test]
fn dependency_is_installed_first() {
    init_log();
    let universe = single_repo(vec![pkg("A-1.0", &["B-1.0"]), pkg("B-1.0", &[])]);
    let mut txn = Transaction::new(&universe);
    txn.install("A").unwrap();
    let plan = txn.solve().unwrap();
    assert_solution_sound(&universe, &plan);

    assert_eq!(plan.decisions.len(), 2);
    assert_eq!(plan.decisions["A"], Version::from("1.0"));
    assert_eq!(plan.decisions["B"], Version::from("1.0"));
    let order: Vec<(&str, TransactionKind)> = plan
        .entries
        .iter()
        .map(|e| (e.pkgver.as_str(), e.kind))
        .collect();
    assert_eq!(
        order,
        [
            ("B-1.0", TransactionKind::Install),
            ("A-1.0", TransactionKind::Install)
        ]
    );
}

#[test]
fn unsatisfiable_dependency_is_explained() {
    init_log();
    let universe = single_repo(vec![pkg("A-1.0", &["B>=2.0"]), pkg("B-1.0", &[])]);
    let mut txn = Transaction::new(&universe);
    txn.install("A").unwrap();
    let report = report_of(txn.solve().unwrap_err());

    assert!(report.contains("depends on B >=2.0"), "report: {report}");
    assert!(report.contains("no version of B"), "report: {report}");
}

#[test]
fn conflicting_requests_fail() {
    init_log();
    let mut repo1 = Repository::new("https://repo/one");
    repo1.insert(pkg("A-2", &[]));
    repo1.insert(pkg("B-1", &["A<2"]));
    repo1.insert(pkg("C-1", &["A>=2"]));
    let mut repo2 = Repository::new("https://repo/two");
    repo2.insert(pkg("A-1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo1);
    rpool.push(repo2);
    let universe = Universe::new(PkgDb::new(), rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("B").unwrap();
    txn.install("C").unwrap();
    let report = report_of(txn.solve().unwrap_err());
    assert!(report.contains("A"), "report: {report}");
}

#[test]
fn overlapping_requests_pick_the_shared_version() {
    init_log();
    let mut repo1 = Repository::new("https://repo/one");
    repo1.insert(pkg("A-2", &[]));
    repo1.insert(pkg("B-1", &["A<2"]));
    repo1.insert(pkg("C-1", &["A<=2"]));
    let mut repo2 = Repository::new("https://repo/two");
    repo2.insert(pkg("A-1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo1);
    rpool.push(repo2);
    let universe = Universe::new(PkgDb::new(), rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("B").unwrap();
    txn.install("C").unwrap();
    let plan = txn.solve().unwrap();
    assert_solution_sound(&universe, &plan);
    assert_eq!(plan.decisions["A"], Version::from("1"));
    assert_eq!(plan.decisions["B"], Version::from("1"));
    assert_eq!(plan.decisions["C"], Version::from("1"));
}

#[test]
fn conflict_with_partial_satisfier_backtracks() {
    init_log();
    // foo 1.1 depends on left and right, which disagree about shared's
    // version; foo 1.0 has no dependencies. Requesting foo with target 2.x
    // must backtrack to foo 1.0.
    let mut repo1 = Repository::new("https://repo/one");
    repo1.insert(pkg("foo-1.1", &["left>=1.0<2.0", "right>=1.0<2.0"]));
    repo1.insert(pkg("shared-2.0", &[]));
    repo1.insert(pkg("target-2.0", &[]));
    repo1.insert(pkg("left-1.0", &["shared>=1.0"]));
    repo1.insert(pkg("right-1.0", &["shared<2.0"]));
    let mut repo2 = Repository::new("https://repo/two");
    repo2.insert(pkg("foo-1.0", &[]));
    repo2.insert(pkg("shared-1.0", &["target>=1.0<2.0"]));
    repo2.insert(pkg("target-1.0", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo1);
    rpool.push(repo2);
    let universe = Universe::new(PkgDb::new(), rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("foo>=1.0<2.0").unwrap();
    txn.install("target>=2.0<3.0").unwrap();
    let plan = txn.solve().unwrap();
    assert_solution_sound(&universe, &plan);

    assert_eq!(plan.decisions["foo"], Version::from("1.0"));
    assert_eq!(plan.decisions["target"], Version::from("2.0"));
    assert!(!plan.decisions.contains_key("shared"));
    assert!(!plan.decisions.contains_key("left"));
    assert!(!plan.decisions.contains_key("right"));
}

#[test]
fn exact_dependencies_force_other_choices() {
    init_log();
    // b 1 and c 1 depend on versions of d that don't exist, so solving must
    // fall back to b 0 and c 0.
    let mut repo1 = Repository::new("https://repo/one");
    repo1.insert(pkg("a-0", &["b", "c"]));
    repo1.insert(pkg("b-1", &["d-1"]));
    repo1.insert(pkg("c-1", &["d-2"]));
    repo1.insert(pkg("d-0", &[]));
    let mut repo2 = Repository::new("https://repo/two");
    repo2.insert(pkg("b-0", &["d-0"]));
    repo2.insert(pkg("c-0", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo1);
    rpool.push(repo2);
    let universe = Universe::new(PkgDb::new(), rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("a").unwrap();
    let plan = txn.solve().unwrap();
    assert_solution_sound(&universe, &plan);

    assert_eq!(plan.decisions["a"], Version::from("0"));
    assert_eq!(plan.decisions["b"], Version::from("0"));
    assert_eq!(plan.decisions["c"], Version::from("0"));
    assert_eq!(plan.decisions["d"], Version::from("0"));
}

#[test]
fn requesting_a_missing_package_is_explained() {
    init_log();
    let universe = single_repo(vec![pkg("A-1.0", &[])]);
    let mut txn = Transaction::new(&universe);
    txn.install("ghost").unwrap();
    let report = report_of(txn.solve().unwrap_err());
    assert!(report.contains("ghost doesn't exist"), "report: {report}");
}

#[test]
fn installed_packages_update_from_the_pool() {
    init_log();
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(pkg("A-1.0_1", &["B>=1.0"]));
    pkgdb.insert(pkg("B-1.0_1", &[]));
    let mut repo = Repository::new("https://repo/test");
    repo.insert(pkg("A-2.0_1", &["B>=2.0"]));
    repo.insert(pkg("B-2.0_1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    let universe = Universe::new(pkgdb, rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("A").unwrap();
    let plan = txn.solve().unwrap();
    assert_solution_sound(&universe, &plan);

    let order: Vec<(&str, TransactionKind)> = plan
        .entries
        .iter()
        .map(|e| (e.pkgver.as_str(), e.kind))
        .collect();
    assert_eq!(
        order,
        [
            ("B-2.0_1", TransactionKind::Update),
            ("A-2.0_1", TransactionKind::Update)
        ]
    );
    assert_eq!(plan.entries[0].from, Some(Version::from("1.0_1")));
}

#[test]
fn satisfied_requests_produce_no_entries() {
    init_log();
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(pkg("A-1.0_1", &[]));
    let mut repo = Repository::new("https://repo/test");
    repo.insert(pkg("A-1.0_1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    let universe = Universe::new(pkgdb, rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("A").unwrap();
    let plan = txn.solve().unwrap();
    assert!(plan.is_empty());
    assert_eq!(plan.decisions["A"], Version::from("1.0_1"));
}

#[test]
fn held_package_keeps_its_version() {
    init_log();
    let mut held = pkg("A-1.0_1", &[]);
    held.hold = true;
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(held);
    let mut repo = Repository::new("https://repo/test");
    repo.insert(pkg("A-2.0_1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    let universe = Universe::new(pkgdb, rpool);

    let mut txn = Transaction::new(&universe);
    txn.update_all();
    let plan = txn.solve().unwrap();
    assert_eq!(plan.decisions["A"], Version::from("1.0_1"));
    assert!(plan.is_empty());
}

#[test]
fn requesting_past_a_held_version_fails_early() {
    init_log();
    let mut held = pkg("A-1.0_1", &[]);
    held.hold = true;
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(held);
    let mut repo = Repository::new("https://repo/test");
    repo.insert(pkg("A-2.0_1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    let universe = Universe::new(pkgdb, rpool);

    let mut txn = Transaction::new(&universe);
    assert!(matches!(
        txn.install("A>=2.0"),
        Err(SolveError::Hold { package, version })
            if package == "A" && version == Version::from("1.0_1")
    ));
}

#[test]
fn a_dependency_excluded_by_a_hold_is_explained() {
    init_log();
    let mut held = pkg("A-1.0_1", &[]);
    held.hold = true;
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(held);
    let mut repo = Repository::new("https://repo/test");
    repo.insert(pkg("A-2.0_1", &[]));
    repo.insert(pkg("app-1.0_1", &["A>=2.0"]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    let universe = Universe::new(pkgdb, rpool);

    let mut txn = Transaction::new(&universe);
    txn.install("app").unwrap();
    let report = report_of(txn.solve().unwrap_err());
    assert!(report.contains("held at 1.0_1"), "report: {report}");
}

#[test]
fn virtual_packages_resolve_to_their_provider() {
    init_log();
    let mut vim = pkg("vim-8.2_1", &[]);
    vim.provides = vec!["editor-1.0_1".to_string()];
    let universe = single_repo(vec![vim, pkg("app-1.0_1", &["editor"])]);

    let mut txn = Transaction::new(&universe);
    txn.install("app").unwrap();
    let plan = txn.solve().unwrap();

    let pkgvers: Vec<&str> = plan.entries.iter().map(|e| e.pkgver.as_str()).collect();
    assert_eq!(pkgvers, ["vim-8.2_1", "app-1.0_1"]);
}

#[test]
fn reconcile_skips_automatic_installs() {
    init_log();
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(pkg("A-1.0_1", &[]));
    let mut automatic = pkg("B-1.0_1", &[]);
    automatic.automatic_install = true;
    pkgdb.insert(automatic);
    let mut repo = Repository::new("https://repo/test");
    repo.insert(pkg("A-1.1_1", &[]));
    repo.insert(pkg("B-1.1_1", &[]));
    let mut rpool = RepositoryPool::new();
    rpool.push(repo);
    let universe = Universe::new(pkgdb, rpool);

    let mut txn = Transaction::new(&universe);
    txn.update_all();
    let plan = txn.solve().unwrap();

    let pkgvers: Vec<&str> = plan.entries.iter().map(|e| e.pkgver.as_str()).collect();
    assert_eq!(pkgvers, ["A-1.1_1"]);
    assert_eq!(plan.entries[0].kind, TransactionKind::Update);
}

#[test]
fn removing_a_depended_on_package_fails() {
    init_log();
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(pkg("lib-1.0_1", &[]));
    pkgdb.insert(pkg("app-1.0_1", &["lib>=1.0"]));
    let universe = Universe::new(pkgdb, RepositoryPool::new());

    let mut txn = Transaction::new(&universe);
    txn.remove("lib", false).unwrap();
    let report = report_of(txn.solve().unwrap_err());
    assert!(report.contains("marked for removal"), "report: {report}");
}

#[test]
fn recursive_remove_takes_dependents_along() {
    init_log();
    let mut pkgdb = PkgDb::new();
    pkgdb.insert(pkg("lib-1.0_1", &[]));
    pkgdb.insert(pkg("app-1.0_1", &["lib>=1.0"]));
    pkgdb.insert(pkg("other-1.0_1", &[]));
    let universe = Universe::new(pkgdb, RepositoryPool::new());

    let mut txn = Transaction::new(&universe);
    txn.remove("lib", true).unwrap();
    let plan = txn.solve().unwrap();

    let removes: Vec<(&str, TransactionKind)> = plan
        .entries
        .iter()
        .map(|e| (e.name.as_str(), e.kind))
        .collect();
    assert_eq!(
        removes,
        [
            ("app", TransactionKind::Remove),
            ("lib", TransactionKind::Remove)
        ]
    );
}

#[test]
fn removing_a_package_that_is_not_installed_fails() {
    init_log();
    let universe = Universe::default();
    let mut txn = Transaction::new(&universe);
    assert!(matches!(
        txn.remove("ghost", false),
        Err(SolveError::NotInstalled(_))
    ));
}

#[test]
fn solving_is_deterministic() {
    init_log();
    let build = || {
        let mut repo1 = Repository::new("https://repo/one");
        repo1.insert(pkg("app-2.0_1", &["liba>=1.0", "libb>=1.0"]));
        repo1.insert(pkg("liba-2.0_1", &["base>=2.0"]));
        repo1.insert(pkg("libb-2.0_1", &["base<2.0"]));
        repo1.insert(pkg("base-2.0_1", &[]));
        let mut repo2 = Repository::new("https://repo/two");
        repo2.insert(pkg("liba-1.0_1", &["base>=1.0"]));
        repo2.insert(pkg("libb-1.0_1", &["base>=1.0"]));
        repo2.insert(pkg("base-1.0_1", &[]));
        let mut rpool = RepositoryPool::new();
        rpool.push(repo1);
        rpool.push(repo2);
        Universe::new(PkgDb::new(), rpool)
    };

    let solve = |universe: &Universe| {
        let mut txn = Transaction::new(universe);
        txn.install("app").unwrap();
        let plan = txn.solve().unwrap();
        let entries: Vec<String> = plan.entries.iter().map(|e| e.pkgver.clone()).collect();
        let mut decisions: Vec<(String, String)> = plan
            .decisions
            .iter()
            .map(|(name, version)| (name.clone(), version.to_string()))
            .collect();
        decisions.sort();
        (entries, decisions)
    };

    let universe = build();
    let first = solve(&universe);
    for _ in 0..5 {
        assert_eq!(solve(&build()), first);
    }
}
