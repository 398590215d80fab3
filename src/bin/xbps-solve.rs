// SPDX-License-Identifier: MPL-2.0

//! Command line front-end for the transaction solver.
//!
//! The package universe (installed database plus repositories) is loaded
//! from a JSON description; repodata archives and the on-disk database
//! format stay out of scope. One mode is selected per invocation; the
//! planned transaction is printed to stdout, one action per line.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde::Deserialize;

use xbps_solve::{
    check_pkg_alternatives, fulldeptree, system_mountpoints, transaction_diskspace,
    CachedBinpkgs, Config, DefaultStringReporter, DepSource, FileEntry, Flags, PackageRecord,
    PkgDb, Reporter, Repository, RepositoryPool, SolveError, Transaction, TransactionError,
    Universe, ALTERNATIVES_KEY, RESERVED_PREFIX,
};

#[derive(Parser)]
#[command(
    name = "xbps-solve",
    version,
    about = "Solve package transactions against a package universe"
)]
struct Cli {
    /// Path to confdir (xbps.d)
    #[arg(short = 'C', long = "config", value_name = "dir")]
    confdir: Option<PathBuf>,

    /// Path to cachedir
    #[arg(short = 'c', long = "cachedir", value_name = "dir")]
    cachedir: Option<PathBuf>,

    /// Debug mode shown to stderr
    #[arg(short, long)]
    debug: bool,

    /// Ignore repositories defined in xbps.d
    #[arg(short = 'i', long = "ignore-conf-repos")]
    ignore_conf_repos: bool,

    /// Remote repository data is fetched and stored in memory
    #[arg(short = 'M', long = "memory-sync")]
    memory_sync: bool,

    /// Enable repository mode and move the repository to the top of the
    /// pool; may be given multiple times
    #[arg(long = "repository", value_name = "url")]
    repositories: Vec<String>,

    /// Full path to rootdir
    #[arg(short, long, value_name = "dir")]
    rootdir: Option<PathBuf>,

    /// Verbose messages
    #[arg(short, long)]
    verbose: bool,

    /// With --remove, also remove packages depending on the removed ones
    #[arg(long)]
    recursive: bool,

    /// Check the transaction's disk space requirements
    #[arg(long)]
    diskspace: bool,

    /// JSON file describing the installed database and the repositories
    #[arg(long, value_name = "file")]
    universe: PathBuf,

    #[command(flatten)]
    mode: Mode,

    /// Packages the mode applies to
    #[arg(value_name = "PKG")]
    packages: Vec<String>,
}

#[derive(clap::Args)]
#[group(required = true, multiple = false)]
struct Mode {
    /// Install or update the given packages
    #[arg(short = 'S', long)]
    install: bool,

    /// Remove the given packages
    #[arg(short = 'R', long)]
    remove: bool,

    /// Update all installed packages
    #[arg(short = 'u', long = "update-all")]
    update_all: bool,

    /// Show the full dependency tree of PKG in install order
    #[arg(short = 'x', long)]
    deps: bool,

    /// Verify the alternatives symlinks of the given packages
    #[arg(long = "check-alternatives")]
    check_alternatives: bool,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct RecordFile {
    pkgver: String,
    run_depends: Vec<String>,
    provides: Vec<String>,
    automatic_install: bool,
    hold: bool,
    preserve: bool,
    alternatives: BTreeMap<String, Vec<String>>,
    files: Vec<FileEntryFile>,
    architecture: String,
}

#[derive(Deserialize)]
struct FileEntryFile {
    file: String,
    #[serde(default)]
    size: u64,
}

#[derive(Deserialize)]
struct RepoFile {
    uri: String,
    #[serde(default)]
    from_conf: bool,
    #[serde(default)]
    packages: Vec<RecordFile>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct UniverseFile {
    pkgdb: BTreeMap<String, RecordFile>,
    repositories: Vec<RepoFile>,
}

impl RecordFile {
    fn into_record(self) -> PackageRecord {
        PackageRecord {
            pkgver: self.pkgver,
            run_depends: self.run_depends,
            provides: self.provides,
            automatic_install: self.automatic_install,
            hold: self.hold,
            preserve: self.preserve,
            alternatives: self.alternatives,
            files: self
                .files
                .into_iter()
                .map(|f| FileEntry {
                    path: f.file,
                    size: f.size,
                })
                .collect(),
            architecture: self.architecture,
        }
    }
}

fn load_universe(cli: &Cli, config: &Config) -> Result<Universe, TransactionError> {
    let file = File::open(&cli.universe)?;
    let parsed: UniverseFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    let mut pkgdb = PkgDb::new();
    for (key, record) in parsed.pkgdb {
        if key.starts_with(RESERVED_PREFIX) {
            if key == ALTERNATIVES_KEY {
                pkgdb.set_alternatives(record.alternatives);
            }
            continue;
        }
        pkgdb.insert(record.into_record());
    }

    let mut repositories: Vec<Repository> = Vec::new();
    for repo_file in parsed.repositories {
        if repo_file.from_conf && config.flags.contains(Flags::IGNORE_CONF_REPOS) {
            log::debug!("ignoring configuration repository {}", repo_file.uri);
            continue;
        }
        let mut repository = Repository::new(repo_file.uri);
        for record in repo_file.packages {
            repository.insert(record.into_record());
        }
        repositories.push(repository);
    }
    // repositories given on the command line move to the top of the pool
    let mut rpool = RepositoryPool::new();
    for uri in &cli.repositories {
        if let Some(pos) = repositories.iter().position(|r| &r.uri == uri) {
            rpool.push(repositories.remove(pos));
        } else {
            log::warn!("repository {} not present in the universe", uri);
        }
    }
    for repository in repositories {
        rpool.push(repository);
    }

    Ok(Universe::new(pkgdb, rpool))
}

fn print_plan(plan: &xbps_solve::TransactionSet) {
    if plan.is_empty() {
        println!("nothing to do");
        return;
    }
    for entry in &plan.entries {
        match &entry.from {
            Some(from) => println!("{} {} (from {})", entry.pkgver, entry.kind, from),
            None => println!("{} {}", entry.pkgver, entry.kind),
        }
    }
}

fn run(cli: &Cli, config: &Config) -> Result<ExitCode, TransactionError> {
    let universe = load_universe(cli, config)?;

    if cli.mode.deps {
        let source = if cli.repositories.is_empty() {
            DepSource::InstalledDb
        } else {
            DepSource::Pool
        };
        for pkg in &cli.packages {
            for pkgver in fulldeptree(&universe, pkg, source)? {
                println!("{}", pkgver);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    if cli.mode.check_alternatives {
        let mut broken = false;
        for pkg in &cli.packages {
            for issue in check_pkg_alternatives(config, &universe.pkgdb, pkg) {
                eprintln!("{}", issue);
                broken = true;
            }
        }
        return Ok(if broken {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        });
    }

    let mut txn = Transaction::new(&universe);
    if cli.mode.install {
        for pkg in &cli.packages {
            txn.install(pkg).map_err(TransactionError::Solve)?;
        }
    } else if cli.mode.remove {
        for pkg in &cli.packages {
            txn.remove(pkg, cli.recursive).map_err(TransactionError::Solve)?;
        }
    } else if cli.mode.update_all {
        txn.update_all();
    }
    let plan = txn.solve()?;

    if cli.diskspace && !plan.is_empty() {
        let mut mounts = system_mountpoints()?;
        let binpkgs = CachedBinpkgs::new(config);
        transaction_diskspace(&universe, &plan, &mut mounts, &binpkgs)?;
        for mountpoint in mounts.iter().filter(|m| m.install_size + m.remove_size > 0) {
            println!(
                "{}: {} bytes required, {} free",
                mountpoint.path,
                mountpoint.required(),
                mountpoint.free
            );
        }
    }

    print_plan(&plan);
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut flags = Flags::empty();
    if cli.debug {
        flags |= Flags::DEBUG;
    }
    if cli.ignore_conf_repos {
        flags |= Flags::IGNORE_CONF_REPOS;
    }
    if cli.memory_sync {
        flags |= Flags::REPOS_MEMSYNC;
    }
    if cli.verbose {
        flags |= Flags::VERBOSE;
    }

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else if cli.verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut config = Config::default();
    if let Some(rootdir) = &cli.rootdir {
        config = Config::rooted_at(rootdir);
    }
    if let Some(cachedir) = &cli.cachedir {
        config.cache_dir = cachedir.clone();
    }
    if let Some(confdir) = &cli.confdir {
        config.config_dir = confdir.clone();
    }
    config.flags = flags;

    match run(&cli, &config) {
        Ok(code) => code,
        Err(TransactionError::Solve(SolveError::NoSolution(mut tree))) => {
            tree.collapse_no_versions();
            eprintln!("{}", DefaultStringReporter::report(&tree));
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("xbps-solve: {}", err);
            ExitCode::FAILURE
        }
    }
}
