// SPDX-License-Identifier: MPL-2.0

//! Dependency ordering: linearise a set of packages so that every package
//! appears after all of its run-time dependencies.
//!
//! The walk is done in two passes over an arena of nodes. The first pass
//! collects every reachable package and its resolved dependency edges. The
//! second pass appends dependency-free packages to the result directly and
//! keeps the rest on a todo list, repeatedly emitting packages whose
//! dependencies are all emitted. Re-entering a node currently under
//! consideration means the graph has a cycle, which is reported by name
//! rather than silently dropping a package.

use rustc_hash::FxHashMap;
use xbps_version::dep_name;

use crate::error::{SolveError, TransactionError};
use crate::universe::{PackageRecord, Universe};
use crate::SelectedDependencies;

/// Where dependency records are resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepSource {
    /// The repository pool; missing dependencies are fatal.
    Pool,
    /// The installed database; missing dependencies are silently skipped
    /// (optional run-time deps whose package is ignored).
    InstalledDb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

struct Node {
    pkgver: String,
    /// One entry per declared dependency; `None` when the dependency was
    /// skipped (provides-satisfied or missing from the installed database).
    deps: Vec<Option<usize>>,
    mark: Mark,
}

#[derive(Default)]
struct Graph {
    nodes: Vec<Node>,
    index: FxHashMap<String, usize>,
}

impl Graph {
    fn add_node(&mut self, name: &str, pkgver: String) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            pkgver,
            deps: Vec::new(),
            mark: Mark::Unvisited,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Recursively add a package and all its dependencies to the arena.
    fn collect(
        &mut self,
        universe: &Universe,
        record: &PackageRecord,
        source: DepSource,
    ) -> Result<usize, TransactionError> {
        let name = record.name().to_string();
        if let Some(&idx) = self.index.get(&name) {
            return Ok(idx);
        }
        let idx = self.add_node(&name, record.pkgver.clone());

        let mut deps: Vec<Option<usize>> = Vec::with_capacity(record.run_depends.len());
        for dep in &record.run_depends {
            let Some(dep_pkgname) = dep_name(dep) else {
                log::warn!("{}: unparseable dependency '{}'", record.pkgver, dep);
                deps.push(None);
                continue;
            };
            // a dependency satisfied by the package's own provides is skipped
            if record
                .provides
                .iter()
                .any(|p| dep_name(p) == Some(dep_pkgname))
            {
                log::debug!(
                    "{}: ignoring dependency {} already in provides",
                    record.pkgver,
                    dep
                );
                deps.push(None);
                continue;
            }
            let dep_record = match source {
                DepSource::Pool => universe
                    .rpool
                    .get_pkg(dep_pkgname)
                    .or_else(|| universe.rpool.get_virtualpkg(dep_pkgname)),
                DepSource::InstalledDb => universe
                    .pkgdb
                    .get_pkg(dep_pkgname)
                    .or_else(|| universe.pkgdb.get_virtualpkg(dep_pkgname)),
            };
            match dep_record {
                Some(dep_record) => {
                    let dep_idx = self.collect(universe, dep_record, source)?;
                    deps.push(Some(dep_idx));
                }
                None if source == DepSource::InstalledDb => {
                    log::debug!("{}: missing dependency '{}'", record.pkgver, dep);
                    deps.push(None);
                }
                None => {
                    return Err(TransactionError::MissingDependency {
                        pkgver: record.pkgver.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        self.nodes[idx].deps = deps;
        Ok(idx)
    }

    /// Queue the subtree under `item`: dependency-free packages go straight
    /// to the result, the rest onto the todo list after their own subtree.
    fn collect_todo(
        &mut self,
        item: usize,
        todo: &mut Vec<usize>,
        result: &mut Vec<usize>,
        queued: &mut [bool],
    ) {
        let deps = self.nodes[item].deps.clone();
        for dep in deps.into_iter().flatten() {
            if queued[dep] {
                continue;
            }
            queued[dep] = true;
            if self.nodes[dep].deps.is_empty() {
                result.push(dep);
                self.nodes[dep].mark = Mark::Done;
            } else {
                self.collect_todo(dep, todo, result, queued);
                todo.push(dep);
            }
        }
    }

    /// A node is sortable when every one of its dependencies is done or
    /// recursively sortable. Re-entry into a node on the current descent
    /// stack is a cycle.
    fn sort_recursive(
        &mut self,
        item: usize,
        result: &mut Vec<usize>,
    ) -> Result<bool, TransactionError> {
        match self.nodes[item].mark {
            Mark::Done => return Ok(true),
            Mark::OnStack => {
                return Err(TransactionError::DependencyCycle(
                    self.nodes[item].pkgver.clone(),
                ));
            }
            Mark::Unvisited => {}
        }
        self.nodes[item].mark = Mark::OnStack;
        let deps = self.nodes[item].deps.clone();
        let mut done = 0;
        for dep in &deps {
            match dep {
                None => done += 1,
                Some(d) => {
                    if self.nodes[*d].mark == Mark::Done || self.sort_recursive(*d, result)? {
                        done += 1;
                    }
                }
            }
        }
        self.nodes[item].mark = Mark::Unvisited;
        if done == deps.len() {
            result.push(item);
            self.nodes[item].mark = Mark::Done;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Order every package reachable from `root`, excluding the root itself.
    fn ordered(&mut self, root: usize) -> Result<Vec<String>, TransactionError> {
        let mut result: Vec<usize> = Vec::new();
        let mut todo: Vec<usize> = Vec::new();
        let mut queued = vec![false; self.nodes.len()];

        // the head itself is already done
        self.nodes[root].mark = Mark::Done;
        queued[root] = true;
        self.collect_todo(root, &mut todo, &mut result, &mut queued);

        while !todo.is_empty() {
            let mut progressed = false;
            for i in 0..todo.len() {
                let item = todo[i];
                if self.nodes[item].mark == Mark::Done || self.sort_recursive(item, &mut result)? {
                    todo.remove(i);
                    progressed = true;
                    break;
                }
            }
            if !progressed {
                return Err(TransactionError::DependencyCycle(
                    self.nodes[todo[0]].pkgver.clone(),
                ));
            }
        }

        Ok(result
            .into_iter()
            .map(|idx| self.nodes[idx].pkgver.clone())
            .collect())
    }
}

/// The full run-time dependency tree of a package, in install order and
/// excluding the package itself.
pub fn fulldeptree(
    universe: &Universe,
    pkg: &str,
    source: DepSource,
) -> Result<Vec<String>, TransactionError> {
    let record = match source {
        DepSource::Pool => universe
            .rpool
            .get_pkg(pkg)
            .or_else(|| universe.rpool.get_virtualpkg(pkg)),
        DepSource::InstalledDb => universe
            .pkgdb
            .get_pkg(pkg)
            .or_else(|| universe.pkgdb.get_virtualpkg(pkg)),
    }
    .ok_or_else(|| TransactionError::Solve(SolveError::NotFound(pkg.to_string())))?;
    let mut graph = Graph::default();
    let root = graph.collect(universe, record, source)?;
    graph.ordered(root)
}

/// Order the decisions of a successful solve so that every package appears
/// after its chosen run-time dependencies. Returns pkgver strings.
pub(crate) fn sort_solution(
    universe: &Universe,
    decisions: &SelectedDependencies,
) -> Result<Vec<String>, TransactionError> {
    let mut graph = Graph::default();
    let mut names: Vec<&String> = decisions.keys().collect();
    names.sort();

    for name in &names {
        let version = &decisions[name.as_str()];
        graph.add_node(name, format!("{}-{}", name, version));
    }
    for name in &names {
        let version = &decisions[name.as_str()];
        let Some(record) = universe.record_for(name, version) else {
            continue;
        };
        let mut deps: Vec<Option<usize>> = Vec::with_capacity(record.run_depends.len());
        for dep in &record.run_depends {
            let dep_idx = dep_name(dep)
                .filter(|n| *n != name.as_str())
                .filter(|n| !record.provides.iter().any(|p| dep_name(p) == Some(*n)))
                .and_then(|n| graph.index.get(n).copied());
            deps.push(dep_idx);
        }
        let idx = graph.index[name.as_str()];
        graph.nodes[idx].deps = deps;
    }

    // synthetic root depending on every decision
    let root = graph.nodes.len();
    let deps = (0..root).map(Some).collect();
    graph.nodes.push(Node {
        pkgver: String::new(),
        deps,
        mark: Mark::Unvisited,
    });
    graph.ordered(root)
}
