// src/resolver.rs

//! Dependency resolution and installation ordering.
//!
//! Resolution computes the closure of the requested set over catalog
//! dependencies, builds a dependency graph (edges point from dependency to
//! dependent), and orders it with a cycle-tolerant Kahn sort so that
//! independent packages emerge first. Accidental cycles are warned and
//! their members appended alphabetically; bootstraps must still make
//! progress.

use crate::catalog::Catalog;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::version::Dependency;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

/// Dependency graph over a resolution closure. Never persisted.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// dependency -> packages that depend on it
    dependents: HashMap<String, Vec<String>>,
    /// package -> number of its dependencies inside the closure
    in_degree: HashMap<String, usize>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str) {
        if self.nodes.insert(name.to_string()) {
            self.in_degree.entry(name.to_string()).or_insert(0);
        }
    }

    /// Record that `dependent` depends on `dependency`.
    pub fn add_edge(&mut self, dependency: &str, dependent: &str) {
        self.add_node(dependency);
        self.add_node(dependent);
        self.dependents
            .entry(dependency.to_string())
            .or_default()
            .push(dependent.to_string());
        *self.in_degree.entry(dependent.to_string()).or_insert(0) += 1;
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn topological sort, dependencies first.
    ///
    /// If a cycle remains its members are warned and appended at the end in
    /// alphabetical order; the result always contains every node.
    pub fn install_order(&self) -> Vec<String> {
        let mut in_degree = self.in_degree.clone();
        let mut queue: VecDeque<String> = VecDeque::new();

        // BTreeSet iteration keeps the seed deterministic.
        for name in &self.nodes {
            if in_degree.get(name).copied().unwrap_or(0) == 0 {
                queue.push_back(name.clone());
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(name) = queue.pop_front() {
            order.push(name.clone());
            if let Some(dependents) = self.dependents.get(&name) {
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dependent.clone());
                        }
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let mut cycle: Vec<String> = self
                .nodes
                .iter()
                .filter(|name| in_degree.get(*name).copied().unwrap_or(0) > 0)
                .cloned()
                .collect();
            cycle.sort();
            warn!(
                "Circular dependency detected among: {}. Appending in alphabetical order.",
                cycle.join(", ")
            );
            order.extend(cycle);
        }
        order
    }
}

/// The outcome of a resolution: the full closure in install order and the
/// subset that actually needs installing.
#[derive(Debug)]
pub struct ResolutionPlan {
    /// Every closure member, dependencies before dependents.
    pub ordered_closure: Vec<String>,
    /// `ordered_closure` minus already-installed packages, order preserved.
    pub to_install: Vec<String>,
}

/// Compute the dependency closure of `requested` and order it.
///
/// A name absent from the catalog but present in the installed database is
/// treated as already satisfied. A name absent from both is a hard error.
pub fn resolve(requested: &[String], catalog: &Catalog, db: &Database) -> Result<ResolutionPlan> {
    let mut closure: HashSet<String> = HashSet::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = requested.to_vec();

    while let Some(current) = stack.pop() {
        if !visited.insert(current.clone()) {
            continue;
        }
        closure.insert(current.clone());

        match catalog.get(&current) {
            Some(record) => {
                for dep_str in &record.dependencies {
                    let dep = Dependency::parse(dep_str);
                    if let Some(constraint) = &dep.constraint {
                        if let Some(candidate) = catalog.get(&dep.name) {
                            if !constraint.satisfied_by(&candidate.version) {
                                warn!(
                                    "Dependency '{}' of {} is not satisfied by available version {}; continuing",
                                    dep_str, current, candidate.version
                                );
                            }
                        }
                    }
                    if !visited.contains(&dep.name) {
                        stack.push(dep.name);
                    }
                }
            }
            None => {
                if !db.is_installed(&current)? {
                    return Err(Error::Resolution(current));
                }
                debug!("'{}' not in any catalog but already installed", current);
            }
        }
    }

    let mut graph = DependencyGraph::new();
    for name in &closure {
        graph.add_node(name);
    }
    for name in &closure {
        let Some(record) = catalog.get(name) else {
            // Satisfied from the installed database; no outgoing edges.
            continue;
        };
        for dep_str in &record.dependencies {
            let dep = Dependency::parse(dep_str);
            if closure.contains(&dep.name) {
                graph.add_edge(&dep.name, name);
            }
        }
    }

    let ordered_closure = graph.install_order();

    let mut to_install = Vec::new();
    for name in &ordered_closure {
        if !db.is_installed(name)? {
            to_install.push(name.clone());
        }
    }

    Ok(ResolutionPlan {
        ordered_closure,
        to_install,
    })
}
