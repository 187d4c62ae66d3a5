//! Flat name → descriptor registry.
//!
//! There is one process-wide registry, empty at startup and filled by
//! explicit registration calls. Sessions hold an `Arc` to a registry, so
//! every session sees the same analyses; tests can build private registries
//! with [`AnalysisRegistry::new`].

use crate::descriptor::{AnalysisDescriptor, Dependency, Runnable};
use crate::errors::AnalysisError;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::sync::Arc;

static GLOBAL_REGISTRY: Lazy<Arc<AnalysisRegistry>> = Lazy::new(|| Arc::new(AnalysisRegistry::new()));

#[derive(Debug, Default)]
pub struct AnalysisRegistry {
    descriptors: RwLock<HashMap<String, Arc<AnalysisDescriptor>>>,
}

impl AnalysisRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<AnalysisRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Insert or overwrite a descriptor under its own name.
    pub fn insert(&self, descriptor: AnalysisDescriptor) {
        let name = descriptor.name().to_string();
        let previous = self
            .descriptors
            .write()
            .insert(name.clone(), Arc::new(descriptor));
        if previous.is_some() {
            tracing::debug!(analysis = %name, "Replaced registered analysis");
        } else {
            tracing::debug!(analysis = %name, "Registered analysis");
        }
    }

    pub fn register(
        &self,
        name: &str,
        runnable: Runnable,
        dependencies: Vec<Dependency>,
        resilient_by_default: bool,
    ) {
        self.insert(
            AnalysisDescriptor::new(name, runnable)
                .with_dependencies(dependencies)
                .resilient_by_default(resilient_by_default),
        );
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<AnalysisDescriptor>, AnalysisError> {
        self.descriptors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| AnalysisError::unknown(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    /// Name-level cycles among declared dependencies.
    ///
    /// Arguments are ignored, so this over-approximates: `A(depth=1)` →
    /// `A(depth=0)` shows up as a self-loop even though the keys differ.
    /// Dependencies on unregistered names are skipped.
    pub fn dependency_cycles(&self) -> Vec<Vec<String>> {
        let descriptors = self.descriptors.read();
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for name in descriptors.keys() {
            nodes.insert(name.as_str(), graph.add_node(name.as_str()));
        }
        for (name, descriptor) in descriptors.iter() {
            for dep in descriptor.dependencies() {
                if let Some(&to) = nodes.get(dep.name.as_str()) {
                    graph.add_edge(nodes[name.as_str()], to, ());
                }
            }
        }

        let mut cycles: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut names: Vec<String> = scc.iter().map(|&n| graph[n].to_string()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }
}

/// Register an analysis in the process-wide registry.
pub fn register(
    name: &str,
    runnable: Runnable,
    dependencies: Vec<Dependency>,
    resilient_by_default: bool,
) {
    AnalysisRegistry::global().register(name, runnable, dependencies, resilient_by_default);
}
