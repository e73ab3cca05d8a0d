//! Dependency graph
//!
//! Builds the reference graph of a manifest and orders it for apply and
//! destroy. Ordering is Kahn's algorithm with a sorted ready set, so two
//! runs over the same declarations always produce the same sequence.

use crate::error::{ManifestError, Result};
use crate::model::{Address, Manifest};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Directed dependency graph over resource addresses.
///
/// An edge `a -> b` means `a` depends on `b`: `b` must be finalized before
/// `a` is created, and `a` must be destroyed before `b`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<Address>,
    /// node -> addresses it depends on
    dependencies: BTreeMap<Address, BTreeSet<Address>>,
    /// node -> addresses depending on it
    dependents: BTreeMap<Address, BTreeSet<Address>>,
}

impl DependencyGraph {
    /// Build the graph from a manifest, validating that every edge points
    /// at a declared resource.
    pub fn from_manifest(manifest: &Manifest) -> Result<Self> {
        let mut graph = Self::default();
        for node in manifest.iter_resources() {
            graph.add_node(node.address.clone());
        }
        for node in manifest.iter_resources() {
            for dep in node.dependencies() {
                if !manifest.contains(&dep) {
                    return Err(ManifestError::UnknownReference {
                        from: node.address.to_string(),
                        to: dep.to_string(),
                    });
                }
                graph.add_edge(node.address.clone(), dep);
            }
        }
        debug!(
            nodes = graph.nodes.len(),
            edges = graph.edge_count(),
            "Built dependency graph"
        );
        Ok(graph)
    }

    /// Build a graph from explicit (node, dependencies) pairs. Used for
    /// ordering deletions out of a state snapshot, where the declarations
    /// are gone but the recorded edges remain.
    pub fn from_edges<I, D>(edges: I) -> Self
    where
        I: IntoIterator<Item = (Address, D)>,
        D: IntoIterator<Item = Address>,
    {
        let pairs: Vec<(Address, Vec<Address>)> = edges
            .into_iter()
            .map(|(node, deps)| (node, deps.into_iter().collect()))
            .collect();

        let mut graph = Self::default();
        for (node, _) in &pairs {
            graph.add_node(node.clone());
        }
        for (node, deps) in pairs {
            for dep in deps {
                // Edges leaving the set are dropped: a survivor referenced
                // by a deleted resource does not gate deletion
                if graph.contains(&dep) {
                    graph.add_edge(node.clone(), dep);
                }
            }
        }
        graph
    }

    pub fn add_node(&mut self, address: Address) {
        self.nodes.insert(address);
    }

    pub fn add_edge(&mut self, from: Address, to: Address) {
        self.dependencies
            .entry(from.clone())
            .or_default()
            .insert(to.clone());
        self.dependents.entry(to).or_default().insert(from);
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.nodes.contains(address)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn edge_count(&self) -> usize {
        self.dependencies.values().map(|d| d.len()).sum()
    }

    /// All nodes in stable order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.nodes.iter()
    }

    /// All edges as (dependent, dependency) pairs in stable order.
    pub fn edges(&self) -> Vec<(Address, Address)> {
        self.dependencies
            .iter()
            .flat_map(|(from, deps)| deps.iter().map(|to| (from.clone(), to.clone())))
            .collect()
    }

    /// Addresses the given node depends on.
    pub fn dependencies_of(&self, address: &Address) -> Vec<Address> {
        self.dependencies
            .get(address)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Addresses depending on the given node.
    pub fn dependents_of(&self, address: &Address) -> Vec<Address> {
        self.dependents
            .get(address)
            .map(|d| d.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Topological order for creation: every resource appears after all of
    /// its dependencies. Fails with the full set of cycle members when the
    /// graph is not acyclic.
    pub fn creation_order(&self) -> Result<Vec<Address>> {
        let mut in_degree: BTreeMap<&Address, usize> = self
            .nodes
            .iter()
            .map(|n| (n, self.dependencies.get(n).map(|d| d.len()).unwrap_or(0)))
            .collect();

        // Sorted ready set gives a stable order among independent nodes
        let mut ready: BTreeSet<&Address> = in_degree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(n, _)| *n)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(&node) = ready.iter().next() {
            ready.remove(node);
            order.push(node.clone());
            if let Some(deps) = self.dependents.get(node) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(dependent);
                        }
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            // Whatever never reached degree zero sits on a cycle; report
            // every member at once
            let members: Vec<String> = in_degree
                .iter()
                .filter(|(n, _)| !order.contains(*n))
                .map(|(n, _)| n.to_string())
                .collect();
            return Err(ManifestError::DependencyCycle { members });
        }

        Ok(order)
    }

    /// Topological order for destruction: the reverse of creation, so a
    /// resource is destroyed only after everything depending on it.
    pub fn destruction_order(&self) -> Result<Vec<Address>> {
        let mut order = self.creation_order()?;
        order.reverse();
        Ok(order)
    }
}
