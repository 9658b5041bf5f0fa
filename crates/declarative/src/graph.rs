//! Dependency resolution
//!
//! Edges come from desired state only: every reference a kind reports for a
//! resource becomes one edge from the resource to the referenced one.
//! [`waves`] orders resources for the executor.

use crate::error::{Error, Result};
use crate::resource::KindRegistry;
use crate::types::{ResourceHandle, ResourceRef};
use std::collections::HashMap;
use std::fmt;

/// `from` depends on `to`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub from: ResourceRef,
    pub to: ResourceRef,
    /// Property or attribute holding the reference
    pub via: String,
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (via {})", self.from, self.to, self.via)
    }
}

/// Candidate dependency edges for a set of resources.
///
/// One edge per reference found. References a resource makes to itself are
/// dropped; nothing is deduplicated or cycle-checked here.
pub fn edges(registry: &KindRegistry, resources: &[ResourceHandle]) -> Result<Vec<DependencyEdge>> {
    let mut edges = Vec::new();
    for resource in resources {
        let kind = registry.get(&resource.kind)?;
        let from = resource.reference();
        for reference in kind.references(resource) {
            let to = ResourceRef::new(reference.kind, reference.name);
            if to == from {
                continue;
            }
            edges.push(DependencyEdge {
                from: from.clone(),
                to,
                via: reference.via,
            });
        }
    }
    Ok(edges)
}

/// Group resources into waves that can run in parallel.
///
/// Every resource lands in a later wave than all resources it depends on.
/// Edges to resources outside `resources` are ignored. Returns indices into
/// `resources`, each wave in input order.
pub fn waves(resources: &[ResourceHandle], edges: &[DependencyEdge]) -> Result<Vec<Vec<usize>>> {
    let mut index: HashMap<ResourceRef, Vec<usize>> = HashMap::new();
    for (i, resource) in resources.iter().enumerate() {
        index.entry(resource.reference()).or_default().push(i);
    }

    let mut pending = vec![0usize; resources.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); resources.len()];
    for edge in edges {
        let (Some(from), Some(to)) = (index.get(&edge.from), index.get(&edge.to)) else {
            continue;
        };
        for &dependent in from {
            for &dependency in to {
                if dependent == dependency {
                    continue;
                }
                pending[dependent] += 1;
                dependents[dependency].push(dependent);
            }
        }
    }

    let mut done = vec![false; resources.len()];
    let mut waves = Vec::new();
    let mut remaining = resources.len();
    while remaining > 0 {
        let wave: Vec<usize> = (0..resources.len())
            .filter(|&i| !done[i] && pending[i] == 0)
            .collect();

        if wave.is_empty() {
            let mut cycle: Vec<String> = (0..resources.len())
                .filter(|&i| !done[i])
                .map(|i| resources[i].reference().to_string())
                .collect();
            cycle.sort();
            cycle.dedup();
            return Err(Error::Cycle(cycle));
        }

        for &i in &wave {
            done[i] = true;
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
            }
        }
        remaining -= wave.len();
        waves.push(wave);
    }

    log::debug!("Ordered {} resources into {} waves", resources.len(), waves.len());
    Ok(waves)
}
