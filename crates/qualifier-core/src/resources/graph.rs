//! Dependency ordering for resource declarations.
//!
//! Declarations form a directed graph: an edge `A → B` means "B depends on
//! A", so A must be constructed first. Ordering is computed with Kahn's
//! algorithm, draining ready nodes in ID order so the result is
//! deterministic. Anything left over is reported together with the
//! dependencies it was still waiting for and, when the leftovers contain a
//! cycle, the precise cycle path.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use qualifier_domain::{ResourceDeclaration, ResourceId};

use crate::error::{ResourceError, UnresolvedResource};

/// Compute the construction order of `declarations`.
///
/// `available` reports whether an ID already exists outside of
/// `declarations` (for instance in the pool being extended); such IDs satisfy
/// dependencies without being ordered. A declaration shadows an available
/// resource of the same ID.
pub fn resolution_order(
    declarations: &BTreeMap<ResourceId, ResourceDeclaration>,
    available: impl Fn(&str) -> bool,
) -> Result<Vec<ResourceId>, ResourceError> {
    // `dependency → {dependent, ...}` over declared nodes only.
    let mut downstream: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();

    for (id, declaration) in declarations {
        let degree = in_degree.entry(id.as_str()).or_default();
        let deps: BTreeSet<&str> = declaration
            .dependencies
            .values()
            .map(String::as_str)
            .collect();
        for dep in deps {
            if declarations.contains_key(dep) {
                *degree += 1;
                downstream.entry(dep).or_default().insert(id.as_str());
            } else if !available(dep) {
                // Never satisfiable; keeps the node out of the order.
                *degree += 1;
            }
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();
    let mut sorted: Vec<ResourceId> = Vec::with_capacity(declarations.len());

    while let Some(id) = ready.pop_first() {
        sorted.push(id.to_string());
        if let Some(dependents) = downstream.get(id) {
            for dependent in dependents {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }
    }

    if sorted.len() == declarations.len() {
        return Ok(sorted);
    }

    let built: HashSet<&str> = sorted.iter().map(String::as_str).collect();
    let unresolved: Vec<UnresolvedResource> = declarations
        .iter()
        .filter(|(id, _)| !built.contains(id.as_str()))
        .map(|(id, declaration)| {
            let missing: BTreeSet<ResourceId> = declaration
                .dependencies
                .values()
                .filter(|dep| {
                    !built.contains(dep.as_str())
                        && (declarations.contains_key(dep.as_str()) || !available(dep.as_str()))
                })
                .cloned()
                .collect();
            UnresolvedResource {
                resource_id: id.clone(),
                missing_dependencies: missing.into_iter().collect(),
            }
        })
        .collect();

    let pending: BTreeSet<&str> = unresolved.iter().map(|u| u.resource_id.as_str()).collect();
    let cycle = find_cycle(declarations, &pending);

    Err(ResourceError::UnresolvableResources { unresolved, cycle })
}

/// Find a dependency cycle among `pending` declarations, if any.
///
/// The returned path starts and ends with the same ID and follows
/// "depends on" edges.
fn find_cycle(
    declarations: &BTreeMap<ResourceId, ResourceDeclaration>,
    pending: &BTreeSet<&str>,
) -> Option<Vec<ResourceId>> {
    let mut visited = HashSet::new();
    for start in pending {
        let mut path = Vec::new();
        if dfs_cycle(declarations, pending, start, &mut visited, &mut path) {
            return Some(path);
        }
    }
    None
}

fn dfs_cycle<'a>(
    declarations: &'a BTreeMap<ResourceId, ResourceDeclaration>,
    pending: &BTreeSet<&str>,
    node: &'a str,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<ResourceId>,
) -> bool {
    if let Some(pos) = path.iter().position(|p| p == node) {
        path.drain(..pos);
        path.push(node.to_string());
        return true;
    }
    if !visited.insert(node) {
        return false;
    }
    path.push(node.to_string());

    if let Some(declaration) = declarations.get(node) {
        let deps: BTreeSet<&str> = declaration
            .dependencies
            .values()
            .map(String::as_str)
            .filter(|dep| pending.contains(dep))
            .collect();
        for dep in deps {
            if dfs_cycle(declarations, pending, dep, visited, path) {
                return true;
            }
        }
    }

    path.pop();
    false
}
