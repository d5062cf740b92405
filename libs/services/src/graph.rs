//! Pure dependency-graph checks, run against snapshots before any mutation.

use std::collections::{BTreeMap, BTreeSet};

use crate::name::ServiceName;

/// Check whether registering `candidate` with `candidate_deps` would close a
/// cycle through the existing `edges` (service -> its dependencies).
///
/// Edges may reference names that are not yet registered; those are dead ends
/// for the search. Returns the offending path `candidate -> ... -> candidate`
/// when a cycle is found, so it runs before the graph is touched and a failed
/// install commits nothing.
pub(crate) fn find_cycle(
    edges: &BTreeMap<ServiceName, BTreeSet<ServiceName>>,
    candidate: &ServiceName,
    candidate_deps: &BTreeSet<ServiceName>,
) -> Option<Vec<ServiceName>> {
    if candidate_deps.contains(candidate) {
        return Some(vec![candidate.clone(), candidate.clone()]);
    }

    // DFS from each declared dependency, looking for a path back to the
    // candidate through existing edges.
    for dep in candidate_deps {
        let mut visited: BTreeSet<&ServiceName> = BTreeSet::new();
        let mut path: Vec<&ServiceName> = vec![dep];
        if dfs(edges, candidate, dep, &mut visited, &mut path) {
            let mut cycle = Vec::with_capacity(path.len() + 2);
            cycle.push(candidate.clone());
            cycle.extend(path.iter().map(|n| (*n).clone()));
            cycle.push(candidate.clone());
            return Some(cycle);
        }
    }
    None
}

fn dfs<'a>(
    edges: &'a BTreeMap<ServiceName, BTreeSet<ServiceName>>,
    target: &ServiceName,
    current: &'a ServiceName,
    visited: &mut BTreeSet<&'a ServiceName>,
    path: &mut Vec<&'a ServiceName>,
) -> bool {
    if current == target {
        path.pop();
        return true;
    }
    if !visited.insert(current) {
        return false;
    }
    if let Some(deps) = edges.get(current) {
        for next in deps {
            path.push(next);
            if dfs(edges, target, next, visited, path) {
                return true;
            }
            path.pop();
        }
    }
    false
}
