// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Dependency graph over declarations
//!
//! Cycles are found with Tarjan's algorithm and their members cut out of
//! the graph, so every closure handed out afterwards is acyclic. Closures
//! are memoised in a concurrent map because most targets share ancestors.

use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use crate::core::DeclId;

const UNVISITED: usize = usize::MAX;

/// Strongly connected components with more than one member, or a self edge
pub fn cycles(deps: &[Vec<DeclId>]) -> Vec<Vec<DeclId>> {
    let n = deps.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next = 0usize;
    let mut found = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = next;
        low[root] = next;
        next += 1;
        stack.push(root);
        on_stack[root] = true;
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.1 < deps[v].len() {
                let w = deps[v][frame.1].index();
                frame.1 += 1;
                if w >= n {
                    continue;
                }
                if index[w] == UNVISITED {
                    index[w] = next;
                    low[w] = next;
                    next += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
            } else {
                call.pop();
                if let Some(&(u, _)) = call.last() {
                    low[u] = low[u].min(low[v]);
                }
                if low[v] == index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(DeclId(w as u32));
                        if w == v {
                            break;
                        }
                    }
                    let self_edge = deps[v].iter().any(|d| d.index() == v);
                    if component.len() > 1 || self_edge {
                        component.sort();
                        found.push(component);
                    }
                }
            }
        }
    }
    found.sort();
    found
}

/// Acyclic dependency graph with a deterministic topological order
#[derive(Debug)]
pub struct DependencyGraph {
    deps: Vec<Vec<DeclId>>,
    excluded: Vec<bool>,
    order: Vec<DeclId>,
    rank: Vec<usize>,
    closures: DashMap<DeclId, Arc<Vec<DeclId>>>,
}

impl DependencyGraph {
    /// Build from direct dependencies (`deps[i]` are the dependencies of `DeclId(i)`).
    ///
    /// Returns the graph and the cycles whose members were excluded.
    pub fn new(mut deps: Vec<Vec<DeclId>>) -> (Self, Vec<Vec<DeclId>>) {
        let n = deps.len();
        for list in deps.iter_mut() {
            list.retain(|d| d.index() < n);
            list.sort();
            list.dedup();
        }

        let cycles = cycles(&deps);
        let mut excluded = vec![false; n];
        for member in cycles.iter().flatten() {
            excluded[member.index()] = true;
        }
        for (i, list) in deps.iter_mut().enumerate() {
            if excluded[i] {
                list.clear();
            } else {
                list.retain(|d| !excluded[d.index()]);
            }
        }

        let order = topological_order(&deps, &excluded);
        let mut rank = vec![usize::MAX; n];
        for (pos, id) in order.iter().enumerate() {
            rank[id.index()] = pos;
        }

        let graph = Self {
            deps,
            excluded,
            order,
            rank,
            closures: DashMap::new(),
        };
        (graph, cycles)
    }

    pub fn len(&self) -> usize {
        self.deps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deps.is_empty()
    }

    pub fn direct(&self, id: DeclId) -> &[DeclId] {
        self.deps.get(id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_excluded(&self, id: DeclId) -> bool {
        self.excluded.get(id.index()).copied().unwrap_or(true)
    }

    /// Dependencies before dependents; ties broken by id
    pub fn order(&self) -> &[DeclId] {
        &self.order
    }

    pub fn rank(&self, id: DeclId) -> usize {
        self.rank.get(id.index()).copied().unwrap_or(usize::MAX)
    }

    /// Transitive dependencies of `id` in topological order
    pub fn closure(&self, id: DeclId) -> Arc<Vec<DeclId>> {
        if let Some(cached) = self.closures.get(&id) {
            return cached.value().clone();
        }

        let mut seen: HashSet<DeclId> = HashSet::new();
        let mut stack: Vec<DeclId> = self.direct(id).to_vec();
        while let Some(d) = stack.pop() {
            if !seen.insert(d) {
                continue;
            }
            if let Some(known) = self.closures.get(&d) {
                seen.extend(known.iter().copied());
                continue;
            }
            stack.extend(self.direct(d).iter().copied());
        }

        let mut closure: Vec<DeclId> = seen.into_iter().collect();
        closure.sort_by_key(|d| (self.rank(*d), *d));
        let closure = Arc::new(closure);
        self.closures.insert(id, Arc::clone(&closure));
        closure
    }

    pub fn cached_closures(&self) -> usize {
        self.closures.len()
    }
}

/// Kahn's algorithm with a min-heap so equal-rank nodes come out by id
fn topological_order(deps: &[Vec<DeclId>], excluded: &[bool]) -> Vec<DeclId> {
    let n = deps.len();
    let mut pending = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, list) in deps.iter().enumerate() {
        pending[i] = list.len();
        for d in list {
            dependents[d.index()].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| pending[i] == 0 && !excluded[i])
        .map(Reverse)
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        order.push(DeclId(i as u32));
        for &j in &dependents[i] {
            pending[j] -= 1;
            if pending[j] == 0 && !excluded[j] {
                ready.push(Reverse(j));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[u32]) -> Vec<DeclId> {
        v.iter().map(|&i| DeclId(i)).collect()
    }

    #[test]
    fn test_closure_is_transitive_and_ordered() {
        // 0 <- 1 <- 3, 0 <- 2 <- 3
        let (graph, cycles) = DependencyGraph::new(vec![
            vec![],
            ids(&[0]),
            ids(&[0]),
            ids(&[2, 1]),
        ]);
        assert!(cycles.is_empty());
        assert_eq!(*graph.closure(DeclId(3)), ids(&[0, 1, 2]));
        assert_eq!(*graph.closure(DeclId(0)), Vec::<DeclId>::new());
        assert_eq!(graph.order(), ids(&[0, 1, 2, 3]).as_slice());
    }

    #[test]
    fn test_closure_is_memoised() {
        let (graph, _) = DependencyGraph::new(vec![vec![], ids(&[0]), ids(&[1])]);
        let first = graph.closure(DeclId(2));
        let second = graph.closure(DeclId(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(graph.cached_closures(), 1);
    }

    #[test]
    fn test_cycle_excludes_exactly_its_members() {
        // 1 <-> 2 form a cycle; 0 is independent; 3 depends on 0 and 1
        let (graph, cycles) = DependencyGraph::new(vec![
            vec![],
            ids(&[2]),
            ids(&[1]),
            ids(&[0, 1]),
        ]);
        assert_eq!(cycles, vec![ids(&[1, 2])]);
        assert!(graph.is_excluded(DeclId(1)));
        assert!(graph.is_excluded(DeclId(2)));
        assert!(!graph.is_excluded(DeclId(0)));
        assert!(!graph.is_excluded(DeclId(3)));
        assert_eq!(*graph.closure(DeclId(3)), ids(&[0]));
        assert_eq!(graph.order(), ids(&[0, 3]).as_slice());
    }

    #[test]
    fn test_self_edge_is_a_cycle() {
        let found = cycles(&[ids(&[0]), vec![]]);
        assert_eq!(found, vec![ids(&[0])]);
    }

    #[test]
    fn test_order_respects_dependencies_over_ids() {
        // 0 depends on 1 even though its id is smaller
        let (graph, _) = DependencyGraph::new(vec![ids(&[1]), vec![], vec![]]);
        assert_eq!(graph.order(), ids(&[1, 0, 2]).as_slice());
        assert_eq!(*graph.closure(DeclId(0)), ids(&[1]));
    }

    #[test]
    fn test_deep_chain_does_not_overflow() {
        let n = 50_000u32;
        let deps: Vec<Vec<DeclId>> = (0..n)
            .map(|i| if i == 0 { vec![] } else { vec![DeclId(i - 1)] })
            .collect();
        let (graph, cycles) = DependencyGraph::new(deps);
        assert!(cycles.is_empty());
        assert_eq!(graph.closure(DeclId(n - 1)).len(), (n - 1) as usize);
    }
}
