// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type graph analysis: strongly connected components, cycle membership and
//! the longest path in the condensed graph.
//!
//! Nodes are dense `usize` indices into an arena (the schema's type table),
//! so the graph never owns descriptors and mutually recursive types need no
//! reference cycles.

use crate::error::SchemaError;
use std::collections::BTreeSet;

/// Max allowed condensed-graph path length, ignoring types that belong to cycles.
pub const MAX_STATIC_DEPTH: usize = 256;

/// Directed "contains" graph over type indices.
///
/// Every node `0..len` is present, even with no neighbors.
#[derive(Debug, Clone, Default)]
pub struct TypeGraph {
    adjacency: Vec<BTreeSet<usize>>,
}

impl TypeGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            adjacency: vec![BTreeSet::new(); node_count],
        }
    }

    pub fn from_adjacency(adjacency: Vec<Vec<usize>>) -> Self {
        Self {
            adjacency: adjacency
                .into_iter()
                .map(|n| n.into_iter().collect())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.adjacency[from].insert(to);
    }

    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        self.adjacency[node].iter().copied()
    }

    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.adjacency[from].contains(&to)
    }

    /// Reverse adjacency: `node -> nodes that directly contain it`.
    pub fn reversed(&self) -> TypeGraph {
        let mut reversed = TypeGraph::new(self.len());
        for (from, neighbors) in self.adjacency.iter().enumerate() {
            for &to in neighbors {
                reversed.add_edge(to, from);
            }
        }
        reversed
    }
}

/// Iterative Tarjan SCC.
///
/// Components are returned in topological order: if some node of component
/// `a` has an edge into component `b` (`a != b`), then `a` comes before `b`.
pub fn strongly_connected_components(graph: &TypeGraph) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = graph.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<usize>> = Vec::new();

    // (node, neighbors snapshot, position of next neighbor to visit)
    let mut work: Vec<(usize, Vec<usize>, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }

        index[root] = next_index;
        lowlink[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;
        work.push((root, graph.neighbors(root).collect(), 0));

        while let Some((node, neighbors, pos)) = work.last_mut() {
            let node = *node;
            if let Some(&next) = neighbors.get(*pos) {
                *pos += 1;
                if index[next] == UNVISITED {
                    index[next] = next_index;
                    lowlink[next] = next_index;
                    next_index += 1;
                    stack.push(next);
                    on_stack[next] = true;
                    work.push((next, graph.neighbors(next).collect(), 0));
                } else if on_stack[next] {
                    lowlink[node] = lowlink[node].min(index[next]);
                }
                continue;
            }

            // All neighbors done.
            work.pop();
            if let Some((parent, _, _)) = work.last() {
                lowlink[*parent] = lowlink[*parent].min(lowlink[node]);
            }

            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.reverse();
                components.push(component);
            }
        }
    }

    // Tarjan emits in reverse topological order.
    components.reverse();
    components
}

/// The cycle-collapsed view of a [`TypeGraph`].
#[derive(Debug, Clone)]
pub struct CondensedGraph {
    /// Components in topological order.
    pub components: Vec<Vec<usize>>,
    /// Node index -> component index.
    pub component_of: Vec<usize>,
    /// Inter-component edges only (no self-loops).
    pub graph: TypeGraph,
}

pub fn condense(graph: &TypeGraph) -> CondensedGraph {
    let components = strongly_connected_components(graph);
    let mut component_of = vec![0usize; graph.len()];
    for (ci, component) in components.iter().enumerate() {
        for &node in component {
            component_of[node] = ci;
        }
    }

    let mut condensed = TypeGraph::new(components.len());
    for from in 0..graph.len() {
        for to in graph.neighbors(from) {
            let (cf, ct) = (component_of[from], component_of[to]);
            if cf != ct {
                condensed.add_edge(cf, ct);
            }
        }
    }

    CondensedGraph {
        components,
        component_of,
        graph: condensed,
    }
}

/// Nodes that belong to at least one cycle: members of a multi-node
/// component, or singletons with a self-edge.
pub fn cycle_members(graph: &TypeGraph, condensed: &CondensedGraph) -> Vec<bool> {
    let mut in_cycle = vec![false; graph.len()];
    for component in &condensed.components {
        match component.as_slice() {
            [single] => in_cycle[*single] = graph.has_edge(*single, *single),
            many => {
                for &node in many {
                    in_cycle[node] = true;
                }
            }
        }
    }
    in_cycle
}

/// Longest path (in edges) through a DAG whose nodes are already in
/// topological order.
///
/// Single forward pass: each node's value is one more than the best of its
/// predecessors, and it registers itself as a predecessor of its successors.
/// An edge pointing back to an already-visited node means the order is not
/// topological, which is a build error.
pub fn longest_path_in_topological_dag(dag: &TypeGraph) -> Result<usize, SchemaError> {
    let n = dag.len();
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut longest_ending_at = vec![0usize; n];
    let mut longest = 0usize;

    for node in 0..n {
        let best = predecessors[node]
            .iter()
            .map(|&p| longest_ending_at[p] + 1)
            .max()
            .unwrap_or(0);
        longest_ending_at[node] = best;
        longest = longest.max(best);

        for next in dag.neighbors(node) {
            if next <= node {
                return Err(SchemaError::NotTopologicallyOrdered {
                    from: node,
                    to: next,
                });
            }
            predecessors[next].push(node);
        }
    }

    Ok(longest)
}

/// Everything reachable from `starts` (inclusive) following `graph` edges.
pub fn reachable_from(graph: &TypeGraph, starts: impl IntoIterator<Item = usize>) -> Vec<bool> {
    let mut seen = vec![false; graph.len()];
    let mut queue: Vec<usize> = Vec::new();
    for start in starts {
        if !seen[start] {
            seen[start] = true;
            queue.push(start);
        }
    }
    while let Some(node) = queue.pop() {
        for next in graph.neighbors(node) {
            if !seen[next] {
                seen[next] = true;
                queue.push(next);
            }
        }
    }
    seen
}

/// Result of analyzing a schema's type graph.
#[derive(Debug, Clone)]
pub struct GraphAnalysis {
    pub condensed: CondensedGraph,
    pub in_cycle: Vec<bool>,
    /// Longest path in the condensed graph. This is an approximation of the
    /// static nesting depth: each multi-node component counts as one step.
    pub max_condensed_depth: usize,
}

impl GraphAnalysis {
    pub fn analyze(graph: &TypeGraph) -> Result<Self, SchemaError> {
        let condensed = condense(graph);
        let in_cycle = cycle_members(graph, &condensed);
        let max_condensed_depth = longest_path_in_topological_dag(&condensed.graph)?;
        Ok(Self {
            condensed,
            in_cycle,
            max_condensed_depth,
        })
    }

    /// Fails when the static nesting bound exceeds `max_depth`.
    pub fn check_depth(&self, max_depth: usize) -> Result<(), SchemaError> {
        if self.max_condensed_depth > max_depth {
            return Err(SchemaError::DepthLimitExceeded {
                depth: self.max_condensed_depth,
                max: max_depth,
            });
        }
        Ok(())
    }

    pub fn cycle_member_count(&self) -> usize {
        self.in_cycle.iter().filter(|c| **c).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: usize = 0;
    const B: usize = 1;
    const C: usize = 2;

    #[test]
    fn test_chain_has_no_cycles() {
        let graph = TypeGraph::from_adjacency(vec![vec![B], vec![C], vec![]]);
        let analysis = GraphAnalysis::analyze(&graph).expect("analyze");
        assert_eq!(analysis.in_cycle, vec![false, false, false]);
        assert_eq!(analysis.max_condensed_depth, 2);
    }

    #[test]
    fn test_mutual_and_self_cycles() {
        let graph = TypeGraph::from_adjacency(vec![vec![B], vec![A], vec![C]]);
        let analysis = GraphAnalysis::analyze(&graph).expect("analyze");
        assert_eq!(analysis.in_cycle, vec![true, true, true]);
        assert_eq!(analysis.cycle_member_count(), 3);
        assert_eq!(analysis.max_condensed_depth, 0);
    }

    #[test]
    fn test_components_topologically_ordered() {
        // D -> {A,B} cycle -> C
        let d = 3;
        let graph = TypeGraph::from_adjacency(vec![vec![B], vec![A, C], vec![], vec![A]]);
        let condensed = condense(&graph);
        assert_eq!(condensed.components.len(), 3);
        let pos = |node: usize| condensed.component_of[node];
        assert!(pos(d) < pos(A));
        assert_eq!(pos(A), pos(B));
        assert!(pos(A) < pos(C));
        // Intra-component edges are dropped.
        let ab = pos(A);
        assert!(!condensed.graph.has_edge(ab, ab));
        assert_eq!(
            longest_path_in_topological_dag(&condensed.graph).expect("dag"),
            2
        );
    }

    #[test]
    fn test_singleton_without_self_edge_not_cyclic() {
        let graph = TypeGraph::from_adjacency(vec![vec![], vec![B]]);
        let analysis = GraphAnalysis::analyze(&graph).expect("analyze");
        assert_eq!(analysis.in_cycle, vec![false, true]);
    }

    #[test]
    fn test_longest_path_rejects_backward_edge() {
        let dag = TypeGraph::from_adjacency(vec![vec![], vec![0]]);
        assert_eq!(
            longest_path_in_topological_dag(&dag),
            Err(SchemaError::NotTopologicallyOrdered { from: 1, to: 0 })
        );
    }

    #[test]
    fn test_longest_path_diamond() {
        // 0 -> 1 -> 3, 0 -> 2 -> 3, 0 -> 3
        let dag = TypeGraph::from_adjacency(vec![vec![1, 2, 3], vec![3], vec![3], vec![]]);
        assert_eq!(longest_path_in_topological_dag(&dag).expect("dag"), 2);
    }

    #[test]
    fn test_depth_limit() {
        let n = MAX_STATIC_DEPTH + 2;
        let adjacency = (0..n)
            .map(|i| if i + 1 < n { vec![i + 1] } else { vec![] })
            .collect();
        let analysis =
            GraphAnalysis::analyze(&TypeGraph::from_adjacency(adjacency)).expect("analyze");
        assert_eq!(analysis.max_condensed_depth, MAX_STATIC_DEPTH + 1);
        assert_eq!(
            analysis.check_depth(MAX_STATIC_DEPTH),
            Err(SchemaError::DepthLimitExceeded {
                depth: MAX_STATIC_DEPTH + 1,
                max: MAX_STATIC_DEPTH
            })
        );
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let n = 200_000;
        let adjacency = (0..n)
            .map(|i| if i + 1 < n { vec![i + 1] } else { vec![0] })
            .collect();
        let analysis =
            GraphAnalysis::analyze(&TypeGraph::from_adjacency(adjacency)).expect("analyze");
        assert_eq!(analysis.condensed.components.len(), 1);
        assert_eq!(analysis.cycle_member_count(), n);
    }

    #[test]
    fn test_reachable_from_reverse_graph() {
        // A contains B, B contains C (a reference type). C is reachable
        // from nothing; in the reversed graph C reaches B and A.
        let graph = TypeGraph::from_adjacency(vec![vec![B], vec![C], vec![]]);
        let reached = reachable_from(&graph.reversed(), [C]);
        assert_eq!(reached, vec![true, true, true]);
        let reached = reachable_from(&graph.reversed(), [B]);
        assert_eq!(reached, vec![true, true, false]);
    }
}
