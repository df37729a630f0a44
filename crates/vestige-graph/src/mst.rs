//! Maximum spanning tree over a discovered neighborhood.
//!
//! Prim's algorithm rooted at the first node, maximizing total weight. The
//! candidate set is a binary heap with lazy deletion: stale candidates whose
//! far endpoint was already reached are skipped when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// An undirected weighted edge between two node ids.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedEdge<'a> {
    pub a: &'a str,
    pub b: &'a str,
    pub weight: f64,
}

impl<'a> WeightedEdge<'a> {
    pub fn new(a: &'a str, b: &'a str, weight: f64) -> Self {
        Self { a, b, weight }
    }
}

/// Heap entry for an edge leaving the tree.
#[derive(Debug)]
struct Candidate {
    weight: f64,
    /// Push order; earlier candidates win ties.
    seq: u64,
    edge: usize,
    to: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.weight
            .total_cmp(&other.weight)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Select the edges of a maximum spanning tree.
///
/// Returns indices into `edges` in the order Prim's algorithm selected them.
/// The tree is grown from `nodes[0]`; nodes not reachable from it are left
/// out. Edges with an endpoint outside `nodes`, and self loops, are ignored.
/// With equal weights the candidate pushed first wins, so the result is
/// deterministic for a given input order.
pub fn maximum_spanning_tree(nodes: &[&str], edges: &[WeightedEdge<'_>]) -> Vec<usize> {
    if nodes.is_empty() || edges.is_empty() {
        return Vec::new();
    }

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
    for (i, id) in nodes.iter().enumerate() {
        index.entry(*id).or_insert(i);
    }

    // node -> (edge index, far node)
    let mut adjacency: Vec<Vec<(usize, usize)>> = vec![Vec::new(); nodes.len()];
    for (i, edge) in edges.iter().enumerate() {
        let (Some(&a), Some(&b)) = (index.get(edge.a), index.get(edge.b)) else {
            continue;
        };
        if a == b {
            continue;
        }
        adjacency[a].push((i, b));
        adjacency[b].push((i, a));
    }

    let mut visited = vec![false; nodes.len()];
    let mut heap = BinaryHeap::new();
    let mut seq = 0u64;
    let mut selected = Vec::with_capacity(nodes.len().saturating_sub(1));

    let mut reach = |node: usize,
                     visited: &mut Vec<bool>,
                     heap: &mut BinaryHeap<Candidate>| {
        visited[node] = true;
        for &(edge, to) in &adjacency[node] {
            if !visited[to] {
                heap.push(Candidate {
                    weight: edges[edge].weight,
                    seq,
                    edge,
                    to,
                });
                seq += 1;
            }
        }
    };

    reach(0, &mut visited, &mut heap);
    while let Some(candidate) = heap.pop() {
        if visited[candidate.to] {
            continue;
        }
        selected.push(candidate.edge);
        reach(candidate.to, &mut visited, &mut heap);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(edges: &[WeightedEdge<'_>], picked: &[usize]) -> f64 {
        picked.iter().map(|&i| edges[i].weight).sum()
    }

    #[test]
    fn test_empty_inputs() {
        assert!(maximum_spanning_tree(&[], &[WeightedEdge::new("a", "b", 1.0)]).is_empty());
        assert!(maximum_spanning_tree(&["a", "b"], &[]).is_empty());
    }

    #[test]
    fn test_triangle_keeps_two_heaviest() {
        let edges = [
            WeightedEdge::new("A", "B", 0.5),
            WeightedEdge::new("B", "C", 0.9),
            WeightedEdge::new("A", "C", 0.3),
        ];
        let picked = maximum_spanning_tree(&["A", "B", "C"], &edges);

        assert_eq!(picked, vec![0, 1]);
        assert!((total(&edges, &picked) - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_disconnected_remainder_excluded() {
        let edges = [
            WeightedEdge::new("a", "b", 0.4),
            WeightedEdge::new("c", "d", 0.9),
        ];
        let picked = maximum_spanning_tree(&["a", "b", "c", "d"], &edges);
        assert_eq!(picked, vec![0]);
    }

    #[test]
    fn test_ties_prefer_first_encountered() {
        let edges = [
            WeightedEdge::new("r", "x", 0.5),
            WeightedEdge::new("r", "y", 0.5),
            WeightedEdge::new("x", "y", 0.5),
        ];
        let picked = maximum_spanning_tree(&["r", "x", "y"], &edges);
        assert_eq!(picked, vec![0, 1]);

        // Stable across calls.
        assert_eq!(maximum_spanning_tree(&["r", "x", "y"], &edges), picked);
    }

    #[test]
    fn test_unknown_endpoints_and_self_loops_ignored() {
        let edges = [
            WeightedEdge::new("a", "ghost", 1.0),
            WeightedEdge::new("a", "a", 1.0),
            WeightedEdge::new("a", "b", 0.1),
        ];
        assert_eq!(maximum_spanning_tree(&["a", "b"], &edges), vec![2]);
    }

    #[test]
    fn test_tree_has_one_less_edge_than_reached_nodes() {
        let edges = [
            WeightedEdge::new("a", "b", 0.2),
            WeightedEdge::new("b", "c", 0.2),
            WeightedEdge::new("c", "d", 0.2),
            WeightedEdge::new("d", "a", 0.2),
            WeightedEdge::new("a", "c", 0.2),
        ];
        let picked = maximum_spanning_tree(&["a", "b", "c", "d"], &edges);
        assert_eq!(picked.len(), 3);
    }

    // Deterministic linear congruential generator for the optimality check.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self
                .0
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    fn find(parent: &mut [usize], x: usize) -> usize {
        let mut x = x;
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    /// Best spanning tree weight by exhaustive search, or `None` if the graph
    /// is disconnected.
    fn brute_force(node_count: usize, pairs: &[(usize, usize, f64)]) -> Option<f64> {
        let mut best: Option<f64> = None;
        for mask in 0u32..(1 << pairs.len()) {
            if mask.count_ones() as usize != node_count - 1 {
                continue;
            }
            let mut parent: Vec<usize> = (0..node_count).collect();
            let mut weight = 0.0;
            let mut acyclic = true;
            for (i, &(a, b, w)) in pairs.iter().enumerate() {
                if mask & (1 << i) == 0 {
                    continue;
                }
                let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
                if ra == rb {
                    acyclic = false;
                    break;
                }
                parent[ra] = rb;
                weight += w;
            }
            if acyclic {
                best = Some(best.map_or(weight, |b: f64| b.max(weight)));
            }
        }
        best
    }

    #[test]
    fn test_matches_exhaustive_search_on_small_graphs() {
        let names = ["n0", "n1", "n2", "n3", "n4"];
        let mut rng = Lcg(42);

        for _ in 0..200 {
            let node_count = 2 + (rng.next() % 4) as usize;
            let mut pairs = Vec::new();
            for a in 0..node_count {
                for b in (a + 1)..node_count {
                    if rng.next() % 3 != 0 {
                        let w = (rng.next() % 11) as f64 / 10.0;
                        pairs.push((a, b, w));
                    }
                }
            }

            let nodes = &names[..node_count];
            let edges: Vec<WeightedEdge<'_>> = pairs
                .iter()
                .map(|&(a, b, w)| WeightedEdge::new(names[a], names[b], w))
                .collect();
            let picked = maximum_spanning_tree(nodes, &edges);

            match brute_force(node_count, &pairs) {
                Some(best) => {
                    assert_eq!(picked.len(), node_count - 1);
                    assert!((total(&edges, &picked) - best).abs() < 1e-9);
                }
                None => assert!(picked.len() < node_count - 1),
            }
        }
    }
}
