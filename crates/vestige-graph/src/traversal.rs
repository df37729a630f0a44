//! Breadth-first neighborhood discovery over stored relationships.

use std::collections::{HashSet, VecDeque};

use tracing::trace;
use vestige_core::{RelationshipEdge, RelationshipStore, Result};

/// Nodes and edges reached from a root image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighborhood {
    /// Node ids in visit order; the root is first.
    pub nodes: Vec<String>,
    /// Distinct edges in discovery order.
    pub edges: Vec<RelationshipEdge>,
}

/// Walk the relationship graph from `root_id` up to `max_depth` hops.
///
/// A node is visited once, at the depth it is first dequeued. Only nodes at
/// `depth < max_depth` are expanded, so `max_depth <= 0` yields the root
/// alone and no edges. An edge reached from both of its endpoints is kept
/// once. Storage errors abort the walk.
pub async fn breadth_first(
    store: &dyn RelationshipStore,
    owner_id: &str,
    root_id: &str,
    max_depth: i32,
) -> Result<Neighborhood> {
    let mut neighborhood = Neighborhood::default();
    let mut visited: HashSet<String> = HashSet::new();
    let mut seen_pairs: HashSet<(String, String)> = HashSet::new();
    let mut queue: VecDeque<(String, i32)> = VecDeque::new();
    queue.push_back((root_id.to_string(), 0));

    while let Some((node, depth)) = queue.pop_front() {
        if !visited.insert(node.clone()) {
            continue;
        }
        trace!(
            subsystem = "graph",
            component = "traversal",
            image_id = %node,
            depth,
            "Visit"
        );
        neighborhood.nodes.push(node.clone());

        if depth >= max_depth {
            continue;
        }

        for edge in store.find_all_for_endpoint(owner_id, &node).await? {
            let Some(other) = edge.other_endpoint(&node).map(str::to_string) else {
                continue;
            };
            if !visited.contains(&other) {
                queue.push_back((other, depth + 1));
            }
            let pair = (edge.endpoint_a.clone(), edge.endpoint_b.clone());
            if seen_pairs.insert(pair) {
                neighborhood.edges.push(edge);
            }
        }
    }

    Ok(neighborhood)
}
