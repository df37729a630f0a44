//! Relationship graph engine.
//!
//! Owns the write rules for relationship edges (canonical pairs, weights that
//! only rise, flag propagation between related images) and assembles graph
//! views from stored edges and the image collaborator.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use vestige_core::{
    canonical_pair, defaults, new_v7, placeholder_label, Error, GraphEdge, GraphNode, GraphView,
    ImageDirectory, ImageSummary, NewRelationship, RelationshipEdge, RelationshipStore,
    RelationshipView, Result,
};

use crate::mst::{maximum_spanning_tree, WeightedEdge};
use crate::traversal::breadth_first;

/// Relationship graph operations over a store and an image collaborator.
#[derive(Clone)]
pub struct RelationshipGraphEngine {
    relationships: Arc<dyn RelationshipStore>,
    images: Arc<dyn ImageDirectory>,
}

impl RelationshipGraphEngine {
    pub fn new(relationships: Arc<dyn RelationshipStore>, images: Arc<dyn ImageDirectory>) -> Self {
        Self {
            relationships,
            images,
        }
    }

    /// Record an association between two images, or strengthen an existing one.
    ///
    /// Endpoint order does not matter. If the pair already exists, its weight
    /// is replaced only by a strictly greater weight and the stored edge is
    /// returned. On every call, if either image is flagged both become
    /// flagged; collaborator failures there are logged and do not fail the
    /// call.
    pub async fn create_relationship(&self, request: NewRelationship) -> Result<RelationshipEdge> {
        if request.owner_id.is_empty() {
            return Err(Error::Validation("owner_id must not be empty".to_string()));
        }
        if request.endpoint_a.is_empty() || request.endpoint_b.is_empty() {
            return Err(Error::Validation("image ids must not be empty".to_string()));
        }
        if request.endpoint_a == request.endpoint_b {
            return Err(Error::Validation(
                "an image cannot be related to itself".to_string(),
            ));
        }
        let weight = request.validated_weight()?;
        let owner_id = request.owner_id.as_str();
        let (a, b) = canonical_pair(&request.endpoint_a, &request.endpoint_b);

        let edge = match self.relationships.find_by_pair(owner_id, a, b).await? {
            Some(existing) => {
                self.raise_weight(existing, weight, request.metadata.clone())
                    .await?
            }
            None => {
                let candidate = RelationshipEdge {
                    relationship_id: new_v7(),
                    owner_id: owner_id.to_string(),
                    endpoint_a: a.to_string(),
                    endpoint_b: b.to_string(),
                    source_type: request.source_type,
                    source_analysis_id: request.source_analysis_id.clone(),
                    weight,
                    metadata: request.metadata.clone().unwrap_or_else(|| json!({})),
                    created_at: Utc::now(),
                    created_by: request
                        .created_by
                        .clone()
                        .unwrap_or_else(|| defaults::RELATIONSHIP_CREATED_BY.to_string()),
                };
                let candidate_id = candidate.relationship_id;
                let stored = self.relationships.insert(candidate).await?;
                if stored.relationship_id == candidate_id {
                    info!(
                        subsystem = "graph",
                        component = "engine",
                        op = "create_relationship",
                        owner_id,
                        relationship_id = %stored.relationship_id,
                        source_type = %stored.source_type,
                        weight,
                        "Relationship created"
                    );
                    stored
                } else {
                    // Lost an insert race; the winner's edge stands, raised if we are heavier.
                    self.raise_weight(stored, weight, request.metadata.clone())
                        .await?
                }
            }
        };

        self.propagate_flags(owner_id, a, b).await;
        Ok(edge)
    }

    async fn raise_weight(
        &self,
        existing: RelationshipEdge,
        weight: f64,
        metadata: Option<serde_json::Value>,
    ) -> Result<RelationshipEdge> {
        if weight <= existing.weight {
            debug!(
                subsystem = "graph",
                component = "engine",
                op = "create_relationship",
                relationship_id = %existing.relationship_id,
                stored_weight = existing.weight,
                weight,
                "Existing relationship kept"
            );
            return Ok(existing);
        }

        match self
            .relationships
            .update_weight(&existing.owner_id, existing.relationship_id, weight, metadata)
            .await?
        {
            Some(updated) => {
                info!(
                    subsystem = "graph",
                    component = "engine",
                    op = "create_relationship",
                    relationship_id = %updated.relationship_id,
                    previous_weight = existing.weight,
                    weight,
                    "Relationship weight raised"
                );
                Ok(updated)
            }
            // Raised concurrently to at least this weight, or removed.
            None => Ok(self
                .relationships
                .find_by_id(&existing.owner_id, existing.relationship_id)
                .await?
                .unwrap_or(existing)),
        }
    }

    /// One-way OR of the flag across a related pair.
    async fn propagate_flags(&self, owner_id: &str, a: &str, b: &str) {
        let (first, second) = futures::join!(
            self.images.lookup(owner_id, a),
            self.images.lookup(owner_id, b)
        );
        let (first, second) = match (first, second) {
            (Ok(first), Ok(second)) => (first, second),
            (Err(e), _) | (_, Err(e)) => {
                warn!(
                    subsystem = "graph",
                    component = "engine",
                    op = "propagate_flags",
                    owner_id,
                    error = %e,
                    "Image lookup failed, flags not propagated"
                );
                return;
            }
        };

        let flagged = |s: &Option<ImageSummary>| s.as_ref().is_some_and(|s| s.is_flagged);
        // Nothing to do when neither or both are flagged.
        if flagged(&first) == flagged(&second) {
            return;
        }

        match self
            .images
            .set_flagged(owner_id, &[a.to_string(), b.to_string()])
            .await
        {
            Ok(changed) => debug!(
                subsystem = "graph",
                component = "engine",
                op = "propagate_flags",
                owner_id,
                changed,
                "Flag propagated"
            ),
            Err(e) => warn!(
                subsystem = "graph",
                component = "engine",
                op = "propagate_flags",
                owner_id,
                error = %e,
                "Setting image flags failed"
            ),
        }
    }

    /// Delete one edge. Image flags are left as they are.
    pub async fn remove_relationship(&self, owner_id: &str, relationship_id: Uuid) -> Result<bool> {
        let removed = self.relationships.delete(owner_id, relationship_id).await?;
        if removed {
            info!(
                subsystem = "graph",
                component = "engine",
                op = "remove_relationship",
                owner_id,
                relationship_id = %relationship_id,
                "Relationship removed"
            );
        }
        Ok(removed)
    }

    /// Delete every edge touching an image, returning how many were removed.
    pub async fn cascade_remove_for_endpoint(&self, owner_id: &str, image_id: &str) -> Result<u64> {
        let removed = self
            .relationships
            .delete_all_for_endpoint(owner_id, image_id)
            .await?;
        info!(
            subsystem = "graph",
            component = "engine",
            op = "cascade_remove",
            owner_id,
            image_id,
            result_count = removed,
            "Relationships removed for image"
        );
        Ok(removed)
    }

    /// Edges of one image, seen from that image.
    ///
    /// With `include_details`, each view carries a summary of the opposite
    /// image; an image the collaborator cannot resolve gets `None`.
    pub async fn neighbors(
        &self,
        owner_id: &str,
        image_id: &str,
        include_details: bool,
    ) -> Result<Vec<RelationshipView>> {
        let edges = self
            .relationships
            .find_all_for_endpoint(owner_id, image_id)
            .await?;

        let mut views: Vec<RelationshipView> = edges
            .into_iter()
            .map(|edge| {
                let other_image_id = edge
                    .other_endpoint(image_id)
                    .unwrap_or(edge.endpoint_b.as_str())
                    .to_string();
                RelationshipView {
                    relationship: edge,
                    other_image_id,
                    other_image: None,
                }
            })
            .collect();

        if include_details {
            let lookups = views
                .iter()
                .map(|v| self.images.lookup(owner_id, &v.other_image_id));
            let summaries = join_all(lookups).await;
            for (view, summary) in views.iter_mut().zip(summaries) {
                view.other_image = self.resolved(summary, &view.other_image_id);
            }
        }

        Ok(views)
    }

    fn resolved(&self, lookup: Result<Option<ImageSummary>>, image_id: &str) -> Option<ImageSummary> {
        match lookup {
            Ok(summary) => summary,
            Err(e) => {
                warn!(
                    subsystem = "graph",
                    component = "engine",
                    image_id,
                    error = %e,
                    "Image lookup failed"
                );
                None
            }
        }
    }

    /// Neighborhood of `root_id` up to `max_depth` hops, with its maximum
    /// spanning tree marked.
    pub async fn build_graph(
        &self,
        owner_id: &str,
        root_id: &str,
        max_depth: i32,
    ) -> Result<GraphView> {
        if root_id.is_empty() {
            return Err(Error::Validation("image id must not be empty".to_string()));
        }
        let start = Instant::now();
        let neighborhood =
            breadth_first(self.relationships.as_ref(), owner_id, root_id, max_depth).await?;

        let lookups = neighborhood
            .nodes
            .iter()
            .map(|id| self.images.lookup(owner_id, id));
        let summaries = join_all(lookups).await;
        let nodes: Vec<GraphNode> = neighborhood
            .nodes
            .iter()
            .zip(summaries)
            .map(|(id, summary)| {
                let (label, is_flagged) = match self.resolved(summary, id) {
                    Some(s) => (s.label, s.is_flagged),
                    None => (placeholder_label(id), false),
                };
                GraphNode {
                    id: id.clone(),
                    label,
                    is_flagged,
                    is_query: id == root_id,
                }
            })
            .collect();

        let node_ids: Vec<&str> = neighborhood.nodes.iter().map(String::as_str).collect();
        let weighted: Vec<WeightedEdge<'_>> = neighborhood
            .edges
            .iter()
            .map(|e| WeightedEdge::new(&e.endpoint_a, &e.endpoint_b, e.weight))
            .collect();
        let picked = maximum_spanning_tree(&node_ids, &weighted);
        let in_tree: HashSet<usize> = picked.iter().copied().collect();

        let edges: Vec<GraphEdge> = neighborhood
            .edges
            .iter()
            .enumerate()
            .map(|(i, e)| GraphEdge {
                source: e.endpoint_a.clone(),
                target: e.endpoint_b.clone(),
                weight: e.weight,
                source_type: e.source_type,
                is_mst_edge: in_tree.contains(&i),
            })
            .collect();
        let mst_edges: Vec<GraphEdge> = picked.iter().map(|&i| edges[i].clone()).collect();

        info!(
            subsystem = "graph",
            component = "engine",
            op = "build_graph",
            owner_id,
            image_id = root_id,
            max_depth,
            node_count = nodes.len(),
            edge_count = edges.len(),
            mst_edge_count = mst_edges.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Graph built"
        );

        Ok(GraphView {
            query_image_id: root_id.to_string(),
            nodes,
            edges,
            mst_edges,
        })
    }
}
