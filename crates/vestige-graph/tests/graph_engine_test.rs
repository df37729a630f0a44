//! Engine behaviour over the in-memory stores.
//!
//! Scenarios:
//! 1. Reversed pairs address the same edge
//! 2. Repeated creates keep the maximum weight
//! 3. Self relations and out-of-range weights are rejected
//! 4. Flag propagation is a one-way OR and tolerates collaborator failure
//! 5. Neighbor listing with and without details
//! 6. Graph building: depth limits, placeholders, spanning tree
//! 7. Cascade removal

use std::sync::Arc;

use vestige_core::{Error, NewRelationship, SourceType};
use vestige_db::{MemoryImageDirectory, MemoryRelationshipStore};
use vestige_graph::RelationshipGraphEngine;

const OWNER: &str = "alice";

struct Fixture {
    store: Arc<MemoryRelationshipStore>,
    images: Arc<MemoryImageDirectory>,
    engine: RelationshipGraphEngine,
}

async fn fixture(image_ids: &[&str]) -> Fixture {
    let store = Arc::new(MemoryRelationshipStore::new());
    let images = Arc::new(MemoryImageDirectory::new());
    for id in image_ids {
        images
            .put_image(OWNER, id, &format!("{}.png", id), false)
            .await;
    }
    let engine = RelationshipGraphEngine::new(store.clone(), images.clone());
    Fixture {
        store,
        images,
        engine,
    }
}

fn relate(a: &str, b: &str, weight: f64) -> NewRelationship {
    NewRelationship::new(OWNER, a, b, SourceType::Similarity).with_weight(weight)
}

#[tokio::test]
async fn test_reversed_pair_is_same_edge() {
    let f = fixture(&["a", "b"]).await;

    let first = f.engine.create_relationship(relate("b", "a", 0.5)).await.unwrap();
    let second = f.engine.create_relationship(relate("a", "b", 0.5)).await.unwrap();

    assert_eq!(first.relationship_id, second.relationship_id);
    assert_eq!(first.endpoint_a, "a");
    assert_eq!(first.endpoint_b, "b");
    assert_eq!(f.store.len().await, 1);
}

#[tokio::test]
async fn test_repeated_creates_keep_max_weight() {
    let f = fixture(&["a", "b"]).await;

    f.engine.create_relationship(relate("a", "b", 0.6)).await.unwrap();
    let lower = f.engine.create_relationship(relate("a", "b", 0.2)).await.unwrap();
    assert_eq!(lower.weight, 0.6);

    let higher = f
        .engine
        .create_relationship(relate("b", "a", 0.8).with_metadata(serde_json::json!({"inliers": 40})))
        .await
        .unwrap();
    assert_eq!(higher.weight, 0.8);
    assert_eq!(higher.metadata, serde_json::json!({"inliers": 40}));
    assert_eq!(f.store.len().await, 1);
}

#[tokio::test]
async fn test_defaults_apply_when_omitted() {
    let f = fixture(&["a", "b"]).await;
    let edge = f
        .engine
        .create_relationship(NewRelationship::new(OWNER, "a", "b", SourceType::Manual))
        .await
        .unwrap();
    assert_eq!(edge.weight, 1.0);
    assert_eq!(edge.created_by, "system");
    assert_eq!(edge.metadata, serde_json::json!({}));
}

#[tokio::test]
async fn test_invalid_requests_rejected() {
    let f = fixture(&["a", "b"]).await;

    assert!(matches!(
        f.engine.create_relationship(relate("a", "a", 0.5)).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        f.engine.create_relationship(relate("a", "b", 1.5)).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        f.engine.create_relationship(relate("a", "b", f64::NAN)).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        f.engine.create_relationship(relate("", "b", 0.5)).await,
        Err(Error::Validation(_))
    ));
    assert!(f.store.is_empty().await);
}

#[tokio::test]
async fn test_flag_spreads_to_related_image() {
    let f = fixture(&["clean"]).await;
    f.images.put_image(OWNER, "suspect", "suspect.png", true).await;

    f.engine
        .create_relationship(relate("clean", "suspect", 0.7))
        .await
        .unwrap();

    assert_eq!(f.images.is_flagged(OWNER, "clean").await, Some(true));
    assert_eq!(f.images.is_flagged(OWNER, "suspect").await, Some(true));
}

#[tokio::test]
async fn test_unflagged_pair_stays_unflagged() {
    let f = fixture(&["a", "b"]).await;
    f.engine.create_relationship(relate("a", "b", 0.7)).await.unwrap();

    assert_eq!(f.images.is_flagged(OWNER, "a").await, Some(false));
    assert_eq!(f.images.is_flagged(OWNER, "b").await, Some(false));
}

#[tokio::test]
async fn test_removal_does_not_unflag() {
    let f = fixture(&["clean"]).await;
    f.images.put_image(OWNER, "suspect", "suspect.png", true).await;
    let edge = f
        .engine
        .create_relationship(relate("clean", "suspect", 0.7))
        .await
        .unwrap();

    assert!(f
        .engine
        .remove_relationship(OWNER, edge.relationship_id)
        .await
        .unwrap());
    assert_eq!(f.images.is_flagged(OWNER, "clean").await, Some(true));
    assert!(!f
        .engine
        .remove_relationship(OWNER, edge.relationship_id)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_collaborator_failure_does_not_fail_create() {
    let f = fixture(&["a", "b"]).await;
    f.images.set_unavailable(true);

    let edge = f.engine.create_relationship(relate("a", "b", 0.4)).await;
    assert!(edge.is_ok());
    assert_eq!(f.store.len().await, 1);
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let f = fixture(&["a", "b"]).await;
    f.store.set_unavailable(true);

    assert!(matches!(
        f.engine.create_relationship(relate("a", "b", 0.4)).await,
        Err(Error::Storage(_))
    ));
    assert!(matches!(
        f.engine.build_graph(OWNER, "a", 2).await,
        Err(Error::Storage(_))
    ));
}

#[tokio::test]
async fn test_neighbors_with_and_without_details() {
    let f = fixture(&["a", "b", "c"]).await;
    f.engine.create_relationship(relate("a", "b", 0.5)).await.unwrap();
    f.engine.create_relationship(relate("c", "a", 0.9)).await.unwrap();

    let plain = f.engine.neighbors(OWNER, "a", false).await.unwrap();
    assert_eq!(plain.len(), 2);
    assert!(plain.iter().all(|v| v.other_image.is_none()));
    let others: Vec<&str> = plain.iter().map(|v| v.other_image_id.as_str()).collect();
    assert_eq!(others, vec!["b", "c"]);

    f.images.remove(OWNER, "c").await;
    let detailed = f.engine.neighbors(OWNER, "a", true).await.unwrap();
    assert_eq!(detailed[0].other_image.as_ref().map(|i| i.label.as_str()), Some("b.png"));
    assert!(detailed[1].other_image.is_none());
}

#[tokio::test]
async fn test_graph_triangle_spanning_tree() {
    let f = fixture(&["A", "B", "C"]).await;
    f.engine.create_relationship(relate("A", "B", 0.5)).await.unwrap();
    f.engine.create_relationship(relate("B", "C", 0.9)).await.unwrap();
    f.engine.create_relationship(relate("A", "C", 0.3)).await.unwrap();

    let graph = f.engine.build_graph(OWNER, "A", 2).await.unwrap();

    assert_eq!(graph.query_image_id, "A");
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 3);
    assert_eq!(graph.nodes[0].id, "A");
    assert!(graph.nodes[0].is_query);
    assert!(graph.nodes[1..].iter().all(|n| !n.is_query));

    assert_eq!(graph.mst_edges.len(), 2);
    assert!((graph.mst_weight() - 1.4).abs() < 1e-9);
    let excluded: Vec<_> = graph.edges.iter().filter(|e| !e.is_mst_edge).collect();
    assert_eq!(excluded.len(), 1);
    assert_eq!((excluded[0].source.as_str(), excluded[0].target.as_str()), ("A", "C"));
}

#[tokio::test]
async fn test_graph_depth_limits() {
    let f = fixture(&["a", "b", "c", "d"]).await;
    f.engine.create_relationship(relate("a", "b", 0.5)).await.unwrap();
    f.engine.create_relationship(relate("b", "c", 0.5)).await.unwrap();
    f.engine.create_relationship(relate("c", "d", 0.5)).await.unwrap();

    let root_only = f.engine.build_graph(OWNER, "a", 0).await.unwrap();
    assert_eq!(root_only.nodes.len(), 1);
    assert!(root_only.edges.is_empty());
    assert!(root_only.mst_edges.is_empty());

    let one_hop = f.engine.build_graph(OWNER, "a", 1).await.unwrap();
    let ids: Vec<&str> = one_hop.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(one_hop.edges.len(), 1);

    let two_hops = f.engine.build_graph(OWNER, "a", 2).await.unwrap();
    assert_eq!(two_hops.nodes.len(), 3);
    assert_eq!(two_hops.edges.len(), 2);

    let everything = f.engine.build_graph(OWNER, "a", 5).await.unwrap();
    assert_eq!(everything.nodes.len(), 4);
    assert_eq!(everything.mst_edges.len(), 3);
}

#[tokio::test]
async fn test_graph_placeholders_for_unresolved_images() {
    let f = fixture(&["root"]).await;
    f.images.put_image(OWNER, "root", "root.png", true).await;
    f.engine
        .create_relationship(relate("root", "img-0042abcdef", 0.5))
        .await
        .unwrap();

    let graph = f.engine.build_graph(OWNER, "root", 1).await.unwrap();
    let root = &graph.nodes[0];
    assert_eq!(root.label, "root.png");
    assert!(root.is_flagged);

    let missing = &graph.nodes[1];
    assert_eq!(missing.label, "Image abcdef");
    assert!(!missing.is_flagged);

    // Collaborator down: every node gets a placeholder, the graph still builds.
    f.images.set_unavailable(true);
    let graph = f.engine.build_graph(OWNER, "root", 1).await.unwrap();
    assert!(graph.nodes.iter().all(|n| n.label.starts_with("Image ")));
    assert!(graph.nodes.iter().all(|n| !n.is_flagged));
}

#[tokio::test]
async fn test_graph_of_isolated_image() {
    let f = fixture(&["lonely"]).await;
    let graph = f.engine.build_graph(OWNER, "lonely", 3).await.unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert!(graph.edges.is_empty());
    assert!(graph.mst_edges.is_empty());
}

#[tokio::test]
async fn test_graph_is_owner_scoped() {
    let f = fixture(&["a", "b"]).await;
    f.engine.create_relationship(relate("a", "b", 0.5)).await.unwrap();

    let graph = f.engine.build_graph("bob", "a", 3).await.unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert!(graph.edges.is_empty());
}

#[tokio::test]
async fn test_cascade_removes_all_edges_of_image() {
    let f = fixture(&["a", "b", "c"]).await;
    f.engine.create_relationship(relate("a", "b", 0.5)).await.unwrap();
    f.engine.create_relationship(relate("a", "c", 0.5)).await.unwrap();
    f.engine.create_relationship(relate("b", "c", 0.5)).await.unwrap();

    assert_eq!(f.engine.cascade_remove_for_endpoint(OWNER, "a").await.unwrap(), 2);
    assert!(f.engine.neighbors(OWNER, "a", false).await.unwrap().is_empty());
    assert_eq!(f.store.len().await, 1);
    assert_eq!(f.engine.cascade_remove_for_endpoint(OWNER, "a").await.unwrap(), 0);
}
