//! # vestige-graph
//!
//! Relationship graph engine for vestige.
//!
//! Images of one owner are linked by undirected weighted edges. This crate
//! enforces the write rules for those edges and derives neighborhood views
//! on demand:
//!
//! - [`engine::RelationshipGraphEngine`]: create, remove, list and graph
//! - [`traversal::breadth_first`]: depth-limited BFS over stored edges
//! - [`mst::maximum_spanning_tree`]: Prim's algorithm, weight maximizing

pub mod engine;
pub mod mst;
pub mod traversal;

pub use engine::RelationshipGraphEngine;
pub use mst::{maximum_spanning_tree, WeightedEdge};
pub use traversal::{breadth_first, Neighborhood};
