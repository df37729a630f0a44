//! Core traits for vestige abstractions.
//!
//! Stores are implemented in `vestige-db` for PostgreSQL and in memory.
//! Every query is scoped by `owner_id`; a record owned by someone else is
//! indistinguishable from one that does not exist.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::events::JobEvent;
use crate::models::*;

// =============================================================================
// JOB STORE
// =============================================================================

/// Durable persistence for job records with time-based expiry.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new PENDING record.
    ///
    /// Fails with `Validation` when the owner id is empty.
    async fn insert(&self, job: NewJob) -> Result<JobRecord>;

    /// Apply a partial update to a non-terminal job in one atomic step.
    ///
    /// Returns [`JobWrite::Terminal`] without writing when the job has already
    /// reached a terminal status, and `NotFound` when it is unknown, expired,
    /// or not owned by `owner_id`.
    async fn update(&self, owner_id: &str, job_id: Uuid, update: JobUpdate) -> Result<JobWrite>;

    /// Fetch one unexpired job.
    async fn find(&self, owner_id: &str, job_id: Uuid) -> Result<JobRecord>;

    /// Page through an owner's unexpired jobs, newest first.
    ///
    /// Returns the page plus the total number of matching records.
    async fn list(&self, owner_id: &str, query: &JobListQuery) -> Result<(Vec<JobRecord>, i64)>;

    /// Count an owner's unexpired jobs by status and type.
    async fn stats(&self, owner_id: &str) -> Result<JobStats>;

    /// Physically delete every expired record. Returns the number removed.
    async fn purge_expired(&self) -> Result<u64>;
}

// =============================================================================
// RELATIONSHIP STORE
// =============================================================================

/// Durable persistence for canonical-pair relationship edges.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    /// Look up the edge between two endpoints, in either order.
    async fn find_by_pair(
        &self,
        owner_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Option<RelationshipEdge>>;

    async fn find_by_id(&self, owner_id: &str, id: Uuid) -> Result<Option<RelationshipEdge>>;

    /// Insert a canonical edge.
    ///
    /// If an edge for the same owner and pair already exists, nothing is
    /// written and the stored edge is returned instead.
    async fn insert(&self, edge: RelationshipEdge) -> Result<RelationshipEdge>;

    /// Raise the weight of an edge to `weight` if that is strictly greater.
    ///
    /// `metadata` replaces the stored metadata only when the raise happens.
    /// Returns the updated edge, or `None` if no row was raised.
    async fn update_weight(
        &self,
        owner_id: &str,
        id: Uuid,
        weight: f64,
        metadata: Option<JsonValue>,
    ) -> Result<Option<RelationshipEdge>>;

    /// Remove one edge. Returns whether it existed.
    async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool>;

    /// Remove every edge touching `endpoint_id`. Returns the number removed.
    async fn delete_all_for_endpoint(&self, owner_id: &str, endpoint_id: &str) -> Result<u64>;

    /// Every edge touching `endpoint_id`, oldest first.
    async fn find_all_for_endpoint(
        &self,
        owner_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<RelationshipEdge>>;
}

// =============================================================================
// IMAGE COLLABORATOR
// =============================================================================

/// Read access to the image records owned by the surrounding product.
#[async_trait]
pub trait ImageDirectory: Send + Sync {
    /// `Ok(None)` when the image does not exist for this owner.
    /// `Err(CollaboratorUnavailable)` when the lookup itself failed.
    async fn lookup(&self, owner_id: &str, image_id: &str) -> Result<Option<ImageSummary>>;

    /// Mark images as flagged. Returns the number of images changed.
    async fn set_flagged(&self, owner_id: &str, image_ids: &[String]) -> Result<u64>;
}

// =============================================================================
// EVENT PUBLISHING
// =============================================================================

/// Sink for job lifecycle events.
///
/// Publishing never blocks and never fails to the caller; an event with no
/// live subscriber is discarded.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, owner_id: &str, event: JobEvent);
}
