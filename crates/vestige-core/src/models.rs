//! Core data models for vestige.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// JOB TYPES
// =============================================================================

/// Kind of asynchronous analysis a job record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Image manipulation localization.
    Trufor,
    /// Copy-move detection within one image.
    CopyMoveSingle,
    /// Copy-move detection across a pair of images.
    CopyMoveCross,
    /// Split a figure into its panels.
    PanelExtraction,
    /// Provenance graph reconstruction.
    Provenance,
    WatermarkRemoval,
    /// Add images to the content-based retrieval index.
    CbirIndex,
    /// Query the content-based retrieval index.
    CbirSearch,
    /// Pull embedded images out of an uploaded document.
    ImageExtraction,
}

impl JobType {
    pub const ALL: [JobType; 9] = [
        JobType::Trufor,
        JobType::CopyMoveSingle,
        JobType::CopyMoveCross,
        JobType::PanelExtraction,
        JobType::Provenance,
        JobType::WatermarkRemoval,
        JobType::CbirIndex,
        JobType::CbirSearch,
        JobType::ImageExtraction,
    ];

    /// Storage and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::Trufor => "trufor",
            JobType::CopyMoveSingle => "copy_move_single",
            JobType::CopyMoveCross => "copy_move_cross",
            JobType::PanelExtraction => "panel_extraction",
            JobType::Provenance => "provenance",
            JobType::WatermarkRemoval => "watermark_removal",
            JobType::CbirIndex => "cbir_index",
            JobType::CbirSearch => "cbir_search",
            JobType::ImageExtraction => "image_extraction",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown job type '{}'", s)))
    }
}

/// Job lifecycle status.
///
/// The only forward path is `Pending -> Processing -> {Completed | Partial | Failed}`,
/// with `Pending` allowed to jump straight to a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    /// Finished with some sub-items failed.
    Partial,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Partial,
        JobStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed
        )
    }

    /// Status line written alongside a terminal transition.
    pub fn terminal_message(self) -> Option<&'static str> {
        match self {
            JobStatus::Completed => Some(defaults::MESSAGE_COMPLETED),
            JobStatus::Partial => Some(defaults::MESSAGE_PARTIAL),
            JobStatus::Failed => Some(defaults::MESSAGE_FAILED),
            JobStatus::Pending | JobStatus::Processing => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown job status '{}'", s)))
    }
}

/// Clamp a reported progress value into the valid percent range.
pub fn clamp_progress(percent: i32) -> i32 {
    percent.clamp(defaults::PROGRESS_MIN, defaults::PROGRESS_MAX)
}

// =============================================================================
// JOB RECORDS
// =============================================================================

/// Durable record of one asynchronous unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub owner_id: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub progress_percent: i32,
    pub title: String,
    /// Latest human readable status line.
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub input_data: Option<JsonValue>,
    #[schema(value_type = Option<Object>)]
    pub output_data: Option<JsonValue>,
    pub errors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl JobRecord {
    /// Whether the record is past its retention window at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Input for registering a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: String,
    pub job_type: JobType,
    pub title: String,
    pub input_data: Option<JsonValue>,
    /// Readable lifetime counted from creation.
    pub retention: Duration,
}

/// Partial update applied atomically to a non-terminal job.
///
/// `None` fields are left untouched. A terminal `status` makes this the
/// record's single terminal write: `completed_at` is set and expiry is
/// re-based to `completed_at + retention`.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    /// Written as `max(current, value)`.
    pub progress_percent: Option<i32>,
    pub message: Option<String>,
    pub output_data: Option<JsonValue>,
    pub errors: Option<Vec<String>>,
    pub retention: Option<Duration>,
}

impl JobUpdate {
    pub fn is_terminal(&self) -> bool {
        self.status.is_some_and(JobStatus::is_terminal)
    }
}

/// Outcome of a conditional job update.
#[derive(Debug, Clone, PartialEq)]
pub enum JobWrite {
    /// The update was written; carries the record after the write.
    Applied(JobRecord),
    /// The record was already terminal; nothing was written.
    Terminal(JobRecord),
}

/// Filter and page for listing an owner's jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct JobListQuery {
    pub job_type: Option<JobType>,
    pub status: Option<JobStatus>,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl Default for JobListQuery {
    fn default() -> Self {
        Self {
            job_type: None,
            status: None,
            page: 1,
            per_page: defaults::PAGE_SIZE,
        }
    }
}

impl JobListQuery {
    pub fn validate(&self) -> Result<()> {
        if self.page < 1 {
            return Err(Error::Validation("page must be at least 1".to_string()));
        }
        if self.per_page < 1 || self.per_page > defaults::PAGE_SIZE_MAX {
            return Err(Error::Validation(format!(
                "per_page must be between 1 and {}",
                defaults::PAGE_SIZE_MAX
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.per_page)
    }

    /// Whether a record passes the type and status filters.
    pub fn matches(&self, job: &JobRecord) -> bool {
        self.job_type.map_or(true, |t| t == job.job_type)
            && self.status.map_or(true, |s| s == job.status)
    }
}

/// Per-owner job counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct JobStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub partial: i64,
    pub failed: i64,
    pub by_type: BTreeMap<String, i64>,
}

impl JobStats {
    /// Add `count` jobs with the given status and type.
    pub fn record(&mut self, status: JobStatus, job_type: JobType, count: i64) {
        self.total += count;
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Partial => self.partial += count,
            JobStatus::Failed => self.failed += count,
        }
        *self.by_type.entry(job_type.as_str().to_string()).or_insert(0) += count;
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

/// Origin of a recorded association between two images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[default]
    Manual,
    Provenance,
    CrossCopyMove,
    Similarity,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Manual => "manual",
            SourceType::Provenance => "provenance",
            SourceType::CrossCopyMove => "cross_copy_move",
            SourceType::Similarity => "similarity",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(SourceType::Manual),
            "provenance" => Ok(SourceType::Provenance),
            "cross_copy_move" => Ok(SourceType::CrossCopyMove),
            "similarity" => Ok(SourceType::Similarity),
            other => Err(Error::Validation(format!(
                "unknown relationship source type '{}'",
                other
            ))),
        }
    }
}

/// Sort two endpoint ids into canonical `(smaller, larger)` order.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Undirected weighted association between two images of one owner.
///
/// `endpoint_a < endpoint_b` always holds for stored edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RelationshipEdge {
    pub relationship_id: Uuid,
    pub owner_id: String,
    pub endpoint_a: String,
    pub endpoint_b: String,
    pub source_type: SourceType,
    pub source_analysis_id: Option<String>,
    pub weight: f64,
    #[schema(value_type = Object)]
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl RelationshipEdge {
    /// The endpoint opposite `id`, or `None` if `id` is not on this edge.
    pub fn other_endpoint(&self, id: &str) -> Option<&str> {
        if self.endpoint_a == id {
            Some(&self.endpoint_b)
        } else if self.endpoint_b == id {
            Some(&self.endpoint_a)
        } else {
            None
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.endpoint_a == id || self.endpoint_b == id
    }
}

/// Request to record an association between two images.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub owner_id: String,
    pub endpoint_a: String,
    pub endpoint_b: String,
    pub source_type: SourceType,
    pub source_analysis_id: Option<String>,
    /// Defaults to [`defaults::RELATIONSHIP_WEIGHT`].
    pub weight: Option<f64>,
    pub metadata: Option<JsonValue>,
    /// Defaults to [`defaults::RELATIONSHIP_CREATED_BY`].
    pub created_by: Option<String>,
}

impl NewRelationship {
    pub fn new(
        owner_id: impl Into<String>,
        endpoint_a: impl Into<String>,
        endpoint_b: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            endpoint_a: endpoint_a.into(),
            endpoint_b: endpoint_b.into(),
            source_type,
            source_analysis_id: None,
            weight: None,
            metadata: None,
            created_by: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_source_analysis(mut self, analysis_id: impl Into<String>) -> Self {
        self.source_analysis_id = Some(analysis_id.into());
        self
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = Some(created_by.into());
        self
    }

    /// Effective weight after validation.
    pub fn validated_weight(&self) -> Result<f64> {
        let weight = self.weight.unwrap_or(defaults::RELATIONSHIP_WEIGHT);
        if weight.is_nan() || !(0.0..=1.0).contains(&weight) {
            return Err(Error::Validation(format!(
                "weight must be within [0, 1], got {}",
                weight
            )));
        }
        Ok(weight)
    }
}

// =============================================================================
// IMAGE COLLABORATOR VIEW
// =============================================================================

/// What the graph needs to know about an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImageSummary {
    pub id: String,
    /// Display label, normally the original filename.
    pub label: String,
    pub is_flagged: bool,
    /// Size in bytes, when known.
    pub size: Option<i64>,
}

/// One relationship of an image, seen from that image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RelationshipView {
    #[serde(flatten)]
    pub relationship: RelationshipEdge,
    pub other_image_id: String,
    /// Summary of the opposite endpoint. `null` when details were not
    /// requested or the image could not be resolved.
    pub other_image: Option<ImageSummary>,
}

// =============================================================================
// GRAPH VIEW
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub is_flagged: bool,
    /// True only for the root of the traversal.
    pub is_query: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GraphEdge {
    /// Smaller endpoint id.
    pub source: String,
    /// Larger endpoint id.
    pub target: String,
    pub weight: f64,
    pub source_type: SourceType,
    pub is_mst_edge: bool,
}

/// Neighborhood of one image, derived on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GraphView {
    pub query_image_id: String,
    /// Nodes in BFS visit order; the root is first.
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    /// Edges chosen by the maximum spanning tree, in selection order.
    pub mst_edges: Vec<GraphEdge>,
}

impl GraphView {
    /// Sum of the maximum spanning tree edge weights.
    pub fn mst_weight(&self) -> f64 {
        self.mst_edges.iter().map(|e| e.weight).sum()
    }
}

/// Label shown for an image the collaborator could not resolve.
pub fn placeholder_label(image_id: &str) -> String {
    let count = image_id.chars().count();
    let suffix: String = image_id
        .chars()
        .skip(count.saturating_sub(defaults::PLACEHOLDER_LABEL_SUFFIX_LEN))
        .collect();
    format!("Image {}", suffix)
}
