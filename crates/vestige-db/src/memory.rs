//! In-memory store and collaborator implementations.
//!
//! Same semantics as the PostgreSQL stores, without a database. Used by unit
//! and API tests and by embedders that do not need durability. Each store can
//! be switched into an unavailable mode to exercise failure paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use vestige_core::{
    canonical_pair, clamp_progress, defaults, new_v7, Error, ImageDirectory, ImageSummary,
    JobListQuery, JobRecord, JobStats, JobStatus, JobStore, JobUpdate, JobWrite, NewJob,
    RelationshipEdge, RelationshipStore, Result,
};

fn unavailable(store: &str) -> Error {
    Error::Storage(format!("{} store unavailable", store))
}

// =============================================================================
// JOBS
// =============================================================================

/// Apply a partial update to a non-terminal record in place.
fn apply_update(job: &mut JobRecord, update: &JobUpdate, now: DateTime<Utc>) {
    if let Some(status) = update.status {
        if status == JobStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if status.is_terminal() {
            job.completed_at = Some(now);
            if let Some(retention) = update.retention {
                job.expires_at = now + retention.max(Duration::zero());
            }
        }
        job.status = status;
    }
    if let Some(percent) = update.progress_percent {
        job.progress_percent = job.progress_percent.max(clamp_progress(percent));
    }
    if let Some(message) = &update.message {
        job.message = message.clone();
    }
    if let Some(output) = &update.output_data {
        job.output_data = Some(output.clone());
    }
    if let Some(errors) = &update.errors {
        job.errors = errors.clone();
    }
    job.updated_at = now;
}

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a storage error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Records currently held, expired ones included.
    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(unavailable("job"))
        } else {
            Ok(())
        }
    }

    fn visible<'a>(
        job: Option<&'a JobRecord>,
        owner_id: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a JobRecord> {
        job.filter(|j| j.owner_id == owner_id && !j.is_expired_at(now))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        self.check()?;
        if job.owner_id.is_empty() {
            return Err(Error::Validation("owner id must not be empty".to_string()));
        }
        let now = Utc::now();
        let record = JobRecord {
            job_id: new_v7(),
            owner_id: job.owner_id,
            job_type: job.job_type,
            status: JobStatus::Pending,
            progress_percent: 0,
            title: job.title,
            message: defaults::MESSAGE_QUEUED.to_string(),
            input_data: job.input_data,
            output_data: None,
            errors: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            expires_at: now + job.retention.max(Duration::zero()),
        };
        self.jobs
            .write()
            .await
            .insert(record.job_id, record.clone());
        Ok(record)
    }

    async fn update(&self, owner_id: &str, job_id: Uuid, update: JobUpdate) -> Result<JobWrite> {
        self.check()?;
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .filter(|j| j.owner_id == owner_id && !j.is_expired_at(now))
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))?;

        if job.status.is_terminal() {
            return Ok(JobWrite::Terminal(job.clone()));
        }
        apply_update(job, &update, now);
        Ok(JobWrite::Applied(job.clone()))
    }

    async fn find(&self, owner_id: &str, job_id: Uuid) -> Result<JobRecord> {
        self.check()?;
        let jobs = self.jobs.read().await;
        Self::visible(jobs.get(&job_id), owner_id, Utc::now())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {}", job_id)))
    }

    async fn list(&self, owner_id: &str, query: &JobListQuery) -> Result<(Vec<JobRecord>, i64)> {
        self.check()?;
        query.validate()?;
        let now = Utc::now();
        let jobs = self.jobs.read().await;
        let mut matching: Vec<&JobRecord> = jobs
            .values()
            .filter(|j| Self::visible(Some(*j), owner_id, now).is_some() && query.matches(j))
            .collect();
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.job_id.cmp(&a.job_id))
        });

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.per_page as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn stats(&self, owner_id: &str) -> Result<JobStats> {
        self.check()?;
        let now = Utc::now();
        let jobs = self.jobs.read().await;
        let mut stats = JobStats::default();
        for job in jobs
            .values()
            .filter(|j| Self::visible(Some(*j), owner_id, now).is_some())
        {
            stats.record(job.status, job.job_type, 1);
        }
        Ok(stats)
    }

    async fn purge_expired(&self) -> Result<u64> {
        self.check()?;
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| !j.is_expired_at(now));
        Ok((before - jobs.len()) as u64)
    }
}

// =============================================================================
// RELATIONSHIPS
// =============================================================================

#[derive(Default)]
pub struct MemoryRelationshipStore {
    edges: RwLock<Vec<RelationshipEdge>>,
    unavailable: AtomicBool,
}

impl MemoryRelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.edges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.edges.read().await.is_empty()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(unavailable("relationship"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelationshipStore for MemoryRelationshipStore {
    async fn find_by_pair(
        &self,
        owner_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Option<RelationshipEdge>> {
        self.check()?;
        let (low, high) = canonical_pair(a, b);
        Ok(self
            .edges
            .read()
            .await
            .iter()
            .find(|e| e.owner_id == owner_id && e.endpoint_a == low && e.endpoint_b == high)
            .cloned())
    }

    async fn find_by_id(&self, owner_id: &str, id: Uuid) -> Result<Option<RelationshipEdge>> {
        self.check()?;
        Ok(self
            .edges
            .read()
            .await
            .iter()
            .find(|e| e.owner_id == owner_id && e.relationship_id == id)
            .cloned())
    }

    async fn insert(&self, edge: RelationshipEdge) -> Result<RelationshipEdge> {
        self.check()?;
        if edge.endpoint_a >= edge.endpoint_b {
            return Err(Error::Validation(format!(
                "relationship endpoints not in canonical order: {} / {}",
                edge.endpoint_a, edge.endpoint_b
            )));
        }
        let mut edges = self.edges.write().await;
        if let Some(existing) = edges.iter().find(|e| {
            e.owner_id == edge.owner_id
                && e.endpoint_a == edge.endpoint_a
                && e.endpoint_b == edge.endpoint_b
        }) {
            return Ok(existing.clone());
        }
        edges.push(edge.clone());
        Ok(edge)
    }

    async fn update_weight(
        &self,
        owner_id: &str,
        id: Uuid,
        weight: f64,
        metadata: Option<JsonValue>,
    ) -> Result<Option<RelationshipEdge>> {
        self.check()?;
        let mut edges = self.edges.write().await;
        let Some(edge) = edges
            .iter_mut()
            .find(|e| e.owner_id == owner_id && e.relationship_id == id)
        else {
            return Ok(None);
        };
        if edge.weight >= weight {
            return Ok(None);
        }
        edge.weight = weight;
        if let Some(metadata) = metadata {
            edge.metadata = metadata;
        }
        Ok(Some(edge.clone()))
    }

    async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool> {
        self.check()?;
        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|e| !(e.owner_id == owner_id && e.relationship_id == id));
        Ok(edges.len() != before)
    }

    async fn delete_all_for_endpoint(&self, owner_id: &str, endpoint_id: &str) -> Result<u64> {
        self.check()?;
        let mut edges = self.edges.write().await;
        let before = edges.len();
        edges.retain(|e| !(e.owner_id == owner_id && e.touches(endpoint_id)));
        Ok((before - edges.len()) as u64)
    }

    async fn find_all_for_endpoint(
        &self,
        owner_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<RelationshipEdge>> {
        self.check()?;
        // Insertion order doubles as creation order.
        Ok(self
            .edges
            .read()
            .await
            .iter()
            .filter(|e| e.owner_id == owner_id && e.touches(endpoint_id))
            .cloned()
            .collect())
    }
}

// =============================================================================
// IMAGES
// =============================================================================

/// Image collaborator holding summaries in a map keyed by owner and id.
#[derive(Default)]
pub struct MemoryImageDirectory {
    images: RwLock<HashMap<(String, String), ImageSummary>>,
    unavailable: AtomicBool,
}

impl MemoryImageDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an image for `owner_id`.
    pub async fn put(&self, owner_id: &str, image: ImageSummary) {
        self.images
            .write()
            .await
            .insert((owner_id.to_string(), image.id.clone()), image);
    }

    /// Convenience for tests: register an image by id, label, and flag.
    pub async fn put_image(&self, owner_id: &str, id: &str, label: &str, is_flagged: bool) {
        self.put(
            owner_id,
            ImageSummary {
                id: id.to_string(),
                label: label.to_string(),
                is_flagged,
                size: None,
            },
        )
        .await;
    }

    pub async fn remove(&self, owner_id: &str, id: &str) {
        self.images
            .write()
            .await
            .remove(&(owner_id.to_string(), id.to_string()));
    }

    /// Make lookups and flag writes fail with `CollaboratorUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Flag state without going through the unavailable switch.
    pub async fn is_flagged(&self, owner_id: &str, id: &str) -> Option<bool> {
        self.images
            .read()
            .await
            .get(&(owner_id.to_string(), id.to_string()))
            .map(|i| i.is_flagged)
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::CollaboratorUnavailable(
                "image directory unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ImageDirectory for MemoryImageDirectory {
    async fn lookup(&self, owner_id: &str, image_id: &str) -> Result<Option<ImageSummary>> {
        self.check()?;
        Ok(self
            .images
            .read()
            .await
            .get(&(owner_id.to_string(), image_id.to_string()))
            .cloned())
    }

    async fn set_flagged(&self, owner_id: &str, image_ids: &[String]) -> Result<u64> {
        self.check()?;
        let mut images = self.images.write().await;
        let mut changed = 0;
        for id in image_ids {
            if let Some(image) = images.get_mut(&(owner_id.to_string(), id.clone())) {
                if !image.is_flagged {
                    image.is_flagged = true;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }
}
