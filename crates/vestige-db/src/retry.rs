//! Retry of transient storage failures.
//!
//! [`Retrying`] wraps any [`JobStore`] or [`RelationshipStore`] and repeats a
//! call that failed with a connection-level error (see
//! [`Error::is_transient`]) with exponential backoff. Every other error is
//! returned on the first attempt.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use vestige_core::{
    defaults, Error, JobListQuery, JobRecord, JobStats, JobStore, JobUpdate, JobWrite, NewJob,
    RelationshipEdge, RelationshipStore, Result,
};

/// How many times and how patiently to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: defaults::STORE_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::STORE_RETRY_BASE_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Whether another attempt should follow a failure on attempt `attempt`.
    pub fn should_retry(&self, err: &Error, attempt: u32) -> bool {
        err.is_transient() && attempt + 1 < self.attempts
    }

    async fn pause(&self, op: &'static str, attempt: u32, err: &Error) {
        let delay = self.delay_for(attempt);
        warn!(
            subsystem = "db",
            component = "retry",
            op,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient storage failure, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Store decorator adding retry of transient failures.
pub struct Retrying<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Retrying<S> {
    pub fn new(inner: S) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    pub fn with_policy(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Evaluate `$call` until it succeeds, fails permanently, or attempts run out.
macro_rules! retry {
    ($self:ident, $op:literal, $call:expr) => {{
        let mut attempt = 0;
        loop {
            match $call.await {
                Err(e) if $self.policy.should_retry(&e, attempt) => {
                    $self.policy.pause($op, attempt, &e).await;
                    attempt += 1;
                }
                other => break other,
            }
        }
    }};
}

#[async_trait]
impl<S: JobStore> JobStore for Retrying<S> {
    async fn insert(&self, job: NewJob) -> Result<JobRecord> {
        retry!(self, "insert_job", self.inner.insert(job.clone()))
    }

    async fn update(&self, owner_id: &str, job_id: Uuid, update: JobUpdate) -> Result<JobWrite> {
        retry!(
            self,
            "update_job",
            self.inner.update(owner_id, job_id, update.clone())
        )
    }

    async fn find(&self, owner_id: &str, job_id: Uuid) -> Result<JobRecord> {
        retry!(self, "find_job", self.inner.find(owner_id, job_id))
    }

    async fn list(&self, owner_id: &str, query: &JobListQuery) -> Result<(Vec<JobRecord>, i64)> {
        retry!(self, "list_jobs", self.inner.list(owner_id, query))
    }

    async fn stats(&self, owner_id: &str) -> Result<JobStats> {
        retry!(self, "job_stats", self.inner.stats(owner_id))
    }

    async fn purge_expired(&self) -> Result<u64> {
        retry!(self, "purge_expired", self.inner.purge_expired())
    }
}

#[async_trait]
impl<S: RelationshipStore> RelationshipStore for Retrying<S> {
    async fn find_by_pair(
        &self,
        owner_id: &str,
        a: &str,
        b: &str,
    ) -> Result<Option<RelationshipEdge>> {
        retry!(self, "find_by_pair", self.inner.find_by_pair(owner_id, a, b))
    }

    async fn find_by_id(&self, owner_id: &str, id: Uuid) -> Result<Option<RelationshipEdge>> {
        retry!(self, "find_by_id", self.inner.find_by_id(owner_id, id))
    }

    async fn insert(&self, edge: RelationshipEdge) -> Result<RelationshipEdge> {
        retry!(self, "insert_relationship", self.inner.insert(edge.clone()))
    }

    async fn update_weight(
        &self,
        owner_id: &str,
        id: Uuid,
        weight: f64,
        metadata: Option<JsonValue>,
    ) -> Result<Option<RelationshipEdge>> {
        retry!(
            self,
            "update_weight",
            self.inner
                .update_weight(owner_id, id, weight, metadata.clone())
        )
    }

    async fn delete(&self, owner_id: &str, id: Uuid) -> Result<bool> {
        retry!(self, "delete_relationship", self.inner.delete(owner_id, id))
    }

    async fn delete_all_for_endpoint(&self, owner_id: &str, endpoint_id: &str) -> Result<u64> {
        retry!(
            self,
            "delete_all_for_endpoint",
            self.inner.delete_all_for_endpoint(owner_id, endpoint_id)
        )
    }

    async fn find_all_for_endpoint(
        &self,
        owner_id: &str,
        endpoint_id: &str,
    ) -> Result<Vec<RelationshipEdge>> {
        retry!(
            self,
            "find_all_for_endpoint",
            self.inner.find_all_for_endpoint(owner_id, endpoint_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use chrono::Duration as ChronoDuration;
    use vestige_core::JobType;

    use crate::memory::MemoryJobStore;

    /// Fails `purge_expired` with a pool timeout a fixed number of times.
    struct Flaky {
        inner: MemoryJobStore,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryJobStore::new(),
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl JobStore for Flaky {
        async fn insert(&self, job: NewJob) -> Result<JobRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Validation(format!("rejected {}", job.title)))
        }
        async fn update(&self, o: &str, id: Uuid, u: JobUpdate) -> Result<JobWrite> {
            self.inner.update(o, id, u).await
        }
        async fn find(&self, o: &str, id: Uuid) -> Result<JobRecord> {
            self.inner.find(o, id).await
        }
        async fn list(&self, o: &str, q: &JobListQuery) -> Result<(Vec<JobRecord>, i64)> {
            self.inner.list(o, q).await
        }
        async fn stats(&self, o: &str) -> Result<JobStats> {
            self.inner.stats(o).await
        }
        async fn purge_expired(&self) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.purge_expired().await
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Retrying::with_policy(Flaky::new(2), fast_policy());
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let store = Retrying::with_policy(Flaky::new(5), fast_policy());
        let err = store.purge_expired().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let store = Retrying::with_policy(Flaky::new(0), fast_policy());
        let result = store
            .insert(NewJob {
                owner_id: "alice".to_string(),
                job_type: JobType::Provenance,
                title: "graph".to_string(),
                input_data: None,
                retention: ChronoDuration::days(1),
            })
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(store.inner().calls.load(Ordering::SeqCst), 1);
    }
}
