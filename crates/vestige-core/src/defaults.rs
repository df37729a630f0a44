//! Centralized default constants for vestige.
//!
//! All crates reference these constants instead of defining their own magic
//! numbers. Environment overrides are read by the binaries and by the
//! `from_env` constructors; the values here apply when a variable is unset or
//! unparseable.

// =============================================================================
// JOB RETENTION
// =============================================================================

/// Days a job record stays readable after creation or completion.
pub const JOB_RETENTION_DAYS: i64 = 7;

/// Seconds between sweeps that physically delete expired job records.
pub const JOB_PURGE_INTERVAL_SECS: u64 = 3600;

/// Progress percent bounds.
pub const PROGRESS_MIN: i32 = 0;
pub const PROGRESS_MAX: i32 = 100;

/// Status line written when a job is created.
pub const MESSAGE_QUEUED: &str = "Queued";

/// Status lines written by the terminal transition.
pub const MESSAGE_COMPLETED: &str = "Completed";
pub const MESSAGE_PARTIAL: &str = "Partially completed";
pub const MESSAGE_FAILED: &str = "Failed";

// =============================================================================
// NOTIFICATION BUS
// =============================================================================

/// Per-subscriber buffer before the oldest undelivered events are dropped.
pub const EVENT_BUFFER_CAPACITY: usize = 100;

/// Schema version stamped on every event envelope.
pub const EVENT_PAYLOAD_VERSION: u32 = 1;

/// Redis channel carrying job event envelopes between processes.
pub const JOB_EVENTS_CHANNEL: &str = "vestige:job-events";

/// Seconds between keepalive comments on an idle job stream.
pub const STREAM_KEEPALIVE_SECS: u64 = 30;

/// Backoff bounds for re-subscribing the cross-process relay.
pub const RELAY_RECONNECT_BASE_MS: u64 = 500;
pub const RELAY_RECONNECT_MAX_MS: u64 = 30_000;

/// Envelopes a relay publisher holds while Redis is slow or unreachable.
pub const RELAY_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// RELATIONSHIP GRAPH
// =============================================================================

/// Weight assigned when a relationship is recorded without one.
pub const RELATIONSHIP_WEIGHT: f64 = 1.0;

/// Creator attributed to relationships recorded by analysis pipelines.
pub const RELATIONSHIP_CREATED_BY: &str = "system";

/// BFS depth used by the graph endpoint when none is given.
pub const GRAPH_DEPTH: i32 = 3;

/// Largest BFS depth accepted over HTTP.
pub const GRAPH_DEPTH_MAX: i32 = 5;

/// Trailing id characters used in placeholder node labels.
pub const PLACEHOLDER_LABEL_SUFFIX_LEN: usize = 6;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for the job list.
pub const PAGE_SIZE: u32 = 20;

/// Largest page size accepted by the job list.
pub const PAGE_SIZE_MAX: u32 = 100;

// =============================================================================
// STORAGE RETRY
// =============================================================================

/// Attempts made for a store call that fails transiently.
pub const STORE_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between store retries; doubled after every attempt.
pub const STORE_RETRY_BASE_MS: u64 = 50;

// =============================================================================
// SERVER
// =============================================================================

pub const SERVER_HOST: &str = "0.0.0.0";
pub const SERVER_PORT: u16 = 3000;
pub const DATABASE_URL: &str = "postgres://localhost/vestige";
pub const REDIS_URL: &str = "redis://localhost:6379";
pub const ALLOWED_ORIGINS: &str = "http://localhost:3000";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_within_bounds() {
        assert!(PAGE_SIZE >= 1);
        assert!(PAGE_SIZE <= PAGE_SIZE_MAX);
    }

    #[test]
    fn test_graph_depth_within_bounds() {
        assert!(GRAPH_DEPTH >= 1);
        assert!(GRAPH_DEPTH <= GRAPH_DEPTH_MAX);
    }

    #[test]
    fn test_default_weight_in_unit_interval() {
        assert!((0.0..=1.0).contains(&RELATIONSHIP_WEIGHT));
    }
}
