//! Structured logging schema and field name constants for vestige.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query by the same keys across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (BFS steps, heap pops) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated from the HTTP request.
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "jobs", "graph", "events"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "tracker", "bus", "relay", "retention", "engine", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create", "progress", "complete", "build_graph"
pub const OPERATION: &str = "op";

/// Owner identity every record is scoped by.
pub const OWNER_ID: &str = "owner_id";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being tracked.
pub const JOB_ID: &str = "job_id";

/// Job type enum variant.
pub const JOB_TYPE: &str = "job_type";

/// Job status after a write.
pub const JOB_STATUS: &str = "status";

/// Relationship UUID.
pub const RELATIONSHIP_ID: &str = "relationship_id";

/// Image id on either side of a relationship.
pub const IMAGE_ID: &str = "image_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or items returned.
pub const RESULT_COUNT: &str = "result_count";

/// Live subscribers at the moment of publish.
pub const SUBSCRIBER_COUNT: &str = "subscriber_count";

/// Events a lagging subscriber missed.
pub const MISSED_COUNT: &str = "missed";

/// Nodes and edges in a built graph.
pub const NODE_COUNT: &str = "node_count";
pub const EDGE_COUNT: &str = "edge_count";
