//! vestige-api - HTTP surface for job tracking and image relationships.
//!
//! The binary in `main.rs` wires PostgreSQL-backed stores into [`AppState`];
//! tests build the same router over the in-memory stores.

pub mod config;
pub mod error;
pub mod handlers;
pub mod owner;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;

use vestige_core::{defaults, ImageDirectory, JobStore, NotificationBus};
use vestige_graph::RelationshipGraphEngine;

use crate::handlers::{events, health, jobs, relationships};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub images: Arc<dyn ImageDirectory>,
    pub graph: RelationshipGraphEngine,
    pub bus: NotificationBus,
    /// Keepalive interval on idle job streams.
    pub stream_keepalive: Duration,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        images: Arc<dyn ImageDirectory>,
        graph: RelationshipGraphEngine,
        bus: NotificationBus,
    ) -> Self {
        Self {
            jobs,
            images,
            graph,
            bus,
            stream_keepalive: Duration::from_secs(defaults::STREAM_KEEPALIVE_SECS),
        }
    }

    pub fn with_stream_keepalive(mut self, keepalive: Duration) -> Self {
        self.stream_keepalive = keepalive;
        self
    }
}

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = vestige_core::new_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// OPENAPI
// =============================================================================

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Vestige API",
        description = "Forensic analysis job tracking and image relationship graphs"
    ),
    components(schemas(
        vestige_core::JobRecord,
        vestige_core::JobStats,
        vestige_core::JobType,
        vestige_core::JobStatus,
        vestige_core::SourceType,
        vestige_core::RelationshipEdge,
        vestige_core::RelationshipView,
        vestige_core::ImageSummary,
        vestige_core::GraphView,
        vestige_core::GraphNode,
        vestige_core::GraphEdge,
        handlers::PaginationMeta,
        handlers::relationships::CreateRelationshipBody,
    )),
    tags(
        (name = "Jobs", description = "Analysis job status and live events"),
        (name = "Relationships", description = "Image relationship graph"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// =============================================================================
// ROUTER
// =============================================================================

/// All routes, without the HTTP middleware stack.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/openapi.json", get(openapi_json))
        // Jobs
        .route("/api/v1/jobs", get(jobs::list_jobs))
        .route("/api/v1/jobs/stats", get(jobs::job_stats))
        .route("/api/v1/jobs/stream", get(events::stream_jobs))
        .route("/api/v1/jobs/:id", get(jobs::get_job))
        // Relationships
        .route(
            "/api/v1/relationships",
            axum::routing::post(relationships::create_relationship),
        )
        .route(
            "/api/v1/relationships/:id",
            axum::routing::delete(relationships::delete_relationship),
        )
        .route(
            "/api/v1/relationships/image/:image_id",
            get(relationships::list_image_relationships)
                .delete(relationships::delete_image_relationships),
        )
        .route(
            "/api/v1/relationships/image/:image_id/graph",
            get(relationships::image_graph),
        )
        .with_state(state)
}

/// Tracing, request ids, CORS, and body limits around `router`.
pub fn with_http_layers(router: Router, allowed_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(subsystem = "api", origin = %origin, error = %e, "Invalid CORS origin");
                None
            }
        })
        .collect();

    router
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    HeaderName::from_static(owner::OWNER_HEADER),
                ])
                .allow_credentials(true)
                .max_age(Duration::from_secs(3600)),
        )
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
}
