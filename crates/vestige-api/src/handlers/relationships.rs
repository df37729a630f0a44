//! Image relationship handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use vestige_core::{defaults, NewRelationship, SourceType};

use crate::error::ApiError;
use crate::owner::OwnerId;
use crate::AppState;

/// Request body for `POST /api/v1/relationships`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRelationshipBody {
    pub image1_id: String,
    pub image2_id: String,
    #[serde(default)]
    pub source_type: SourceType,
    pub source_analysis_id: Option<String>,
    /// Association strength in [0, 1]; defaults to 1.0.
    pub weight: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NeighborsQuery {
    #[serde(default)]
    pub include_details: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    pub max_depth: Option<i32>,
}

/// Fail with 404 unless the image resolves for this owner.
async fn require_image(state: &AppState, owner: &OwnerId, image_id: &str) -> Result<(), ApiError> {
    match state.images.lookup(owner.as_str(), image_id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::NotFound(format!("Image {} not found", image_id))),
    }
}

pub async fn create_relationship(
    State(state): State<AppState>,
    owner: OwnerId,
    Json(body): Json<CreateRelationshipBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.image1_id == body.image2_id {
        return Err(ApiError::BadRequest(
            "An image cannot be related to itself".to_string(),
        ));
    }
    require_image(&state, &owner, &body.image1_id).await?;
    require_image(&state, &owner, &body.image2_id).await?;

    let mut request = NewRelationship::new(
        owner.as_str(),
        body.image1_id,
        body.image2_id,
        body.source_type,
    )
    .with_created_by(owner.as_str());
    request.source_analysis_id = body.source_analysis_id;
    request.weight = body.weight;
    request.metadata = body.metadata;

    let edge = state.graph.create_relationship(request).await?;
    Ok((StatusCode::CREATED, Json(edge)))
}

pub async fn delete_relationship(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.graph.remove_relationship(owner.as_str(), id).await? {
        return Err(ApiError::NotFound("Relationship not found".to_string()));
    }
    Ok(Json(serde_json::json!({
        "message": "Relationship removed successfully",
    })))
}

pub async fn list_image_relationships(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(image_id): Path<String>,
    Query(query): Query<NeighborsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_image(&state, &owner, &image_id).await?;
    let views = state
        .graph
        .neighbors(owner.as_str(), &image_id, query.include_details)
        .await?;
    Ok(Json(views))
}

pub async fn image_graph(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(image_id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let max_depth = query.max_depth.unwrap_or(defaults::GRAPH_DEPTH);
    if !(0..=defaults::GRAPH_DEPTH_MAX).contains(&max_depth) {
        return Err(ApiError::BadRequest(format!(
            "max_depth must be between 0 and {}",
            defaults::GRAPH_DEPTH_MAX
        )));
    }
    require_image(&state, &owner, &image_id).await?;

    let graph = state
        .graph
        .build_graph(owner.as_str(), &image_id, max_depth)
        .await?;
    Ok(Json(graph))
}

pub async fn delete_image_relationships(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(image_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state
        .graph
        .cascade_remove_for_endpoint(owner.as_str(), &image_id)
        .await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}
