//! Job status handlers.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use vestige_core::{defaults, JobListQuery, JobStatus, JobType};

use crate::error::ApiError;
use crate::handlers::ListResponse;
use crate::owner::OwnerId;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub job_type: Option<String>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ListJobsQuery {
    fn into_query(self) -> Result<JobListQuery, ApiError> {
        let query = JobListQuery {
            job_type: self
                .job_type
                .as_deref()
                .map(str::parse::<JobType>)
                .transpose()?,
            status: self
                .status
                .as_deref()
                .map(str::parse::<JobStatus>)
                .transpose()?,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(defaults::PAGE_SIZE),
        };
        query.validate()?;
        Ok(query)
    }
}

pub async fn list_jobs(
    State(state): State<AppState>,
    owner: OwnerId,
    Query(params): Query<ListJobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query()?;
    let (jobs, total) = state.jobs.list(owner.as_str(), &query).await?;
    Ok(Json(ListResponse::new(jobs, total, query.page, query.per_page)))
}

pub async fn job_stats(
    State(state): State<AppState>,
    owner: OwnerId,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.jobs.stats(owner.as_str()).await?;
    Ok(Json(stats))
}

pub async fn get_job(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.jobs.find(owner.as_str(), id).await?;
    Ok(Json(job))
}
