//! Axum route handlers for the Generation API.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::generation::orchestrator::{JobStatusView, SubmitRequest, SubmitResponse};
use crate::models::job::GenerationJob;
use crate::routes::ListQuery;
use crate::state::AppState;

/// POST /api/v1/submit-generation
pub async fn handle_submit(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let Json(request) = payload?;
    let response = state.orchestrator.submit(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/job-status/:job_id
pub async fn handle_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobStatusView>, AppError> {
    Ok(Json(state.orchestrator.get_status(user.user_id, job_id).await?))
}

/// GET /api/v1/generations?limit=
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<GenerationJob>>, AppError> {
    Ok(Json(state.repo.list_jobs(user.user_id, params.limit()).await?))
}

/// GET /api/v1/generations/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<GenerationJob>, AppError> {
    state
        .repo
        .get_job(user.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Generation {id} not found")))
}
