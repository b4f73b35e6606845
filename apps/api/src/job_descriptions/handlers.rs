use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::job_description::JobDescription;
use crate::routes::ListQuery;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobDescriptionRequest {
    pub text: String,
}

/// POST /api/v1/job-descriptions
pub async fn handle_create(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateJobDescriptionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobDescription>), AppError> {
    let Json(request) = payload?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("text is required".to_string()));
    }
    let jd = state
        .repo
        .create_job_description(user.user_id, text)
        .await?;
    Ok((StatusCode::CREATED, Json(jd)))
}

/// GET /api/v1/job-descriptions?limit=
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<JobDescription>>, AppError> {
    Ok(Json(
        state
            .repo
            .list_job_descriptions(user.user_id, params.limit())
            .await?,
    ))
}
