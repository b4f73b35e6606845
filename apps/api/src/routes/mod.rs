pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde::Deserialize;

use crate::documents::handlers as documents;
use crate::generation::handlers as generation;
use crate::job_descriptions::handlers as job_descriptions;
use crate::state::AppState;

/// Room for multipart framing on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// `?limit=` for list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Generation jobs
        .route("/api/v1/submit-generation", post(generation::handle_submit))
        .route("/api/v1/job-status/:job_id", get(generation::handle_status))
        .route("/api/v1/generations", get(generation::handle_list_jobs))
        .route("/api/v1/generations/:id", get(generation::handle_get_job))
        // Documents
        .route(
            "/api/v1/documents",
            post(documents::handle_upload).get(documents::handle_list),
        )
        .route("/api/v1/documents/save", post(documents::handle_save))
        .route("/api/v1/documents/:id", get(documents::handle_get))
        .route(
            "/api/v1/documents/:id/download",
            get(documents::handle_download),
        )
        // Job descriptions
        .route(
            "/api/v1/job-descriptions",
            post(job_descriptions::handle_create).get(job_descriptions::handle_list),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
