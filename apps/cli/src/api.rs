//! HTTP client for the ResumeAI API.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    #[serde(alias = "failed")]
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobStatusView {
    pub status: JobStatus,
    #[serde(default)]
    pub output_cover_letter_id: Option<Uuid>,
    #[serde(default)]
    pub output_cv_id: Option<Uuid>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub job_description_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_document_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentMeta {
    pub id: Uuid,
    pub doc_type: String,
    pub version: i32,
    pub file_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDescription {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Where the poller gets job status from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn job_status(&self, job_id: Uuid) -> Result<JobStatusView, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, access_token: Option<String>) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&str, ClientError> {
        self.access_token.as_deref().ok_or(ClientError::Unauthorized)
    }

    pub async fn upload_document(&self, path: &Path) -> Result<DocumentMeta, ClientError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| ClientError::Validation(format!("Cannot read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let part = Part::bytes(content)
            .file_name(file_name)
            .mime_str(guess_content_type(path))?;

        let response = self
            .http
            .post(self.url("/api/v1/documents"))
            .bearer_auth(self.bearer()?)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn create_job_description(&self, text: &str) -> Result<JobDescription, ClientError> {
        let response = self
            .http
            .post(self.url("/api/v1/job-descriptions"))
            .bearer_auth(self.bearer()?)
            .json(&json!({ "text": text }))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    pub async fn submit_generation(
        &self,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ClientError> {
        let response = self
            .http
            .post(self.url("/api/v1/submit-generation"))
            .bearer_auth(self.bearer()?)
            .json(request)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

#[async_trait]
impl StatusSource for ApiClient {
    async fn job_status(&self, job_id: Uuid) -> Result<JobStatusView, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/job-status/{job_id}")))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }
}

async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!("API returned {status}: {body}");
    Err(classify(status, &body))
}

/// Maps a non-success response onto the client's error kinds.
fn classify(status: StatusCode, body: &str) -> ClientError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::Unauthorized,
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE => ClientError::Validation(message),
        other => ClientError::Http {
            status: other.as_u16(),
            message,
        },
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" | "md" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_require_reauth() {
        assert!(classify(StatusCode::UNAUTHORIZED, "").requires_reauth());
        assert!(classify(StatusCode::FORBIDDEN, "nope").requires_reauth());
        assert!(!classify(StatusCode::BAD_GATEWAY, "").requires_reauth());
    }

    #[test]
    fn test_error_envelope_message_is_extracted() {
        let body = r#"{"error":{"code":"NOT_FOUND","message":"Job 1 not found"}}"#;
        match classify(StatusCode::NOT_FOUND, body) {
            ClientError::NotFound(message) => assert_eq!(message, "Job 1 not found"),
            other => panic!("unexpected {other:?}"),
        }
        match classify(StatusCode::SERVICE_UNAVAILABLE, "upstream down\n") {
            ClientError::Http { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream down");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_status_view_tolerates_missing_fields() {
        let view: JobStatusView = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        assert_eq!(view.status, JobStatus::Running);
        assert!(view.output_cv_id.is_none());
        assert!(!view.status.is_terminal());
    }

    #[test]
    fn test_content_type_guess() {
        assert_eq!(guess_content_type(Path::new("cv.PDF")), "application/pdf");
        assert_eq!(guess_content_type(Path::new("notes")), "application/octet-stream");
    }
}
