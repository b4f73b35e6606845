//! Axum route handlers for the Documents API.

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::documents::render::{render, ExportFormat};
use crate::errors::AppError;
use crate::models::document::{DocType, DocumentMeta, NewDocument};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DocTypeQuery {
    pub doc_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SaveDocumentRequest {
    pub doc_type: String,
    pub content: String,
    pub content_type: Option<String>,
    pub file_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentDetailResponse {
    #[serde(flatten)]
    pub document: DocumentMeta,
    /// Present only for `text/*` documents.
    pub text: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/documents
///
/// Uploads a source CV (multipart field `file`) as a new version.
pub async fn handle_upload(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentMeta>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;

        if content.is_empty() {
            return Err(AppError::Validation("file is empty".to_string()));
        }
        if content.len() > state.config.max_upload_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "file exceeds {} bytes",
                state.config.max_upload_bytes
            )));
        }

        let meta = state
            .repo
            .create_document(NewDocument {
                user_id: user.user_id,
                doc_type: DocType::SourceCv,
                file_name,
                content_type,
                content: content.to_vec(),
            })
            .await?;
        info!(
            "User {} uploaded source CV v{} ({})",
            user.user_id, meta.version, meta.file_name
        );
        return Ok((StatusCode::CREATED, Json(meta)));
    }

    Err(AppError::Validation("file is required".to_string()))
}

/// GET /api/v1/documents?doc_type=
///
/// Lists the caller's versions of one lineage, newest first.
pub async fn handle_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<DocTypeQuery>,
) -> Result<Json<Vec<DocumentMeta>>, AppError> {
    let doc_type = match params.doc_type.as_deref() {
        Some(raw) => raw.parse::<DocType>().map_err(AppError::Validation)?,
        None => DocType::SourceCv,
    };
    Ok(Json(state.repo.list_documents(user.user_id, doc_type).await?))
}

/// GET /api/v1/documents/:id
pub async fn handle_get(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentDetailResponse>, AppError> {
    let document = state
        .repo
        .get_document(user.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))?;

    let text = document
        .meta
        .is_text()
        .then(|| String::from_utf8_lossy(&document.content).into_owned());

    Ok(Json(DocumentDetailResponse {
        document: document.meta,
        text,
    }))
}

/// POST /api/v1/documents/save
///
/// Saves edited text as a new version of a generated CV or cover letter.
pub async fn handle_save(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<SaveDocumentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DocumentMeta>), AppError> {
    let Json(request) = payload?;
    let doc_type = request
        .doc_type
        .trim()
        .parse::<DocType>()
        .map_err(AppError::Validation)?;
    if doc_type == DocType::SourceCv {
        return Err(AppError::Validation(
            "source CVs are uploaded, not saved from text".to_string(),
        ));
    }
    if request.content.is_empty() {
        return Err(AppError::Validation("content is required".to_string()));
    }

    let content_type = request
        .content_type
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "text/plain".to_string());
    let file_name = request
        .file_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| {
            if content_type.starts_with("text/") {
                format!("edited_{doc_type}.txt")
            } else {
                format!("edited_{doc_type}")
            }
        });

    let meta = state
        .repo
        .create_document(NewDocument {
            user_id: user.user_id,
            doc_type,
            file_name,
            content_type,
            content: request.content.into_bytes(),
        })
        .await?;

    Ok((StatusCode::CREATED, Json(meta)))
}

/// GET /api/v1/documents/:id/download?format=txt|pdf|docx
///
/// Without `format` the stored bytes are returned as-is. Text documents can be
/// exported to any format; binary uploads only as-is.
pub async fn handle_download(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<DownloadQuery>,
) -> Result<Response, AppError> {
    let document = state
        .repo
        .get_document(user.user_id, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document {id} not found")))?;

    let Some(raw_format) = params.format else {
        let disposition = attachment(&document.meta.file_name);
        return Ok((
            [
                (header::CONTENT_TYPE, document.meta.content_type),
                (header::CONTENT_DISPOSITION, disposition),
            ],
            document.content,
        )
            .into_response());
    };

    let format = raw_format
        .parse::<ExportFormat>()
        .map_err(AppError::Validation)?;
    if !document.meta.is_text() {
        return Err(AppError::Validation(
            "Conversion only supported for text/* documents".to_string(),
        ));
    }

    let text = String::from_utf8_lossy(&document.content).into_owned();
    let bytes = tokio::task::spawn_blocking(move || render(&text, format))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Render task panicked: {e}")))?
        .map_err(|e| AppError::Render(e.to_string()))?;

    let stem = document
        .meta
        .file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&document.meta.file_name);
    let file_name = format!("{stem}.{}", format.extension());

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, attachment(&file_name)),
        ],
        bytes,
    )
        .into_response())
}

fn attachment(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
