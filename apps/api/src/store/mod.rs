//! Persistence seam for jobs, job descriptions and document versions.
//!
//! `AppState` carries an `Arc<dyn Repository>`: `PgRepository` (Postgres rows +
//! S3 blobs) in deployments, `MemoryRepository` for local runs and tests.
//!
//! Documents are append-only. Job status changes are conditional updates so
//! that concurrent workers can never both move the same job.

pub mod memory;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::document::{DocType, Document, DocumentMeta, NewDocument};
use crate::models::job::GenerationJob;
use crate::models::job_description::JobDescription;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

#[async_trait]
pub trait Repository: Send + Sync {
    // ── Job descriptions ────────────────────────────────────────────────────
    async fn create_job_description(&self, user_id: Uuid, text: &str) -> Result<JobDescription>;

    async fn get_job_description(&self, user_id: Uuid, id: Uuid)
        -> Result<Option<JobDescription>>;

    async fn list_job_descriptions(&self, user_id: Uuid, limit: i64)
        -> Result<Vec<JobDescription>>;

    // ── Documents ───────────────────────────────────────────────────────────
    /// Appends a new version to the (owner, doc_type) lineage.
    async fn create_document(&self, doc: NewDocument) -> Result<DocumentMeta>;

    async fn get_document_meta(&self, user_id: Uuid, id: Uuid) -> Result<Option<DocumentMeta>>;

    async fn get_document(&self, user_id: Uuid, id: Uuid) -> Result<Option<Document>>;

    /// Newest version first.
    async fn list_documents(&self, user_id: Uuid, doc_type: DocType) -> Result<Vec<DocumentMeta>>;

    // ── Generation jobs ─────────────────────────────────────────────────────
    async fn insert_job(&self, job: &GenerationJob) -> Result<()>;

    async fn get_job(&self, user_id: Uuid, id: Uuid) -> Result<Option<GenerationJob>>;

    /// Unscoped lookup for the worker.
    async fn find_job(&self, id: Uuid) -> Result<Option<GenerationJob>>;

    async fn list_jobs(&self, user_id: Uuid, limit: i64) -> Result<Vec<GenerationJob>>;

    async fn queued_job_ids(&self) -> Result<Vec<Uuid>>;

    /// `queued → running`. Returns false when the job was not queued.
    async fn claim_job(&self, id: Uuid) -> Result<bool>;

    /// `running → completed`, persisting `outputs` and attaching their ids in
    /// the same atomic step. `log` is a bare message; stores timestamp it.
    /// Returns `None` (and persists nothing) when the job
    /// is no longer running.
    async fn complete_job(
        &self,
        id: Uuid,
        outputs: Vec<NewDocument>,
        log: &str,
    ) -> Result<Option<GenerationJob>>;

    /// `queued | running → error`. Returns false when the job was already terminal.
    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool>;

    /// Appends a timestamped line. Counts as progress for the reaper.
    async fn append_job_log(&self, id: Uuid, log: &str) -> Result<()>;

    /// Fails every running job that has made no progress since `cutoff`.
    async fn expire_running_jobs(&self, cutoff: DateTime<Utc>, message: &str) -> Result<Vec<Uuid>>;
}

/// Formats a job log line: `[<rfc3339>] <message>\n`.
pub fn log_line(message: &str) -> String {
    format!("[{}] {}\n", Utc::now().to_rfc3339(), message)
}
