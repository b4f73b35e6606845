//! Postgres-backed repository. Document bytes live in S3; rows hold the key.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::document::{DocType, Document, DocumentMeta, DocumentRow, NewDocument};
use crate::models::job::{GenerationJob, GenerationJobRow};
use crate::models::job_description::JobDescription;
use crate::store::{log_line, Repository};

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
    s3: S3Client,
    bucket: String,
}

impl PgRepository {
    pub fn new(pool: PgPool, s3: S3Client, bucket: String) -> Self {
        Self { pool, s3, bucket }
    }

    async fn put_blob(&self, key: &str, content_type: &str, content: Vec<u8>) -> Result<()> {
        self.s3
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(content))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| anyhow!("S3 upload failed: {e}"))?;
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> Result<Vec<u8>> {
        let object = self
            .s3
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| anyhow!("S3 download failed: {e}"))?;
        let bytes = object
            .body
            .collect()
            .await
            .map_err(|e| anyhow!("S3 body read failed: {e}"))?;
        Ok(bytes.into_bytes().to_vec())
    }

    /// Best-effort cleanup of blobs whose rows were never committed.
    async fn discard_blobs(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self
                .s3
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                warn!("Failed to delete orphaned blob s3://{}/{}: {e}", self.bucket, key);
            }
        }
    }

    /// Allocates the next version under a transaction-scoped advisory lock on
    /// the lineage, uploads the blob and inserts the row. Must run inside a
    /// transaction. Returns the metadata and the uploaded key.
    async fn insert_document(
        &self,
        conn: &mut PgConnection,
        doc: NewDocument,
    ) -> Result<(DocumentMeta, String)> {
        let id = Uuid::new_v4();
        let doc_type = doc.doc_type.as_str();

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("{}:{}", doc.user_id, doc_type))
            .execute(&mut *conn)
            .await?;

        let current: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(version) FROM documents WHERE user_id = $1 AND doc_type = $2",
        )
        .bind(doc.user_id)
        .bind(doc_type)
        .fetch_one(&mut *conn)
        .await?;
        let version = current.unwrap_or(0) + 1;

        let s3_key = format!("documents/{}/{}/v{}-{}", doc.user_id, doc_type, version, id);
        self.put_blob(&s3_key, &doc.content_type, doc.content).await?;

        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            INSERT INTO documents (id, user_id, doc_type, version, file_name, content_type, s3_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(doc.user_id)
        .bind(doc_type)
        .bind(version)
        .bind(&doc.file_name)
        .bind(&doc.content_type)
        .bind(&s3_key)
        .fetch_one(&mut *conn)
        .await;

        match row {
            Ok(row) => Ok((into_meta(row)?, s3_key)),
            Err(e) => {
                self.discard_blobs(std::slice::from_ref(&s3_key)).await;
                Err(e.into())
            }
        }
    }

    async fn fetch_row(&self, user_id: Uuid, id: Uuid) -> Result<Option<DocumentRow>> {
        Ok(
            sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = $1 AND user_id = $2")
                .bind(id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

fn into_meta(row: DocumentRow) -> Result<DocumentMeta> {
    DocumentMeta::try_from(row).map_err(|e| anyhow!("Corrupt document row: {e}"))
}

fn into_job(row: GenerationJobRow) -> Result<GenerationJob> {
    GenerationJob::try_from(row).map_err(|e| anyhow!("Corrupt generation job row: {e}"))
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_job_description(&self, user_id: Uuid, text: &str) -> Result<JobDescription> {
        Ok(sqlx::query_as::<_, JobDescription>(
            "INSERT INTO job_descriptions (id, user_id, text) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_job_description(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<JobDescription>> {
        Ok(sqlx::query_as::<_, JobDescription>(
            "SELECT * FROM job_descriptions WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_job_descriptions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JobDescription>> {
        Ok(sqlx::query_as::<_, JobDescription>(
            "SELECT * FROM job_descriptions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn create_document(&self, doc: NewDocument) -> Result<DocumentMeta> {
        let mut tx = self.pool.begin().await?;
        let (meta, key) = self.insert_document(&mut tx, doc).await?;
        if let Err(e) = tx.commit().await {
            self.discard_blobs(&[key]).await;
            return Err(e.into());
        }
        info!(
            "Stored {} v{} for user {}",
            meta.doc_type, meta.version, meta.user_id
        );
        Ok(meta)
    }

    async fn get_document_meta(&self, user_id: Uuid, id: Uuid) -> Result<Option<DocumentMeta>> {
        self.fetch_row(user_id, id).await?.map(into_meta).transpose()
    }

    async fn get_document(&self, user_id: Uuid, id: Uuid) -> Result<Option<Document>> {
        let Some(row) = self.fetch_row(user_id, id).await? else {
            return Ok(None);
        };
        let content = self
            .get_blob(&row.s3_key)
            .await
            .with_context(|| format!("Failed to load content of document {id}"))?;
        Ok(Some(Document {
            meta: into_meta(row)?,
            content,
        }))
    }

    async fn list_documents(&self, user_id: Uuid, doc_type: DocType) -> Result<Vec<DocumentMeta>> {
        sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE user_id = $1 AND doc_type = $2 ORDER BY version DESC",
        )
        .bind(user_id)
        .bind(doc_type.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(into_meta)
        .collect()
    }

    async fn insert_job(&self, job: &GenerationJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO generation_jobs
                (id, user_id, job_description_id, source_document_id, output_kind,
                 template, status, logs, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.job_description_id)
        .bind(job.source_document_id)
        .bind(job.output_kind.as_str())
        .bind(&job.template)
        .bind(job.status.as_str())
        .bind(&job.logs)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, user_id: Uuid, id: Uuid) -> Result<Option<GenerationJob>> {
        sqlx::query_as::<_, GenerationJobRow>(
            "SELECT * FROM generation_jobs WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .map(into_job)
        .transpose()
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<GenerationJob>> {
        sqlx::query_as::<_, GenerationJobRow>("SELECT * FROM generation_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(into_job)
            .transpose()
    }

    async fn list_jobs(&self, user_id: Uuid, limit: i64) -> Result<Vec<GenerationJob>> {
        sqlx::query_as::<_, GenerationJobRow>(
            "SELECT * FROM generation_jobs WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(into_job)
        .collect()
    }

    async fn queued_job_ids(&self) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            "SELECT id FROM generation_jobs WHERE status = 'queued' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    async fn claim_job(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'running', logs = logs || $2, updated_at = NOW()
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .bind(log_line("Job started"))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        outputs: Vec<NewDocument>,
        log: &str,
    ) -> Result<Option<GenerationJob>> {
        let mut tx = self.pool.begin().await?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM generation_jobs WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        if status.as_deref() != Some("running") {
            tx.rollback().await?;
            return Ok(None);
        }

        let mut uploaded = Vec::new();
        let mut cv_id = None;
        let mut cover_letter_id = None;
        for doc in outputs {
            match self.insert_document(&mut tx, doc).await {
                Ok((meta, key)) => {
                    uploaded.push(key);
                    match meta.doc_type {
                        DocType::GeneratedCv => cv_id = Some(meta.id),
                        DocType::CoverLetter => cover_letter_id = Some(meta.id),
                        DocType::SourceCv => {}
                    }
                }
                Err(e) => {
                    self.discard_blobs(&uploaded).await;
                    return Err(e);
                }
            }
        }

        let row = sqlx::query_as::<_, GenerationJobRow>(
            r#"
            UPDATE generation_jobs
            SET status = 'completed',
                output_cv_id = $2,
                output_cover_letter_id = $3,
                logs = logs || $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(cv_id)
        .bind(cover_letter_id)
        .bind(log_line(log))
        .fetch_one(&mut *tx)
        .await;

        let row = match row {
            Ok(row) => row,
            Err(e) => {
                self.discard_blobs(&uploaded).await;
                return Err(e.into());
            }
        };
        if let Err(e) = tx.commit().await {
            self.discard_blobs(&uploaded).await;
            return Err(e.into());
        }
        into_job(row).map(Some)
    }

    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'error', error_message = $2, logs = logs || $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'running')
            "#,
        )
        .bind(id)
        .bind(message)
        .bind(log_line(&format!("Error: {message}")))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn append_job_log(&self, id: Uuid, log: &str) -> Result<()> {
        sqlx::query(
            "UPDATE generation_jobs SET logs = logs || $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(log_line(log))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn expire_running_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>> {
        Ok(sqlx::query_scalar(
            r#"
            UPDATE generation_jobs
            SET status = 'error', error_message = $2, logs = logs || $3, updated_at = NOW()
            WHERE status = 'running' AND updated_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .bind(message)
        .bind(log_line(&format!("Error: {message}")))
        .fetch_all(&self.pool)
        .await?)
    }
}
