//! Generation job lifecycle: submit, advance, status.
//!
//! ```text
//! queued ──claim──▶ running ──complete──▶ completed
//!    │                 │
//!    └──────fail───────┴──────fail──────▶ error
//! ```
//!
//! Every transition goes through a conditional repository call, so the
//! orchestrator itself holds no locks and any number of workers may call
//! `advance` on the same id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::documents::extract::extract_text;
use crate::errors::AppError;
use crate::generation::generator::{
    Artifact, DocumentGenerator, GenerationError, GenerationInput,
};
use crate::generation::queue::JobQueue;
use crate::models::document::{DocType, NewDocument};
use crate::models::job::{GenerationJob, JobStatus, OutputKind};
use crate::store::Repository;

pub const DEFAULT_TEMPLATE: &str = "classic";
const MAX_TEMPLATE_LEN: usize = 64;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitRequest {
    pub job_description_id: Option<Uuid>,
    pub source_document_id: Option<Uuid>,
    pub output_kind: Option<OutputKind>,
    pub template: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// What a client polls for.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobStatusView {
    pub status: JobStatus,
    pub output_cover_letter_id: Option<Uuid>,
    pub output_cv_id: Option<Uuid>,
    pub error_message: Option<String>,
}

impl From<&GenerationJob> for JobStatusView {
    fn from(job: &GenerationJob) -> Self {
        Self {
            status: job.status,
            output_cover_letter_id: job.output_cover_letter_id,
            output_cv_id: job.output_cv_id,
            error_message: job.error_message.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Completed(GenerationJob),
    Failed { message: String },
    /// Another worker owns the job, or it already finished.
    Skipped { status: Option<JobStatus> },
}

pub struct Orchestrator {
    repo: Arc<dyn Repository>,
    generator: Arc<dyn DocumentGenerator>,
    queue: Arc<dyn JobQueue>,
    job_timeout: Option<Duration>,
}

impl Orchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        generator: Arc<dyn DocumentGenerator>,
        queue: Arc<dyn JobQueue>,
        job_timeout: Option<Duration>,
    ) -> Self {
        Self {
            repo,
            generator,
            queue,
            job_timeout,
        }
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Validates ownership of the inputs, records a `queued` job and hands its
    /// id to the workers. Nothing is written when validation fails.
    pub async fn submit(
        &self,
        user_id: Uuid,
        request: SubmitRequest,
    ) -> Result<SubmitResponse, AppError> {
        let jd_id = request
            .job_description_id
            .ok_or_else(|| AppError::Validation("job_description_id is required".to_string()))?;

        let template = validate_template(request.template.as_deref())?;

        if self.repo.get_job_description(user_id, jd_id).await?.is_none() {
            return Err(AppError::Validation(format!(
                "Job description {jd_id} does not exist"
            )));
        }

        if let Some(doc_id) = request.source_document_id {
            if self.repo.get_document_meta(user_id, doc_id).await?.is_none() {
                return Err(AppError::NotFound(format!("Document {doc_id} not found")));
            }
        }

        let job = GenerationJob::queued(
            user_id,
            jd_id,
            request.source_document_id,
            request.output_kind.unwrap_or_default(),
            template,
        );
        self.repo.insert_job(&job).await?;
        info!(
            job_id = %job.id,
            output_kind = job.output_kind.as_str(),
            "Generation job queued"
        );

        if let Err(e) = self.queue.enqueue(job.id).await {
            // The row is committed; startup recovery will pick it up.
            warn!(job_id = %job.id, "Failed to enqueue generation job: {e:#}");
        }

        Ok(SubmitResponse {
            job_id: job.id,
            status: job.status,
        })
    }

    pub async fn get_status(&self, user_id: Uuid, job_id: Uuid) -> Result<JobStatusView, AppError> {
        let job = self
            .repo
            .get_job(user_id, job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;
        Ok(JobStatusView::from(&job))
    }

    /// Runs one job to a terminal state. Safe to call concurrently and
    /// repeatedly for the same id.
    pub async fn advance(&self, job_id: Uuid) -> anyhow::Result<AdvanceOutcome> {
        if !self.repo.claim_job(job_id).await? {
            let status = self.repo.find_job(job_id).await?.map(|j| j.status);
            debug!(%job_id, ?status, "Job not claimable, skipping");
            return Ok(AdvanceOutcome::Skipped { status });
        }

        // From here on the job is ours: every exit must leave it terminal.
        let job = match self.repo.find_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => return Ok(AdvanceOutcome::Skipped { status: None }),
            Err(e) => return self.fail(job_id, format!("Storage error: {e:#}")).await,
        };
        info!(%job_id, provider = self.generator.provider(), "Job started");

        let work = self.generate_outputs(&job);
        let result = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(GenerationError::TimedOut(limit)),
            },
            None => work.await,
        };

        let outputs = match result {
            Ok(outputs) => outputs,
            Err(e) => return self.fail(job_id, e.to_string()).await,
        };

        match self.repo.complete_job(job_id, outputs, "Job finished").await {
            Ok(Some(done)) => {
                info!(%job_id, "Job completed");
                Ok(AdvanceOutcome::Completed(done))
            }
            Ok(None) => {
                let status = self.repo.find_job(job_id).await?.map(|j| j.status);
                warn!(
                    %job_id,
                    ?status,
                    "Job left running state before completion, outputs discarded"
                );
                Ok(AdvanceOutcome::Skipped { status })
            }
            Err(e) => self.fail(job_id, format!("Storage error: {e:#}")).await,
        }
    }

    /// `queued | running → error`. A no-op on the row when the job is already terminal.
    async fn fail(&self, job_id: Uuid, message: String) -> anyhow::Result<AdvanceOutcome> {
        warn!(%job_id, "Job failed: {message}");
        self.repo.fail_job(job_id, &message).await?;
        Ok(AdvanceOutcome::Failed { message })
    }

    async fn generate_outputs(
        &self,
        job: &GenerationJob,
    ) -> Result<Vec<NewDocument>, GenerationError> {
        let jd = self
            .repo
            .get_job_description(job.user_id, job.job_description_id)
            .await?
            .ok_or_else(|| {
                GenerationError::MissingInput(format!(
                    "job description {} no longer exists",
                    job.job_description_id
                ))
            })?;

        let source_text = match job.source_document_id {
            Some(doc_id) => {
                let doc = self
                    .repo
                    .get_document(job.user_id, doc_id)
                    .await?
                    .ok_or_else(|| {
                        GenerationError::MissingInput(format!("document {doc_id} no longer exists"))
                    })?;
                let text =
                    tokio::task::spawn_blocking(move || extract_text(&doc.meta, &doc.content))
                        .await
                        .map_err(|e| anyhow::anyhow!("extraction task failed: {e}"))??;
                Some(text)
            }
            None => None,
        };

        let input = GenerationInput {
            jd_text: &jd.text,
            source_text: source_text.as_deref(),
            template: &job.template,
        };

        let mut outputs = Vec::new();
        if job.output_kind.wants_cover_letter() {
            let text = self.generate_one(job.id, &input, Artifact::CoverLetter).await?;
            outputs.push(NewDocument::text(
                job.user_id,
                DocType::CoverLetter,
                format!("cover_letter_{}.txt", job.id),
                text,
            ));
        }
        if job.output_kind.wants_cv() {
            let text = self.generate_one(job.id, &input, Artifact::Cv).await?;
            outputs.push(NewDocument::text(
                job.user_id,
                DocType::GeneratedCv,
                format!("generated_cv_{}.txt", job.id),
                text,
            ));
        }
        Ok(outputs)
    }

    async fn generate_one(
        &self,
        job_id: Uuid,
        input: &GenerationInput<'_>,
        artifact: Artifact,
    ) -> Result<String, GenerationError> {
        let started = Instant::now();
        let text = self.generator.generate(input, artifact).await?;
        let elapsed_ms = started.elapsed().as_millis();
        self.repo
            .append_job_log(
                job_id,
                &format!(
                    "{} generated via {} in {elapsed_ms}ms",
                    artifact.label(),
                    self.generator.provider()
                ),
            )
            .await?;
        Ok(text)
    }
}

fn validate_template(template: Option<&str>) -> Result<String, AppError> {
    let template = template.map(str::trim).filter(|t| !t.is_empty());
    let Some(template) = template else {
        return Ok(DEFAULT_TEMPLATE.to_string());
    };
    let valid = template.len() <= MAX_TEMPLATE_LEN
        && template
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if !valid {
        return Err(AppError::Validation(format!(
            "template must be at most {MAX_TEMPLATE_LEN} characters of [a-z0-9_-]"
        )));
    }
    Ok(template.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use crate::generation::generator::DryRunGenerator;
    use crate::generation::queue::ChannelJobQueue;
    use crate::llm_client::LlmError;
    use crate::models::document::{Document, DocumentMeta};
    use crate::models::job_description::JobDescription;
    use crate::store::MemoryRepository;

    struct FailingGenerator;

    #[async_trait]
    impl DocumentGenerator for FailingGenerator {
        fn provider(&self) -> &'static str {
            "failing"
        }

        async fn generate(
            &self,
            _input: &GenerationInput<'_>,
            _artifact: Artifact,
        ) -> Result<String, GenerationError> {
            Err(GenerationError::Llm(LlmError::EmptyContent))
        }
    }

    /// Never finishes; used to exercise the timeout.
    struct StalledGenerator;

    #[async_trait]
    impl DocumentGenerator for StalledGenerator {
        fn provider(&self) -> &'static str {
            "stalled"
        }

        async fn generate(
            &self,
            _input: &GenerationInput<'_>,
            _artifact: Artifact,
        ) -> Result<String, GenerationError> {
            std::future::pending().await
        }
    }

    /// Delegates to `MemoryRepository`, failing the selected calls.
    #[derive(Default)]
    struct BrokenStore {
        inner: MemoryRepository,
        fail_completion: bool,
        fail_lookup: bool,
    }

    fn storage_down() -> anyhow::Error {
        anyhow::anyhow!("S3 upload failed: connection reset")
    }

    #[async_trait]
    impl Repository for BrokenStore {
        async fn create_job_description(
            &self,
            user_id: Uuid,
            text: &str,
        ) -> anyhow::Result<JobDescription> {
            self.inner.create_job_description(user_id, text).await
        }

        async fn get_job_description(
            &self,
            user_id: Uuid,
            id: Uuid,
        ) -> anyhow::Result<Option<JobDescription>> {
            self.inner.get_job_description(user_id, id).await
        }

        async fn list_job_descriptions(
            &self,
            user_id: Uuid,
            limit: i64,
        ) -> anyhow::Result<Vec<JobDescription>> {
            self.inner.list_job_descriptions(user_id, limit).await
        }

        async fn create_document(&self, doc: NewDocument) -> anyhow::Result<DocumentMeta> {
            self.inner.create_document(doc).await
        }

        async fn get_document_meta(
            &self,
            user_id: Uuid,
            id: Uuid,
        ) -> anyhow::Result<Option<DocumentMeta>> {
            self.inner.get_document_meta(user_id, id).await
        }

        async fn get_document(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<Document>> {
            self.inner.get_document(user_id, id).await
        }

        async fn list_documents(
            &self,
            user_id: Uuid,
            doc_type: DocType,
        ) -> anyhow::Result<Vec<DocumentMeta>> {
            self.inner.list_documents(user_id, doc_type).await
        }

        async fn insert_job(&self, job: &GenerationJob) -> anyhow::Result<()> {
            self.inner.insert_job(job).await
        }

        async fn get_job(&self, user_id: Uuid, id: Uuid) -> anyhow::Result<Option<GenerationJob>> {
            self.inner.get_job(user_id, id).await
        }

        async fn find_job(&self, id: Uuid) -> anyhow::Result<Option<GenerationJob>> {
            if self.fail_lookup {
                return Err(storage_down());
            }
            self.inner.find_job(id).await
        }

        async fn list_jobs(&self, user_id: Uuid, limit: i64) -> anyhow::Result<Vec<GenerationJob>> {
            self.inner.list_jobs(user_id, limit).await
        }

        async fn queued_job_ids(&self) -> anyhow::Result<Vec<Uuid>> {
            self.inner.queued_job_ids().await
        }

        async fn claim_job(&self, id: Uuid) -> anyhow::Result<bool> {
            self.inner.claim_job(id).await
        }

        async fn complete_job(
            &self,
            id: Uuid,
            outputs: Vec<NewDocument>,
            log: &str,
        ) -> anyhow::Result<Option<GenerationJob>> {
            if self.fail_completion {
                return Err(storage_down());
            }
            self.inner.complete_job(id, outputs, log).await
        }

        async fn fail_job(&self, id: Uuid, message: &str) -> anyhow::Result<bool> {
            self.inner.fail_job(id, message).await
        }

        async fn append_job_log(&self, id: Uuid, log: &str) -> anyhow::Result<()> {
            self.inner.append_job_log(id, log).await
        }

        async fn expire_running_jobs(
            &self,
            cutoff: DateTime<Utc>,
            message: &str,
        ) -> anyhow::Result<Vec<Uuid>> {
            self.inner.expire_running_jobs(cutoff, message).await
        }
    }

    async fn assert_storage_failure_ends_in_error(store: BrokenStore) {
        let repo = Arc::new(store);
        let user = Uuid::new_v4();
        let jd = repo
            .create_job_description(user, "Site reliability engineer")
            .await
            .unwrap();
        let orch = Orchestrator::new(
            repo.clone(),
            Arc::new(DryRunGenerator),
            Arc::new(ChannelJobQueue::new()),
            None,
        );

        let job = orch.submit(user, request(jd.id, None, OutputKind::Both)).await.unwrap();
        let outcome = orch.advance(job.job_id).await.unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Failed {
                message: "Storage error: S3 upload failed: connection reset".to_string()
            }
        );

        let view = orch.get_status(user, job.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Error);
        assert!(view.output_cv_id.is_none() && view.output_cover_letter_id.is_none());
        assert!(repo
            .list_documents(user, DocType::GeneratedCv)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_completion_storage_failure_fails_the_job() {
        assert_storage_failure_ends_in_error(BrokenStore {
            fail_completion: true,
            ..Default::default()
        })
        .await;
    }

    #[tokio::test]
    async fn test_lookup_failure_after_claim_fails_the_job() {
        assert_storage_failure_ends_in_error(BrokenStore {
            fail_lookup: true,
            ..Default::default()
        })
        .await;
    }

    fn orchestrator_with(
        repo: Arc<MemoryRepository>,
        generator: Arc<dyn DocumentGenerator>,
        job_timeout: Option<Duration>,
    ) -> Orchestrator {
        Orchestrator::new(repo, generator, Arc::new(ChannelJobQueue::new()), job_timeout)
    }

    async fn seed(repo: &MemoryRepository, user: Uuid) -> (Uuid, Uuid) {
        let jd = repo
            .create_job_description(user, "Senior Rust engineer, async services")
            .await
            .unwrap();
        let cv = repo
            .create_document(NewDocument::text(
                user,
                DocType::SourceCv,
                "cv.txt".to_string(),
                "Jane Doe. Eight years of systems work.".to_string(),
            ))
            .await
            .unwrap();
        (jd.id, cv.id)
    }

    fn request(jd: Uuid, source: Option<Uuid>, kind: OutputKind) -> SubmitRequest {
        SubmitRequest {
            job_description_id: Some(jd),
            source_document_id: source,
            output_kind: Some(kind),
            template: Some("classic".to_string()),
        }
    }

    #[tokio::test]
    async fn test_submit_then_advance_completes_with_both_outputs() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, cv) = seed(&repo, user).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(DryRunGenerator), None);

        let submitted = orch
            .submit(user, request(jd, Some(cv), OutputKind::Both))
            .await
            .unwrap();
        assert_eq!(submitted.status, JobStatus::Queued);

        let view = orch.get_status(user, submitted.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Queued);
        assert!(view.output_cv_id.is_none() && view.output_cover_letter_id.is_none());

        let outcome = orch.advance(submitted.job_id).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Completed(_)));

        let view = orch.get_status(user, submitted.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        let cv_id = view.output_cv_id.unwrap();
        let letter_id = view.output_cover_letter_id.unwrap();

        let cv_doc = repo.get_document(user, cv_id).await.unwrap().unwrap();
        assert_eq!(cv_doc.meta.doc_type, DocType::GeneratedCv);
        assert_eq!(cv_doc.meta.version, 1);
        assert!(String::from_utf8_lossy(&cv_doc.content).contains("Jane Doe"));

        let letter = repo.get_document_meta(user, letter_id).await.unwrap().unwrap();
        assert_eq!(letter.doc_type, DocType::CoverLetter);

        let job = repo.find_job(submitted.job_id).await.unwrap().unwrap();
        assert!(job.logs.contains("Job started"));
        assert!(job.logs.contains("Cover letter generated via dry-run"));
        assert!(job.logs.contains("Job finished"));
    }

    #[tokio::test]
    async fn test_single_output_kind_attaches_only_that_output() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, _) = seed(&repo, user).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(DryRunGenerator), None);

        let job = orch
            .submit(user, request(jd, None, OutputKind::CoverLetter))
            .await
            .unwrap();
        orch.advance(job.job_id).await.unwrap();

        let view = orch.get_status(user, job.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert!(view.output_cover_letter_id.is_some());
        assert!(view.output_cv_id.is_none());
    }

    #[tokio::test]
    async fn test_foreign_source_document_is_not_found_and_creates_no_job() {
        let repo = Arc::new(MemoryRepository::new());
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let (_, owners_cv) = seed(&repo, owner).await;
        let (intruders_jd, _) = seed(&repo, intruder).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(DryRunGenerator), None);

        let err = orch
            .submit(intruder, request(intruders_jd, Some(owners_cv), OutputKind::Both))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(repo.list_jobs(intruder, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_foreign_job_description_is_validation_error() {
        let repo = Arc::new(MemoryRepository::new());
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let (jd, _) = seed(&repo, owner).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(DryRunGenerator), None);

        let err = orch.submit(other, request(jd, None, OutputKind::Both)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = orch.submit(owner, SubmitRequest::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(repo.list_jobs(owner, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_template_is_rejected() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, _) = seed(&repo, user).await;
        let orch = orchestrator_with(repo, Arc::new(DryRunGenerator), None);

        let mut req = request(jd, None, OutputKind::Cv);
        req.template = Some("../etc/passwd".to_string());
        assert!(matches!(
            orch.submit(user, req).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[test]
    fn test_template_defaults_to_classic() {
        assert_eq!(validate_template(None).unwrap(), "classic");
        assert_eq!(validate_template(Some("  ")).unwrap(), "classic");
        assert_eq!(validate_template(Some("modern-2")).unwrap(), "modern-2");
        assert!(validate_template(Some("Modern")).is_err());
    }

    #[tokio::test]
    async fn test_status_of_foreign_job_is_not_found() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, _) = seed(&repo, user).await;
        let orch = orchestrator_with(repo, Arc::new(DryRunGenerator), None);

        let job = orch.submit(user, request(jd, None, OutputKind::Both)).await.unwrap();
        let err = orch.get_status(Uuid::new_v4(), job.job_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_generator_failure_records_error_without_outputs() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, cv) = seed(&repo, user).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(FailingGenerator), None);

        let first = orch.submit(user, request(jd, Some(cv), OutputKind::Both)).await.unwrap();
        let outcome = orch.advance(first.job_id).await.unwrap();
        assert!(matches!(outcome, AdvanceOutcome::Failed { .. }));

        let view = orch.get_status(user, first.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Error);
        assert!(view.error_message.is_some());
        assert!(view.output_cv_id.is_none() && view.output_cover_letter_id.is_none());
        assert!(repo
            .list_documents(user, DocType::CoverLetter)
            .await
            .unwrap()
            .is_empty());

        // Retrying means a brand new job.
        let second = orch.submit(user, request(jd, Some(cv), OutputKind::Both)).await.unwrap();
        assert_ne!(first.job_id, second.job_id);
        assert_eq!(second.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_advanced_again() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, _) = seed(&repo, user).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(DryRunGenerator), None);

        let job = orch.submit(user, request(jd, None, OutputKind::Cv)).await.unwrap();
        orch.advance(job.job_id).await.unwrap();
        let before = orch.get_status(user, job.job_id).await.unwrap();

        let outcome = orch.advance(job.job_id).await.unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Skipped {
                status: Some(JobStatus::Completed)
            }
        );
        assert_eq!(orch.get_status(user, job.job_id).await.unwrap(), before);
        assert_eq!(
            repo.list_documents(user, DocType::GeneratedCv).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_advance_produces_one_set_of_outputs() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, cv) = seed(&repo, user).await;
        let orch = orchestrator_with(repo.clone(), Arc::new(DryRunGenerator), None);

        let job = orch.submit(user, request(jd, Some(cv), OutputKind::Both)).await.unwrap();
        let (a, b) = tokio::join!(orch.advance(job.job_id), orch.advance(job.job_id));
        let completed = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|o| matches!(o, AdvanceOutcome::Completed(_)))
            .count();
        assert_eq!(completed, 1);

        assert_eq!(repo.list_documents(user, DocType::GeneratedCv).await.unwrap().len(), 1);
        assert_eq!(repo.list_documents(user, DocType::CoverLetter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_status_is_stable_between_polls() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, _) = seed(&repo, user).await;
        let orch = orchestrator_with(repo, Arc::new(DryRunGenerator), None);

        let job = orch.submit(user, request(jd, None, OutputKind::Both)).await.unwrap();
        let a = orch.get_status(user, job.job_id).await.unwrap();
        let b = orch.get_status(user, job.job_id).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_generation_times_out_into_error() {
        let repo = Arc::new(MemoryRepository::new());
        let user = Uuid::new_v4();
        let (jd, _) = seed(&repo, user).await;
        let orch = orchestrator_with(
            repo.clone(),
            Arc::new(StalledGenerator),
            Some(Duration::from_secs(60)),
        );

        let job = orch.submit(user, request(jd, None, OutputKind::Both)).await.unwrap();
        let outcome = orch.advance(job.job_id).await.unwrap();
        assert_eq!(
            outcome,
            AdvanceOutcome::Failed {
                message: "Generation timed out after 60s".to_string()
            }
        );
        let view = orch.get_status(user, job.job_id).await.unwrap();
        assert_eq!(view.status, JobStatus::Error);
    }
}
