//! In-memory repository. One mutex guards all state, which makes every
//! conditional transition trivially atomic.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::document::{DocType, Document, DocumentMeta, NewDocument};
use crate::models::job::{GenerationJob, JobStatus};
use crate::models::job_description::JobDescription;
use crate::store::{log_line, Repository};

#[derive(Default)]
struct State {
    job_descriptions: HashMap<Uuid, JobDescription>,
    documents: HashMap<Uuid, Document>,
    jobs: HashMap<Uuid, GenerationJob>,
}

impl State {
    fn next_version(&self, user_id: Uuid, doc_type: DocType) -> i32 {
        self.documents
            .values()
            .filter(|d| d.meta.user_id == user_id && d.meta.doc_type == doc_type)
            .map(|d| d.meta.version)
            .max()
            .unwrap_or(0)
            + 1
    }

    fn insert_document(&mut self, doc: NewDocument) -> DocumentMeta {
        let meta = DocumentMeta {
            id: Uuid::new_v4(),
            user_id: doc.user_id,
            doc_type: doc.doc_type,
            version: self.next_version(doc.user_id, doc.doc_type),
            file_name: doc.file_name,
            content_type: doc.content_type,
            created_at: Utc::now(),
        };
        self.documents.insert(
            meta.id,
            Document {
                meta: meta.clone(),
                content: doc.content,
            },
        );
        meta
    }
}

#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_job_description(&self, user_id: Uuid, text: &str) -> Result<JobDescription> {
        let jd = JobDescription {
            id: Uuid::new_v4(),
            user_id,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .job_descriptions
            .insert(jd.id, jd.clone());
        Ok(jd)
    }

    async fn get_job_description(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<JobDescription>> {
        let state = self.state.lock().await;
        Ok(state
            .job_descriptions
            .get(&id)
            .filter(|jd| jd.user_id == user_id)
            .cloned())
    }

    async fn list_job_descriptions(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> Result<Vec<JobDescription>> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .job_descriptions
            .values()
            .filter(|jd| jd.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn create_document(&self, doc: NewDocument) -> Result<DocumentMeta> {
        Ok(self.state.lock().await.insert_document(doc))
    }

    async fn get_document_meta(&self, user_id: Uuid, id: Uuid) -> Result<Option<DocumentMeta>> {
        Ok(self
            .get_document(user_id, id)
            .await?
            .map(|document| document.meta))
    }

    async fn get_document(&self, user_id: Uuid, id: Uuid) -> Result<Option<Document>> {
        let state = self.state.lock().await;
        Ok(state
            .documents
            .get(&id)
            .filter(|d| d.meta.user_id == user_id)
            .cloned())
    }

    async fn list_documents(&self, user_id: Uuid, doc_type: DocType) -> Result<Vec<DocumentMeta>> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .documents
            .values()
            .filter(|d| d.meta.user_id == user_id && d.meta.doc_type == doc_type)
            .map(|d| d.meta.clone())
            .collect();
        items.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(items)
    }

    async fn insert_job(&self, job: &GenerationJob) -> Result<()> {
        self.state.lock().await.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, user_id: Uuid, id: Uuid) -> Result<Option<GenerationJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .get(&id)
            .filter(|j| j.user_id == user_id)
            .cloned())
    }

    async fn find_job(&self, id: Uuid) -> Result<Option<GenerationJob>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn list_jobs(&self, user_id: Uuid, limit: i64) -> Result<Vec<GenerationJob>> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .jobs
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn queued_job_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut queued: Vec<_> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .collect();
        queued.sort_by_key(|j| j.created_at);
        Ok(queued.into_iter().map(|j| j.id).collect())
    }

    async fn claim_job(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        job.status = JobStatus::Running;
        job.logs.push_str(&log_line("Job started"));
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn complete_job(
        &self,
        id: Uuid,
        outputs: Vec<NewDocument>,
        log: &str,
    ) -> Result<Option<GenerationJob>> {
        let mut state = self.state.lock().await;
        match state.jobs.get(&id) {
            Some(job) if job.status == JobStatus::Running => {}
            _ => return Ok(None),
        }

        let mut cv_id = None;
        let mut cover_letter_id = None;
        for doc in outputs {
            let meta = state.insert_document(doc);
            match meta.doc_type {
                DocType::GeneratedCv => cv_id = Some(meta.id),
                DocType::CoverLetter => cover_letter_id = Some(meta.id),
                DocType::SourceCv => {}
            }
        }

        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.status = JobStatus::Completed;
        job.output_cv_id = cv_id;
        job.output_cover_letter_id = cover_letter_id;
        job.logs.push_str(&log_line(log));
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn fail_job(&self, id: Uuid, message: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if !job.status.can_transition_to(JobStatus::Error) {
            return Ok(false);
        }
        job.status = JobStatus::Error;
        job.error_message = Some(message.to_string());
        job.logs.push_str(&log_line(&format!("Error: {message}")));
        job.updated_at = Utc::now();
        Ok(true)
    }

    async fn append_job_log(&self, id: Uuid, log: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(job) = state.jobs.get_mut(&id) {
            job.logs.push_str(&log_line(log));
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn expire_running_jobs(
        &self,
        cutoff: DateTime<Utc>,
        message: &str,
    ) -> Result<Vec<Uuid>> {
        let mut state = self.state.lock().await;
        let mut expired = Vec::new();
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Running && job.updated_at < cutoff {
                job.status = JobStatus::Error;
                job.error_message = Some(message.to_string());
                job.logs.push_str(&log_line(&format!("Error: {message}")));
                job.updated_at = Utc::now();
                expired.push(job.id);
            }
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::OutputKind;

    fn text_doc(user_id: Uuid, doc_type: DocType, body: &str) -> NewDocument {
        NewDocument::text(user_id, doc_type, "doc.txt".to_string(), body.to_string())
    }

    async fn running_job(repo: &MemoryRepository, user_id: Uuid) -> GenerationJob {
        let jd = repo.create_job_description(user_id, "Rust engineer").await.unwrap();
        let job = GenerationJob::queued(user_id, jd.id, None, OutputKind::Both, "classic".into());
        repo.insert_job(&job).await.unwrap();
        assert!(repo.claim_job(job.id).await.unwrap());
        job
    }

    #[tokio::test]
    async fn test_versions_increase_per_lineage() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();

        let v1 = repo.create_document(text_doc(user, DocType::CoverLetter, "a")).await.unwrap();
        let v2 = repo.create_document(text_doc(user, DocType::CoverLetter, "b")).await.unwrap();
        let cv = repo.create_document(text_doc(user, DocType::GeneratedCv, "c")).await.unwrap();
        let theirs = repo.create_document(text_doc(other, DocType::CoverLetter, "d")).await.unwrap();

        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(cv.version, 1);
        assert_eq!(theirs.version, 1);

        let listed = repo.list_documents(user, DocType::CoverLetter).await.unwrap();
        assert_eq!(listed.iter().map(|d| d.version).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_documents_are_scoped_to_owner() {
        let repo = MemoryRepository::new();
        let owner = Uuid::new_v4();
        let meta = repo.create_document(text_doc(owner, DocType::SourceCv, "cv")).await.unwrap();

        assert!(repo.get_document(owner, meta.id).await.unwrap().is_some());
        assert!(repo.get_document(Uuid::new_v4(), meta.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let job = running_job(&repo, user).await;
        assert!(!repo.claim_job(job.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_completion_is_rejected_and_persists_nothing() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let job = running_job(&repo, user).await;

        let outputs = || {
            vec![
                text_doc(user, DocType::CoverLetter, "cover"),
                text_doc(user, DocType::GeneratedCv, "cv"),
            ]
        };
        let first = repo.complete_job(job.id, outputs(), "Job finished").await.unwrap();
        let second = repo.complete_job(job.id, outputs(), "Job finished").await.unwrap();

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(repo.list_documents(user, DocType::CoverLetter).await.unwrap().len(), 1);
        assert_eq!(repo.list_documents(user, DocType::GeneratedCv).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fail_does_not_touch_terminal_jobs() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let job = running_job(&repo, user).await;

        repo.complete_job(job.id, vec![text_doc(user, DocType::CoverLetter, "x")], "Job finished")
            .await
            .unwrap();
        assert!(!repo.fail_job(job.id, "late failure").await.unwrap());

        let stored = repo.find_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_expire_only_hits_stale_running_jobs() {
        let repo = MemoryRepository::new();
        let user = Uuid::new_v4();
        let stale = running_job(&repo, user).await;

        let expired = repo
            .expire_running_jobs(Utc::now() + chrono::Duration::seconds(1), "timed out")
            .await
            .unwrap();
        assert_eq!(expired, vec![stale.id]);

        let none = repo
            .expire_running_jobs(Utc::now() + chrono::Duration::seconds(1), "timed out")
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
