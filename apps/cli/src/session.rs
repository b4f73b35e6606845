//! Session-scoped client state.
//!
//! A `Session` is created by `login`, dropped by `logout`, and passed
//! explicitly to whatever needs the token or the job records. It is persisted
//! as JSON by `SessionStore`.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::api::{JobStatus, JobStatusView};
use crate::error::ClientError;

/// Tokens handed out by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Last known state of a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub output_cover_letter_id: Option<Uuid>,
    pub output_cv_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn queued(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Queued,
            output_cover_letter_id: None,
            output_cv_id: None,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    /// Applies a server view. Returns whether anything changed.
    pub fn apply(&mut self, view: &JobStatusView) -> bool {
        let changed = self.status != view.status
            || self.output_cover_letter_id != view.output_cover_letter_id
            || self.output_cv_id != view.output_cv_id
            || self.error_message != view.error_message;
        if changed {
            self.status = view.status;
            self.output_cover_letter_id = view.output_cover_letter_id;
            self.output_cv_id = view.output_cv_id;
            self.error_message = view.error_message.clone();
            self.updated_at = Utc::now();
        }
        changed
    }

    pub fn has_outputs(&self) -> bool {
        self.output_cv_id.is_some() || self.output_cover_letter_id.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    tokens: Option<TokenPair>,
    #[serde(default)]
    jobs: BTreeMap<Uuid, JobRecord>,
}

impl Session {
    /// A fresh session. Job records from any previous login are not carried over.
    pub fn login(tokens: TokenPair) -> Self {
        Self {
            tokens: Some(tokens),
            jobs: BTreeMap::new(),
        }
    }

    pub fn logout(&mut self) {
        *self = Session::default();
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access_token.as_str())
    }

    pub fn is_signed_in(&self) -> bool {
        self.tokens.is_some()
    }

    /// Records a just-submitted job as `queued` with no outputs.
    pub fn record_submitted(&mut self, job_id: Uuid) -> &JobRecord {
        self.jobs
            .entry(job_id)
            .or_insert_with(|| JobRecord::queued(job_id))
    }

    pub fn upsert_job(&mut self, record: JobRecord) {
        self.jobs.insert(record.job_id, record);
    }

    pub fn job(&self, job_id: Uuid) -> Option<&JobRecord> {
        self.jobs.get(&job_id)
    }

    /// Most recently updated first.
    pub fn jobs(&self) -> Vec<&JobRecord> {
        let mut jobs: Vec<_> = self.jobs.values().collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        jobs
    }
}

/// JSON file holding the current `Session`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Platform data dir, or the working directory when none is available.
    pub fn default_path() -> PathBuf {
        match directories::ProjectDirs::from("", "", "resumeai") {
            Some(dirs) => dirs.data_dir().join("session.json"),
            None => PathBuf::from("resumeai-session.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty, signed-out session.
    pub fn load(&self) -> Result<Session, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| {
                ClientError::Session(format!("{} is corrupt: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Session::default()),
            Err(e) => Err(ClientError::Session(format!(
                "Failed to read {}: {e}",
                self.path.display()
            ))),
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::Session(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        let raw = serde_json::to_string_pretty(session)
            .map_err(|e| ClientError::Session(e.to_string()))?;
        std::fs::write(&self.path, raw).map_err(|e| {
            ClientError::Session(format!("Failed to write {}: {e}", self.path.display()))
        })?;
        debug!("Session saved to {}", self.path.display());
        Ok(())
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Session(format!(
                "Failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens() -> TokenPair {
        TokenPair {
            access_token: "access".to_string(),
            refresh_token: None,
        }
    }

    #[test]
    fn test_missing_file_is_signed_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/session.json"));
        let session = store.load().unwrap();
        assert!(!session.is_signed_in());
        assert!(session.jobs().is_empty());
    }

    #[test]
    fn test_login_save_load_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("nested/session.json"));

        let mut session = Session::login(tokens());
        let job_id = Uuid::new_v4();
        session.record_submitted(job_id);
        store.save(&session).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.access_token(), Some("access"));
        assert_eq!(loaded.job(job_id).unwrap().status, JobStatus::Queued);

        store.clear().unwrap();
        assert!(!store.load().unwrap().is_signed_in());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_token_pair_refresh_token_is_optional() {
        let parsed: TokenPair = serde_json::from_str(r#"{"access_token":"a"}"#).unwrap();
        assert_eq!(parsed, TokenPair { access_token: "a".to_string(), refresh_token: None });
    }

    #[test]
    fn test_logout_drops_tokens_and_jobs() {
        let mut session = Session::login(tokens());
        session.record_submitted(Uuid::new_v4());
        session.logout();
        assert_eq!(session, Session::default());
    }

    #[test]
    fn test_record_submitted_does_not_reset_known_job() {
        let mut session = Session::login(tokens());
        let job_id = Uuid::new_v4();
        session.record_submitted(job_id);

        let mut record = session.job(job_id).unwrap().clone();
        record.status = JobStatus::Running;
        session.upsert_job(record);

        assert_eq!(session.record_submitted(job_id).status, JobStatus::Running);
    }

    #[test]
    fn test_applying_same_view_twice_is_idempotent() {
        let mut record = JobRecord::queued(Uuid::new_v4());
        let view = JobStatusView {
            status: JobStatus::Completed,
            output_cover_letter_id: Some(Uuid::new_v4()),
            output_cv_id: None,
            error_message: None,
        };
        assert!(record.apply(&view));
        let snapshot = record.clone();
        assert!(!record.apply(&view));
        assert_eq!(record, snapshot);
    }
}
