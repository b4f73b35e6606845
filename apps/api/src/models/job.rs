use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of a generation job.
///
/// `queued → running → completed | error`. `completed` and `error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `queued → error` is allowed so that the reaper can fail jobs that were
    /// never picked up and the worker can fail jobs whose inputs disappeared.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Queued, JobStatus::Error)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Error)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" | "done" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

/// Which documents a job should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[serde(alias = "generated_cv")]
    Cv,
    #[serde(alias = "cover")]
    CoverLetter,
    #[default]
    Both,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputKind::Cv => "cv",
            OutputKind::CoverLetter => "cover_letter",
            OutputKind::Both => "both",
        }
    }

    pub fn wants_cv(&self) -> bool {
        matches!(self, OutputKind::Cv | OutputKind::Both)
    }

    pub fn wants_cover_letter(&self) -> bool {
        matches!(self, OutputKind::CoverLetter | OutputKind::Both)
    }
}

impl FromStr for OutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cv" | "generated_cv" => Ok(OutputKind::Cv),
            "cover_letter" | "cover" => Ok(OutputKind::CoverLetter),
            "both" => Ok(OutputKind::Both),
            other => Err(format!("unknown output kind '{other}'")),
        }
    }
}

/// A single request to produce generated document(s).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_description_id: Uuid,
    pub source_document_id: Option<Uuid>,
    pub output_kind: OutputKind,
    pub template: String,
    pub status: JobStatus,
    pub output_cv_id: Option<Uuid>,
    pub output_cover_letter_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub logs: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationJob {
    /// A fresh job in the `queued` state with no outputs attached.
    pub fn queued(
        user_id: Uuid,
        job_description_id: Uuid,
        source_document_id: Option<Uuid>,
        output_kind: OutputKind,
        template: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            job_description_id,
            source_document_id,
            output_kind,
            template,
            status: JobStatus::Queued,
            output_cv_id: None,
            output_cover_letter_id: None,
            error_message: None,
            logs: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw `generation_jobs` row. Enum columns are stored as TEXT.
#[derive(Debug, Clone, FromRow)]
pub struct GenerationJobRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub job_description_id: Uuid,
    pub source_document_id: Option<Uuid>,
    pub output_kind: String,
    pub template: String,
    pub status: String,
    pub output_cv_id: Option<Uuid>,
    pub output_cover_letter_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub logs: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<GenerationJobRow> for GenerationJob {
    type Error = String;

    fn try_from(row: GenerationJobRow) -> Result<Self, Self::Error> {
        Ok(GenerationJob {
            id: row.id,
            user_id: row.user_id,
            job_description_id: row.job_description_id,
            source_document_id: row.source_document_id,
            output_kind: row.output_kind.parse()?,
            template: row.template,
            status: row.status.parse()?,
            output_cv_id: row.output_cv_id,
            output_cover_letter_id: row.output_cover_letter_id,
            error_message: row.error_message,
            logs: row.logs,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Error,
    ];

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{from} must not transition to {to}"
                );
            }
        }
    }

    #[test]
    fn test_happy_path_transitions_allowed() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Running.can_transition_to(JobStatus::Error));
        assert!(!JobStatus::Running.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_legacy_done_status_parses_as_completed() {
        assert_eq!("done".parse::<JobStatus>().unwrap(), JobStatus::Completed);
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_output_kind_aliases() {
        let kind: OutputKind = serde_json::from_str("\"cover\"").unwrap();
        assert_eq!(kind, OutputKind::CoverLetter);
        let kind: OutputKind = serde_json::from_str("\"generated_cv\"").unwrap();
        assert_eq!(kind, OutputKind::Cv);
        assert!(OutputKind::Both.wants_cv() && OutputKind::Both.wants_cover_letter());
        assert!(!OutputKind::Cv.wants_cover_letter());
    }

    #[test]
    fn test_new_job_is_queued_without_outputs() {
        let job = GenerationJob::queued(
            Uuid::new_v4(),
            Uuid::new_v4(),
            None,
            OutputKind::Both,
            "classic".to_string(),
        );
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.output_cv_id.is_none());
        assert!(job.output_cover_letter_id.is_none());
    }
}
