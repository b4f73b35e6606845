//! Document generators — the AI backend behind a generation job.
//!
//! `AppState` holds an `Arc<dyn DocumentGenerator>`, chosen once at startup:
//! `DryRunGenerator` (deterministic stub, default) or `LlmGenerator`.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::documents::extract::ExtractError;
use crate::generation::prompts::{build_cover_letter_prompt, build_cv_prompt};
use crate::llm_client::prompts::WRITER_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};

/// Length of the JD / CV excerpts embedded in dry-run output.
const EXCERPT_CHARS: usize = 500;

/// Anything that can make a job end in `error`.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("AI provider call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Could not read source document: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Generation timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// A single document a job can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    CoverLetter,
    Cv,
}

impl Artifact {
    pub fn label(&self) -> &'static str {
        match self {
            Artifact::CoverLetter => "Cover letter",
            Artifact::Cv => "Generated CV",
        }
    }
}

/// Inputs shared by every artifact of one job.
#[derive(Debug, Clone)]
pub struct GenerationInput<'a> {
    pub jd_text: &'a str,
    pub source_text: Option<&'a str>,
    pub template: &'a str,
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Short provider name recorded in job logs.
    fn provider(&self) -> &'static str;

    async fn generate(
        &self,
        input: &GenerationInput<'_>,
        artifact: Artifact,
    ) -> Result<String, GenerationError>;
}

// ────────────────────────────────────────────────────────────────────────────
// DryRunGenerator
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic ATS-style placeholder content. No external calls.
pub struct DryRunGenerator;

fn excerpt(text: &str) -> String {
    text.trim().chars().take(EXCERPT_CHARS).collect()
}

#[async_trait]
impl DocumentGenerator for DryRunGenerator {
    fn provider(&self) -> &'static str {
        "dry-run"
    }

    async fn generate(
        &self,
        input: &GenerationInput<'_>,
        artifact: Artifact,
    ) -> Result<String, GenerationError> {
        let jd = excerpt(input.jd_text);
        let cv = excerpt(input.source_text.unwrap_or_default());
        let body = match artifact {
            Artifact::CoverLetter => format!(
                "Cover Letter (Stub) - ATS-style\n\n\
                 Dear Hiring Manager,\n\n\
                 I'm excited to apply for this opportunity. My background aligns closely \
                 with the role and the outcomes you're targeting.\n\n\
                 - Delivered results aligned with the job description (example placeholder).\n\
                 - Led initiatives with measurable impact (example placeholder).\n\
                 - Collaborated cross-functionally to improve KPIs (example placeholder).\n\n\
                 I'd welcome the chance to discuss how my experience can support your team.\n\n\
                 Sincerely,\nYour Name\n\n\
                 JD Excerpt:\n{jd}\n\n\
                 CV Excerpt:\n{cv}\n"
            ),
            Artifact::Cv => format!(
                "Generated CV (Stub) - ATS-style\n\n\
                 Template: {template}\n\n\
                 NAME & CONTACT\nYour Name | email@example.com | City, ST\n\n\
                 SUMMARY\n3-4 lines tailored to the job description.\n\n\
                 SKILLS\nKeyword 1, Keyword 2, Keyword 3, Keyword 4\n\n\
                 EXPERIENCE\nCompany - Title - Dates\n\
                 - Action + context + metric (placeholder).\n\
                 - Action + context + metric (placeholder).\n\n\
                 EDUCATION\nInstitution - Degree - Year\n\n\
                 JD Excerpt:\n{jd}\n\n\
                 CV Excerpt:\n{cv}\n",
                template = input.template
            ),
        };
        Ok(body)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmGenerator
// ────────────────────────────────────────────────────────────────────────────

/// Generates documents through the shared `LlmClient`.
pub struct LlmGenerator {
    llm: LlmClient,
}

impl LlmGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl DocumentGenerator for LlmGenerator {
    fn provider(&self) -> &'static str {
        "anthropic"
    }

    async fn generate(
        &self,
        input: &GenerationInput<'_>,
        artifact: Artifact,
    ) -> Result<String, GenerationError> {
        let cv_text = input.source_text.unwrap_or_default();
        let prompt = match artifact {
            Artifact::CoverLetter => build_cover_letter_prompt(input.jd_text, cv_text),
            Artifact::Cv => build_cv_prompt(input.jd_text, cv_text, input.template),
        };
        Ok(self.llm.call_text(&prompt, WRITER_SYSTEM).await?)
    }
}
