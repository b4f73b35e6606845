// Prompt templates for cover-letter and CV generation.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::NO_FABRICATION_INSTRUCTION;

/// Cover letter prompt. Replace `{no_fabrication}`, `{jd_text}` and `{cv_text}`.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"You are an expert career writer. Create a tailored, first-person cover letter optimized for ATS.

Requirements:
- {no_fabrication}
- Tone: confident, concise, professional, and warm.
- Structure:
  1) Greeting (e.g., Dear Hiring Manager).
  2) Opening (1-2 sentences aligning experience to role).
  3) 2-4 bullet points with quantified impact aligned to the job description.
  4) Closing (availability + call to action).
- Naturally include relevant job description keywords for ATS.
- Length: 180-250 words.
- Output plain text only.

Job Description:
{jd_text}

Candidate CV (may be raw text):
{cv_text}
"#;

/// CV prompt. Replace `{template}`, `{no_fabrication}`, `{jd_text}` and `{cv_text}`.
pub const CV_PROMPT_TEMPLATE: &str = r#"You are an expert resume writer. Generate an ATS-optimized CV in a '{template}' style.

Requirements:
- {no_fabrication}
- Preserve truthful dates, titles, employers.
- Use clear section headings in plain text (no tables/graphics):
  NAME & CONTACT
  SUMMARY (3-4 lines tailored to the job description)
  SKILLS (comma- or bullet-separated; job-description-aligned keywords)
  EXPERIENCE (Company - Title - Dates; 3-5 bullets with action + context + metric)
  EDUCATION
  CERTIFICATIONS (if any)
- Prefer bullet points with strong verbs and measurable results when present.
- Keep concise, remove redundancy, normalize formatting.
- Output plain text only.

Job Description:
{jd_text}

Baseline CV (may be raw text):
{cv_text}
"#;

pub fn build_cover_letter_prompt(jd_text: &str, cv_text: &str) -> String {
    COVER_LETTER_PROMPT_TEMPLATE
        .replace("{no_fabrication}", NO_FABRICATION_INSTRUCTION)
        .replace("{jd_text}", jd_text)
        .replace("{cv_text}", cv_text)
}

pub fn build_cv_prompt(jd_text: &str, cv_text: &str, template: &str) -> String {
    CV_PROMPT_TEMPLATE
        .replace("{template}", template)
        .replace("{no_fabrication}", NO_FABRICATION_INSTRUCTION)
        .replace("{jd_text}", jd_text)
        .replace("{cv_text}", cv_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_prompt_fills_every_placeholder() {
        let prompt = build_cover_letter_prompt("Rust engineer wanted", "Jane Doe, 8 years Rust");
        assert!(prompt.contains("Rust engineer wanted"));
        assert!(prompt.contains("Jane Doe, 8 years Rust"));
        assert!(!prompt.contains('{'), "unfilled placeholder in: {prompt}");
    }

    #[test]
    fn test_cv_prompt_names_template() {
        let prompt = build_cv_prompt("JD", "CV", "modern");
        assert!(prompt.contains("in a 'modern' style"));
        assert!(!prompt.contains("{template}"));
    }
}
