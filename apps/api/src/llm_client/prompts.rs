// Shared prompt constants used by every generation prompt.
// Each service that needs LLM calls defines its own prompts.rs alongside it.

/// System prompt for all document-writing calls.
pub const WRITER_SYSTEM: &str = "You are a helpful assistant. \
    Avoid fabrications. Use only provided facts. \
    Respond with the document text only: no preamble, no markdown code fences.";

/// Common instruction appended to all generation prompts.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
    Use ONLY facts from the CV and job description. \
    Do NOT invent employers, titles, dates, degrees or metrics. \
    If the CV does not support a claim, omit it.";
