// Generation jobs: submission, the worker pipeline and status polling.
// All AI calls go through `generator`; no handler talks to a provider directly.

pub mod generator;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod queue;
pub mod worker;
