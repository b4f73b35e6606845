pub mod document;
pub mod job;
pub mod job_description;
