// Candidate screening: extraction, scoring and batch orchestration.
// All LLM calls go through llm_client; engines never talk to the provider directly.

pub mod extraction;
pub mod handlers;
pub mod intake;
pub mod orchestrator;
pub mod prompts;
pub mod repository;
pub mod scoring;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::models::candidate::{ProcessingStage, RecordProcessingFailure};

/// Timestamp source for results. Injected so batches are reproducible in tests.
pub type Clock = fn() -> DateTime<Utc>;

#[derive(Debug, Error)]
pub enum ScreeningError {
    #[error("invalid job requirements: {0}")]
    InvalidRequirements(String),

    #[error("concurrency limit must be between 1 and {max}")]
    InvalidConcurrency { max: usize },

    #[error("record '{0}' has no successful extraction to score")]
    ExtractionUnavailable(String),

    #[error(transparent)]
    Model(#[from] LlmError),

    #[error("batch task failed: {0}")]
    Batch(String),
}

impl ScreeningError {
    pub fn to_failure(&self, stage: ProcessingStage) -> RecordProcessingFailure {
        match self {
            ScreeningError::Model(err) => RecordProcessingFailure::from_llm(stage, err),
            other => RecordProcessingFailure {
                stage,
                kind: None,
                reason: other.to_string(),
            },
        }
    }
}
