use std::sync::Arc;

use crate::config::Config;
use crate::screening::orchestrator::BatchOrchestrator;
use crate::screening::repository::CandidateRepository;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BatchOrchestrator,
    /// Where finished batches go. Postgres in production, in-memory in tests.
    pub repository: Arc<dyn CandidateRepository>,
    /// Default concurrency for batches that don't specify one.
    pub default_concurrency: usize,
}

impl AppState {
    pub fn new(
        orchestrator: BatchOrchestrator,
        repository: Arc<dyn CandidateRepository>,
        config: &Config,
    ) -> Self {
        Self {
            orchestrator,
            repository,
            default_concurrency: config.screening_concurrency,
        }
    }
}
