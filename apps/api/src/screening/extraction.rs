//! Extraction Engine: turns one raw candidate record into a structured profile.
//!
//! `extract` never fails: adapter errors are encoded in the returned
//! `ExtractionResult` so a batch can keep going.

use chrono::Utc;
use tracing::{info, warn};

use crate::llm_client::LlmClient;
use crate::models::candidate::{
    max_severity, ExtractionPayload, ExtractionResult, ProcessingStage, RecordProcessingFailure,
};
use crate::models::record::RawRecord;
use crate::screening::prompts::{build_extraction_prompt, EXTRACTION_SYSTEM};
use crate::screening::Clock;

#[derive(Clone)]
pub struct ExtractionEngine {
    llm: LlmClient,
    clock: Clock,
}

impl ExtractionEngine {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            clock: Utc::now,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn extract(&self, record: &RawRecord) -> ExtractionResult {
        let model = self.llm.model();

        if record.is_empty() {
            warn!(source_id = %record.source_id, "record has no fields; skipping model call");
            return ExtractionResult::failed(
                record.source_id.clone(),
                model,
                (self.clock)(),
                RecordProcessingFailure {
                    stage: ProcessingStage::Extraction,
                    kind: None,
                    reason: "record has no non-empty fields".to_string(),
                },
            );
        }

        let prompt = build_extraction_prompt(record);
        match self
            .llm
            .complete::<ExtractionPayload>(EXTRACTION_SYSTEM, &prompt)
            .await
        {
            Ok(payload) => {
                info!(
                    source_id = %record.source_id,
                    skills = payload.candidate.skills.len(),
                    red_flags = payload.red_flags.len(),
                    worst_red_flag = ?max_severity(&payload.red_flags),
                    "extraction succeeded"
                );
                ExtractionResult::succeeded(record.source_id.clone(), model, (self.clock)(), payload)
            }
            Err(err) => {
                warn!(source_id = %record.source_id, kind = ?err.kind(), "extraction failed: {err}");
                ExtractionResult::failed(
                    record.source_id.clone(),
                    model,
                    (self.clock)(),
                    RecordProcessingFailure::from_llm(ProcessingStage::Extraction, &err),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::testing::{client_with, StubTransport};
    use crate::llm_client::{FailureKind, TransportError, MAX_RETRIES};
    use crate::models::candidate::CandidateExtraction;
    use crate::screening::fixtures::{extraction_json, fixed_clock, jane};

    #[tokio::test]
    async fn test_clean_extraction_populates_fields_verbatim() {
        let transport = Arc::new(StubTransport::new(|_| Ok(extraction_json())));
        let engine = ExtractionEngine::new(client_with(transport.clone())).with_clock(fixed_clock);

        let result = engine.extract(&jane()).await;

        assert!(result.is_success());
        assert_eq!(result.source_id(), "jane");
        assert_eq!(result.candidate().name.as_deref(), Some("Jane Doe"));
        assert_eq!(result.candidate().years_experience, Some(5.0));
        assert_eq!(result.candidate().skills, vec!["Python", "Go"]);
        assert_eq!(result.metadata().model, "stub-model");
        assert_eq!(result.metadata().extracted_at, fixed_clock());
        assert!(result.metadata().failure.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_every_field_reaches_the_prompt() {
        let transport = Arc::new(StubTransport::new(|_| Ok(extraction_json())));
        let engine = ExtractionEngine::new(client_with(transport.clone()));
        let record = RawRecord::new(
            "row-3",
            [("Legacy ATS Code", "X-91"), ("bio", "Go developer")],
        );

        engine.extract(&record).await;

        let prompt = transport.requests()[0].user_prompt().to_string();
        assert!(prompt.contains("[Legacy ATS Code]\nX-91"));
        assert!(prompt.contains("[bio]\nGo developer"));
    }

    #[tokio::test]
    async fn test_always_malformed_output_stops_after_retry_bound() {
        let transport = Arc::new(StubTransport::new(|_| Ok("{\"candidate\": ".to_string())));
        let engine = ExtractionEngine::new(client_with(transport.clone()));

        let result = engine.extract(&jane()).await;

        assert_eq!(transport.calls(), (MAX_RETRIES + 1) as usize);
        assert!(!result.is_success());
        assert_eq!(result.candidate(), &CandidateExtraction::default());
        let failure = result.metadata().failure.as_ref().unwrap();
        assert_eq!(failure.kind, Some(FailureKind::SchemaValidation));
        assert_eq!(failure.stage, ProcessingStage::Extraction);
    }

    #[tokio::test]
    async fn test_transport_failure_is_encoded_not_raised() {
        let transport = Arc::new(StubTransport::new(|_| {
            Err(TransportError::Api {
                status: 429,
                message: "rate limited".to_string(),
            })
        }));
        let engine = ExtractionEngine::new(client_with(transport));

        let result = engine.extract(&jane()).await;

        assert!(!result.is_success());
        assert_eq!(
            result.metadata().failure.as_ref().unwrap().kind,
            Some(FailureKind::TransientFailure)
        );
    }

    #[tokio::test]
    async fn test_empty_record_fails_without_model_call() {
        let transport = Arc::new(StubTransport::new(|_| Ok(extraction_json())));
        let engine = ExtractionEngine::new(client_with(transport.clone()));

        let result = engine.extract(&RawRecord::new("blank", [("bio", "   ")])).await;

        assert!(!result.is_success());
        assert_eq!(transport.calls(), 0);
    }
}
