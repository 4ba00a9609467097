//! The terminal per-record screening result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::candidate::{
    CandidateExtraction, ExtractionResult, RecordProcessingFailure, RedFlag,
};
use crate::models::job::{FitScore, RequirementMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Never processed (the batch was cancelled first).
    Pending,
    Success,
    Failed,
    /// Extraction succeeded, scoring did not.
    Partial,
}

impl ProcessingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Success => "success",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Partial => "partial",
        }
    }
}

/// Extraction fields flattened, plus the fit score and processing status.
///
/// Only the constructors below build one, so the status invariants hold:
/// `Success` always carries a score in 0..=100 and a rationale; every other
/// status carries neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedCandidate {
    source_id: String,
    #[serde(flatten)]
    candidate: CandidateExtraction,
    red_flags: Vec<RedFlag>,
    score: Option<u8>,
    rationale: Option<String>,
    requirement_matches: Vec<RequirementMatch>,
    status: ProcessingStatus,
    failure: Option<RecordProcessingFailure>,
    model: Option<String>,
    extracted_at: Option<DateTime<Utc>>,
}

impl ProcessedCandidate {
    pub fn success(extraction: ExtractionResult, fit: FitScore) -> Self {
        let (candidate, red_flags, metadata) = extraction.into_parts();
        let (score, rationale, requirement_matches) = fit.into_parts();
        Self {
            source_id: metadata.source_id,
            candidate,
            red_flags,
            score: Some(score),
            rationale: Some(rationale),
            requirement_matches,
            status: ProcessingStatus::Success,
            failure: None,
            model: Some(metadata.model),
            extracted_at: Some(metadata.extracted_at),
        }
    }

    /// Keeps the extracted profile; scoring failed.
    pub fn partial(extraction: ExtractionResult, failure: RecordProcessingFailure) -> Self {
        let (candidate, red_flags, metadata) = extraction.into_parts();
        Self {
            source_id: metadata.source_id,
            candidate,
            red_flags,
            score: None,
            rationale: None,
            requirement_matches: Vec::new(),
            status: ProcessingStatus::Partial,
            failure: Some(failure),
            model: Some(metadata.model),
            extracted_at: Some(metadata.extracted_at),
        }
    }

    /// Built from an unsuccessful extraction; its failure becomes the record's failure.
    pub fn from_failed_extraction(extraction: ExtractionResult) -> Self {
        let (candidate, red_flags, metadata) = extraction.into_parts();
        let failure = metadata.failure.unwrap_or_else(|| {
            RecordProcessingFailure::orchestration("extraction reported no result")
        });
        Self {
            source_id: metadata.source_id,
            candidate,
            red_flags,
            score: None,
            rationale: None,
            requirement_matches: Vec::new(),
            status: ProcessingStatus::Failed,
            failure: Some(failure),
            model: Some(metadata.model),
            extracted_at: Some(metadata.extracted_at),
        }
    }

    pub fn failed(source_id: impl Into<String>, failure: RecordProcessingFailure) -> Self {
        Self::empty(source_id.into(), ProcessingStatus::Failed, Some(failure))
    }

    pub fn pending(source_id: impl Into<String>) -> Self {
        Self::empty(source_id.into(), ProcessingStatus::Pending, None)
    }

    fn empty(
        source_id: String,
        status: ProcessingStatus,
        failure: Option<RecordProcessingFailure>,
    ) -> Self {
        Self {
            source_id,
            candidate: CandidateExtraction::default(),
            red_flags: Vec::new(),
            score: None,
            rationale: None,
            requirement_matches: Vec::new(),
            status,
            failure,
            model: None,
            extracted_at: None,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn candidate(&self) -> &CandidateExtraction {
        &self.candidate
    }

    pub fn red_flags(&self) -> &[RedFlag] {
        &self.red_flags
    }

    pub fn score(&self) -> Option<u8> {
        self.score
    }

    pub fn rationale(&self) -> Option<&str> {
        self.rationale.as_deref()
    }

    pub fn requirement_matches(&self) -> &[RequirementMatch] {
        &self.requirement_matches
    }

    pub fn status(&self) -> ProcessingStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&RecordProcessingFailure> {
        self.failure.as_ref()
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn extracted_at(&self) -> Option<DateTime<Utc>> {
        self.extracted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::FailureKind;
    use crate::models::candidate::{ExtractionPayload, ProcessingStage};
    use crate::models::job::MatchVerdict;

    fn extraction() -> ExtractionResult {
        ExtractionResult::succeeded(
            "r1",
            "stub-model",
            Utc::now(),
            ExtractionPayload {
                candidate: CandidateExtraction {
                    name: Some("Jane Doe".to_string()),
                    skills: vec!["Python".to_string()],
                    ..Default::default()
                },
                red_flags: vec![],
            },
        )
    }

    fn scoring_failure() -> RecordProcessingFailure {
        RecordProcessingFailure {
            stage: ProcessingStage::Scoring,
            kind: Some(FailureKind::SchemaValidation),
            reason: "bad score payload".to_string(),
        }
    }

    #[test]
    fn test_success_carries_bounded_score_and_rationale() {
        let fit = FitScore::new(
            250.0,
            "Great".to_string(),
            vec![RequirementMatch {
                requirement: "Python".to_string(),
                verdict: MatchVerdict::Met,
                evidence: "listed".to_string(),
            }],
        );
        let processed = ProcessedCandidate::success(extraction(), fit);
        assert_eq!(processed.status(), ProcessingStatus::Success);
        assert_eq!(processed.score(), Some(100));
        assert_eq!(processed.rationale(), Some("Great"));
        assert!(processed.failure().is_none());
        assert_eq!(processed.candidate().name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_partial_keeps_profile_without_score() {
        let processed = ProcessedCandidate::partial(extraction(), scoring_failure());
        assert_eq!(processed.status(), ProcessingStatus::Partial);
        assert!(processed.score().is_none());
        assert!(processed.rationale().is_none());
        assert_eq!(processed.candidate().skills, vec!["Python"]);
        assert_eq!(processed.failure().unwrap().stage, ProcessingStage::Scoring);
    }

    #[test]
    fn test_failed_has_no_score_or_rationale() {
        let processed = ProcessedCandidate::failed("r9", scoring_failure());
        assert_eq!(processed.status(), ProcessingStatus::Failed);
        assert!(processed.score().is_none());
        assert!(processed.rationale().is_none());
        assert_eq!(processed.source_id(), "r9");
    }

    #[test]
    fn test_serialized_shape_flattens_extraction() {
        let processed = ProcessedCandidate::pending("r4");
        let json = serde_json::to_value(&processed).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["source_id"], "r4");
        assert!(json["name"].is_null());
        assert!(json["score"].is_null());
        assert!(json.get("candidate").is_none());
    }
}
