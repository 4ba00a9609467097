//! Scoring Engine: measures a structured profile against weighted job requirements.
//!
//! Two entry points:
//! - `score`: profile + requirements → `FitScore` (one model call).
//! - `extract_and_score`: raw record + requirements → `ProcessedCandidate` in a single
//!   fused call. A fused failure is returned to the caller; this engine never falls
//!   back to two calls on its own.
//!
//! The model's numeric score is never trusted: it is clamped to 0..=100 here, and the
//! rationale is rebuilt around the per-requirement verdicts so it can be audited
//! against the weights.

use chrono::Utc;
use tracing::{debug, info};

use crate::llm_client::LlmClient;
use crate::models::candidate::ExtractionResult;
use crate::models::job::{
    FitAssessment, FitScore, JobRequirements, MatchVerdict, RequirementMatch, ScreeningPayload,
};
use crate::models::processed::ProcessedCandidate;
use crate::models::record::RawRecord;
use crate::screening::prompts::{
    build_scoring_prompt, build_screening_prompt, SCORING_SYSTEM, SCREENING_SYSTEM,
};
use crate::screening::{Clock, ScreeningError};

const NOT_ASSESSED: &str = "Not assessed by the model.";

#[derive(Clone)]
pub struct ScoringEngine {
    llm: LlmClient,
    clock: Clock,
}

impl ScoringEngine {
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

    pub async fn score(
        &self,
        extraction: &ExtractionResult,
        job: &JobRequirements,
    ) -> Result<FitScore, ScreeningError> {
        job.validate().map_err(ScreeningError::InvalidRequirements)?;
        if !extraction.is_success() {
            return Err(ScreeningError::ExtractionUnavailable(
                extraction.source_id().to_string(),
            ));
        }

        let prompt = build_scoring_prompt(extraction, job);
        let assessment = self
            .llm
            .complete::<FitAssessment>(SCORING_SYSTEM, &prompt)
            .await?;

        let fit = finalize_assessment(assessment, job);
        info!(
            source_id = %extraction.source_id(),
            score = fit.score(),
            "scoring succeeded"
        );
        Ok(fit)
    }

    /// Fused screening: extraction and scoring in one model call.
    pub async fn extract_and_score(
        &self,
        record: &RawRecord,
        job: &JobRequirements,
    ) -> Result<ProcessedCandidate, ScreeningError> {
        job.validate().map_err(ScreeningError::InvalidRequirements)?;

        let prompt = build_screening_prompt(record, job);
        let payload = self
            .llm
            .complete::<ScreeningPayload>(SCREENING_SYSTEM, &prompt)
            .await?;

        let (extraction, assessment) = payload.split();
        let extraction = ExtractionResult::succeeded(
            record.source_id.clone(),
            self.llm.model(),
            (self.clock)(),
            extraction,
        );
        let fit = finalize_assessment(assessment, job);
        info!(
            source_id = %record.source_id,
            score = fit.score(),
            "fused screening succeeded"
        );
        Ok(ProcessedCandidate::success(extraction, fit))
    }
}

/// Aligns verdicts to the job's requirements, clamps the score and builds the rationale.
///
/// Verdicts naming unknown requirements are dropped; requirements the model skipped
/// count as unmet.
pub fn finalize_assessment(assessment: FitAssessment, job: &JobRequirements) -> FitScore {
    let FitAssessment {
        requirement_matches,
        score,
        rationale,
    } = assessment;

    for m in &requirement_matches {
        if job.find(&m.requirement).is_none() {
            debug!(requirement = %m.requirement, "dropping verdict for unknown requirement");
        }
    }

    let matches: Vec<RequirementMatch> = job
        .requirements
        .iter()
        .map(|req| {
            let key = req.name.trim().to_lowercase();
            requirement_matches
                .iter()
                .find(|m| m.requirement.trim().to_lowercase() == key)
                .map(|m| RequirementMatch {
                    requirement: req.name.clone(),
                    verdict: m.verdict,
                    evidence: m.evidence.clone(),
                })
                .unwrap_or_else(|| RequirementMatch {
                    requirement: req.name.clone(),
                    verdict: MatchVerdict::Unmet,
                    evidence: NOT_ASSESSED.to_string(),
                })
        })
        .collect();

    let coverage = weighted_coverage(job, &matches);
    let rationale = build_rationale(rationale.trim(), coverage, &matches);
    FitScore::new(score, rationale, matches)
}

/// Σ(weight × credit) / Σweight × 100, with `matches` aligned to `job.requirements`.
pub fn weighted_coverage(job: &JobRequirements, matches: &[RequirementMatch]) -> f64 {
    let total = job.total_weight();
    if total <= 0.0 {
        return 0.0;
    }
    let earned: f64 = job
        .requirements
        .iter()
        .zip(matches)
        .map(|(req, m)| req.weight * m.verdict.credit())
        .sum();
    (earned / total * 100.0).clamp(0.0, 100.0)
}

fn build_rationale(model_rationale: &str, coverage: f64, matches: &[RequirementMatch]) -> String {
    let list = |verdict: MatchVerdict| {
        let names: Vec<&str> = matches
            .iter()
            .filter(|m| m.verdict == verdict)
            .map(|m| m.requirement.as_str())
            .collect();
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(", ")
        }
    };

    format!(
        "{model_rationale}\n\nWeighted requirement coverage: {coverage:.0}%\nMet: {}\nPartially met: {}\nUnmet: {}",
        list(MatchVerdict::Met),
        list(MatchVerdict::PartiallyMet),
        list(MatchVerdict::Unmet),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::llm_client::testing::{client_with, StubTransport};
    use crate::llm_client::FailureKind;
    use crate::models::candidate::{ExtractionPayload, ProcessingStage, RecordProcessingFailure};
    use crate::models::processed::ProcessingStatus;
    use crate::screening::fixtures::{
        assessment_json, extraction_json, fixed_clock, jane, job, screening_json,
    };

    fn extracted() -> ExtractionResult {
        let payload: ExtractionPayload =
            crate::llm_client::structured::parse_structured(&extraction_json()).unwrap();
        ExtractionResult::succeeded("jane", "stub-model", fixed_clock(), payload)
    }

    #[tokio::test]
    async fn test_score_above_bound_is_clamped() {
        let transport = Arc::new(StubTransport::new(|_| Ok(assessment_json(140.0))));
        let engine = ScoringEngine::new(client_with(transport));

        let fit = engine.score(&extracted(), &job()).await.unwrap();
        assert_eq!(fit.score(), 100);
    }

    #[tokio::test]
    async fn test_score_below_bound_is_clamped() {
        let transport = Arc::new(StubTransport::new(|_| Ok(assessment_json(-20.0))));
        let engine = ScoringEngine::new(client_with(transport));

        let fit = engine.score(&extracted(), &job()).await.unwrap();
        assert_eq!(fit.score(), 0);
    }

    #[tokio::test]
    async fn test_rationale_enumerates_verdicts_and_coverage() {
        let transport = Arc::new(StubTransport::new(|_| Ok(assessment_json(75.0))));
        let engine = ScoringEngine::new(client_with(transport));

        let fit = engine.score(&extracted(), &job()).await.unwrap();
        let rationale = fit.rationale();
        assert!(rationale.starts_with("Strong backend fundamentals."));
        // Python (2) + Go (1) met out of 4 total weight.
        assert!(rationale.contains("Weighted requirement coverage: 75%"));
        assert!(rationale.contains("Met: Python, Go"));
        assert!(rationale.contains("Partially met: none"));
        assert!(rationale.contains("Unmet: Kubernetes"));
        assert_eq!(fit.requirement_matches().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_extraction_cannot_be_scored() {
        let transport = Arc::new(StubTransport::new(|_| Ok(assessment_json(50.0))));
        let engine = ScoringEngine::new(client_with(transport.clone()));
        let failed = ExtractionResult::failed(
            "jane",
            "stub-model",
            fixed_clock(),
            RecordProcessingFailure::orchestration("boom"),
        );

        let err = engine.score(&failed, &job()).await.unwrap_err();
        assert!(matches!(err, ScreeningError::ExtractionUnavailable(id) if id == "jane"));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_requirements_are_fatal_before_any_call() {
        let transport = Arc::new(StubTransport::new(|_| Ok(assessment_json(50.0))));
        let engine = ScoringEngine::new(client_with(transport.clone()));
        let mut bad_job = job();
        bad_job.requirements[0].weight = 0.0;

        let err = engine.score(&extracted(), &bad_job).await.unwrap_err();
        assert!(matches!(err, ScreeningError::InvalidRequirements(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn test_fused_mode_produces_success_in_one_call() {
        let transport = Arc::new(StubTransport::new(|_| Ok(screening_json(88.0))));
        let engine = ScoringEngine::new(client_with(transport.clone())).with_clock(fixed_clock);

        let processed = engine.extract_and_score(&jane(), &job()).await.unwrap();
        assert_eq!(processed.status(), ProcessingStatus::Success);
        assert_eq!(processed.score(), Some(88));
        assert_eq!(processed.candidate().name.as_deref(), Some("Jane Doe"));
        assert_eq!(processed.extracted_at(), Some(fixed_clock()));
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.requests()[0].schema_name(), "candidate_screening");
    }

    #[tokio::test]
    async fn test_fused_schema_failure_is_surfaced() {
        let transport = Arc::new(StubTransport::new(|_| Ok(assessment_json(88.0))));
        let engine = ScoringEngine::new(client_with(transport));

        let err = engine.extract_and_score(&jane(), &job()).await.unwrap_err();
        let failure = err.to_failure(ProcessingStage::Screening);
        assert_eq!(failure.kind, Some(FailureKind::SchemaValidation));
    }

    #[test]
    fn test_unassessed_requirements_count_as_unmet() {
        let assessment = FitAssessment {
            requirement_matches: vec![
                RequirementMatch {
                    requirement: "python".to_string(),
                    verdict: MatchVerdict::PartiallyMet,
                    evidence: "Some scripting".to_string(),
                },
                RequirementMatch {
                    requirement: "COBOL".to_string(),
                    verdict: MatchVerdict::Met,
                    evidence: "not a requirement".to_string(),
                },
            ],
            score: 30.0,
            rationale: "Thin profile.".to_string(),
        };

        let fit = finalize_assessment(assessment, &job());
        let matches = fit.requirement_matches();
        assert_eq!(matches.len(), 3);
        assert_eq!(matches[0].requirement, "Python");
        assert_eq!(matches[0].verdict, MatchVerdict::PartiallyMet);
        assert_eq!(matches[1].verdict, MatchVerdict::Unmet);
        assert_eq!(matches[1].evidence, NOT_ASSESSED);
        assert!(!fit.rationale().contains("COBOL"));
        // Python partially met: 2 * 0.5 of 4.
        assert!(fit.rationale().contains("coverage: 25%"));
    }
}
