//! Candidate attributes, red flags and the per-row extraction result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm_client::structured::{
    array_of, nullable, object_schema, required_nullable, string_enum, StructuredOutput,
};
use crate::llm_client::FailureKind;

// ────────────────────────────────────────────────────────────────────────────
// Extracted attributes
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EducationEntry {
    #[serde(deserialize_with = "required_nullable")]
    pub institution: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub degree: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub field_of_study: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub graduation_year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmploymentEntry {
    #[serde(deserialize_with = "required_nullable")]
    pub employer: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub title: Option<String>,
    /// Free text as written in the source ("2019-03", "Mar 2019").
    #[serde(deserialize_with = "required_nullable")]
    pub start: Option<String>,
    /// `None` when unknown; "present" for a current role.
    #[serde(deserialize_with = "required_nullable")]
    pub end: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub summary: Option<String>,
}

/// Structured attributes pulled from raw candidate text.
///
/// Every optional attribute is `null` when the source does not state it, so
/// "unknown" never collapses into `""` or `0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CandidateExtraction {
    #[serde(deserialize_with = "required_nullable")]
    pub name: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub email: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub phone: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub location: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub profile_url: Option<String>,
    #[serde(deserialize_with = "required_nullable")]
    pub years_experience: Option<f64>,
    /// Most confident first.
    pub skills: Vec<String>,
    pub education: Vec<EducationEntry>,
    pub employment_history: Vec<EmploymentEntry>,
    #[serde(deserialize_with = "required_nullable")]
    pub summary: Option<String>,
}

impl CandidateExtraction {
    /// Drops repeated skills (case-insensitive), keeping the first, most confident, spelling.
    pub fn dedup_skills(&mut self) {
        let mut seen = std::collections::HashSet::new();
        self.skills.retain(|skill| {
            let key = skill.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        });
        for skill in &mut self.skills {
            *skill = skill.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(years) = self.years_experience {
            if !years.is_finite() || years < 0.0 {
                return Err(format!("years_experience must be >= 0, got {years}"));
            }
        }
        Ok(())
    }

    pub(crate) fn json_schema() -> Value {
        let education = object_schema(json!({
            "institution": nullable("string"),
            "degree": nullable("string"),
            "field_of_study": nullable("string"),
            "graduation_year": nullable("integer"),
        }));
        let employment = object_schema(json!({
            "employer": nullable("string"),
            "title": nullable("string"),
            "start": nullable("string"),
            "end": nullable("string"),
            "summary": nullable("string"),
        }));
        object_schema(json!({
            "name": nullable("string"),
            "email": nullable("string"),
            "phone": nullable("string"),
            "location": nullable("string"),
            "profile_url": nullable("string"),
            "years_experience": nullable("number"),
            "skills": array_of(json!({ "type": "string" })),
            "education": array_of(education),
            "employment_history": array_of(employment),
            "summary": nullable("string"),
        }))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Red flags
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedFlagCategory {
    EmploymentGap,
    InconsistentDates,
    UnverifiableClaim,
    FrequentJobChanges,
    MissingInformation,
    Other,
}

impl RedFlagCategory {
    pub const ALL: [&'static str; 6] = [
        "employment_gap",
        "inconsistent_dates",
        "unverifiable_claim",
        "frequent_job_changes",
        "missing_information",
        "other",
    ];
}

/// Ordered: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedFlag {
    pub category: RedFlagCategory,
    pub severity: Severity,
    pub justification: String,
}

impl RedFlag {
    pub(crate) fn json_schema() -> Value {
        object_schema(json!({
            "category": string_enum(&RedFlagCategory::ALL),
            "severity": string_enum(&["low", "medium", "high"]),
            "justification": { "type": "string" },
        }))
    }
}

pub(crate) fn validate_red_flags(flags: &[RedFlag]) -> Result<(), String> {
    match flags.iter().position(|f| f.justification.trim().is_empty()) {
        Some(idx) => Err(format!("red_flags[{idx}] has an empty justification")),
        None => Ok(()),
    }
}

/// Highest severity among the flags, if any.
pub fn max_severity(flags: &[RedFlag]) -> Option<Severity> {
    flags.iter().map(|f| f.severity).max()
}

/// Model response shape for extraction calls.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionPayload {
    pub candidate: CandidateExtraction,
    pub red_flags: Vec<RedFlag>,
}

impl StructuredOutput for ExtractionPayload {
    const SCHEMA_NAME: &'static str = "candidate_extraction";

    fn json_schema() -> Value {
        object_schema(json!({
            "candidate": CandidateExtraction::json_schema(),
            "red_flags": array_of(RedFlag::json_schema()),
        }))
    }

    fn validate(&self) -> Result<(), String> {
        self.candidate.validate()?;
        validate_red_flags(&self.red_flags)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Extraction result
// ────────────────────────────────────────────────────────────────────────────

/// Which step of the per-record pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Extraction,
    Scoring,
    /// The fused extract-and-score call.
    Screening,
    /// The worker task itself died or was cancelled.
    Orchestration,
}

/// A record-level failure: terminal for that record only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordProcessingFailure {
    pub stage: ProcessingStage,
    pub kind: Option<FailureKind>,
    pub reason: String,
}

impl RecordProcessingFailure {
    pub fn from_llm(stage: ProcessingStage, err: &crate::llm_client::LlmError) -> Self {
        Self {
            stage,
            kind: Some(err.kind()),
            reason: err.to_string(),
        }
    }

    pub fn orchestration(reason: impl Into<String>) -> Self {
        Self {
            stage: ProcessingStage::Orchestration,
            kind: None,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionMetadata {
    pub source_id: String,
    pub model: String,
    pub extracted_at: DateTime<Utc>,
    pub success: bool,
    pub failure: Option<RecordProcessingFailure>,
}

/// Created once per input row; read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    candidate: CandidateExtraction,
    red_flags: Vec<RedFlag>,
    metadata: ExtractionMetadata,
}

impl ExtractionResult {
    pub fn succeeded(
        source_id: impl Into<String>,
        model: impl Into<String>,
        extracted_at: DateTime<Utc>,
        payload: ExtractionPayload,
    ) -> Self {
        let ExtractionPayload {
            mut candidate,
            red_flags,
        } = payload;
        candidate.dedup_skills();
        Self {
            candidate,
            red_flags,
            metadata: ExtractionMetadata {
                source_id: source_id.into(),
                model: model.into(),
                extracted_at,
                success: true,
                failure: None,
            },
        }
    }

    /// Every attribute empty; the failure explains why.
    pub fn failed(
        source_id: impl Into<String>,
        model: impl Into<String>,
        extracted_at: DateTime<Utc>,
        failure: RecordProcessingFailure,
    ) -> Self {
        Self {
            candidate: CandidateExtraction::default(),
            red_flags: Vec::new(),
            metadata: ExtractionMetadata {
                source_id: source_id.into(),
                model: model.into(),
                extracted_at,
                success: false,
                failure: Some(failure),
            },
        }
    }

    pub fn candidate(&self) -> &CandidateExtraction {
        &self.candidate
    }

    pub fn red_flags(&self) -> &[RedFlag] {
        &self.red_flags
    }

    pub fn metadata(&self) -> &ExtractionMetadata {
        &self.metadata
    }

    pub fn source_id(&self) -> &str {
        &self.metadata.source_id
    }

    pub fn is_success(&self) -> bool {
        self.metadata.success
    }

    pub(crate) fn into_parts(self) -> (CandidateExtraction, Vec<RedFlag>, ExtractionMetadata) {
        (self.candidate, self.red_flags, self.metadata)
    }
}
