//! Job requirements, per-requirement verdicts and the fit score.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm_client::structured::{array_of, object_schema, string_enum, StructuredOutput};
use crate::models::candidate::{
    validate_red_flags, CandidateExtraction, ExtractionPayload, RedFlag,
};

pub const MIN_SCORE: u8 = 0;
pub const MAX_SCORE: u8 = 100;

/// A job-fit criterion with a relative importance weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedRequirement {
    pub name: String,
    pub weight: f64,
    /// What satisfies the requirement.
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub title: Option<String>,
    pub requirements: Vec<WeightedRequirement>,
}

impl JobRequirements {
    /// Contract check run before any model call. A failure here is a caller bug.
    pub fn validate(&self) -> Result<(), String> {
        if self.requirements.is_empty() {
            return Err("at least one requirement is needed".to_string());
        }
        let mut names = HashSet::new();
        for req in &self.requirements {
            let name = req.name.trim();
            if name.is_empty() {
                return Err("requirement names must not be blank".to_string());
            }
            if !names.insert(name.to_lowercase()) {
                return Err(format!("duplicate requirement '{name}'"));
            }
            if !req.weight.is_finite() || req.weight <= 0.0 {
                return Err(format!(
                    "requirement '{name}' must have a positive weight, got {}",
                    req.weight
                ));
            }
        }
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&WeightedRequirement> {
        let needle = name.trim().to_lowercase();
        self.requirements
            .iter()
            .find(|r| r.name.trim().to_lowercase() == needle)
    }

    pub fn total_weight(&self) -> f64 {
        self.requirements.iter().map(|r| r.weight).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchVerdict {
    Met,
    PartiallyMet,
    Unmet,
}

impl MatchVerdict {
    /// Share of a requirement's weight the verdict earns.
    pub fn credit(self) -> f64 {
        match self {
            MatchVerdict::Met => 1.0,
            MatchVerdict::PartiallyMet => 0.5,
            MatchVerdict::Unmet => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementMatch {
    pub requirement: String,
    pub verdict: MatchVerdict,
    pub evidence: String,
}

impl RequirementMatch {
    fn json_schema() -> Value {
        object_schema(json!({
            "requirement": { "type": "string" },
            "verdict": string_enum(&["met", "partially_met", "unmet"]),
            "evidence": { "type": "string" },
        }))
    }
}

/// Model response shape for scoring calls. `score` is raw and untrusted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FitAssessment {
    pub requirement_matches: Vec<RequirementMatch>,
    pub score: f64,
    pub rationale: String,
}

impl FitAssessment {
    fn schema() -> Value {
        object_schema(json!({
            "requirement_matches": array_of(RequirementMatch::json_schema()),
            "score": { "type": "number" },
            "rationale": { "type": "string" },
        }))
    }

    fn check(&self) -> Result<(), String> {
        if !self.score.is_finite() {
            return Err("score must be a finite number".to_string());
        }
        if self.rationale.trim().is_empty() {
            return Err("rationale must not be empty".to_string());
        }
        Ok(())
    }
}

impl StructuredOutput for FitAssessment {
    const SCHEMA_NAME: &'static str = "fit_assessment";

    fn json_schema() -> Value {
        Self::schema()
    }

    fn validate(&self) -> Result<(), String> {
        self.check()
    }
}

/// Model response shape for the fused extract-and-score call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreeningPayload {
    pub candidate: CandidateExtraction,
    pub red_flags: Vec<RedFlag>,
    pub assessment: FitAssessment,
}

impl ScreeningPayload {
    pub fn split(self) -> (ExtractionPayload, FitAssessment) {
        (
            ExtractionPayload {
                candidate: self.candidate,
                red_flags: self.red_flags,
            },
            self.assessment,
        )
    }
}

impl StructuredOutput for ScreeningPayload {
    const SCHEMA_NAME: &'static str = "candidate_screening";

    fn json_schema() -> Value {
        let extraction = ExtractionPayload::json_schema();
        object_schema(json!({
            "candidate": extraction["properties"]["candidate"].clone(),
            "red_flags": extraction["properties"]["red_flags"].clone(),
            "assessment": FitAssessment::schema(),
        }))
    }

    fn validate(&self) -> Result<(), String> {
        self.candidate.validate()?;
        validate_red_flags(&self.red_flags)?;
        self.assessment.check()
    }
}

/// A validated fit score. `score` is always within `MIN_SCORE..=MAX_SCORE`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FitScore {
    score: u8,
    rationale: String,
    requirement_matches: Vec<RequirementMatch>,
}

impl FitScore {
    /// Clamps whatever the model emitted into the declared bound.
    pub fn new(raw_score: f64, rationale: String, requirement_matches: Vec<RequirementMatch>) -> Self {
        Self {
            score: clamp_score(raw_score),
            rationale,
            requirement_matches,
        }
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn requirement_matches(&self) -> &[RequirementMatch] {
        &self.requirement_matches
    }

    pub(crate) fn into_parts(self) -> (u8, String, Vec<RequirementMatch>) {
        (self.score, self.rationale, self.requirement_matches)
    }
}

pub fn clamp_score(raw: f64) -> u8 {
    if raw.is_nan() {
        return MIN_SCORE;
    }
    raw.round().clamp(MIN_SCORE as f64, MAX_SCORE as f64) as u8
}
