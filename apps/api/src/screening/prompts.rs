// All LLM prompt constants for the Screening module.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, RED_FLAG_INSTRUCTION};
use crate::models::candidate::ExtractionResult;
use crate::models::job::JobRequirements;
use crate::models::record::RawRecord;

/// System prompt for candidate extraction. Enforces JSON-only output.
pub const EXTRACTION_SYSTEM: &str =
    "You are an expert technical recruiter. \
    Turn raw recruiting data about one candidate into a structured profile. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for scoring a structured profile against a job.
pub const SCORING_SYSTEM: &str =
    "You are an expert technical recruiter scoring candidate fit against weighted job requirements. \
    Judge every requirement on the evidence given and nothing else. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// System prompt for the fused extract-and-score call.
pub const SCREENING_SYSTEM: &str =
    "You are an expert technical recruiter. \
    Build a structured profile from raw candidate data and score it against weighted job requirements \
    in a single answer. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Extraction prompt template. Fill `{record}`, `{evidence}` and `{red_flags}`.
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"Extract a structured candidate profile from the record below.
The record's columns are not fixed; use every field that says something about the candidate.

{record}

Rules:
- years_experience: total professional years as a number, or null if the record does not say.
- skills: deduplicated, most confident first.
- employment_history: most recent first; keep dates as written.
- red_flags: categories are employment_gap, inconsistent_dates, unverifiable_claim,
  frequent_job_changes, missing_information, other.

{evidence}
{red_flags}"#;

/// Scoring prompt template. Fill `{requirements}`, `{source_id}`, `{profile}` and `{red_flags}`.
pub const SCORING_PROMPT_TEMPLATE: &str = r#"Score this candidate against the job requirements.

JOB REQUIREMENTS (name, weight, what satisfies it):
{requirements}

CANDIDATE PROFILE (source id: {source_id}):
{profile}

KNOWN RED FLAGS:
{red_flags}

Rules:
- Return one requirement_matches entry per requirement, using the requirement name exactly.
- verdict is "met", "partially_met" or "unmet"; evidence quotes or paraphrases the profile.
- score is 0-100 and reflects the weighted share of requirements met (partially met counts half).
- rationale is 2-4 sentences a hiring manager can act on."#;

/// Fused prompt template. Fill `{record}`, `{requirements}`, `{evidence}` and `{red_flags}`.
pub const SCREENING_PROMPT_TEMPLATE: &str = r#"Build a structured profile for the candidate below, then score it against the job.

{record}

JOB REQUIREMENTS (name, weight, what satisfies it):
{requirements}

Rules for `candidate` and `red_flags`:
- years_experience is a number or null; skills are deduplicated, most confident first.
- red_flag categories are employment_gap, inconsistent_dates, unverifiable_claim,
  frequent_job_changes, missing_information, other.

Rules for `assessment`:
- One requirement_matches entry per requirement, using the requirement name exactly.
- verdict is "met", "partially_met" or "unmet".
- score is 0-100 and reflects the weighted share of requirements met (partially met counts half).

{evidence}
{red_flags}"#;

/// Renders every field of the record verbatim, in its original order.
pub fn render_record(record: &RawRecord) -> String {
    let mut out = format!("CANDIDATE RECORD (source id: {})\n", record.source_id);
    for (name, value) in record.fields() {
        out.push_str(&format!("\n[{name}]\n{value}\n"));
    }
    out
}

pub fn render_requirements(job: &JobRequirements) -> String {
    let mut out = String::new();
    if let Some(title) = job.title.as_deref().filter(|t| !t.trim().is_empty()) {
        out.push_str(&format!("Role: {title}\n"));
    }
    for (idx, req) in job.requirements.iter().enumerate() {
        out.push_str(&format!(
            "{}. {} (weight {}): {}\n",
            idx + 1,
            req.name,
            req.weight,
            req.description
        ));
    }
    out
}

pub fn build_extraction_prompt(record: &RawRecord) -> String {
    fill_template(
        EXTRACTION_PROMPT_TEMPLATE,
        &[
            ("record", render_record(record).as_str()),
            ("evidence", EVIDENCE_INSTRUCTION),
            ("red_flags", RED_FLAG_INSTRUCTION),
        ],
    )
}

pub fn build_scoring_prompt(extraction: &ExtractionResult, job: &JobRequirements) -> String {
    let profile = serde_json::to_string_pretty(extraction.candidate()).unwrap_or_default();
    let red_flags = if extraction.red_flags().is_empty() {
        "none".to_string()
    } else {
        serde_json::to_string_pretty(extraction.red_flags()).unwrap_or_default()
    };
    fill_template(
        SCORING_PROMPT_TEMPLATE,
        &[
            ("requirements", render_requirements(job).as_str()),
            ("source_id", extraction.source_id()),
            ("profile", profile.as_str()),
            ("red_flags", red_flags.as_str()),
        ],
    )
}

pub fn build_screening_prompt(record: &RawRecord, job: &JobRequirements) -> String {
    fill_template(
        SCREENING_PROMPT_TEMPLATE,
        &[
            ("record", render_record(record).as_str()),
            ("requirements", render_requirements(job).as_str()),
            ("evidence", EVIDENCE_INSTRUCTION),
            ("red_flags", RED_FLAG_INSTRUCTION),
        ],
    )
}

/// Fills `{name}` placeholders in one pass over the template.
/// Substituted values are never scanned again, so candidate text is embedded as-is.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let hit = values.iter().find_map(|&(name, value)| {
            tail.strip_prefix(name)
                .and_then(|after| after.strip_prefix('}'))
                .map(|after| (value, after))
        });
        match hit {
            Some((value, after)) => {
                out.push_str(value);
                rest = after;
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
