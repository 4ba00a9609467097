// Shared prompt fragments.
// Each service that needs LLM calls defines its own prompts.rs alongside it;
// this file only holds cross-cutting instructions.

/// Keeps extracted attributes traceable to the supplied text.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: Every attribute you return must be supported by the candidate text provided. \
    Do NOT infer, interpolate, or invent details. \
    If the text does not state a value, return null for that field (or an empty list). \
    Never use an empty string or 0 to mean unknown.";

/// Keeps red flags factual and proportionate.
pub const RED_FLAG_INSTRUCTION: &str = "\
    Report red flags only when the text itself shows the concern. \
    Use severity \"low\", \"medium\" or \"high\" and justify each flag in one sentence \
    that cites the text. Return an empty list when nothing is concerning.";
