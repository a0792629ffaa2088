//! Stage executors: discovery, analysis, and synthesis.
//!
//! Each executor reads what it needs from a [`RunContext`], issues exactly one
//! reasoning call (after any tool adapter calls), validates the result, and
//! returns a new [`Artifact`]. Executors never retry and never write to the
//! context; the orchestrator records their output.

pub mod analysis;
pub mod discovery;
pub mod synthesis;

pub use analysis::AnalysisStage;
pub use discovery::DiscoveryStage;
pub use synthesis::SynthesisStage;

use crate::context::RunContext;
use crate::error::StageError;
use crate::types::Artifact;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Discovery,
    Analysis,
    Synthesis,
    Refinement,
}

impl StageName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Discovery => "discovery",
            StageName::Analysis => "analysis",
            StageName::Synthesis => "synthesis",
            StageName::Refinement => "refinement",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pipeline phase producing a typed artifact.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    fn name(&self) -> StageName;

    async fn execute(&self, ctx: &RunContext) -> Result<Artifact, StageError>;
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// The JSON value embedded in a model response: fences removed, then the
/// span from the first `{`/`[` to the last `}`/`]`.
pub fn extract_json_payload(text: &str) -> &str {
    let body = strip_code_fence(text);
    match (body.find(['{', '[']), body.rfind(['}', ']'])) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => body,
    }
}

/// Parse a JSON array of `T` out of a model response.
pub(crate) fn parse_json_array<T: DeserializeOwned>(text: &str) -> Result<Vec<T>, StageError> {
    let payload = extract_json_payload(text);
    if !payload.starts_with('[') {
        return Err(StageError::InvalidResponse {
            message: "expected a JSON array".to_string(),
        });
    }
    serde_json::from_str(payload).map_err(|e| StageError::InvalidResponse {
        message: format!("invalid JSON array: {}", e),
    })
}

/// At most `max` characters of `text`, cut on a char boundary.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Paper;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\nplain\n```\n"), "plain");
        assert_eq!(strip_code_fence("  no fence  "), "no fence");
    }

    #[test]
    fn test_extract_json_payload_finds_embedded_value() {
        assert_eq!(
            extract_json_payload("Here you go:\n[{\"title\": \"A\"}]\nHope that helps."),
            "[{\"title\": \"A\"}]"
        );
        assert_eq!(extract_json_payload("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(extract_json_payload("nothing here"), "nothing here");
    }

    #[test]
    fn test_parse_json_array_rejects_objects() {
        let result: Result<Vec<Paper>, _> = parse_json_array("{\"title\": \"A\"}");
        assert!(matches!(result, Err(StageError::InvalidResponse { .. })));

        let papers: Vec<Paper> =
            parse_json_array("```json\n[{\"title\": \"A\", \"year\": 2020}]\n```").unwrap();
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].year, Some(2020));
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn test_stage_name_display() {
        assert_eq!(StageName::Discovery.to_string(), "discovery");
        assert_eq!(
            serde_json::to_string(&StageName::Synthesis).unwrap(),
            "\"synthesis\""
        );
    }
}
