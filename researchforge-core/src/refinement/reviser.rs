//! Draft revisers.

use crate::brain::{ContextFields, PromptTemplate, ReasoningCapability};
use crate::error::{CapabilityError, ReviserError};
use crate::stages::strip_code_fence;
use crate::types::{Draft, ScoreReport};
use async_trait::async_trait;
use std::sync::Arc;

/// Produces the text of a new draft from a draft and its score report.
///
/// The controller wraps the returned text into the next [`Draft`] version.
#[async_trait]
pub trait Reviser: Send + Sync {
    async fn revise(&self, draft: &Draft, report: &ScoreReport) -> Result<String, ReviserError>;
}

/// Reviser backed by the reasoning capability's refinement template.
pub struct LlmReviser {
    reasoning: Arc<dyn ReasoningCapability>,
    topic: String,
}

impl LlmReviser {
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, topic: impl Into<String>) -> Self {
        Self {
            reasoning,
            topic: topic.into(),
        }
    }

    fn fields(&self, draft: &Draft, report: &ScoreReport) -> ContextFields {
        let improvements = if report.improvements.is_empty() {
            "(none listed)".to_string()
        } else {
            report
                .improvements
                .iter()
                .map(|i| format!("- {}", i))
                .collect::<Vec<_>>()
                .join("\n")
        };
        ContextFields::new()
            .with("topic", &self.topic)
            .with("score", report.total)
            .with("structure", report.structure)
            .with("length", report.length)
            .with("citations", report.citations)
            .with("coverage", report.coverage)
            .with("clarity", report.clarity)
            .with("feedback", &report.feedback)
            .with("improvements", improvements)
            .with("version", draft.version())
            .with("draft", draft.text())
    }
}

#[async_trait]
impl Reviser for LlmReviser {
    async fn revise(&self, draft: &Draft, report: &ScoreReport) -> Result<String, ReviserError> {
        let text = self
            .reasoning
            .generate(PromptTemplate::Refinement, &self.fields(draft, report))
            .await
            .map_err(|e| match e {
                CapabilityError::Timeout { timeout_secs } => ReviserError::Timeout { timeout_secs },
                other => ReviserError::Rejected {
                    message: other.to_string(),
                },
            })?;
        Ok(strip_code_fence(text.trim()).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockReasoning;

    #[tokio::test]
    async fn test_llm_reviser_passes_report_fields() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_response("```markdown\n# Revised Review\nBetter text.\n```");
        let reviser = LlmReviser::new(mock.clone(), "graph neural networks");

        let draft = Draft::initial("original").unwrap();
        let report = ScoreReport::from_subscores(1, 1, 0, 2, 1)
            .with_feedback("needs citations")
            .with_improvements(vec!["Cite more".to_string()]);

        let text = reviser.revise(&draft, &report).await.unwrap();
        assert_eq!(text, "# Revised Review\nBetter text.");

        let fields = mock.last_fields(PromptTemplate::Refinement).unwrap();
        assert_eq!(fields.get("score"), Some("5"));
        assert_eq!(fields.get("citations"), Some("0"));
        assert_eq!(fields.get("improvements"), Some("- Cite more"));
        assert_eq!(fields.get("version"), Some("0"));
        assert_eq!(fields.get("topic"), Some("graph neural networks"));
    }

    #[tokio::test]
    async fn test_llm_reviser_maps_errors() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_error(CapabilityError::Timeout { timeout_secs: 60 });
        mock.queue_error(CapabilityError::Unavailable {
            message: "down".to_string(),
        });
        let reviser = LlmReviser::new(mock, "t");
        let draft = Draft::initial("d").unwrap();
        let report = ScoreReport::from_subscores(0, 0, 0, 0, 0);

        assert_eq!(
            reviser.revise(&draft, &report).await,
            Err(ReviserError::Timeout { timeout_secs: 60 })
        );
        assert!(matches!(
            reviser.revise(&draft, &report).await,
            Err(ReviserError::Rejected { .. })
        ));
    }
}
