//! Synthesis: combine paper analyses into the first review draft.

use super::{StageExecutor, StageName, strip_code_fence};
use crate::brain::{ContextFields, PromptTemplate, ReasoningCapability, call_with_timeout};
use crate::context::RunContext;
use crate::error::{CapabilityError, StageError};
use crate::types::{AnalysisBundle, Artifact, ArtifactKind, Draft, PaperAnalysis};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Length the model is asked to aim for.
const TARGET_WORDS: usize = 1500;

pub struct SynthesisStage {
    reasoning: Arc<dyn ReasoningCapability>,
    min_words: usize,
    call_timeout: Duration,
}

impl SynthesisStage {
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, min_words: usize, call_timeout: Duration) -> Self {
        Self {
            reasoning,
            min_words,
            call_timeout,
        }
    }
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- (none reported)".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_analysis(analysis: &PaperAnalysis) -> String {
    format!(
        "### {} {}\nSummary: {}\nResearch question: {}\nMethodology: {}\nKey findings:\n{}\nLimitations:\n{}\n",
        analysis.paper.title,
        analysis.paper.short_citation(),
        analysis.summary,
        analysis.research_question,
        analysis.methodology,
        bullet_list(&analysis.key_findings),
        bullet_list(&analysis.limitations),
    )
}

fn format_references(bundle: &AnalysisBundle) -> String {
    bundle
        .analyses
        .iter()
        .map(|a| format!("- {}", a.citation))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl StageExecutor for SynthesisStage {
    fn name(&self) -> StageName {
        StageName::Synthesis
    }

    async fn execute(&self, ctx: &RunContext) -> Result<Artifact, StageError> {
        let bundle = ctx
            .analyses()
            .filter(|b| !b.is_empty())
            .ok_or(StageError::MissingInput {
                artifact: ArtifactKind::AnalysisBundle,
            })?;

        let analyses = bundle
            .analyses
            .iter()
            .map(format_analysis)
            .collect::<Vec<_>>()
            .join("\n");
        let fields = ContextFields::new()
            .with("topic", ctx.topic())
            .with("analyses", analyses)
            .with("references", format_references(bundle))
            .with("target_words", TARGET_WORDS);
        let text = call_with_timeout(
            self.call_timeout,
            self.reasoning.generate(PromptTemplate::Synthesis, &fields),
            |timeout_secs| CapabilityError::Timeout { timeout_secs },
        )
        .await?;

        let body = strip_code_fence(&text);
        let words = body.split_whitespace().count();
        if words == 0 {
            return Err(StageError::EmptyDraft);
        }
        if words < self.min_words {
            return Err(StageError::DraftTooShort {
                words,
                minimum: self.min_words,
            });
        }
        let draft = Draft::initial(body).map_err(|_| StageError::EmptyDraft)?;

        info!(words, papers = bundle.len(), "Synthesis complete");
        Ok(Artifact::Draft(draft))
    }
}
