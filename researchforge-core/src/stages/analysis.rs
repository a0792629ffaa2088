//! Analysis: structured summaries of each discovered paper.

use super::{StageExecutor, StageName, parse_json_array, truncate_chars};
use crate::brain::{ContextFields, PromptTemplate, ReasoningCapability, call_with_timeout};
use crate::context::RunContext;
use crate::error::{CapabilityError, StageError, ToolError};
use crate::tools::Toolbox;
use crate::types::{AnalysisBundle, Artifact, ArtifactKind, Paper, PaperAnalysis};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Characters of extracted PDF text included per paper.
const EXCERPT_CHARS: usize = 4000;

pub struct AnalysisStage {
    reasoning: Arc<dyn ReasoningCapability>,
    tools: Toolbox,
    call_timeout: Duration,
}

/// One analysis object as returned by the model.
#[derive(Debug, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    research_question: String,
    #[serde(default)]
    methodology: String,
    #[serde(default, deserialize_with = "string_or_list")]
    key_findings: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    limitations: Vec<String>,
}

/// Accept either a JSON array of strings or a single string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
        None => Vec::new(),
    })
}

impl AnalysisStage {
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, tools: Toolbox, call_timeout: Duration) -> Self {
        Self {
            reasoning,
            tools,
            call_timeout,
        }
    }

    /// Extracted full text for `paper`, or `None` when no PDF is available or
    /// the fetch fails.
    async fn excerpt(&self, paper: &Paper) -> Option<String> {
        let pdf = self.tools.pdf.as_ref()?;
        let url = paper.pdf_link()?;
        let result = call_with_timeout(self.call_timeout, pdf.fetch(url), |secs| {
            ToolError::Timeout {
                tool: "pdf_fetch".to_string(),
                timeout_secs: secs,
            }
        })
        .await;
        match result {
            Ok(doc) => {
                debug!(title = %paper.title, chars = doc.text.len(), "Fetched PDF text");
                Some(truncate_chars(&doc.text, EXCERPT_CHARS).to_string())
            }
            Err(e) => {
                warn!(title = %paper.title, url, error = %e, "PDF unavailable, analysing abstract only");
                None
            }
        }
    }

    fn describe(index: usize, paper: &Paper, citation: &str, excerpt: Option<&str>) -> String {
        let authors = if paper.authors.is_empty() {
            "Unknown".to_string()
        } else {
            paper.authors.join(", ")
        };
        let year = paper
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n.d.".to_string());
        let mut block = format!(
            "[{}] {}\nAuthors: {}\nYear: {}\nCitation: {}\n",
            index + 1,
            paper.title,
            authors,
            year,
            citation
        );
        if let Some(venue) = &paper.venue {
            block.push_str(&format!("Venue: {}\n", venue));
        }
        if let Some(abstract_text) = &paper.abstract_text {
            block.push_str(&format!("Abstract: {}\n", abstract_text));
        }
        if let Some(excerpt) = excerpt {
            block.push_str(&format!("Full text excerpt:\n{}\n", excerpt));
        }
        block
    }
}

#[async_trait]
impl StageExecutor for AnalysisStage {
    fn name(&self) -> StageName {
        StageName::Analysis
    }

    async fn execute(&self, ctx: &RunContext) -> Result<Artifact, StageError> {
        let papers = ctx.papers().ok_or(StageError::MissingInput {
            artifact: ArtifactKind::PaperList,
        })?;
        if papers.is_empty() {
            return Err(StageError::NoPapers);
        }

        let mut citations = Vec::with_capacity(papers.len());
        let mut blocks = Vec::with_capacity(papers.len());
        let mut with_full_text = 0;
        for (index, paper) in papers.iter().enumerate() {
            let excerpt = self.excerpt(paper).await;
            if excerpt.is_some() {
                with_full_text += 1;
            }
            let citation = self.tools.cite(paper);
            blocks.push(Self::describe(index, paper, &citation, excerpt.as_deref()));
            citations.push(citation);
        }

        let fields = ContextFields::new()
            .with("topic", ctx.topic())
            .with("papers", blocks.join("\n"));
        let text = call_with_timeout(
            self.call_timeout,
            self.reasoning.generate(PromptTemplate::PaperAnalysis, &fields),
            |timeout_secs| CapabilityError::Timeout { timeout_secs },
        )
        .await?;

        let raw: Vec<RawAnalysis> = parse_json_array(&text)?;
        if raw.len() < papers.len() {
            warn!(
                expected = papers.len(),
                received = raw.len(),
                "Fewer analyses than papers"
            );
        }

        let mut analyses = Vec::with_capacity(raw.len().min(papers.len()));
        for ((paper, citation), raw) in papers.iter().zip(citations).zip(raw) {
            if raw.summary.trim().is_empty() {
                return Err(StageError::InvalidResponse {
                    message: format!("analysis of '{}' has an empty summary", paper.title),
                });
            }
            analyses.push(PaperAnalysis {
                paper: paper.clone(),
                citation,
                summary: raw.summary.trim().to_string(),
                research_question: raw.research_question,
                methodology: raw.methodology,
                key_findings: raw.key_findings,
                limitations: raw.limitations,
            });
        }
        if analyses.is_empty() {
            return Err(StageError::InvalidResponse {
                message: "no paper analyses returned".to_string(),
            });
        }

        info!(
            analysed = analyses.len(),
            full_text = with_full_text,
            "Analysis complete"
        );
        Ok(Artifact::AnalysisBundle(AnalysisBundle { analyses }))
    }
}
