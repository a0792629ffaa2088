//! Discovery: pick the papers a review will cover.

use super::{StageExecutor, StageName, parse_json_array};
use crate::brain::{ContextFields, PromptTemplate, ReasoningCapability, call_with_timeout};
use crate::context::RunContext;
use crate::error::{CapabilityError, StageError, ToolError};
use crate::tools::DiscoverySearch;
use crate::types::{Artifact, Paper};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct DiscoveryStage {
    reasoning: Arc<dyn ReasoningCapability>,
    search: Option<Arc<dyn DiscoverySearch>>,
    breadth: usize,
    call_timeout: Duration,
}

impl DiscoveryStage {
    pub fn new(
        reasoning: Arc<dyn ReasoningCapability>,
        search: Option<Arc<dyn DiscoverySearch>>,
        breadth: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            reasoning,
            search,
            breadth: breadth.max(1),
            call_timeout,
        }
    }

    /// Candidate papers from the search adapter. A failed search degrades to
    /// an empty candidate list.
    async fn candidates(&self, topic: &str) -> Vec<Paper> {
        let Some(search) = &self.search else {
            return Vec::new();
        };
        let limit = self.breadth * 2;
        let result = call_with_timeout(self.call_timeout, search.search(topic, limit), |secs| {
            ToolError::Timeout {
                tool: search.name().to_string(),
                timeout_secs: secs,
            }
        })
        .await;
        match result {
            Ok(papers) => {
                debug!(tool = search.name(), found = papers.len(), "Search candidates");
                papers
            }
            Err(e) => {
                warn!(tool = search.name(), error = %e, "Search failed, continuing without candidates");
                Vec::new()
            }
        }
    }
}

/// Fill links and abstracts the model left out from a same-titled candidate.
fn enrich_from_candidates(paper: &mut Paper, candidates: &[Paper]) {
    let title = paper.title.trim().to_lowercase();
    let Some(found) = candidates
        .iter()
        .find(|c| c.title.trim().to_lowercase() == title)
    else {
        return;
    };
    if paper.url.is_none() {
        paper.url = found.url.clone();
    }
    if paper.pdf_url.is_none() {
        paper.pdf_url = found.pdf_url.clone();
    }
    if paper.abstract_text.is_none() {
        paper.abstract_text = found.abstract_text.clone();
    }
    if paper.authors.is_empty() {
        paper.authors = found.authors.clone();
    }
    if paper.year.is_none() {
        paper.year = found.year;
    }
}

#[async_trait]
impl StageExecutor for DiscoveryStage {
    fn name(&self) -> StageName {
        StageName::Discovery
    }

    async fn execute(&self, ctx: &RunContext) -> Result<Artifact, StageError> {
        let candidates = self.candidates(ctx.topic()).await;
        let candidates_json =
            serde_json::to_string_pretty(&candidates).unwrap_or_else(|_| "[]".to_string());

        let fields = ContextFields::new()
            .with("topic", ctx.topic())
            .with("breadth", self.breadth)
            .with("candidates", candidates_json);
        let text = call_with_timeout(
            self.call_timeout,
            self.reasoning
                .generate(PromptTemplate::PaperDiscovery, &fields),
            |timeout_secs| CapabilityError::Timeout { timeout_secs },
        )
        .await?;

        let mut papers: Vec<Paper> = parse_json_array(&text)?;
        papers.retain(|p| !p.title.trim().is_empty());
        papers.truncate(self.breadth);
        if papers.is_empty() {
            return Err(StageError::NoPapers);
        }
        for paper in &mut papers {
            enrich_from_candidates(paper, &candidates);
        }

        info!(
            papers = papers.len(),
            candidates = candidates.len(),
            "Discovery complete"
        );
        Ok(Artifact::PaperList(papers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockReasoning;

    struct FixedSearch(Vec<Paper>);

    #[async_trait]
    impl DiscoverySearch for FixedSearch {
        async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Paper>, ToolError> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl DiscoverySearch for FailingSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Paper>, ToolError> {
            Err(ToolError::Request {
                tool: "failing".to_string(),
                message: "connection refused".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    const THREE_PAPERS: &str = r#"```json
[
  {"title": "Attention Is All You Need", "authors": ["Ashish Vaswani"], "year": 2017},
  {"title": "BERT", "authors": ["Jacob Devlin"], "year": "2019"},
  {"title": "GPT-3", "authors": ["Tom Brown"], "year": 2020}
]
```"#;

    fn stage(mock: Arc<MockReasoning>, search: Option<Arc<dyn DiscoverySearch>>) -> DiscoveryStage {
        DiscoveryStage::new(mock, search, 2, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_discovery_truncates_to_breadth() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_response(THREE_PAPERS);
        let ctx = RunContext::new("transformers");

        let artifact = stage(mock.clone(), None).execute(&ctx).await.unwrap();
        let Artifact::PaperList(papers) = artifact else {
            panic!("expected paper list");
        };
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[1].year, Some(2019));

        let fields = mock.last_fields(PromptTemplate::PaperDiscovery).unwrap();
        assert_eq!(fields.get("breadth"), Some("2"));
        assert_eq!(fields.get("candidates"), Some("[]"));
    }

    #[tokio::test]
    async fn test_discovery_enriches_from_search_candidates() {
        let candidate = Paper::new("Attention Is All You Need")
            .with_pdf_url("https://arxiv.org/pdf/1706.03762");
        let search: Arc<dyn DiscoverySearch> = Arc::new(FixedSearch(vec![candidate]));
        let mock = Arc::new(MockReasoning::new());
        mock.queue_response(THREE_PAPERS);

        let artifact = stage(mock.clone(), Some(search))
            .execute(&RunContext::new("transformers"))
            .await
            .unwrap();
        let Artifact::PaperList(papers) = artifact else {
            panic!("expected paper list");
        };
        assert_eq!(papers[0].pdf_link(), Some("https://arxiv.org/pdf/1706.03762"));
        let fields = mock.last_fields(PromptTemplate::PaperDiscovery).unwrap();
        assert!(fields.get("candidates").unwrap().contains("Attention Is All You Need"));
    }

    #[tokio::test]
    async fn test_discovery_search_failure_degrades() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_response(THREE_PAPERS);
        let result = stage(mock, Some(Arc::new(FailingSearch)))
            .execute(&RunContext::new("transformers"))
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_discovery_requires_papers() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_response("[]");
        let result = stage(mock, None).execute(&RunContext::new("t")).await;
        assert!(matches!(result, Err(StageError::NoPapers)));
    }

    #[tokio::test]
    async fn test_discovery_rejects_prose() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_response("I could not find any papers.");
        let result = stage(mock, None).execute(&RunContext::new("t")).await;
        assert!(matches!(result, Err(StageError::InvalidResponse { .. })));
    }

    #[tokio::test]
    async fn test_discovery_capability_error_propagates() {
        let mock = Arc::new(MockReasoning::new());
        mock.queue_error(CapabilityError::RateLimited {
            retry_after_secs: 30,
        });
        let result = stage(mock.clone(), None).execute(&RunContext::new("t")).await;
        assert!(matches!(
            result,
            Err(StageError::Capability(CapabilityError::RateLimited { .. }))
        ));
        assert_eq!(mock.call_count(), 1);
    }
}
