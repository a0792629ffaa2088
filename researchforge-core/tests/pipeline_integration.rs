//! Integration tests for the ResearchForge pipeline.
//!
//! These tests drive discovery → analysis → synthesis → refinement end-to-end
//! using MockReasoning and stub tool adapters.

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use researchforge_core::brain::{MockReasoning, PromptTemplate};
use researchforge_core::config::{EvaluatorKind, PipelineConfig};
use researchforge_core::error::{CapabilityError, EvaluatorError, PipelineError, ToolError};
use researchforge_core::output::ReviewWriter;
use researchforge_core::pipeline::{PipelineCallback, PipelineOrchestrator};
use researchforge_core::refinement::{
    Evaluator, LoopState, RefinementCallback, TerminationReason,
};
use researchforge_core::stages::StageName;
use researchforge_core::tools::{DiscoverySearch, PdfDocument, PdfFetch, Toolbox};
use researchforge_core::types::{Draft, Paper, ScoreReport};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const DISCOVERY: &str = r#"```json
[
  {"title": "Attention Is All You Need", "authors": ["Ashish Vaswani", "Noam Shazeer"], "year": 2017, "venue": "NeurIPS"},
  {"title": "BERT: Pre-training of Deep Bidirectional Transformers", "authors": ["Jacob Devlin"], "year": 2019, "venue": "NAACL"}
]
```"#;

const ANALYSIS: &str = r#"[
  {"summary": "Introduces the Transformer architecture.", "research_question": "Can attention replace recurrence?",
   "methodology": "Encoder-decoder trained on WMT", "key_findings": ["State of the art BLEU"], "limitations": ["Quadratic cost"]},
  {"summary": "Bidirectional pre-training for language understanding.", "research_question": "Does deep bidirectionality help?",
   "methodology": "Masked language modelling", "key_findings": ["GLUE improvements"], "limitations": []}
]"#;

struct StubSearch;

#[async_trait]
impl DiscoverySearch for StubSearch {
    async fn search(&self, _query: &str, limit: usize) -> Result<Vec<Paper>, ToolError> {
        let papers = vec![
            Paper::new("Attention Is All You Need")
                .with_authors(&["Ashish Vaswani"])
                .with_year(2017)
                .with_pdf_url("https://arxiv.org/pdf/1706.03762"),
        ];
        Ok(papers.into_iter().take(limit).collect())
    }

    fn name(&self) -> &str {
        "stub_search"
    }
}

struct StubPdf;

#[async_trait]
impl PdfFetch for StubPdf {
    async fn fetch(&self, _url: &str) -> Result<PdfDocument, ToolError> {
        Ok(PdfDocument {
            text: "The dominant sequence transduction models are based on recurrent networks."
                .to_string(),
            page_count: Some(11),
        })
    }
}

/// A draft that scores below any sensible threshold.
fn weak_draft() -> String {
    "word ".repeat(200)
}

/// A draft the heuristic evaluator scores 10/10 for the two papers above.
fn strong_draft() -> String {
    let mut text = String::from(
        "Introduction. This research review surveys attention in transformer models (Vaswani, 2017).\n\
         Major Themes. Moreover the central theme of each study is pre-training at scale (Devlin, 2019).\n",
    );
    let sentence = "However the findings of this study suggest that the approach and its methodology \
                    remain robust across many settings and tasks (Vaswani, 2017). ";
    for _ in 0..60 {
        text.push_str(sentence);
    }
    text.push_str(
        "Research Gaps. Furthermore several open questions remain unanswered by current work (Devlin, 2019).\n\
         Conclusion. Therefore future work should consider efficiency consequently and carefully (Vaswani, 2017).",
    );
    text
}

fn config() -> PipelineConfig {
    PipelineConfig {
        search_breadth: 2,
        ..Default::default()
    }
}

fn toolbox() -> Toolbox {
    Toolbox::new()
        .with_search(Arc::new(StubSearch))
        .with_pdf(Arc::new(StubPdf))
}

fn mock_through_synthesis(fallback: Option<&str>) -> Arc<MockReasoning> {
    let mock = match fallback {
        Some(text) => MockReasoning::with_response(text),
        None => MockReasoning::new(),
    };
    mock.queue_response(DISCOVERY);
    mock.queue_response(ANALYSIS);
    mock.queue_response(weak_draft());
    Arc::new(mock)
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
    cancel_after: Option<(StageName, CancellationToken)>,
}

impl RefinementCallback for RecordingCallback {
    fn on_evaluation(&self, iteration: usize, _draft: &Draft, report: &ScoreReport) {
        self.events
            .lock()
            .unwrap()
            .push(format!("evaluated {} -> {}", iteration, report.total));
    }

    fn on_revision(&self, iteration: usize, _draft: &Draft) {
        self.events
            .lock()
            .unwrap()
            .push(format!("revised {}", iteration));
    }

    fn on_terminated(&self, state: &LoopState) {
        self.events
            .lock()
            .unwrap()
            .push(format!("terminated: {}", state.termination_reason()));
    }
}

impl PipelineCallback for RecordingCallback {
    fn on_stage_started(&self, stage: StageName) {
        self.events.lock().unwrap().push(format!("start {}", stage));
    }

    fn on_stage_completed(&self, stage: StageName, _summary: &str) {
        self.events.lock().unwrap().push(format!("done {}", stage));
        if let Some((after, token)) = &self.cancel_after {
            if *after == stage {
                token.cancel();
            }
        }
    }
}

#[tokio::test]
async fn test_full_pipeline_meets_threshold_after_revision() {
    let mock = mock_through_synthesis(None);
    mock.queue_response(strong_draft());
    let callback = Arc::new(RecordingCallback::default());

    let outcome = PipelineOrchestrator::new(config(), mock.clone(), toolbox())
        .with_callback(callback.clone())
        .run("attention mechanisms in transformer models")
        .await
        .unwrap();

    assert_eq!(outcome.termination_reason(), TerminationReason::ThresholdMet);
    assert_eq!(outcome.loop_state.iteration(), 1);
    assert_eq!(outcome.draft.version(), 1);
    assert_eq!(outcome.final_report().map(|r| r.total), Some(10));
    assert!(outcome.failure(true).is_none());

    let ctx = &outcome.context;
    assert_eq!(ctx.iteration(), 1);
    assert_eq!(ctx.papers().unwrap().len(), 2);
    assert_eq!(ctx.drafts().count(), 2);
    assert_eq!(ctx.latest_draft(), Some(&outcome.draft));
    // Discovery keeps the PDF link from the search candidate.
    assert_eq!(
        ctx.papers().unwrap()[0].pdf_link(),
        Some("https://arxiv.org/pdf/1706.03762")
    );

    assert_eq!(
        mock.templates_called(),
        vec![
            PromptTemplate::PaperDiscovery,
            PromptTemplate::PaperAnalysis,
            PromptTemplate::Synthesis,
            PromptTemplate::Refinement,
        ]
    );
    let analysis_fields = mock.last_fields(PromptTemplate::PaperAnalysis).unwrap();
    assert!(
        analysis_fields
            .get("papers")
            .unwrap()
            .contains("sequence transduction")
    );

    assert_eq!(
        *callback.events.lock().unwrap(),
        vec![
            "start discovery",
            "done discovery",
            "start analysis",
            "done analysis",
            "start synthesis",
            "done synthesis",
            "start refinement",
            "evaluated 0 -> 0",
            "revised 1",
            "evaluated 1 -> 10",
            "terminated: threshold met",
            "done refinement",
        ]
    );
}

#[tokio::test]
async fn test_review_file_written_with_provenance() {
    let mock = mock_through_synthesis(None);
    mock.queue_response(strong_draft());
    let outcome = PipelineOrchestrator::new(config(), mock, toolbox())
        .run("Attention Mechanisms")
        .await
        .unwrap();

    let dir = TempDir::new().unwrap();
    let path = ReviewWriter::new(dir.path()).write(&outcome).unwrap();

    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("literature_review_attention_mechanisms_"));
    assert!(name.ends_with(".md"));

    let body = std::fs::read_to_string(&path).unwrap();
    assert!(body.starts_with("# Literature Review: Attention Mechanisms"));
    assert!(body.contains("- Papers reviewed: 2"));
    assert!(body.contains("- Final score: 10/10"));
    assert!(body.contains("- Termination: threshold met"));
    assert!(body.contains("Attention Is All You Need (Vaswani, 2017)"));
}

#[tokio::test]
async fn test_budget_exhausted_is_failure_only_when_strict() {
    let weak = weak_draft();
    let mock = mock_through_synthesis(Some(&weak));

    let outcome = PipelineOrchestrator::new(config(), mock.clone(), toolbox())
        .run("topic")
        .await
        .unwrap();

    assert_eq!(
        outcome.termination_reason(),
        TerminationReason::IterationsExhausted
    );
    assert_eq!(outcome.loop_state.iteration(), 3);
    assert_eq!(outcome.draft.version(), 3);
    assert!(outcome.failure(false).is_none());
    assert!(matches!(
        outcome.failure(true),
        Some(PipelineError::BudgetExhausted {
            max_iterations: 3,
            best_total: 0
        })
    ));
    assert_eq!(mock.call_count(), 6);
}

#[tokio::test]
async fn test_llm_evaluator_inconsistent_report_retried() {
    let mock = mock_through_synthesis(None);
    mock.queue_response(
        r#"{"structure": 2, "length": 2, "citations": 2, "coverage": 2, "clarity": 1, "total": 10}"#,
    );
    mock.queue_response(
        r#"{"structure": 2, "length": 2, "citations": 2, "coverage": 2, "clarity": 1, "total": 9, "feedback": "good"}"#,
    );
    let config = PipelineConfig {
        evaluator: EvaluatorKind::Llm,
        ..config()
    };

    let outcome = PipelineOrchestrator::new(config, mock.clone(), toolbox())
        .run("topic")
        .await
        .unwrap();

    assert_eq!(outcome.termination_reason(), TerminationReason::ThresholdMet);
    assert_eq!(outcome.loop_state.iteration(), 0);
    assert_eq!(outcome.draft.version(), 0);
    assert_eq!(
        mock.templates_called()[3..],
        [PromptTemplate::Evaluation, PromptTemplate::Evaluation]
    );
    let titles = mock.last_fields(PromptTemplate::Evaluation).unwrap();
    assert!(titles.get("titles").unwrap().contains("- Attention Is All You Need"));
}

#[tokio::test]
async fn test_reviser_failure_keeps_synthesis_draft() {
    let mock = mock_through_synthesis(None);
    mock.queue_error(CapabilityError::Unavailable {
        message: "service down".to_string(),
    });

    let outcome = PipelineOrchestrator::new(config(), mock, toolbox())
        .run("topic")
        .await
        .unwrap();

    assert_eq!(outcome.termination_reason(), TerminationReason::ReviserFailed);
    assert_eq!(outcome.draft.version(), 0);
    assert_eq!(outcome.draft.text(), weak_draft().trim());
    assert!(matches!(
        outcome.failure(false),
        Some(PipelineError::ReviserFailure { ref reason }) if reason.contains("service down")
    ));
}

#[tokio::test]
async fn test_cancellation_between_stages() {
    let token = CancellationToken::new();
    let callback = Arc::new(RecordingCallback {
        cancel_after: Some((StageName::Analysis, token.clone())),
        ..Default::default()
    });
    let mock = mock_through_synthesis(None);

    let result = PipelineOrchestrator::new(config(), mock.clone(), toolbox())
        .with_callback(callback)
        .with_cancellation(token)
        .run("topic")
        .await;

    let err = result.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::CancellationRequested { ref phase, .. } if phase == "synthesis"
    ));
    assert_eq!(mock.call_count(), 2);
    let ctx = err.context().unwrap();
    assert_eq!(ctx.papers().map(|p| p.len()), Some(2));
    assert!(ctx.analyses().is_some());
}

#[tokio::test]
async fn test_cancellation_after_synthesis_keeps_draft() {
    let token = CancellationToken::new();
    let callback = Arc::new(RecordingCallback {
        cancel_after: Some((StageName::Synthesis, token.clone())),
        ..Default::default()
    });
    let mock = mock_through_synthesis(None);

    let outcome = PipelineOrchestrator::new(config(), mock.clone(), toolbox())
        .with_callback(callback.clone())
        .with_cancellation(token)
        .run("topic")
        .await
        .unwrap();

    assert_eq!(outcome.termination_reason(), TerminationReason::Cancelled);
    assert_eq!(outcome.draft.version(), 0);
    assert_eq!(outcome.draft.text(), weak_draft().trim());
    assert_eq!(outcome.loop_state.iteration(), 0);
    assert!(outcome.final_report().is_none());
    assert_eq!(mock.call_count(), 3);
    assert!(matches!(
        outcome.failure(false),
        Some(PipelineError::CancellationRequested { ref phase, .. })
            if phase == "refinement iteration 1"
    ));
    assert_eq!(
        callback.events.lock().unwrap().last().map(String::as_str),
        Some("done refinement")
    );
}

/// Scores drafts from a fixed list of totals.
struct ScriptedEvaluator {
    totals: Mutex<Vec<u8>>,
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn score(&self, _draft: &Draft) -> Result<ScoreReport, EvaluatorError> {
        let total = self.totals.lock().unwrap().remove(0);
        let subs: Vec<u8> = (0..5u8).map(|i| total.saturating_sub(i * 2).min(2)).collect();
        Ok(ScoreReport::from_subscores(subs[0], subs[1], subs[2], subs[3], subs[4]))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[tokio::test]
async fn test_best_draft_is_not_appended_to_draft_log() {
    let weak = weak_draft();
    let mock = mock_through_synthesis(Some(&weak));
    let evaluator = Arc::new(ScriptedEvaluator {
        totals: Mutex::new(vec![2, 6, 4, 3]),
    });

    let outcome = PipelineOrchestrator::new(config(), mock, toolbox())
        .with_evaluator(evaluator)
        .run("topic")
        .await
        .unwrap();

    assert_eq!(
        outcome.termination_reason(),
        TerminationReason::IterationsExhausted
    );
    assert_eq!(outcome.draft.version(), 1);
    assert_eq!(outcome.final_report().map(|r| r.total), Some(6));

    let versions: Vec<u32> = outcome.context.drafts().map(|d| d.version()).collect();
    assert_eq!(versions, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_short_synthesis_is_stage_failure() {
    let mock = Arc::new(MockReasoning::new());
    mock.queue_response(DISCOVERY);
    mock.queue_response(ANALYSIS);
    mock.queue_response("A review that is far too short.");

    let err = PipelineOrchestrator::new(config(), mock, toolbox())
        .run("topic")
        .await
        .unwrap_err();

    assert_eq!(err.stage(), Some(StageName::Synthesis));
    assert_eq!(
        err.to_string(),
        "synthesis stage failed: Synthesized draft has 7 words, minimum is 150"
    );
    let ctx = err.context().unwrap();
    assert!(ctx.analyses().is_some());
    assert!(ctx.latest_draft().is_none());
}
