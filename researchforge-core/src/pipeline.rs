//! Pipeline orchestrator.
//!
//! Sequences discovery → analysis → synthesis, records each artifact in the
//! run context, then hands the synthesized draft to the refinement loop.

use crate::brain::ReasoningCapability;
use crate::config::{EvaluatorKind, PipelineConfig};
use crate::context::RunContext;
use crate::error::{PipelineError, StageError};
use crate::refinement::{
    Evaluator, HeuristicEvaluator, LlmEvaluator, LlmReviser, LoopState, NoOpCallback,
    RefinementCallback, RefinementController, Reviser, TerminationReason,
};
use crate::stages::{AnalysisStage, DiscoveryStage, StageExecutor, StageName, SynthesisStage};
use crate::tools::Toolbox;
use crate::types::{Artifact, ArtifactKind, Draft, Paper, ScoreReport};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Observer of pipeline progress, including refinement events.
pub trait PipelineCallback: RefinementCallback {
    fn on_stage_started(&self, stage: StageName);
    /// `summary` is a short human-readable description of the stage output.
    fn on_stage_completed(&self, stage: StageName, summary: &str);
}

impl PipelineCallback for NoOpCallback {
    fn on_stage_started(&self, _stage: StageName) {}
    fn on_stage_completed(&self, _stage: StageName, _summary: &str) {}
}

/// Result of a run that got through every stage.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Best draft from the loop, or the synthesized draft if it was never scored.
    pub draft: Draft,
    pub loop_state: LoopState,
    pub context: RunContext,
}

impl RunOutcome {
    pub fn termination_reason(&self) -> TerminationReason {
        self.loop_state.termination_reason()
    }

    /// Report for the final draft, if it was scored.
    pub fn final_report(&self) -> Option<&ScoreReport> {
        self.loop_state.best_report()
    }

    pub fn paper_count(&self) -> usize {
        self.context.papers().map_or(0, <[Paper]>::len)
    }

    /// The error this outcome represents, if any. An exhausted iteration
    /// budget only counts as a failure when `strict` is set.
    pub fn failure(&self, strict: bool) -> Option<PipelineError> {
        let detail = || {
            self.loop_state
                .failure()
                .unwrap_or("no detail recorded")
                .to_string()
        };
        match self.termination_reason() {
            TerminationReason::ThresholdMet => None,
            TerminationReason::IterationsExhausted if strict => {
                Some(PipelineError::BudgetExhausted {
                    max_iterations: self.loop_state.iteration(),
                    best_total: self.loop_state.best_total().unwrap_or(0),
                })
            }
            TerminationReason::IterationsExhausted => None,
            TerminationReason::EvaluatorFailed => {
                Some(PipelineError::EvaluatorFailure { reason: detail() })
            }
            TerminationReason::ReviserFailed => {
                Some(PipelineError::ReviserFailure { reason: detail() })
            }
            TerminationReason::Cancelled => Some(PipelineError::CancellationRequested {
                phase: format!("refinement iteration {}", self.loop_state.iteration() + 1),
                context: Box::new(self.context.clone()),
            }),
        }
    }
}

/// Runs one literature review from topic to refined draft.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    reasoning: Arc<dyn ReasoningCapability>,
    tools: Toolbox,
    callback: Arc<dyn PipelineCallback>,
    cancel: CancellationToken,
    evaluator: Option<Arc<dyn Evaluator>>,
    reviser: Option<Arc<dyn Reviser>>,
}

impl PipelineOrchestrator {
    pub fn new(
        config: PipelineConfig,
        reasoning: Arc<dyn ReasoningCapability>,
        tools: Toolbox,
    ) -> Self {
        Self {
            config,
            reasoning,
            tools,
            callback: Arc::new(NoOpCallback),
            cancel: CancellationToken::new(),
            evaluator: None,
            reviser: None,
        }
    }

    pub fn with_callback(mut self, callback: Arc<dyn PipelineCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Token checked between stages and between refinement iterations.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Override the evaluator selected by `config.evaluator`.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Override the reasoning-backed reviser.
    pub fn with_reviser(mut self, reviser: Arc<dyn Reviser>) -> Self {
        self.reviser = Some(reviser);
        self
    }

    /// Run every stage for `topic`, then refine the synthesized draft.
    pub async fn run(&self, topic: &str) -> Result<RunOutcome, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::InvalidTopic);
        }
        self.config.validate()?;

        let mut ctx = RunContext::new(topic);
        info!(
            run_id = %ctx.run_id(),
            topic,
            breadth = self.config.search_breadth,
            threshold = self.config.quality_threshold,
            max_iterations = self.config.max_iterations,
            evaluator = %self.config.evaluator,
            "Starting literature review pipeline"
        );

        let timeout = self.config.call_timeout();
        let stages: Vec<Box<dyn StageExecutor>> = vec![
            Box::new(DiscoveryStage::new(
                self.reasoning.clone(),
                self.tools.search.clone(),
                self.config.search_breadth,
                timeout,
            )),
            Box::new(AnalysisStage::new(
                self.reasoning.clone(),
                self.tools.clone(),
                timeout,
            )),
            Box::new(SynthesisStage::new(
                self.reasoning.clone(),
                self.config.min_draft_words,
                timeout,
            )),
        ];

        for stage in &stages {
            let name = stage.name();
            if self.cancel.is_cancelled() {
                return Err(cancelled_before(name, ctx));
            }
            self.callback.on_stage_started(name);
            match stage.execute(&ctx).await {
                Ok(artifact) => {
                    let summary = summarize(&artifact);
                    ctx.record(artifact);
                    self.callback.on_stage_completed(name, &summary);
                }
                Err(cause) => {
                    error!(stage = %name, error = %cause, "Stage failed");
                    return Err(PipelineError::StageFailure {
                        stage: name,
                        cause,
                        context: Box::new(ctx),
                    });
                }
            }
        }

        // A cancel from here on is observed by the controller, which reports it
        // as a Cancelled outcome carrying the synthesized draft.
        let Some(initial) = ctx.latest_draft().cloned() else {
            return Err(PipelineError::StageFailure {
                stage: StageName::Synthesis,
                cause: StageError::MissingInput {
                    artifact: ArtifactKind::Draft,
                },
                context: Box::new(ctx),
            });
        };

        let evaluator = match &self.evaluator {
            Some(evaluator) => evaluator.clone(),
            None => self.default_evaluator(&ctx),
        };
        let reviser: Arc<dyn Reviser> = match &self.reviser {
            Some(reviser) => reviser.clone(),
            None => Arc::new(LlmReviser::new(self.reasoning.clone(), topic)),
        };

        self.callback.on_stage_started(StageName::Refinement);
        let refinement_callback: Arc<dyn RefinementCallback> = self.callback.clone();
        let controller = RefinementController::new(self.config.refinement())?
            .with_callback(refinement_callback)
            .with_cancellation(self.cancel.clone());
        let loop_state = controller
            .run(initial.clone(), evaluator.as_ref(), reviser.as_ref())
            .await;

        for record in loop_state.history().iter().filter(|r| r.draft.version() > 0) {
            ctx.record(Artifact::Draft(record.draft.clone()));
        }
        let draft = loop_state.best_draft().cloned().unwrap_or(initial);
        ctx.advance_iteration(loop_state.iteration());

        let summary = match loop_state.best_total() {
            Some(total) => format!(
                "{} after {} iteration(s), score {}/10",
                loop_state.termination_reason(),
                loop_state.iteration(),
                total
            ),
            None => format!("{}, draft not scored", loop_state.termination_reason()),
        };
        self.callback
            .on_stage_completed(StageName::Refinement, &summary);

        info!(
            run_id = %ctx.run_id(),
            reason = %loop_state.termination_reason(),
            version = draft.version(),
            words = draft.word_count(),
            "Pipeline finished"
        );

        Ok(RunOutcome {
            draft,
            loop_state,
            context: ctx,
        })
    }

    fn default_evaluator(&self, ctx: &RunContext) -> Arc<dyn Evaluator> {
        let analysed: Vec<Paper> = ctx
            .analyses()
            .map(|b| b.analyses.iter().map(|a| a.paper.clone()).collect())
            .unwrap_or_default();
        match self.config.evaluator {
            EvaluatorKind::Heuristic => {
                Arc::new(HeuristicEvaluator::for_papers(&analysed)) as Arc<dyn Evaluator>
            }
            EvaluatorKind::Llm => Arc::new(LlmEvaluator::new(
                self.reasoning.clone(),
                analysed.into_iter().map(|p| p.title).collect(),
            )),
        }
    }

}

fn cancelled_before(next: StageName, ctx: RunContext) -> PipelineError {
    info!(phase = %next, "Run cancelled");
    PipelineError::CancellationRequested {
        phase: next.to_string(),
        context: Box::new(ctx),
    }
}

fn summarize(artifact: &Artifact) -> String {
    match artifact {
        Artifact::PaperList(papers) => format!("{} papers selected", papers.len()),
        Artifact::AnalysisBundle(bundle) => format!("{} papers analysed", bundle.len()),
        Artifact::Draft(draft) => format!("draft v{} with {} words", draft.version(), draft.word_count()),
    }
}
