//! The refinement loop controller.
//!
//! Drives revise/score cycles over a draft until it meets the quality
//! threshold, the iteration budget runs out, a capability fails, or the run
//! is cancelled. Each evaluation is checked against the score-report
//! invariant; a malformed report is retried once, timeouts never are.

use super::evaluator::Evaluator;
use super::reviser::Reviser;
use crate::brain::call_with_timeout;
use crate::error::{ConfigError, EvaluatorError, ReviserError};
use crate::types::{Draft, MAX_TOTAL, ScoreReport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Evaluations attempted per draft before a malformed report is fatal.
const MAX_EVALUATION_ATTEMPTS: usize = 2;

/// Loop parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefinementConfig {
    /// Minimum total (0-10) a draft needs to be accepted.
    pub quality_threshold: u8,
    /// Maximum number of revise/score cycles after the initial evaluation.
    pub max_iterations: usize,
    /// Upper bound on each evaluator or reviser call.
    pub call_timeout: Duration,
}

impl RefinementConfig {
    /// Reject thresholds above the maximum total and an empty iteration budget.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quality_threshold > MAX_TOTAL {
            return Err(ConfigError::Invalid {
                message: format!(
                    "quality_threshold must be in 0..={}, got {}",
                    MAX_TOTAL, self.quality_threshold
                ),
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                message: "max_iterations must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 8,
            max_iterations: 3,
            call_timeout: Duration::from_secs(120),
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    ThresholdMet,
    IterationsExhausted,
    EvaluatorFailed,
    ReviserFailed,
    Cancelled,
}

impl TerminationReason {
    /// Whether the loop ended because a capability failed or the run was cancelled.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            TerminationReason::EvaluatorFailed
                | TerminationReason::ReviserFailed
                | TerminationReason::Cancelled
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TerminationReason::ThresholdMet => "threshold met",
            TerminationReason::IterationsExhausted => "iterations exhausted",
            TerminationReason::EvaluatorFailed => "evaluator failed",
            TerminationReason::ReviserFailed => "reviser failed",
            TerminationReason::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// One successful evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 0 for the initial draft, k for the candidate of cycle k.
    pub iteration: usize,
    pub draft: Draft,
    pub report: ScoreReport,
}

/// Frozen result of a loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    iteration: usize,
    best_draft: Option<Draft>,
    best_report: Option<ScoreReport>,
    termination_reason: TerminationReason,
    failure: Option<String>,
    history: Vec<IterationRecord>,
}

impl LoopState {
    /// Completed revise/score cycles.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Highest-scoring draft seen; `None` if the initial evaluation failed.
    pub fn best_draft(&self) -> Option<&Draft> {
        self.best_draft.as_ref()
    }

    pub fn best_report(&self) -> Option<&ScoreReport> {
        self.best_report.as_ref()
    }

    pub fn best_total(&self) -> Option<u8> {
        self.best_report.as_ref().map(|r| r.total)
    }

    pub fn termination_reason(&self) -> TerminationReason {
        self.termination_reason
    }

    /// Description of the error behind a failed termination.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Every accepted evaluation in order.
    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }
}

/// Mutable loop bookkeeping; frozen into a [`LoopState`] on termination.
#[derive(Debug, Default)]
struct LoopTracker {
    iteration: usize,
    best: Option<(Draft, ScoreReport)>,
    history: Vec<IterationRecord>,
}

impl LoopTracker {
    fn observe(&mut self, draft: &Draft, report: &ScoreReport) {
        let replace = match &self.best {
            Some((_, best)) => report.total >= best.total,
            None => true,
        };
        if replace {
            self.best = Some((draft.clone(), report.clone()));
        }
        self.history.push(IterationRecord {
            iteration: self.iteration,
            draft: draft.clone(),
            report: report.clone(),
        });
    }

    fn freeze(self, reason: TerminationReason, failure: Option<String>) -> LoopState {
        let (best_draft, best_report) = match self.best {
            Some((draft, report)) => (Some(draft), Some(report)),
            None => (None, None),
        };
        LoopState {
            iteration: self.iteration,
            best_draft,
            best_report,
            termination_reason: reason,
            failure,
            history: self.history,
        }
    }
}

/// Observer of loop progress.
pub trait RefinementCallback: Send + Sync {
    /// A draft was scored with a valid report.
    fn on_evaluation(&self, iteration: usize, draft: &Draft, report: &ScoreReport);
    /// The reviser produced a new candidate.
    fn on_revision(&self, iteration: usize, draft: &Draft);
    /// The loop finished.
    fn on_terminated(&self, state: &LoopState);
}

/// No-op callback for testing.
pub struct NoOpCallback;

impl RefinementCallback for NoOpCallback {
    fn on_evaluation(&self, _iteration: usize, _draft: &Draft, _report: &ScoreReport) {}
    fn on_revision(&self, _iteration: usize, _draft: &Draft) {}
    fn on_terminated(&self, _state: &LoopState) {}
}

/// Runs the START → ITERATE → DONE state machine.
pub struct RefinementController {
    config: RefinementConfig,
    callback: Arc<dyn RefinementCallback>,
    cancel: CancellationToken,
}

impl RefinementController {
    pub fn new(config: RefinementConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            callback: Arc::new(NoOpCallback),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_callback(mut self, callback: Arc<dyn RefinementCallback>) -> Self {
        self.callback = callback;
        self
    }

    /// Token checked before each iteration. Calls in flight are never interrupted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Refine `initial` until a termination condition holds.
    pub async fn run(
        &self,
        initial: Draft,
        evaluator: &dyn Evaluator,
        reviser: &dyn Reviser,
    ) -> LoopState {
        let threshold = self.config.quality_threshold;
        let max_iterations = self.config.max_iterations;
        let mut tracker = LoopTracker::default();

        info!(
            threshold,
            max_iterations,
            evaluator = evaluator.name(),
            words = initial.word_count(),
            "Starting refinement loop"
        );

        if self.cancel.is_cancelled() {
            return self.finish(
                tracker,
                TerminationReason::Cancelled,
                Some("cancelled before the initial evaluation".to_string()),
            );
        }

        // START
        let mut report = match self.evaluate(evaluator, &initial, 0).await {
            Ok(report) => report,
            Err(e) => {
                return self.finish(tracker, TerminationReason::EvaluatorFailed, Some(e.to_string()));
            }
        };
        tracker.observe(&initial, &report);
        self.callback.on_evaluation(0, &initial, &report);

        if report.meets(threshold) {
            return self.finish(tracker, TerminationReason::ThresholdMet, None);
        }

        // ITERATE
        let mut current = initial;
        loop {
            if tracker.iteration >= max_iterations {
                return self.finish(tracker, TerminationReason::IterationsExhausted, None);
            }
            if self.cancel.is_cancelled() {
                let done = tracker.iteration;
                return self.finish(
                    tracker,
                    TerminationReason::Cancelled,
                    Some(format!(
                        "cancelled after {} of {} iterations",
                        done, max_iterations
                    )),
                );
            }

            let iteration = tracker.iteration + 1;
            debug!(iteration, version = current.version(), "Revising draft");

            let candidate = match self.revise(reviser, &current, &report).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    return self.finish(tracker, TerminationReason::ReviserFailed, Some(e.to_string()));
                }
            };
            self.callback.on_revision(iteration, &candidate);

            let candidate_report = match self.evaluate(evaluator, &candidate, iteration).await {
                Ok(report) => report,
                Err(e) => {
                    return self.finish(
                        tracker,
                        TerminationReason::EvaluatorFailed,
                        Some(e.to_string()),
                    );
                }
            };
            tracker.iteration = iteration;
            tracker.observe(&candidate, &candidate_report);
            self.callback
                .on_evaluation(iteration, &candidate, &candidate_report);

            info!(
                iteration,
                score = candidate_report.total,
                best = tracker.best.as_ref().map(|(_, r)| r.total),
                "Refinement iteration complete"
            );

            if candidate_report.meets(threshold) {
                return self.finish(tracker, TerminationReason::ThresholdMet, None);
            }
            if iteration == max_iterations {
                return self.finish(tracker, TerminationReason::IterationsExhausted, None);
            }

            current = candidate;
            report = candidate_report;
        }
    }

    /// Score `draft`, retrying once when the report breaks the score invariant.
    async fn evaluate(
        &self,
        evaluator: &dyn Evaluator,
        draft: &Draft,
        iteration: usize,
    ) -> Result<ScoreReport, EvaluatorError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let report = call_with_timeout(
                self.config.call_timeout,
                evaluator.score(draft),
                |timeout_secs| EvaluatorError::Timeout { timeout_secs },
            )
            .await?;

            match report.check_invariant() {
                Ok(()) => {
                    debug!(iteration, total = report.total, "Draft evaluated");
                    return Ok(report);
                }
                Err(violation) if attempt < MAX_EVALUATION_ATTEMPTS => {
                    warn!(
                        iteration,
                        attempt,
                        error = %violation,
                        "Rejected inconsistent score report, retrying evaluation"
                    );
                }
                Err(violation) => return Err(violation.into()),
            }
        }
    }

    async fn revise(
        &self,
        reviser: &dyn Reviser,
        current: &Draft,
        report: &ScoreReport,
    ) -> Result<Draft, ReviserError> {
        let text = call_with_timeout(
            self.config.call_timeout,
            reviser.revise(current, report),
            |timeout_secs| ReviserError::Timeout { timeout_secs },
        )
        .await?;
        current.revise(text).map_err(|e| ReviserError::Rejected {
            message: e.to_string(),
        })
    }

    fn finish(
        &self,
        tracker: LoopTracker,
        reason: TerminationReason,
        failure: Option<String>,
    ) -> LoopState {
        let state = tracker.freeze(reason, failure);
        if reason.is_failure() {
            warn!(
                reason = %reason,
                iteration = state.iteration(),
                error = state.failure().unwrap_or(""),
                "Refinement loop terminated early"
            );
        } else {
            info!(
                reason = %reason,
                iteration = state.iteration(),
                best = state.best_total(),
                "Refinement loop finished"
            );
        }
        self.callback.on_terminated(&state);
        state
    }
}
