//! Console progress lines for a pipeline run.

use researchforge_core::pipeline::PipelineCallback;
use researchforge_core::refinement::{LoopState, RefinementCallback};
use researchforge_core::stages::StageName;
use researchforge_core::types::{Draft, ScoreReport};

/// Prints one line per stage and refinement event to stdout.
pub struct ConsoleProgress {
    quiet: bool,
    threshold: u8,
}

impl ConsoleProgress {
    pub fn new(threshold: u8, quiet: bool) -> Self {
        Self { quiet, threshold }
    }

    fn print(&self, line: String) {
        if !self.quiet {
            println!("{}", line);
        }
    }
}

fn stage_label(stage: StageName) -> &'static str {
    match stage {
        StageName::Discovery => "Discovering papers",
        StageName::Analysis => "Analysing papers",
        StageName::Synthesis => "Synthesizing draft",
        StageName::Refinement => "Refining draft",
    }
}

pub(crate) fn evaluation_line(iteration: usize, report: &ScoreReport, threshold: u8) -> String {
    let weakest = report
        .weakest_criteria()
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let mark = if report.meets(threshold) { "pass" } else { "below threshold" };
    if weakest.is_empty() {
        format!("  [{}] score {}/10 ({})", iteration, report.total, mark)
    } else {
        format!(
            "  [{}] score {}/10 ({}); weakest: {}",
            iteration, report.total, mark, weakest
        )
    }
}

pub(crate) fn termination_line(state: &LoopState) -> String {
    let best = state
        .best_total()
        .map(|t| format!("{}/10", t))
        .unwrap_or_else(|| "unscored".to_string());
    match state.failure() {
        Some(detail) => format!(
            "  Refinement stopped: {} after {} iteration(s), best {} ({})",
            state.termination_reason(),
            state.iteration(),
            best,
            detail
        ),
        None => format!(
            "  Refinement finished: {} after {} iteration(s), best {}",
            state.termination_reason(),
            state.iteration(),
            best
        ),
    }
}

impl RefinementCallback for ConsoleProgress {
    fn on_evaluation(&self, iteration: usize, _draft: &Draft, report: &ScoreReport) {
        self.print(evaluation_line(iteration, report, self.threshold));
    }

    fn on_revision(&self, iteration: usize, draft: &Draft) {
        self.print(format!(
            "  [{}] revised draft v{} ({} words)",
            iteration,
            draft.version(),
            draft.word_count()
        ));
    }

    fn on_terminated(&self, state: &LoopState) {
        self.print(termination_line(state));
    }
}

impl PipelineCallback for ConsoleProgress {
    fn on_stage_started(&self, stage: StageName) {
        self.print(format!("> {}...", stage_label(stage)));
    }

    fn on_stage_completed(&self, stage: StageName, summary: &str) {
        self.print(format!("  {} complete: {}", stage, summary));
    }
}
