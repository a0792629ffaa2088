//! Per-run state shared by reference across the pipeline.
//!
//! A `RunContext` belongs to exactly one run. Only the pipeline orchestrator
//! can write to it (the mutators are crate-private); stage executors and the
//! refinement controller see it read-only.

use crate::types::{AnalysisBundle, Artifact, ArtifactKind, Draft, Paper};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One entry in the append-only artifact log.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub artifact: Artifact,
    pub recorded_at: DateTime<Utc>,
}

/// State for a single literature-review run.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    run_id: Uuid,
    topic: String,
    started_at: DateTime<Utc>,
    artifacts: Vec<ArtifactEntry>,
    iteration: usize,
}

impl RunContext {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            topic: topic.into(),
            started_at: Utc::now(),
            artifacts: Vec::new(),
            iteration: 0,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Refinement iterations completed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Every artifact ever recorded, oldest first.
    pub fn artifacts(&self) -> &[ArtifactEntry] {
        &self.artifacts
    }

    /// The most recent artifact of the given kind.
    pub fn latest(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .rev()
            .map(|e| &e.artifact)
            .find(|a| a.kind() == kind)
    }

    pub fn papers(&self) -> Option<&[Paper]> {
        match self.latest(ArtifactKind::PaperList)? {
            Artifact::PaperList(papers) => Some(papers),
            _ => None,
        }
    }

    pub fn analyses(&self) -> Option<&AnalysisBundle> {
        match self.latest(ArtifactKind::AnalysisBundle)? {
            Artifact::AnalysisBundle(bundle) => Some(bundle),
            _ => None,
        }
    }

    pub fn latest_draft(&self) -> Option<&Draft> {
        match self.latest(ArtifactKind::Draft)? {
            Artifact::Draft(draft) => Some(draft),
            _ => None,
        }
    }

    /// All drafts in the order they were recorded.
    pub fn drafts(&self) -> impl Iterator<Item = &Draft> {
        self.artifacts.iter().filter_map(|e| match &e.artifact {
            Artifact::Draft(d) => Some(d),
            _ => None,
        })
    }

    /// Record a new artifact. Replacements append; nothing is overwritten in place.
    pub(crate) fn record(&mut self, artifact: Artifact) {
        self.artifacts.push(ArtifactEntry {
            artifact,
            recorded_at: Utc::now(),
        });
    }

    /// Move the iteration counter forward. Never moves it backwards.
    pub(crate) fn advance_iteration(&mut self, iteration: usize) {
        if iteration < self.iteration {
            tracing::warn!(
                current = self.iteration,
                requested = iteration,
                "Ignoring attempt to move iteration counter backwards"
            );
            return;
        }
        self.iteration = iteration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_artifact_wins() {
        let mut ctx = RunContext::new("sparse attention");
        ctx.record(Artifact::PaperList(vec![Paper::new("First")]));
        ctx.record(Artifact::PaperList(vec![
            Paper::new("Second"),
            Paper::new("Third"),
        ]));

        let papers = ctx.papers().unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].title, "Second");
        // Both entries are kept in the log.
        assert_eq!(ctx.artifacts().len(), 2);
    }

    #[test]
    fn test_draft_history_is_reconstructable() {
        let mut ctx = RunContext::new("topic");
        let v0 = Draft::initial("first").unwrap();
        let v1 = v0.revise("second").unwrap();
        ctx.record(Artifact::Draft(v0));
        ctx.record(Artifact::AnalysisBundle(AnalysisBundle::default()));
        ctx.record(Artifact::Draft(v1));

        let versions: Vec<u32> = ctx.drafts().map(|d| d.version()).collect();
        assert_eq!(versions, vec![0, 1]);
        assert_eq!(ctx.latest_draft().unwrap().text(), "second");
    }

    #[test]
    fn test_iteration_counter_is_monotonic() {
        let mut ctx = RunContext::new("topic");
        ctx.advance_iteration(2);
        ctx.advance_iteration(1);
        assert_eq!(ctx.iteration(), 2);
        ctx.advance_iteration(3);
        assert_eq!(ctx.iteration(), 3);
    }

    #[test]
    fn test_missing_artifacts() {
        let ctx = RunContext::new("topic");
        assert!(ctx.papers().is_none());
        assert!(ctx.analyses().is_none());
        assert!(ctx.latest_draft().is_none());
    }
}
