//! Review output: file naming, markdown rendering, and atomic writes.

use crate::pipeline::RunOutcome;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Longest slug kept in a file name.
const MAX_SLUG_CHARS: usize = 50;

/// Atomically write raw bytes to a file.
///
/// Writes to a `.tmp` sibling file, then renames it over the target path.
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Lowercase, underscore-separated form of `topic` safe for file names.
pub fn topic_slug(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    for c in topic.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug: String = slug.trim_end_matches('_').chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "review".to_string()
    } else {
        slug.to_string()
    }
}

/// `literature_review_<slug>_<YYYYMMDD-HHMMSS>.md`
pub fn review_file_name(topic: &str, at: DateTime<Utc>) -> String {
    format!(
        "literature_review_{}_{}.md",
        topic_slug(topic),
        at.format("%Y%m%d-%H%M%S")
    )
}

/// The final review as markdown, with a title header and provenance footer.
pub fn render_review(outcome: &RunOutcome) -> String {
    let ctx = &outcome.context;
    let mut out = format!(
        "# Literature Review: {}\n\n*Generated {} (run {})*\n\n---\n\n",
        ctx.topic(),
        ctx.started_at().format("%Y-%m-%d %H:%M UTC"),
        ctx.run_id()
    );
    out.push_str(outcome.draft.text().trim_end());
    out.push_str("\n\n---\n\n## Provenance\n\n");

    out.push_str(&format!("- Papers reviewed: {}\n", outcome.paper_count()));
    match outcome.final_report() {
        Some(report) => out.push_str(&format!(
            "- Final score: {}/10 (structure {}, length {}, citations {}, coverage {}, clarity {})\n",
            report.total,
            report.structure,
            report.length,
            report.citations,
            report.coverage,
            report.clarity
        )),
        None => out.push_str("- Final score: not scored\n"),
    }
    out.push_str(&format!(
        "- Refinement iterations: {}\n- Draft version: {}\n- Termination: {}\n",
        outcome.loop_state.iteration(),
        outcome.draft.version(),
        outcome.termination_reason()
    ));
    if let Some(failure) = outcome.loop_state.failure() {
        out.push_str(&format!("- Failure: {}\n", failure));
    }

    if let Some(bundle) = ctx.analyses() {
        out.push_str("\n### Sources\n\n");
        for analysis in &bundle.analyses {
            out.push_str(&format!("- {}\n", analysis.citation));
        }
    }
    out
}

/// Writes finished reviews into an output directory.
#[derive(Debug, Clone)]
pub struct ReviewWriter {
    dir: PathBuf,
}

impl ReviewWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `outcome` under a name stamped with the current time.
    pub fn write(&self, outcome: &RunOutcome) -> io::Result<PathBuf> {
        self.write_at(outcome, Utc::now())
    }

    pub fn write_at(&self, outcome: &RunOutcome, at: DateTime<Utc>) -> io::Result<PathBuf> {
        let path = self
            .dir
            .join(review_file_name(outcome.context.topic(), at));
        let body = render_review(outcome);
        atomic_write(&path, body.as_bytes())?;
        info!(path = %path.display(), bytes = body.len(), "Review written");
        Ok(path)
    }
}
