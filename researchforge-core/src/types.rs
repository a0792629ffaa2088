//! Core data types: papers, analyses, drafts, artifacts, and score reports.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Highest value a single sub-score may take.
pub const MAX_SUBSCORE: u8 = 2;
/// Highest possible report total (five criteria at `MAX_SUBSCORE`).
pub const MAX_TOTAL: u8 = 10;

/// A paper reference produced by discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    #[serde(
        default,
        rename = "abstract",
        alias = "summary",
        skip_serializing_if = "Option::is_none"
    )]
    pub abstract_text: Option<String>,
}

impl Paper {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            venue: None,
            url: None,
            pdf_url: None,
            abstract_text: None,
        }
    }

    pub fn with_authors(mut self, authors: &[&str]) -> Self {
        self.authors = authors.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_venue(mut self, venue: impl Into<String>) -> Self {
        self.venue = Some(venue.into());
        self
    }

    pub fn with_pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    /// Link to a PDF for this paper: the explicit PDF URL, or the landing
    /// URL when it already points at a `.pdf`.
    pub fn pdf_link(&self) -> Option<&str> {
        self.pdf_url.as_deref().or_else(|| {
            self.url
                .as_deref()
                .filter(|u| u.to_ascii_lowercase().ends_with(".pdf"))
        })
    }

    /// Surname of the first author, or "Unknown".
    pub fn first_author_surname(&self) -> &str {
        self.authors
            .iter()
            .find(|a| !a.trim().is_empty())
            .and_then(|a| a.split_whitespace().last())
            .unwrap_or("Unknown")
    }

    /// In-text citation in `(Surname, Year)` / `(Surname et al., Year)` form.
    pub fn short_citation(&self) -> String {
        let year = self
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n.d.".to_string());
        if self.authors.len() > 2 {
            format!("({} et al., {})", self.first_author_surname(), year)
        } else {
            format!("({}, {})", self.first_author_surname(), year)
        }
    }
}

/// Accepts a year as a JSON number, a numeric string, or null.
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Some(serde_json::Value::String(s)) => s.trim().get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    })
}

/// Structured analysis of a single paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperAnalysis {
    pub paper: Paper,
    /// Formatted reference-list citation.
    pub citation: String,
    pub summary: String,
    pub research_question: String,
    pub methodology: String,
    pub key_findings: Vec<String>,
    pub limitations: Vec<String>,
}

/// All analyses produced by the analysis stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub analyses: Vec<PaperAnalysis>,
}

impl AnalysisBundle {
    pub fn len(&self) -> usize {
        self.analyses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }

    pub fn titles(&self) -> Vec<String> {
        self.analyses.iter().map(|a| a.paper.title.clone()).collect()
    }
}

/// Returned when a draft would be created with an empty body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("draft text must not be empty")]
pub struct EmptyDraftError;

/// A versioned literature-review text.
///
/// Version 0 is the synthesis output; each revision is exactly one higher
/// than the draft it was derived from. The body is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    text: String,
    version: u32,
}

impl Draft {
    /// Create the version-0 draft.
    pub fn initial(text: impl Into<String>) -> Result<Self, EmptyDraftError> {
        Self::with_version(text.into(), 0)
    }

    /// Derive the next version from this draft.
    pub fn revise(&self, text: impl Into<String>) -> Result<Self, EmptyDraftError> {
        Self::with_version(text.into(), self.version + 1)
    }

    fn with_version(text: String, version: u32) -> Result<Self, EmptyDraftError> {
        if text.trim().is_empty() {
            return Err(EmptyDraftError);
        }
        Ok(Self { text, version })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Discriminant of an [`Artifact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PaperList,
    AnalysisBundle,
    Draft,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::PaperList => write!(f, "paper list"),
            ArtifactKind::AnalysisBundle => write!(f, "analysis bundle"),
            ArtifactKind::Draft => write!(f, "draft"),
        }
    }
}

/// Immutable output of a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Artifact {
    PaperList(Vec<Paper>),
    AnalysisBundle(AnalysisBundle),
    Draft(Draft),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::PaperList(_) => ArtifactKind::PaperList,
            Artifact::AnalysisBundle(_) => ArtifactKind::AnalysisBundle,
            Artifact::Draft(_) => ArtifactKind::Draft,
        }
    }
}

/// The five quality dimensions a draft is scored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Structure,
    Length,
    Citations,
    Coverage,
    Clarity,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Structure,
        Criterion::Length,
        Criterion::Citations,
        Criterion::Coverage,
        Criterion::Clarity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Structure => "structure",
            Criterion::Length => "length",
            Criterion::Citations => "citations",
            Criterion::Coverage => "coverage",
            Criterion::Clarity => "clarity",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A score report that breaks the sub-score/total contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoreInvariantError {
    #[error("{criterion} sub-score {value} is outside 0..=2")]
    OutOfRange { criterion: Criterion, value: u8 },

    #[error("reported total {reported} does not equal the sub-score sum {computed}")]
    TotalMismatch { reported: u8, computed: u16 },
}

/// Quality assessment of a draft.
///
/// `total` is what the evaluator *reported*; it is only trustworthy after
/// [`ScoreReport::check_invariant`] has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub structure: u8,
    pub length: u8,
    pub citations: u8,
    pub coverage: u8,
    pub clarity: u8,
    pub total: u8,
    /// Free-text revision guidance.
    #[serde(default)]
    pub feedback: String,
    /// Concrete changes the evaluator asks for.
    #[serde(default)]
    pub improvements: Vec<String>,
}

impl ScoreReport {
    /// Build a report whose total is derived from the sub-scores.
    pub fn from_subscores(
        structure: u8,
        length: u8,
        citations: u8,
        coverage: u8,
        clarity: u8,
    ) -> Self {
        let mut report = Self {
            structure,
            length,
            citations,
            coverage,
            clarity,
            total: 0,
            feedback: String::new(),
            improvements: Vec::new(),
        };
        report.total = report.subscore_sum().min(u8::MAX as u16) as u8;
        report
    }

    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = feedback.into();
        self
    }

    pub fn with_improvements(mut self, improvements: Vec<String>) -> Self {
        self.improvements = improvements;
        self
    }

    pub fn subscore(&self, criterion: Criterion) -> u8 {
        match criterion {
            Criterion::Structure => self.structure,
            Criterion::Length => self.length,
            Criterion::Citations => self.citations,
            Criterion::Coverage => self.coverage,
            Criterion::Clarity => self.clarity,
        }
    }

    pub fn subscore_sum(&self) -> u16 {
        Criterion::ALL
            .iter()
            .map(|c| self.subscore(*c) as u16)
            .sum()
    }

    /// Every sub-score in `0..=2` and `total == sum(sub-scores)`.
    pub fn check_invariant(&self) -> Result<(), ScoreInvariantError> {
        for criterion in Criterion::ALL {
            let value = self.subscore(criterion);
            if value > MAX_SUBSCORE {
                return Err(ScoreInvariantError::OutOfRange { criterion, value });
            }
        }
        let computed = self.subscore_sum();
        if computed != self.total as u16 {
            return Err(ScoreInvariantError::TotalMismatch {
                reported: self.total,
                computed,
            });
        }
        Ok(())
    }

    pub fn meets(&self, threshold: u8) -> bool {
        self.total >= threshold
    }

    /// Criteria scoring below the maximum, weakest first.
    pub fn weakest_criteria(&self) -> Vec<Criterion> {
        let mut weak: Vec<Criterion> = Criterion::ALL
            .into_iter()
            .filter(|c| self.subscore(*c) < MAX_SUBSCORE)
            .collect();
        weak.sort_by_key(|c| self.subscore(*c));
        weak
    }
}
