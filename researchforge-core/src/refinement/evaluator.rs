//! Draft evaluators.
//!
//! [`HeuristicEvaluator`] is a deterministic rule-based scorer. [`LlmEvaluator`]
//! asks the reasoning capability for a JSON report and passes the reported
//! total through unchanged, so the controller's consistency check applies.

use crate::brain::{ContextFields, PromptTemplate, ReasoningCapability};
use crate::error::{CapabilityError, EvaluatorError};
use crate::stages::extract_json_payload;
use crate::types::{Draft, Paper, ScoreReport};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;

/// Scores a draft.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn score(&self, draft: &Draft) -> Result<ScoreReport, EvaluatorError>;

    /// Human-readable name of this evaluator.
    fn name(&self) -> &str;
}

const REQUIRED_SECTIONS: [&str; 5] = ["introduction", "theme", "finding", "gap", "conclusion"];

const ACADEMIC_MARKERS: [&str; 10] = [
    "however",
    "moreover",
    "furthermore",
    "therefore",
    "consequently",
    "research",
    "study",
    "findings",
    "approach",
    "methodology",
];

/// A paper the draft is expected to discuss.
#[derive(Debug, Clone)]
struct CoverageTarget {
    title: String,
    surname: Option<String>,
}

/// Rule-based evaluator over the five criteria.
///
/// Each criterion earns 0, 1 or 2 points:
/// - structure: required section keywords present (5 → 2, 3-4 → 1)
/// - length: 1000-2000 words → 2, 800-999 or >2000 → 1
/// - citations: APA, numbered, and narrative citations (≥10 → 2, ≥5 → 1)
/// - coverage: share of expected papers mentioned by title or first-author surname
/// - clarity: average sentence length 15-25 words (+1), ≥5 academic markers (+1)
pub struct HeuristicEvaluator {
    targets: Vec<CoverageTarget>,
    apa_citation: Regex,
    numbered_citation: Regex,
    narrative_citation: Regex,
    sentence_split: Regex,
}

impl HeuristicEvaluator {
    /// Evaluator without a coverage list; coverage always scores full marks.
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            apa_citation: Regex::new(r"\([A-Z][a-z]+(?:\s+et\s+al\.)?,\s*\d{4}\)")
                .expect("valid APA citation pattern"),
            numbered_citation: Regex::new(r"\[\d+\]").expect("valid numbered citation pattern"),
            narrative_citation: Regex::new(r"[A-Z][a-z]+\s+\(\d{4}\)")
                .expect("valid narrative citation pattern"),
            sentence_split: Regex::new(r"[.!?]+").expect("valid sentence pattern"),
        }
    }

    /// Evaluator that checks the draft mentions each of `papers`.
    pub fn for_papers(papers: &[Paper]) -> Self {
        let targets = papers
            .iter()
            .filter(|p| !p.title.trim().is_empty())
            .map(|p| {
                let surname = p.first_author_surname();
                CoverageTarget {
                    title: p.title.to_lowercase(),
                    surname: (surname != "Unknown" && surname.len() > 2)
                        .then(|| surname.to_lowercase()),
                }
            })
            .collect();
        Self {
            targets,
            ..Self::new()
        }
    }

    /// Score `text` synchronously.
    pub fn evaluate_text(&self, text: &str) -> ScoreReport {
        let lower = text.to_lowercase();
        let word_count = text.split_whitespace().count();
        let mut feedback = Vec::new();
        let mut improvements = Vec::new();

        // Structure
        let found: Vec<&str> = REQUIRED_SECTIONS
            .iter()
            .copied()
            .filter(|s| lower.contains(s))
            .collect();
        let structure = match found.len() {
            5 => 2,
            3 | 4 => 1,
            _ => 0,
        };
        if structure == 2 {
            feedback.push(format!(
                "Structure: all {} key sections present",
                REQUIRED_SECTIONS.len()
            ));
        } else {
            feedback.push(format!(
                "Structure: only {}/{} key sections found",
                found.len(),
                REQUIRED_SECTIONS.len()
            ));
            let missing: Vec<&str> = REQUIRED_SECTIONS
                .iter()
                .copied()
                .filter(|s| !found.contains(s))
                .collect();
            improvements.push(format!("Add sections discussing: {}", missing.join(", ")));
        }

        // Length
        let length = match word_count {
            1000..=2000 => 2,
            800..=999 => {
                improvements.push("Expand the discussion to at least 1000 words".to_string());
                1
            }
            n if n > 2000 => {
                improvements.push("Condense to 1000-2000 words".to_string());
                1
            }
            _ => {
                improvements.push("Significantly expand the content (need 800+ words)".to_string());
                0
            }
        };
        feedback.push(format!("Length: {} words", word_count));

        // Citations
        let citation_count = self.apa_citation.find_iter(text).count()
            + self.numbered_citation.find_iter(text).count()
            + self.narrative_citation.find_iter(text).count();
        let citations = match citation_count {
            n if n >= 10 => 2,
            n if n >= 5 => {
                improvements.push("Add more citations to support claims".to_string());
                1
            }
            _ => {
                improvements.push("Cite every key claim (need 5+ citations)".to_string());
                0
            }
        };
        feedback.push(format!("Citations: {} found", citation_count));

        // Coverage
        let coverage = if self.targets.is_empty() {
            feedback.push("Coverage: no paper list provided".to_string());
            2
        } else {
            let missing: Vec<&CoverageTarget> = self
                .targets
                .iter()
                .filter(|t| {
                    !lower.contains(&t.title)
                        && !t.surname.as_ref().is_some_and(|s| lower.contains(s))
                })
                .collect();
            let covered = self.targets.len() - missing.len();
            feedback.push(format!(
                "Coverage: {}/{} papers discussed",
                covered,
                self.targets.len()
            ));
            if !missing.is_empty() {
                let titles: Vec<&str> = missing.iter().map(|t| t.title.as_str()).collect();
                improvements.push(format!("Discuss the missing papers: {}", titles.join("; ")));
            }
            if missing.is_empty() {
                2
            } else if covered * 2 >= self.targets.len() {
                1
            } else {
                0
            }
        };

        // Clarity
        let sentences = self
            .sentence_split
            .split(text)
            .filter(|s| !s.trim().is_empty())
            .count();
        let avg_sentence = if sentences == 0 {
            0.0
        } else {
            word_count as f64 / sentences as f64
        };
        let markers = ACADEMIC_MARKERS
            .iter()
            .filter(|m| lower.contains(*m))
            .count();
        let mut clarity = 0;
        if (15.0..=25.0).contains(&avg_sentence) {
            clarity += 1;
        } else if avg_sentence > 25.0 {
            improvements.push("Shorten sentences for readability".to_string());
        } else {
            improvements.push("Use fuller sentences for an academic register".to_string());
        }
        if markers >= 5 {
            clarity += 1;
        } else {
            improvements.push("Use more transitions and academic vocabulary".to_string());
        }
        feedback.push(format!(
            "Clarity: average sentence {:.1} words, {} academic markers",
            avg_sentence, markers
        ));

        ScoreReport::from_subscores(structure, length, citations, coverage, clarity)
            .with_feedback(feedback.join("\n"))
            .with_improvements(improvements)
    }
}

impl Default for HeuristicEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for HeuristicEvaluator {
    async fn score(&self, draft: &Draft) -> Result<ScoreReport, EvaluatorError> {
        Ok(self.evaluate_text(draft.text()))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}

/// Report shape requested from the model. Signed so that negative values
/// surface as parse errors instead of wrapping.
#[derive(Debug, Deserialize)]
struct RawReport {
    structure: i64,
    length: i64,
    citations: i64,
    coverage: i64,
    clarity: i64,
    total: i64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    improvements: Vec<String>,
}

/// Evaluator backed by the reasoning capability.
pub struct LlmEvaluator {
    reasoning: Arc<dyn ReasoningCapability>,
    titles: Vec<String>,
}

impl LlmEvaluator {
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, titles: Vec<String>) -> Self {
        Self { reasoning, titles }
    }

    fn parse_report(text: &str) -> Result<ScoreReport, EvaluatorError> {
        let raw: RawReport = serde_json::from_str(extract_json_payload(text)).map_err(|e| {
            EvaluatorError::Unparseable {
                message: format!("invalid score JSON: {}", e),
            }
        })?;
        let to_u8 = |name: &str, value: i64| {
            u8::try_from(value).map_err(|_| EvaluatorError::Unparseable {
                message: format!("{} value {} is not a valid score", name, value),
            })
        };
        Ok(ScoreReport {
            structure: to_u8("structure", raw.structure)?,
            length: to_u8("length", raw.length)?,
            citations: to_u8("citations", raw.citations)?,
            coverage: to_u8("coverage", raw.coverage)?,
            clarity: to_u8("clarity", raw.clarity)?,
            total: to_u8("total", raw.total)?,
            feedback: raw.feedback,
            improvements: raw.improvements,
        })
    }
}

#[async_trait]
impl Evaluator for LlmEvaluator {
    async fn score(&self, draft: &Draft) -> Result<ScoreReport, EvaluatorError> {
        let titles = if self.titles.is_empty() {
            "(none provided)".to_string()
        } else {
            self.titles
                .iter()
                .map(|t| format!("- {}", t))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let fields = ContextFields::new()
            .with("draft", draft.text())
            .with("titles", titles);
        let text = self
            .reasoning
            .generate(PromptTemplate::Evaluation, &fields)
            .await
            .map_err(|e| match e {
                CapabilityError::RateLimited { retry_after_secs } => {
                    EvaluatorError::RateLimited { retry_after_secs }
                }
                CapabilityError::Timeout { timeout_secs } => {
                    EvaluatorError::Timeout { timeout_secs }
                }
                CapabilityError::InvalidResponse { message } => {
                    EvaluatorError::Unparseable { message }
                }
                CapabilityError::Unavailable { message } => EvaluatorError::Unavailable { message },
            })?;
        Self::parse_report(&text)
    }

    fn name(&self) -> &str {
        "llm"
    }
}
