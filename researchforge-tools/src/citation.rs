//! APA reference and BibTeX formatting.
//!
//! Metadata coming back from discovery is often incomplete. The formatter
//! patches missing pieces with placeholders and reports each patch as an
//! issue so the caller can surface it.

use chrono::Datelike;
use researchforge_core::tools::{CitationFormat, FormattedCitation};
use researchforge_core::types::Paper;

const MIN_TITLE_CHARS: usize = 5;
const MIN_VENUE_CHARS: usize = 2;
const EARLIEST_YEAR: i32 = 1900;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_AUTHOR: &str = "Unknown";
const UNKNOWN_VENUE: &str = "Unknown Venue";
const NO_DATE: &str = "n.d.";

/// Paper metadata after validation, with placeholders filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPaper {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: Option<String>,
    pub issues: Vec<String>,
}

/// Formats references in APA style.
#[derive(Debug, Clone)]
pub struct ApaCitationFormatter {
    latest_year: i32,
}

impl ApaCitationFormatter {
    /// Accepts publication years up to next calendar year.
    pub fn new() -> Self {
        Self {
            latest_year: chrono::Utc::now().year() + 1,
        }
    }

    /// Use a fixed upper bound for publication years.
    pub fn with_latest_year(latest_year: i32) -> Self {
        Self { latest_year }
    }

    pub fn validate(&self, paper: &Paper) -> ValidatedPaper {
        let mut issues = Vec::new();

        let title = paper.title.trim();
        let title = if title.chars().count() < MIN_TITLE_CHARS {
            issues.push("Title is missing or too short".to_string());
            UNKNOWN_TITLE.to_string()
        } else {
            title.to_string()
        };

        let authors: Vec<String> = paper
            .authors
            .iter()
            .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|a| !a.is_empty())
            .collect();
        let authors = if authors.is_empty() {
            issues.push("No authors listed".to_string());
            vec![UNKNOWN_AUTHOR.to_string()]
        } else {
            authors
        };

        let year = match paper.year {
            Some(y) if (EARLIEST_YEAR..=self.latest_year).contains(&y) => Some(y),
            Some(y) => {
                issues.push(format!("Publication year {} is out of range", y));
                None
            }
            None => {
                issues.push("Publication year is missing".to_string());
                None
            }
        };

        let venue = match paper.venue.as_deref().map(str::trim) {
            Some(v) if v.chars().count() >= MIN_VENUE_CHARS => Some(v.to_string()),
            _ => {
                issues.push("Venue is missing".to_string());
                None
            }
        };

        ValidatedPaper {
            title,
            authors,
            year,
            venue,
            issues,
        }
    }

    /// `Authors. (Year). *Title*. *Venue*.`
    pub fn apa(&self, paper: &ValidatedPaper) -> String {
        let year = paper
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| NO_DATE.to_string());
        let mut parts = vec![
            format_authors_apa(&paper.authors),
            format!("({})", year),
            format!("*{}*", paper.title),
        ];
        if let Some(venue) = &paper.venue {
            parts.push(format!("*{}*", venue));
        }
        let mut citation = parts.join(". ");
        // Author initials already end in a period.
        citation = citation.replace(".. (", ". (");
        citation.push('.');
        citation
    }

    pub fn bibtex(&self, paper: &ValidatedPaper) -> String {
        let mut fields = vec![
            format!("  title = {{{}}}", escape_bibtex(&paper.title)),
            format!(
                "  author = {{{}}}",
                escape_bibtex(&paper.authors.join(" and "))
            ),
        ];
        if let Some(year) = paper.year {
            fields.push(format!("  year = {{{}}}", year));
        }
        if let Some(venue) = &paper.venue {
            fields.push(format!("  journal = {{{}}}", escape_bibtex(venue)));
        }
        format!("@article{{{},\n{}\n}}", cite_key(paper), fields.join(",\n"))
    }
}

impl Default for ApaCitationFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl CitationFormat for ApaCitationFormatter {
    fn format(&self, paper: &Paper) -> FormattedCitation {
        let validated = self.validate(paper);
        FormattedCitation {
            citation: self.apa(&validated),
            bibtex: self.bibtex(&validated),
            issues: validated.issues,
        }
    }
}

/// One author in APA form: `Surname, I. N.`
fn format_author(name: &str) -> String {
    if name.to_lowercase().contains("et al") {
        return "et al.".to_string();
    }
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.split_last() {
        None => String::new(),
        Some((surname, [])) => format!("{}.", surname.trim_end_matches('.')),
        Some((surname, given)) => {
            let initials = given
                .iter()
                .filter_map(|g| g.chars().next())
                .map(|c| format!("{}.", c.to_uppercase()))
                .collect::<Vec<_>>()
                .join(" ");
            format!("{}, {}", surname, initials)
        }
    }
}

/// Author list in APA form: `A`, `A & B`, or `A, B, & C`.
pub fn format_authors_apa(authors: &[String]) -> String {
    let formatted: Vec<String> = authors.iter().map(|a| format_author(a)).collect();
    match formatted.as_slice() {
        [] => format!("{}.", UNKNOWN_AUTHOR),
        [only] => only.clone(),
        [first, second] => format!("{} & {}", first, second),
        [init @ .., last] => format!("{}, & {}", init.join(", "), last),
    }
}

/// `surnameYEARword`, lowercase ASCII alphanumerics only.
pub fn cite_key(paper: &ValidatedPaper) -> String {
    let surname = paper
        .authors
        .first()
        .and_then(|a| a.split_whitespace().last())
        .unwrap_or(UNKNOWN_AUTHOR);
    let year = paper.year.map(|y| y.to_string()).unwrap_or_default();
    let word = paper
        .title
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>())
        .find(|w| w.len() > 3)
        .unwrap_or_default();
    let key: String = format!("{}{}{}", surname, year, word)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    key.to_lowercase()
}

/// Escape the characters BibTeX treats specially inside braces.
pub fn escape_bibtex(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' | '%' | '$' | '#' | '_' => {
                out.push('\\');
                out.push(c);
            }
            '{' | '}' => {}
            _ => out.push(c),
        }
    }
    out
}
