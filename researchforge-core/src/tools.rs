//! Tool adapter interfaces consumed by the stage executors.
//!
//! Implementations live in `researchforge-tools`; the core only depends on
//! these request/response contracts.

use crate::error::ToolError;
use crate::types::Paper;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Academic search returning candidate papers for a query.
#[async_trait]
pub trait DiscoverySearch: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, ToolError>;

    fn name(&self) -> &str;
}

/// Extracted text of a downloaded PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdfDocument {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
}

/// Downloads a PDF and extracts its text.
#[async_trait]
pub trait PdfFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PdfDocument, ToolError>;
}

/// A formatted reference for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedCitation {
    /// Reference-list entry.
    pub citation: String,
    pub bibtex: String,
    /// Metadata problems found (and patched) while formatting.
    #[serde(default)]
    pub issues: Vec<String>,
}

/// Deterministic citation formatter.
pub trait CitationFormat: Send + Sync {
    fn format(&self, paper: &Paper) -> FormattedCitation;
}

/// The set of tool adapters available to a run. Every adapter is optional;
/// stages degrade to reasoning-only behaviour when one is missing.
#[derive(Clone, Default)]
pub struct Toolbox {
    pub search: Option<Arc<dyn DiscoverySearch>>,
    pub pdf: Option<Arc<dyn PdfFetch>>,
    pub citations: Option<Arc<dyn CitationFormat>>,
}

impl Toolbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: Arc<dyn DiscoverySearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn with_pdf(mut self, pdf: Arc<dyn PdfFetch>) -> Self {
        self.pdf = Some(pdf);
        self
    }

    pub fn with_citations(mut self, citations: Arc<dyn CitationFormat>) -> Self {
        self.citations = Some(citations);
        self
    }

    /// Reference-list entry for `paper`, falling back to an in-text citation.
    pub fn cite(&self, paper: &Paper) -> String {
        match &self.citations {
            Some(formatter) => formatter.format(paper).citation,
            None => format!("{} {}", paper.title, paper.short_citation()),
        }
    }
}

impl std::fmt::Debug for Toolbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolbox")
            .field("search", &self.search.as_ref().map(|s| s.name().to_string()))
            .field("pdf", &self.pdf.is_some())
            .field("citations", &self.citations.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UpperCaseCitations;

    impl CitationFormat for UpperCaseCitations {
        fn format(&self, paper: &Paper) -> FormattedCitation {
            FormattedCitation {
                citation: paper.title.to_uppercase(),
                bibtex: String::new(),
                issues: Vec::new(),
            }
        }
    }

    #[test]
    fn test_cite_uses_formatter_when_present() {
        let paper = Paper::new("Deep Residual Learning")
            .with_authors(&["Kaiming He"])
            .with_year(2016);
        assert_eq!(
            Toolbox::new().cite(&paper),
            "Deep Residual Learning (He, 2016)"
        );
        let toolbox = Toolbox::new().with_citations(Arc::new(UpperCaseCitations));
        assert_eq!(toolbox.cite(&paper), "DEEP RESIDUAL LEARNING");
    }
}
