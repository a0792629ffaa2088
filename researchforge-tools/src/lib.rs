//! # ResearchForge Tools
//!
//! Concrete adapters for the tool interfaces declared in
//! `researchforge_core::tools`: arXiv search, PDF text extraction, and APA
//! citation formatting.

pub mod arxiv;
pub mod citation;
pub mod pdf;

pub use arxiv::ArxivSearch;
pub use citation::ApaCitationFormatter;
pub use pdf::HttpPdfFetcher;

use researchforge_core::error::ToolError;
use researchforge_core::tools::Toolbox;
use std::sync::Arc;

/// A toolbox wired with every network-backed adapter.
pub fn default_toolbox() -> Result<Toolbox, ToolError> {
    Ok(Toolbox::new()
        .with_search(Arc::new(ArxivSearch::new()?))
        .with_pdf(Arc::new(HttpPdfFetcher::new()?))
        .with_citations(Arc::new(ApaCitationFormatter::new())))
}
