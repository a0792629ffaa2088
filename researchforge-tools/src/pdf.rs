//! PDF download and text extraction.

use async_trait::async_trait;
use researchforge_core::error::ToolError;
use researchforge_core::tools::{PdfDocument, PdfFetch};
use std::time::Duration;
use tracing::debug;

const TOOL_NAME: &str = "pdf_fetch";
const USER_AGENT: &str = "Mozilla/5.0 (compatible; ResearchForge/0.1)";

/// Download timeout for a single PDF.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Extracted text beyond this many characters is cut off.
pub const MAX_TEXT_CHARS: usize = 100_000;
/// Extractions shorter than this are treated as scanned or image-only PDFs.
pub const MIN_TEXT_CHARS: usize = 100;

const TRUNCATION_MARKER: &str = "\n\n[Text truncated due to length...]";

/// Fetches PDFs over HTTP and extracts their text with `pdf-extract`.
pub struct HttpPdfFetcher {
    client: reqwest::Client,
}

impl HttpPdfFetcher {
    pub fn new() -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::Request {
                tool: TOOL_NAME.to_string(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PdfFetch for HttpPdfFetcher {
    async fn fetch(&self, url: &str) -> Result<PdfDocument, ToolError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool: TOOL_NAME.to_string(),
                    timeout_secs: FETCH_TIMEOUT.as_secs(),
                }
            } else {
                ToolError::Request {
                    tool: TOOL_NAME.to_string(),
                    message: format!("failed to download PDF: {}", e),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Request {
                tool: TOOL_NAME.to_string(),
                message: format!("HTTP {} for {}", status, url),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !looks_like_pdf(url, &content_type) {
            return Err(invalid(format!(
                "URL does not point to a PDF file (content-type: {})",
                if content_type.is_empty() { "none" } else { &content_type }
            )));
        }

        let bytes = response.bytes().await.map_err(|e| ToolError::Request {
            tool: TOOL_NAME.to_string(),
            message: format!("failed to read PDF body: {}", e),
        })?;
        debug!(url, bytes = bytes.len(), "Downloaded PDF");

        // Extraction is CPU-bound and may panic on malformed files.
        let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await
            .map_err(|e| invalid(format!("PDF extraction aborted: {}", e)))?
            .map_err(|e| invalid(format!("PDF extraction failed: {}", e)))?;

        let text = clean_text(&raw)?;
        debug!(url, chars = text.len(), "Extracted PDF text");
        Ok(PdfDocument {
            text,
            page_count: None,
        })
    }
}

fn invalid(message: String) -> ToolError {
    ToolError::InvalidContent {
        tool: TOOL_NAME.to_string(),
        message,
    }
}

/// Accept an `application/pdf` response or a URL ending in `.pdf`.
pub fn looks_like_pdf(url: &str, content_type: &str) -> bool {
    content_type.contains("application/pdf") || url.to_ascii_lowercase().ends_with(".pdf")
}

/// Collapse whitespace, enforce the minimum, and cap the length.
pub fn clean_text(raw: &str) -> Result<String, ToolError> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() < MIN_TEXT_CHARS {
        return Err(invalid(
            "PDF text extraction yielded very little text; the PDF may be scanned or image-based"
                .to_string(),
        ));
    }
    match collapsed.char_indices().nth(MAX_TEXT_CHARS) {
        Some((cut, _)) => Ok(format!("{}{}", &collapsed[..cut], TRUNCATION_MARKER)),
        None => Ok(collapsed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_pdf() {
        assert!(looks_like_pdf("https://arxiv.org/pdf/1706.03762", "application/pdf"));
        assert!(looks_like_pdf("https://example.org/Paper.PDF", "application/octet-stream"));
        assert!(!looks_like_pdf("https://example.org/paper", "text/html; charset=utf-8"));
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        let raw = format!("Abstract\n\n   {}  \t end", "word ".repeat(30));
        let text = clean_text(&raw).unwrap();
        assert!(text.starts_with("Abstract word word"));
        assert!(text.ends_with("word end"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn test_clean_text_rejects_scanned_pdfs() {
        let err = clean_text("  Figure 1 \n\n ").unwrap_err();
        assert!(matches!(err, ToolError::InvalidContent { .. }));
    }

    #[test]
    fn test_clean_text_truncates_long_documents() {
        let raw = "a".repeat(MAX_TEXT_CHARS + 500);
        let text = clean_text(&raw).unwrap();
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert_eq!(text.chars().count(), MAX_TEXT_CHARS + TRUNCATION_MARKER.chars().count());
    }
}
