//! arXiv discovery search: Atom API client mapped onto [`Paper`].

use async_trait::async_trait;
use researchforge_core::error::ToolError;
use researchforge_core::tools::DiscoverySearch;
use researchforge_core::types::Paper;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const ARXIV_API_BASE: &str = "https://export.arxiv.org/api/query";
const USER_AGENT: &str = "ResearchForge/0.1 (literature review pipeline)";
const TOOL_NAME: &str = "arxiv_search";

/// Minimum spacing between requests, as asked of API clients by arXiv.
const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on results per request.
const MAX_RESULTS: usize = 50;

/// Common words dropped from search queries.
const STOPWORDS: [&str; 12] = [
    "a", "an", "and", "for", "in", "into", "of", "on", "the", "to", "with", "about",
];

/// Discovery search backed by the arXiv Atom API.
pub struct ArxivSearch {
    client: reqwest::Client,
    base_url: String,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivSearch {
    pub fn new() -> Result<Self, ToolError> {
        Self::with_base_url(ARXIV_API_BASE)
    }

    /// Client against a different endpoint (mirrors, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| request_error(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            last_request: Mutex::new(None),
        })
    }

    /// Sleep until the request interval has passed since the previous call.
    async fn throttle(&self) {
        let wait = {
            let last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
            last.and_then(|at| MIN_REQUEST_INTERVAL.checked_sub(at.elapsed()))
        }; // guard dropped before awaiting

        if let Some(wait) = wait {
            debug!(wait_ms = wait.as_millis() as u64, "Throttling arXiv request");
            tokio::time::sleep(wait).await;
        }

        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
    }

    fn search_url(&self, query: &str, limit: usize) -> String {
        format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            self.base_url,
            urlencoding::encode(&build_query(query)),
            limit.clamp(1, MAX_RESULTS),
        )
    }
}

#[async_trait]
impl DiscoverySearch for ArxivSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Paper>, ToolError> {
        self.throttle().await;
        let url = self.search_url(query, limit);
        debug!(url = %url, "arXiv search");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool: TOOL_NAME.to_string(),
                    timeout_secs: 30,
                }
            } else {
                request_error(format!("arXiv API request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(request_error(format!("arXiv API returned status {}", status)));
        }
        let body = response
            .text()
            .await
            .map_err(|e| request_error(format!("failed to read arXiv response: {}", e)))?;

        let mut papers = parse_feed(&body);
        papers.truncate(limit);
        debug!(found = papers.len(), "arXiv search complete");
        Ok(papers)
    }

    fn name(&self) -> &str {
        TOOL_NAME
    }
}

fn request_error(message: String) -> ToolError {
    ToolError::Request {
        tool: TOOL_NAME.to_string(),
        message,
    }
}

/// `all:` clauses for each significant query term, joined with `AND`.
pub fn build_query(query: &str) -> String {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .map(|t| format!("all:{}", t))
        .collect();
    if terms.is_empty() {
        "all:*".to_string()
    } else {
        terms.join(" AND ")
    }
}

/// Parse an Atom feed into papers, skipping entries without an id or title.
pub fn parse_feed(xml: &str) -> Vec<Paper> {
    blocks(xml, "entry").filter_map(parse_entry).collect()
}

fn parse_entry(entry: &str) -> Option<Paper> {
    let id_url = tag_text(entry, "id")?;
    let title = collapse_whitespace(&tag_text(entry, "title")?);
    if title.is_empty() {
        return None;
    }

    let authors = blocks(entry, "author")
        .filter_map(|a| tag_text(a, "name"))
        .map(|n| collapse_whitespace(&n))
        .filter(|n| !n.is_empty())
        .collect();

    let year = tag_text(entry, "published")
        .and_then(|p| p.get(..4).and_then(|y| y.parse().ok()));

    let mut pdf_url = None;
    let mut abs_url = id_url.clone();
    for link in tags(entry, "link") {
        let href = attribute(link, "href").unwrap_or_default();
        let title_attr = attribute(link, "title").unwrap_or_default();
        let link_type = attribute(link, "type").unwrap_or_default();
        if title_attr == "pdf" || link_type == "application/pdf" {
            pdf_url = Some(href);
        } else if href.contains("/abs/") {
            abs_url = href;
        }
    }
    let pdf_url = pdf_url.or_else(|| {
        id_url
            .rfind("/abs/")
            .map(|pos| format!("https://arxiv.org/pdf/{}", &id_url[pos + 5..]))
    });

    let venue = tag_text(entry, "arxiv:journal_ref")
        .map(|j| collapse_whitespace(&j))
        .or_else(|| Some("arXiv".to_string()));
    let abstract_text = tag_text(entry, "summary")
        .map(|s| collapse_whitespace(&s))
        .filter(|s| !s.is_empty());

    Some(Paper {
        title,
        authors,
        year,
        venue,
        url: Some(abs_url),
        pdf_url,
        abstract_text,
    })
}

/// Every `<tag>...</tag>` block in `xml`, including the delimiters.
fn blocks<'a>(xml: &'a str, tag: &str) -> impl Iterator<Item = &'a str> + 'a {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let start = cursor + xml[cursor..].find(&open)?;
        let end = start + xml[start..].find(&close)? + close.len();
        cursor = end;
        Some(&xml[start..end])
    })
}

/// Every opening `<tag ...>` or self-closing `<tag .../>` in `xml`.
fn tags<'a>(xml: &'a str, tag: &str) -> impl Iterator<Item = &'a str> + 'a {
    let open = format!("<{}", tag);
    let mut cursor = 0;
    std::iter::from_fn(move || {
        let start = cursor + xml[cursor..].find(&open)?;
        let end = start + xml[start..].find('>')? + 1;
        cursor = end;
        Some(&xml[start..end])
    })
}

/// Trimmed text content of the first `<tag>` element, attributes allowed.
fn tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut from = 0;
    // Skip longer tag names sharing the prefix (e.g. <id> vs <idx>).
    let start = loop {
        let pos = from + xml[from..].find(&open)?;
        match xml[pos + open.len()..].chars().next() {
            Some('>') | Some(' ') | Some('\n') | Some('\t') => break pos,
            _ => from = pos + open.len(),
        }
    };
    let content_start = start + xml[start..].find('>')? + 1;
    let content_end = content_start + xml[content_start..].find(&close)?;
    Some(decode_entities(xml[content_start..content_end].trim()))
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let needle = format!(" {}=\"", name);
    let start = tag.find(&needle)? + needle.len();
    let end = start + tag[start..].find('"')?;
    Some(decode_entities(&tag[start..end]))
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
