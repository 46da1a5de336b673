//! Web tools for searching the web and reading pages.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use sift_core::{run_blocking, Tool};

const USER_AGENT: &str = concat!("sift/", env!("CARGO_PKG_VERSION"), " (research agent)");

// =============================================================================
// Web Search Configuration (Serper API)
// =============================================================================

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://google.serper.dev/search";
pub const DEFAULT_NUM_RESULTS: usize = 5;
pub const NO_RESULTS: &str = "No results found.";

/// Configuration for the Serper-backed web search
#[derive(Clone)]
pub struct WebSearchConfig {
    pub api_key: String,
    /// Search endpoint (e.g., "https://google.serper.dev/search")
    pub endpoint: String,
    /// How many organic results to show the model
    pub num_results: usize,
    pub timeout: Duration,
}

impl WebSearchConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            num_results: DEFAULT_NUM_RESULTS,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_num_results(mut self, num_results: usize) -> Self {
        self.num_results = num_results.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl std::fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("api_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// =============================================================================
// Web Search Tool (Serper API)
// =============================================================================

pub struct WebSearchTool {
    client: Client,
    config: WebSearchConfig,
}

impl WebSearchTool {
    pub fn new(config: WebSearchConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    async fn search(&self, query: &str) -> Result<SearchResponse, String> {
        let request = SearchRequest {
            q: query,
            num: self.config.num_results,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("X-API-KEY", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("Search request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Search API error {}: {}", status, body));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse search response: {}", e))
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: usize,
}

#[derive(Deserialize, Default)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
    #[serde(rename = "answerBox", default)]
    answer_box: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
struct OrganicResult {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

/// Render search results as the text block the model reads.
fn format_results(results: &SearchResponse, limit: usize) -> String {
    let mut blocks: Vec<String> = results
        .organic
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, result)| {
            format!(
                "Result {}:\nTitle: {}\nURL: {}\nSnippet: {}\n",
                i + 1,
                result.title.as_deref().unwrap_or("No title"),
                result.link.as_deref().unwrap_or("No URL"),
                result.snippet.as_deref().unwrap_or("No description"),
            )
        })
        .collect();

    if let Some(answer) = results.answer_box.as_ref().filter(|a| !a.is_empty()) {
        let text = ["snippet", "answer"]
            .iter()
            .find_map(|key| answer.get(*key).and_then(Value::as_str))
            .unwrap_or("No answer available");
        blocks.push(format!("Quick Answer:\n{}", text));
    }

    if blocks.is_empty() {
        NO_RESULTS.to_string()
    } else {
        blocks.join("\n")
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "WebSearch"
    }

    fn description(&self) -> &str {
        "Useful for searching the web for recent information on any topic. \
         Input should be a clear search query. \
         Returns search results with titles, URLs, and snippets."
    }

    fn input_description(&self) -> &str {
        "A clear search query"
    }

    async fn invoke(&self, input: &str) -> String {
        let query = input.trim();
        if query.is_empty() {
            return NO_RESULTS.to_string();
        }

        match self.search(query).await {
            Ok(results) => {
                debug!(query, results = results.organic.len(), "Search completed");
                format_results(&results, self.config.num_results)
            }
            Err(e) => {
                warn!(query, error = %e, "Search failed");
                NO_RESULTS.to_string()
            }
        }
    }
}

// =============================================================================
// Fetch Page Tool
// =============================================================================

pub const DEFAULT_MAX_CHARS: usize = 8000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
pub const NO_MAIN_CONTENT: &str = "No main content found on the page.";

/// Containers tried in order before falling back to `<body>`.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".content",
    ".main-content",
    ".article-content",
    "#content",
    "#main-content",
    "#article-content",
    "body",
];

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "form", "svg",
    "template",
];

/// Class or id values marking advertising blocks.
const AD_MARKERS: &[&str] = &["ad", "ads", "advert", "advertisement", "sponsored", "promo"];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "br", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table",
    "section", "blockquote", "pre", "dd", "dt", "figcaption",
];

const TRUNCATION_MARKER: &str = "\n\n... (truncated)";

#[derive(Clone, Debug)]
pub struct FetchPageConfig {
    /// Upper bound on the characters returned to the model
    pub max_chars: usize,
    /// Bytes of response body read before the rest is discarded
    pub max_body_bytes: usize,
    pub timeout: Duration,
}

impl Default for FetchPageConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            timeout: Duration::from_secs(15),
        }
    }
}

impl FetchPageConfig {
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct FetchPageTool {
    client: Client,
    config: FetchPageConfig,
}

impl Default for FetchPageTool {
    fn default() -> Self {
        Self::new(FetchPageConfig::default())
    }
}

impl FetchPageTool {
    pub fn new(config: FetchPageConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent(USER_AGENT)
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    async fn fetch(&self, url: Url) -> String {
        let shown = url.to_string();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => return format!("Error fetching URL {}: {}", shown, e),
        };

        let status = response.status();
        if !status.is_success() {
            return format!("Error fetching URL {}: HTTP status {}", shown, status);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_ascii_lowercase());
        if let Some(ct) = content_type.as_deref() {
            if !is_textual(ct) {
                return format!("Error processing URL {}: unsupported content type {}", shown, ct);
            }
        }

        let html = match read_body(response, self.config.max_body_bytes).await {
            Ok(html) => html,
            Err(e) => return format!("Error fetching URL {}: {}", shown, e),
        };

        let max_chars = self.config.max_chars;
        match run_blocking(move || extract_page_text(&html, max_chars)).await {
            Ok(text) if text.is_empty() => NO_MAIN_CONTENT.to_string(),
            Ok(text) => {
                debug!(url = %shown, chars = text.chars().count(), "Page extracted");
                text
            }
            Err(e) => format!("Error processing URL {}: {}", shown, e),
        }
    }
}

/// Read at most `limit` bytes of the body, decoding lossily as UTF-8.
async fn read_body(mut response: reqwest::Response, limit: usize) -> reqwest::Result<String> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            debug!(limit, "Response body truncated");
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("html")
        || content_type.contains("xml")
        || content_type.contains("json")
}

/// Parse and check a page-read input. Only absolute `http`/`https` URLs with
/// a host are accepted.
pub fn validate_url(input: &str) -> Result<Url, String> {
    let invalid = || format!("Invalid URL: {}", input);

    let url = Url::parse(input.trim()).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(invalid()),
    }
}

#[async_trait]
impl Tool for FetchPageTool {
    fn name(&self) -> &str {
        "WebScraper"
    }

    fn description(&self) -> &str {
        "Useful for reading the full content of a specific web page. \
         Input should be a valid URL. \
         Returns the main article content from the webpage."
    }

    fn input_description(&self) -> &str {
        "The full http:// or https:// URL of the page to read"
    }

    async fn invoke(&self, input: &str) -> String {
        let output = match validate_url(input) {
            Ok(url) => self.fetch(url).await,
            Err(message) => {
                debug!(input, "Rejected page-read input");
                message
            }
        };
        truncate_chars(output, self.config.max_chars)
    }
}

/// Extract readable text from an HTML document, capped at `max_chars`.
///
/// The first content container with any text wins; non-content elements are
/// dropped and whitespace is normalized. Returns an empty string when nothing
/// readable is found.
pub fn extract_page_text(html: &str, max_chars: usize) -> String {
    let document = Html::parse_document(html);

    for selector in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if in_skipped_subtree(&element) {
                continue;
            }
            let mut raw = String::new();
            collect_text(element, &mut raw);
            let cleaned = clean_text(&raw);
            if !cleaned.is_empty() {
                return truncate_chars(cleaned, max_chars);
            }
        }
    }

    String::new()
}

/// True when the element or any ancestor is non-content.
fn in_skipped_subtree(element: &ElementRef) -> bool {
    is_skipped(element)
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_skipped(&ancestor))
}

fn is_skipped(element: &ElementRef) -> bool {
    let el = element.value();
    if SKIPPED_TAGS.contains(&el.name()) {
        return true;
    }
    let is_marker = |value: &str| AD_MARKERS.contains(&value.to_ascii_lowercase().as_str());
    el.classes().any(is_marker) || el.id().is_some_and(is_marker)
}

/// Collect text under `element`, skipping non-content subtrees.
fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if is_skipped(&child_el) {
                continue;
            }
            collect_text(child_el, out);
            if BLOCK_TAGS.contains(&child_el.value().name()) {
                out.push('\n');
            }
        }
    }
}

/// Normalize extracted text: runs of horizontal whitespace become one space,
/// lines are trimmed, and blank-line runs collapse to a single blank line.
fn clean_text(text: &str) -> String {
    static HORIZONTAL: OnceLock<Regex> = OnceLock::new();
    static BLANK_LINES: OnceLock<Regex> = OnceLock::new();

    let horizontal = HORIZONTAL.get_or_init(|| Regex::new(r"[ \t\r\f\v\x{a0}]+").expect("valid regex"));
    let blank_lines = BLANK_LINES.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"));

    let spaced = horizontal.replace_all(text, " ");
    let lines: Vec<&str> = spaced.lines().map(str::trim).collect();
    let joined = lines.join("\n");
    blank_lines.replace_all(&joined, "\n\n").trim().to_string()
}

/// Cap `text` at `max_chars` characters, marking the cut when there is room.
fn truncate_chars(text: String, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text;
    }
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let mut truncated: String = text.chars().take(max_chars - marker_len).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

// =============================================================================
// Factory functions
// =============================================================================

/// Create the research tools: web search followed by page reading.
pub fn create_web_tools(search: WebSearchConfig, page: FetchPageConfig) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(WebSearchTool::new(search)),
        Arc::new(FetchPageTool::new(page)),
    ]
}
