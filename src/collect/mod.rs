//! Source collection
//!
//! Narrow seam for document/web ingestion: `collect(sources) -> digest`.
//! The built-in collector fetches URLs, inventories directories, and passes
//! PDFs through as named references; anything smarter plugs in behind the
//! [`SourceCollector`] trait. Individual source failures degrade the digest,
//! they never fail the call.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;

use crate::domain::{SourceDigest, SourceInput};

/// Character cap applied to each collected source
const MAX_CHARS_PER_SOURCE: usize = 2000;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; agentlab/0.1)";

/// Collection seam: turn raw inputs into one prompt-ready digest
#[async_trait]
pub trait SourceCollector: Send + Sync {
    async fn collect(&self, topic: &str, inputs: &[SourceInput]) -> SourceDigest;

    /// One-shot web lookup used by the quick-search mode
    async fn quick_search(&self, query: &str) -> SourceDigest;
}

/// Default collector backed by reqwest and the local filesystem
pub struct BasicCollector {
    client: Client,
}

impl BasicCollector {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn fetch_url(&self, url: &str) -> Result<String, String> {
        // GitHub blob pages have a raw twin with the actual file content
        let effective = if url.contains("github.com") && url.contains("/blob/") {
            url.replace("github.com", "raw.githubusercontent.com")
                .replace("/blob/", "/")
        } else {
            url.to_string()
        };

        let response = self
            .client
            .get(&effective)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }

        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(truncate(&strip_html_tags(&body), MAX_CHARS_PER_SOURCE))
    }

    fn explore_directory(&self, path: &Path) -> Result<String, String> {
        let pattern = format!("{}/**/*", path.display());
        let mut listing = String::new();
        let mut count = 0usize;

        let entries = glob::glob(&pattern).map_err(|e| e.to_string())?;
        for entry in entries.flatten() {
            if !entry.is_file() {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let rel = entry.strip_prefix(path).unwrap_or(&entry);
            let _ = writeln!(listing, "{} ({})", rel.display(), format_size(size));
            count += 1;
        }

        Ok(format!(
            "Directory: {}\nTotal files found: {}\n\n{}",
            path.display(),
            count,
            listing
        ))
    }

    fn describe_pdf(&self, path: &Path) -> Result<String, String> {
        let meta = path.metadata().map_err(|e| e.to_string())?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(format!(
            "PDF document: {} ({}), provided as reference material",
            name,
            format_size(meta.len())
        ))
    }
}

impl Default for BasicCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceCollector for BasicCollector {
    async fn collect(&self, topic: &str, inputs: &[SourceInput]) -> SourceDigest {
        let mut sections = vec![format!("Topic: {}", topic)];
        let mut failures = Vec::new();

        for input in inputs {
            let result = match input {
                SourceInput::Url { url } => self
                    .fetch_url(url)
                    .await
                    .map(|text| format!("Link: {}\n{}", url, text)),
                SourceInput::Directory { path } => self.explore_directory(path),
                SourceInput::Pdf { path } => self.describe_pdf(path),
            };

            match result {
                Ok(section) => sections.push(section),
                Err(reason) => {
                    log::warn!("source collection failed for {:?}: {}", input, reason);
                    failures.push(format!("{:?}: {}", input, reason));
                }
            }
        }

        if !failures.is_empty() {
            sections.push(format!("Sources that could not be collected:\n{}", failures.join("\n")));
            return SourceDigest::degraded(sections.join("\n\n"));
        }
        SourceDigest::new(sections.join("\n\n"))
    }

    async fn quick_search(&self, query: &str) -> SourceDigest {
        let url = format!(
            "https://duckduckgo.com/html/?q={}",
            urlencode(query)
        );
        match self.fetch_url(&url).await {
            Ok(text) => SourceDigest::new(format!("Search results for '{}':\n{}", query, text)),
            Err(reason) => SourceDigest::degraded(format!("search failed for '{}': {}", query, reason)),
        }
    }
}

/// Percent-encode the characters that matter in a query string
fn urlencode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => {
                let _ = write!(out, "%{:02X}", other);
            }
        }
    }
    out
}

/// Reduce an HTML document to its visible text
pub fn strip_html_tags(html: &str) -> String {
    static SCRIPT_RE: OnceLock<Regex> = OnceLock::new();
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    static WS_RE: OnceLock<Regex> = OnceLock::new();
    let script = SCRIPT_RE
        .get_or_init(|| Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
    let tag = TAG_RE.get_or_init(|| Regex::new(r"(?s)<[^>]+>").unwrap());
    let ws = WS_RE.get_or_init(|| Regex::new(r"[ \t]*\n[ \t\n]*").unwrap());

    let text = script.replace_all(html, " ");
    let text = tag.replace_all(&text, "\n");
    ws.replace_all(&text, "\n").trim().to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut)
}

fn format_size(bytes: u64) -> String {
    if bytes > 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes > 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}
