//! Web Search Tool
//!
//! Queries the DuckDuckGo HTML front-end and scrapes result links and
//! snippets with precompiled regexes. No API key required.

use super::{Result, Tool, ToolError, ToolExecutionContext};
use crate::message::ToolResult;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const SEARCH_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 10;

static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("valid result link regex")
});
static RESULT_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#)
        .expect("valid snippet regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

pub struct WebSearchTool {
    client: reqwest::Client,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("Mozilla/5.0 (compatible; opencoder/0.1)")
                .timeout(Duration::from_secs(15))
                .build()
                .expect("failed to create HTTP client"),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WebSearchInput {
    query: String,
    /// Only keep results from these domains
    #[serde(default)]
    allowed_domains: Vec<String>,
    /// Drop results from these domains
    #[serde(default)]
    blocked_domains: Vec<String>,
}

#[derive(Debug)]
struct SearchHit {
    title: String,
    url: String,
    snippet: String,
}

fn strip_tags(html: &str) -> String {
    let text = TAG.replace_all(html, "");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .trim()
        .to_string()
}

/// DuckDuckGo wraps result URLs in a redirect; the real target sits in the
/// `uddg` query parameter.
fn decode_result_url(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let tail = &href[pos + 5..];
        let encoded = tail.split('&').next().unwrap_or(tail);
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    href.to_string()
}

fn domain_of(url: &str) -> &str {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped.split('/').next().unwrap_or(stripped)
}

fn parse_results(html: &str) -> Vec<SearchHit> {
    let snippets: Vec<String> = RESULT_SNIPPET
        .captures_iter(html)
        .map(|c| strip_tags(&c[1]))
        .collect();

    RESULT_LINK
        .captures_iter(html)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: strip_tags(&c[2]),
            url: decode_result_url(&c[1]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web. Returns up to 10 results with title, URL and snippet. Results \
         can be filtered by allowed or blocked domain lists."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "allowed_domains": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Only include results from these domains"
                },
                "blocked_domains": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Exclude results from these domains"
                }
            },
            "required": ["query"]
        })
    }

    fn concurrency_safe(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, _context: &ToolExecutionContext) -> Result<ToolResult> {
        let input: WebSearchInput = serde_json::from_value(input)
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        if input.query.trim().is_empty() {
            return Ok(ToolResult::failure("query must not be empty"));
        }

        let url = format!("{SEARCH_URL}?q={}", urlencoding::encode(&input.query));
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => return Ok(ToolResult::failure(format!("search request failed: {e}"))),
        };
        if !response.status().is_success() {
            return Ok(ToolResult::failure(format!(
                "search returned status {}",
                response.status()
            )));
        }
        let html = match response.text().await {
            Ok(html) => html,
            Err(e) => return Ok(ToolResult::failure(format!("cannot read search page: {e}"))),
        };

        let hits: Vec<SearchHit> = parse_results(&html)
            .into_iter()
            .filter(|hit| {
                let domain = domain_of(&hit.url);
                if !input.allowed_domains.is_empty()
                    && !input.allowed_domains.iter().any(|d| domain.ends_with(d))
                {
                    return false;
                }
                !input.blocked_domains.iter().any(|d| domain.ends_with(d))
            })
            .take(MAX_RESULTS)
            .collect();

        if hits.is_empty() {
            return Ok(ToolResult::success("no results found".to_string()));
        }

        let mut output = String::new();
        for (i, hit) in hits.iter().enumerate() {
            output.push_str(&format!("{}. {}\n   {}\n", i + 1, hit.title, hit.url));
            if !hit.snippet.is_empty() {
                output.push_str(&format!("   {}\n", hit.snippet));
            }
        }
        Ok(ToolResult::success(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
        <div class="result">
            <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdoc.rust%2Dlang.org%2Fbook%2F&amp;rut=abc">The Rust <b>Book</b></a>
            <a class="result__snippet" href="#">Learn <b>Rust</b> from scratch</a>
        </div>
        <div class="result">
            <a rel="nofollow" class="result__a" href="https://example.com/direct">Direct result</a>
            <a class="result__snippet" href="#">A direct link</a>
        </div>
    "##;

    #[test]
    fn test_parse_results_decodes_redirects_and_strips_tags() {
        let hits = parse_results(SAMPLE);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "The Rust Book");
        assert_eq!(hits[0].url, "https://doc.rust-lang.org/book/");
        assert_eq!(hits[0].snippet, "Learn Rust from scratch");
        assert_eq!(hits[1].url, "https://example.com/direct");
    }

    #[test]
    fn test_domain_extraction() {
        assert_eq!(domain_of("https://doc.rust-lang.org/book/"), "doc.rust-lang.org");
        assert_eq!(domain_of("http://example.com"), "example.com");
    }

    #[test]
    fn test_strip_tags_entities() {
        assert_eq!(strip_tags("a &amp; <b>b</b>"), "a & b");
    }
}
