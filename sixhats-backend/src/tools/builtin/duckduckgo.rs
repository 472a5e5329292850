use crate::tools::http_retry::send_with_retry;
use crate::tools::registry::Tool;
use crate::tools::types::{SearchHit, SearchParams, ToolDefinition, ToolGroup, DUCKDUCKGO_SEARCH};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";

static RESULT_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)
        .expect("result link regex")
});
static RESULT_SNIPPET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).expect("snippet regex")
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

/// Primary search provider: scrapes DuckDuckGo's HTML endpoint.
///
/// Returns `{title, url, snippet}` records, or an empty list on any failure.
pub struct DuckDuckGoSearchTool {
    client: Client,
}

impl DuckDuckGoSearchTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) sixhats-backend")
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchHit>, String> {
        let response = send_with_retry("html.duckduckgo.com", 2, || {
            self.client
                .post(ENDPOINT)
                .form(&[("q", params.query.as_str())])
        })
        .await?;
        let html = response
            .text()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;
        Ok(parse_results(&html, params.num_results))
    }
}

impl Default for DuckDuckGoSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DuckDuckGoSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            DUCKDUCKGO_SEARCH,
            "Search the web with DuckDuckGo and return titled results",
            ToolGroup::Search,
        )
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let params: SearchParams =
            serde_json::from_value(params).map_err(|e| format!("Invalid parameters: {}", e))?;

        match self.search(&params).await {
            Ok(hits) => {
                log::info!("[SEARCH] DuckDuckGo '{}' -> {} results", params.query, hits.len());
                serde_json::to_value(hits).map_err(|e| e.to_string())
            }
            Err(e) => {
                log::warn!("[SEARCH] DuckDuckGo search for '{}' failed: {}", params.query, e);
                Ok(json!([]))
            }
        }
    }
}

/// Pull result records out of a DuckDuckGo HTML results page.
///
/// A result's snippet is looked up only between its own link and the next
/// result link, so a result without a snippet leaves the others untouched.
fn parse_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let links: Vec<regex::Captures> = RESULT_LINK.captures_iter(html).collect();

    links
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            let url = resolve_redirect(&caps[1])?;
            let start = caps.get(0).map_or(0, |m| m.end());
            let end = links
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(html.len(), |m| m.start());
            let snippet = RESULT_SNIPPET
                .captures(&html[start..end])
                .map(|c| clean_fragment(&c[1]))
                .unwrap_or_default();
            Some(SearchHit::Record {
                title: clean_fragment(&caps[2]),
                url,
                snippet,
            })
        })
        .take(limit)
        .collect()
}

/// DuckDuckGo wraps targets as `//duckduckgo.com/l/?uddg=<encoded>`
fn resolve_redirect(href: &str) -> Option<String> {
    let href = href.replace("&amp;", "&");
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href
    };
    let parsed = url::Url::parse(&absolute).ok()?;
    if parsed.path().starts_with("/l/") {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned());
    }
    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

fn clean_fragment(fragment: &str) -> String {
    let text = TAGS.replace_all(fragment, "");
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
