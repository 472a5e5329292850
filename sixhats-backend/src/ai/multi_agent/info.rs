//! Information gathering: web search with provider fallback, concurrent page digests

use super::agent::{Agent, AgentCore};
use super::types::{AgentContext, SEARCH_NAMESPACE};
use crate::ai::{GenerateOptions, Message, MessageRole};
use crate::memory::value_to_text;
use crate::tools::{
    parse_search_hits, SearchHit, DUCKDUCKGO_SEARCH, FETCH_FAILED_PREFIX, FETCH_WEBPAGE, GOOGLE_SEARCH,
};
use async_trait::async_trait;
use futures_util::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

pub const INFO_AGENT_NAME: &str = "Info Gatherer";

/// Returned by `search_info` when no provider produced a URL
pub const NO_SEARCH_RESULTS: &str = "NO_SEARCH_RESULTS: every search capability was unavailable or returned nothing";

/// Providers in the order they are tried
const SEARCH_PROVIDERS: [(&str, &str); 2] = [(DUCKDUCKGO_SEARCH, "DuckDuckGo"), (GOOGLE_SEARCH, "Google")];

const DEFAULT_DIGEST_LENGTH: usize = 3000;

/// Phrases that mark a message as a search request. They are stripped to
/// leave the query.
static SEARCH_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(tell me about|look up|search for|search|find out|find|information on|information about|research)\b")
        .expect("search keyword regex")
});

pub struct InfoAgent {
    core: AgentCore,
    result_count: usize,
    digest_length: usize,
}

impl InfoAgent {
    pub fn new(ctx: &AgentContext) -> Self {
        Self {
            core: AgentCore::new(
                INFO_AGENT_NAME,
                "searches for and collects external information",
                include_str!("prompts/info.md"),
                ctx,
            ),
            result_count: 5,
            digest_length: DEFAULT_DIGEST_LENGTH,
        }
    }

    pub fn with_result_count(mut self, count: usize) -> Self {
        self.result_count = count.max(1);
        self
    }

    pub fn result_count(&self) -> usize {
        self.result_count
    }

    /// Search, optionally digest every hit, and record the combined summary
    /// under `search-result` with the query as topic.
    ///
    /// Never fails. With no results it returns [`NO_SEARCH_RESULTS`] and
    /// records nothing.
    pub async fn search_info(&self, query: &str, result_count: usize, fetch_content: bool) -> String {
        log::info!(
            "[INFO] Searching '{}' (results: {}, fetch: {})",
            query,
            result_count,
            fetch_content
        );

        let mut listing = String::new();
        let mut urls: Vec<String> = Vec::new();
        for (capability, label) in SEARCH_PROVIDERS {
            let hits = self.run_search(capability, query, result_count).await;
            if hits.is_empty() {
                continue;
            }
            listing = render_listing(label, &hits);
            urls = hits.iter().map(|hit| hit.url().to_string()).collect();
            log::info!("[INFO] {} returned {} results", label, hits.len());
            break;
        }

        if urls.is_empty() {
            log::warn!("[INFO] No search results for '{}'", query);
            return NO_SEARCH_RESULTS.to_string();
        }

        let mut digests_section = String::new();
        if fetch_content {
            let fetches = urls.iter().map(|url| self.fetch_webpage(url, self.digest_length));
            let digests: Vec<String> = join_all(fetches)
                .await
                .into_iter()
                .filter(|digest| !digest.starts_with(FETCH_FAILED_PREFIX))
                .collect();
            log::info!("[INFO] Digested {}/{} pages", digests.len(), urls.len());
            if !digests.is_empty() {
                digests_section = format!("\n\nPage digests (Markdown):\n{}", digests.join("\n\n---\n\n"));
            }
        }

        let summary = format!(
            "Information gathering: results for \"{}\"\n{}{}",
            query, listing, digests_section
        );
        let stamp = self.core.store().record(SEARCH_NAMESPACE, query, summary.clone());
        log::debug!("[INFO] Recorded search summary @ {}", stamp);
        summary
    }

    /// One provider's hits; empty when the provider is missing or failed
    async fn run_search(&self, capability: &str, query: &str, count: usize) -> Vec<SearchHit> {
        if !self.core.tools().contains(capability) {
            log::debug!("[INFO] '{}' not registered, skipping", capability);
            return Vec::new();
        }
        match self
            .core
            .tools()
            .call(capability, json!({ "query": query, "num_results": count }))
            .await
        {
            Ok(value) => parse_search_hits(value),
            Err(e) => {
                log::warn!("[INFO] {}", e);
                Vec::new()
            }
        }
    }

    /// Fetch a page and compress it into a digest tagged with its source.
    ///
    /// A failed fetch comes back as the capability's `FETCH_FAILED:` text,
    /// untouched; it is never summarized.
    pub async fn fetch_webpage(&self, url: &str, max_length: usize) -> String {
        let raw = match self
            .core
            .tools()
            .call(FETCH_WEBPAGE, json!({ "url": url, "max_length": max_length * 2 }))
            .await
        {
            Ok(value) => value_to_text(&value),
            Err(e) => {
                log::warn!("[INFO] {}", e);
                return format!("{} {}", FETCH_FAILED_PREFIX, e);
            }
        };
        if raw.starts_with(FETCH_FAILED_PREFIX) {
            log::debug!("[INFO] Fetch failed for {}: {}", url, raw);
            return raw;
        }

        let excerpt: String = raw.chars().take(max_length).collect();
        let messages = [
            Message::system(
                "You summarize web page text. Extract the core information and answer in Markdown.",
            ),
            Message::user(format!(
                "Extract the core information from the following page text and summarize it as concise Markdown. \
                 Focus on the main points and key facts; ignore navigation, ads and footers. Source URL: {}\n\n\
                 Page text:\n{}",
                url, excerpt
            )),
        ];
        match self.core.ask(&messages, GenerateOptions::new(0.3, 1000)).await {
            Ok(summary) => format!("**Source: {}**\n\n{}", url, summary),
            Err(e) => {
                log::warn!("[INFO] Could not summarize {}: {}", url, e);
                format!("{} {}", FETCH_FAILED_PREFIX, e)
            }
        }
    }
}

#[async_trait]
impl Agent for InfoAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, input: &str) -> String {
        match extract_query(input) {
            Some(query) => {
                log::info!("[INFO] Search request, query: '{}'", query);
                self.core.add_message(MessageRole::User, input);
                let result = self.search_info(&query, self.result_count, true).await;
                self.core.add_message(MessageRole::Assistant, result.clone());
                result
            }
            None => self.core.converse(input, GenerateOptions::default()).await,
        }
    }
}

/// `Some(query)` when `message` is a search request. The query is the message
/// with every keyword removed, or the whole message if nothing else is left.
fn extract_query(message: &str) -> Option<String> {
    if !SEARCH_KEYWORDS.is_match(message) {
        return None;
    }
    let stripped = SEARCH_KEYWORDS.replace_all(message, " ");
    let query = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    if query.is_empty() {
        Some(message.trim().to_string())
    } else {
        Some(query)
    }
}

fn render_listing(label: &str, hits: &[SearchHit]) -> String {
    let mut listing = format!("{} results:\n", label);
    for (i, hit) in hits.iter().enumerate() {
        listing.push_str(&hit.render(i + 1));
        listing.push('\n');
    }
    listing
}
