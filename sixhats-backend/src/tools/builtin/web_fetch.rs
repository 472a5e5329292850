use crate::tools::http_retry::{retry_key, send_with_retry};
use crate::tools::registry::Tool;
use crate::tools::types::{FetchParams, ToolDefinition, ToolGroup, FETCH_FAILED_PREFIX, FETCH_WEBPAGE};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::net::IpAddr;
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const TRUNCATION_MARKER: &str = "\n[content truncated]\n";

static HIDDEN_BLOCKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|head|svg|template)\b[^>]*>.*?</(script|style|noscript|head|svg|template)>")
        .expect("hidden block regex")
});
static COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"));
static BLOCK_BREAKS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/tr|/section|/article|p|li|h[1-6])\b[^>]*>")
        .expect("block break regex")
});
static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag regex"));
static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x?[0-9a-fA-F]+);").expect("entity regex"));

/// Fetches a page and extracts its readable text.
///
/// Never returns `Err`: failures come back as text starting with
/// `FETCH_FAILED:` so callers can filter them by prefix.
pub struct WebFetchTool {
    client: Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| Client::new());
        WebFetchTool { client }
    }

    async fn fetch(&self, params: &FetchParams) -> Result<String, String> {
        let url = url::Url::parse(&params.url).map_err(|e| format!("invalid URL: {}", e))?;
        validate_public_url(&url).await?;

        let key = retry_key(&params.url);
        let response = send_with_retry(&key, 2, || self.client.get(url.clone())).await?;
        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;

        let text = extract_text_from_html(&body);
        if text.is_empty() {
            return Err("page has no readable text".to_string());
        }
        Ok(truncate_chars(&text, params.max_length))
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            FETCH_WEBPAGE,
            "Fetch a public web page and return its readable text",
            ToolGroup::Fetch,
        )
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let params: FetchParams =
            serde_json::from_value(params).map_err(|e| format!("Invalid parameters: {}", e))?;

        match self.fetch(&params).await {
            Ok(text) => {
                log::debug!("[WEB_FETCH] {} -> {} chars", params.url, text.chars().count());
                Ok(json!(text))
            }
            Err(e) => {
                log::warn!("[WEB_FETCH] Failed to fetch {}: {}", params.url, e);
                Ok(json!(format!("{} {}", FETCH_FAILED_PREFIX, e)))
            }
        }
    }
}

/// Reject non-HTTP schemes and hosts that resolve to private addresses.
///
/// IP literals are checked directly; domains go through tokio's resolver so
/// the lookup never blocks a runtime worker.
async fn validate_public_url(url: &url::Url) -> Result<(), String> {
    if !matches!(url.scheme(), "http" | "https") {
        return Err("URL must use http or https".to_string());
    }
    let host = url.host_str().ok_or("URL has no host")?;
    let lowered = host.to_lowercase();
    if lowered == "localhost" || lowered.ends_with(".localhost") || lowered.ends_with(".internal") {
        return Err(format!("refusing to fetch internal host '{}'", host));
    }

    let literal = match url.host() {
        Some(url::Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
        _ => None,
    };
    if let Some(ip) = literal {
        if is_private_ip(ip) {
            return Err(format!("refusing to fetch private address {}", ip));
        }
        return Ok(());
    }

    let port = url.port_or_known_default().unwrap_or(80);
    if let Ok(mut addrs) = tokio::net::lookup_host((host, port)).await {
        if let Some(addr) = addrs.find(|a| is_private_ip(a.ip())) {
            return Err(format!("'{}' resolves to private address {}", host, addr.ip()));
        }
    }
    Ok(())
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                // carrier-grade NAT 100.64.0.0/10
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xc0) == 64)
        }
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unspecified()
                || (v6.segments()[0] & 0xfe00) == 0xfc00
                || (v6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

/// Strip markup and return one non-empty line per text block
pub fn extract_text_from_html(html: &str) -> String {
    let text = HIDDEN_BLOCKS.replace_all(html, " ");
    let text = COMMENTS.replace_all(&text, " ");
    let text = BLOCK_BREAKS.replace_all(&text, "\n");
    let text = TAGS.replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    let text = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x').or_else(|| raw.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };
        code.and_then(char::from_u32)
            .map(|c| c.to_string())
            .unwrap_or_default()
    });
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Cut to `max_chars` characters, marking the cut
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_from_html() {
        let html = r#"
        <html>
        <head><title>Test</title><style>body { color: red }</style></head>
        <body>
            <h1>Retry   Queues</h1>
            <p>Use <b>exponential</b> backoff.</p>
            <script>var x = 1;</script>
            <!-- hidden -->
            <p>Dead letters &amp; alerts&#33;</p>
        </body>
        </html>
        "#;

        let text = extract_text_from_html(html);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["Retry Queues", "Use exponential backoff.", "Dead letters & alerts!"]);
        assert!(!text.contains("var x"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_truncate_chars_marks_cut() {
        assert_eq!(truncate_chars("short", 10), "short");
        let cut = truncate_chars("ábcdefgh", 3);
        assert!(cut.starts_with("ábc"));
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_private_ip_detection() {
        assert!(is_private_ip("127.0.0.1".parse().unwrap()));
        assert!(is_private_ip("192.168.1.1".parse().unwrap()));
        assert!(is_private_ip("10.0.0.1".parse().unwrap()));
        assert!(is_private_ip("100.64.1.1".parse().unwrap()));
        assert!(is_private_ip("::1".parse().unwrap()));
        assert!(!is_private_ip("8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip("1.1.1.1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_urls() {
        let ftp = url::Url::parse("ftp://example.com/file").unwrap();
        assert!(validate_public_url(&ftp).await.is_err());
        let local = url::Url::parse("http://localhost:8080/").unwrap();
        assert!(validate_public_url(&local).await.is_err());
        let loopback = url::Url::parse("http://127.0.0.1/").unwrap();
        assert!(validate_public_url(&loopback).await.is_err());
        let v6_loopback = url::Url::parse("http://[::1]:8080/").unwrap();
        assert!(validate_public_url(&v6_loopback).await.is_err());
    }

    #[tokio::test]
    async fn test_validate_accepts_public_ip_literal() {
        let public = url::Url::parse("https://1.1.1.1/dns-query").unwrap();
        assert!(validate_public_url(&public).await.is_ok());
    }

    #[tokio::test]
    async fn test_execute_reports_failure_as_sentinel() {
        let tool = WebFetchTool::new();
        let out = tool
            .execute(serde_json::json!({"url": "http://127.0.0.1/secret", "max_length": 100}))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with(FETCH_FAILED_PREFIX));
    }
}
