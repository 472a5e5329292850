use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Primary web search capability
pub const DUCKDUCKGO_SEARCH: &str = "duckduckgo_search";
/// Secondary web search capability
pub const GOOGLE_SEARCH: &str = "google_search";
/// Page text extraction capability
pub const FETCH_WEBPAGE: &str = "fetch_webpage";

/// Prefix every fetch failure starts with. Callers detect failure by prefix.
pub const FETCH_FAILED_PREFIX: &str = "FETCH_FAILED:";

/// Tool groups, used for logging and listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    #[default]
    Search,
    Fetch,
    Other,
}

impl ToolGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::Search => "search",
            ToolGroup::Fetch => "fetch",
            ToolGroup::Other => "other",
        }
    }
}

/// Static description of a registered capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub group: ToolGroup,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, group: ToolGroup) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            group,
        }
    }
}

/// One search result: a bare URL or a titled record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchHit {
    Url(String),
    Record {
        #[serde(default)]
        title: String,
        #[serde(alias = "href", alias = "link")]
        url: String,
        #[serde(default, alias = "body")]
        snippet: String,
    },
}

impl SearchHit {
    pub fn url(&self) -> &str {
        match self {
            SearchHit::Url(url) => url,
            SearchHit::Record { url, .. } => url,
        }
    }

    /// One numbered listing line (1-based)
    pub fn render(&self, index: usize) -> String {
        match self {
            SearchHit::Url(url) => format!("{}. {}", index, url),
            SearchHit::Record { title, url, snippet } => {
                let title = if title.is_empty() { "N/A" } else { title.as_str() };
                let snippet: String = snippet.chars().take(150).collect();
                format!("{}. {} - {}\n   {}...", index, title, url, snippet)
            }
        }
    }
}

/// Decode a search capability's output, tolerating junk entries
pub fn parse_search_hits(value: Value) -> Vec<SearchHit> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<SearchHit>(item).ok())
            .filter(|hit| !hit.url().trim().is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// Parameters accepted by the search capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_num_results", deserialize_with = "deserialize_usize_lenient")]
    pub num_results: usize,
}

/// Parameters accepted by the fetch capability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchParams {
    pub url: String,
    #[serde(
        alias = "max_chars",
        default = "default_max_length",
        deserialize_with = "deserialize_usize_lenient"
    )]
    pub max_length: usize,
}

fn default_num_results() -> usize {
    5
}

fn default_max_length() -> usize {
    5000
}

/// Accept a usize given as either a number or a numeric string
fn deserialize_usize_lenient<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(|v| v as usize)
            .ok_or_else(|| serde::de::Error::custom("expected a non-negative integer")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid number '{}'", s))),
        other => Err(serde::de::Error::custom(format!("expected a number, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_hit_shapes() {
        let hits = parse_search_hits(json!([
            "https://a.example",
            {"title": "B", "href": "https://b.example", "body": "about b"},
            {"title": "no url"},
            42,
            ""
        ]));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], SearchHit::Url("https://a.example".to_string()));
        assert_eq!(hits[1].url(), "https://b.example");
        assert!(hits[1].render(2).starts_with("2. B - https://b.example"));
        assert!(parse_search_hits(json!({"not": "a list"})).is_empty());
    }

    #[test]
    fn test_params_accept_string_numbers() {
        let params: FetchParams =
            serde_json::from_value(json!({"url": "https://x.example", "max_chars": "1200"})).unwrap();
        assert_eq!(params.max_length, 1200);

        let params: SearchParams = serde_json::from_value(json!({"query": "rust"})).unwrap();
        assert_eq!(params.num_results, 5);
    }
}
