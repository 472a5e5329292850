use crate::tools::http_retry::send_with_retry;
use crate::tools::registry::Tool;
use crate::tools::types::{SearchHit, SearchParams, ToolDefinition, ToolGroup, GOOGLE_SEARCH};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
/// The Custom Search API refuses `num` above 10
const MAX_RESULTS: usize = 10;

#[derive(Debug, Deserialize)]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CustomSearchItem {
    link: String,
}

/// Secondary search provider backed by Google Custom Search.
///
/// Returns bare URLs, or an empty list on any failure.
pub struct GoogleSearchTool {
    client: Client,
    api_key: String,
    cse_id: String,
}

impl GoogleSearchTool {
    pub fn new(api_key: impl Into<String>, cse_id: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_key: api_key.into(),
            cse_id: cse_id.into(),
        }
    }

    async fn search(&self, params: &SearchParams) -> Result<Vec<SearchHit>, String> {
        let num = params.num_results.clamp(1, MAX_RESULTS).to_string();
        let response = send_with_retry("www.googleapis.com", 2, || {
            self.client.get(ENDPOINT).query(&[
                ("key", self.api_key.as_str()),
                ("cx", self.cse_id.as_str()),
                ("q", params.query.as_str()),
                ("num", num.as_str()),
            ])
        })
        .await?;
        let body: CustomSearchResponse = response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {}", e))?;
        Ok(links_to_hits(body))
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            GOOGLE_SEARCH,
            "Search the web with Google Custom Search and return result URLs",
            ToolGroup::Search,
        )
    }

    async fn execute(&self, params: Value) -> Result<Value, String> {
        let params: SearchParams =
            serde_json::from_value(params).map_err(|e| format!("Invalid parameters: {}", e))?;

        match self.search(&params).await {
            Ok(hits) => {
                log::info!("[SEARCH] Google '{}' -> {} results", params.query, hits.len());
                serde_json::to_value(hits).map_err(|e| e.to_string())
            }
            Err(e) => {
                log::warn!("[SEARCH] Google search for '{}' failed: {}", params.query, e);
                Ok(json!([]))
            }
        }
    }
}

fn links_to_hits(response: CustomSearchResponse) -> Vec<SearchHit> {
    response
        .items
        .into_iter()
        .map(|item| SearchHit::Url(item.link))
        .collect()
}
