pub mod builtin;
pub mod http_retry;
pub mod registry;
pub mod types;

pub use registry::{Tool, ToolRegistry};
pub use types::{
    parse_search_hits, FetchParams, SearchHit, SearchParams, ToolDefinition, ToolGroup,
    DUCKDUCKGO_SEARCH, FETCH_FAILED_PREFIX, FETCH_WEBPAGE, GOOGLE_SEARCH,
};

use crate::config::Config;
use std::sync::Arc;

/// Register the built-in search and fetch capabilities
fn register_all_tools(registry: &ToolRegistry, config: &Config) {
    registry.register(Arc::new(builtin::DuckDuckGoSearchTool::new()));
    registry.register(Arc::new(builtin::WebFetchTool::new()));

    // Google needs both a key and a search engine id
    match (&config.google_api_key, &config.google_cse_id) {
        (Some(key), Some(cx)) => {
            registry.register(Arc::new(builtin::GoogleSearchTool::new(key, cx)));
        }
        _ => log::info!("[TOOLS] GOOGLE_API_KEY/GOOGLE_CSE_ID not set, secondary search disabled"),
    }
}

/// Create a registry with every built-in capability the configuration allows
pub fn create_default_registry(config: &Config) -> ToolRegistry {
    let registry = ToolRegistry::with_timeout(config.tool_timeout);
    register_all_tools(&registry, config);
    registry
}
