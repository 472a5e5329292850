//! Built-in capabilities
//!
//! - `duckduckgo`: primary web search (titled records)
//! - `google_search`: secondary web search (bare URLs, needs an API key)
//! - `web_fetch`: page text extraction

mod duckduckgo;
mod google_search;
mod web_fetch;

pub use duckduckgo::DuckDuckGoSearchTool;
pub use google_search::GoogleSearchTool;
pub use web_fetch::{extract_text_from_html, WebFetchTool};
