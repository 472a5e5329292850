use crate::error::{HatError, Result};
use std::env;
use std::time::Duration;

const DEFAULT_OPENROUTER_MODEL: &str = "anthropic/claude-3-opus:beta";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_AZURE_API_VERSION: &str = "2023-05-15";

/// Which completion backend to talk to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    OpenRouter {
        api_key: String,
        model: String,
    },
    OpenAI {
        api_key: String,
        model: String,
        endpoint: Option<String>,
    },
    Azure {
        api_key: String,
        endpoint: String,
        deployment: String,
        api_version: String,
    },
}

impl BackendConfig {
    pub fn label(&self) -> &'static str {
        match self {
            BackendConfig::OpenRouter { .. } => "openrouter",
            BackendConfig::OpenAI { .. } => "openai",
            BackendConfig::Azure { .. } => "azure",
        }
    }
}

/// Pipeline flavor. `Extended` adds the refine loop and report scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineMode {
    #[default]
    Basic,
    Extended,
}

impl PipelineMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "basic" | "simple" => Some(PipelineMode::Basic),
            "extended" | "enhanced" | "refine" => Some(PipelineMode::Extended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendConfig,
    pub mode: PipelineMode,
    pub max_rounds: u32,
    pub search_results: usize,
    pub backend_timeout: Duration,
    pub tool_timeout: Duration,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
    pub verbose: bool,
}

impl Config {
    /// Configuration with default tuning for the given backend
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            mode: PipelineMode::Basic,
            max_rounds: 3,
            search_results: 5,
            backend_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
            google_api_key: None,
            google_cse_id: None,
            verbose: false,
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Missing credentials for the selected backend are fatal.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_type = var("API_TYPE").unwrap_or_else(|| "openrouter".to_string());
        let backend = match api_type.to_lowercase().as_str() {
            "openrouter" => BackendConfig::OpenRouter {
                api_key: var("OPENROUTER_API_KEY").ok_or_else(|| {
                    HatError::Config("OPENROUTER_API_KEY must be set for API_TYPE=openrouter".to_string())
                })?,
                model: var("OPENROUTER_MODEL").unwrap_or_else(|| DEFAULT_OPENROUTER_MODEL.to_string()),
            },
            "openai" => BackendConfig::OpenAI {
                api_key: var("OPENAI_API_KEY").ok_or_else(|| {
                    HatError::Config("OPENAI_API_KEY must be set for API_TYPE=openai".to_string())
                })?,
                model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                endpoint: var("OPENAI_ENDPOINT"),
            },
            "azure" => {
                let api_key = var("AZURE_OPENAI_API_KEY");
                let endpoint = var("AZURE_OPENAI_ENDPOINT");
                let deployment = var("AZURE_OPENAI_DEPLOYMENT");
                match (api_key, endpoint, deployment) {
                    (Some(api_key), Some(endpoint), Some(deployment)) => BackendConfig::Azure {
                        api_key,
                        endpoint,
                        deployment,
                        api_version: var("AZURE_OPENAI_API_VERSION")
                            .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
                    },
                    _ => {
                        return Err(HatError::Config(
                            "AZURE_OPENAI_API_KEY, AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_DEPLOYMENT must all be set for API_TYPE=azure".to_string(),
                        ));
                    }
                }
            }
            other => return Err(HatError::Config(format!("Unsupported API_TYPE: {}", other))),
        };

        let mode = match var("SIXHATS_MODE") {
            Some(m) => PipelineMode::from_str(&m)
                .ok_or_else(|| HatError::Config(format!("Unknown SIXHATS_MODE: {}", m)))?,
            None => PipelineMode::Basic,
        };

        Ok(Self {
            backend,
            mode,
            max_rounds: parse_number::<u32, _>(&var, "SIXHATS_MAX_ROUNDS", 3)?.max(1),
            search_results: parse_number::<usize, _>(&var, "SIXHATS_SEARCH_RESULTS", 5)?,
            backend_timeout: Duration::from_secs(parse_number::<u64, _>(&var, "SIXHATS_BACKEND_TIMEOUT_SECS", 120)?),
            tool_timeout: Duration::from_secs(parse_number::<u64, _>(&var, "SIXHATS_TOOL_TIMEOUT_SECS", 30)?),
            google_api_key: var("GOOGLE_API_KEY"),
            google_cse_id: var("GOOGLE_CSE_ID"),
            verbose: var("SIXHATS_VERBOSE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }
}

fn parse_number<T, F>(var: &F, name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| HatError::Config(format!("{} must be a valid number, got '{}'", name, raw))),
        None => Ok(default),
    }
}
