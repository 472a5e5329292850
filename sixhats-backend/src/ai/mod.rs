pub mod multi_agent;
pub mod openai;

pub use openai::OpenAIClient;

use crate::config::{BackendConfig, Config};
use crate::error::{HatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Sampling options, passed through to the backend unchanged
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerateOptions {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::new(0.7, 1000)
    }
}

/// Text-completion backend: turns a message history into a reply
#[async_trait]
pub trait Backend: Send + Sync {
    async fn generate(&self, messages: &[Message], options: GenerateOptions) -> Result<String>;

    /// Streaming variant: fragments are accumulated into one final text
    async fn generate_stream(&self, messages: &[Message], options: GenerateOptions) -> Result<String> {
        self.generate(messages, options).await
    }

    fn describe(&self) -> String {
        "backend".to_string()
    }
}

/// Run one backend call bounded by `timeout`.
///
/// A timeout surfaces as an ordinary `HatError::Backend`.
pub async fn generate_with_timeout(
    backend: &dyn Backend,
    messages: &[Message],
    options: GenerateOptions,
    timeout: Duration,
    context: &str,
) -> Result<String> {
    match tokio::time::timeout(timeout, backend.generate(messages, options)).await {
        Ok(result) => result,
        Err(_) => Err(HatError::backend(
            context,
            format!("no reply within {}s", timeout.as_secs()),
        )),
    }
}

/// Build the configured backend client
pub fn backend_from_config(config: &Config) -> Result<Arc<dyn Backend>> {
    let client = match &config.backend {
        BackendConfig::OpenRouter { api_key, model } => OpenAIClient::openrouter(api_key, model)?,
        BackendConfig::OpenAI {
            api_key,
            model,
            endpoint,
        } => OpenAIClient::new(api_key, endpoint.as_deref(), Some(model))?,
        BackendConfig::Azure {
            api_key,
            endpoint,
            deployment,
            api_version,
        } => OpenAIClient::azure(api_key, endpoint, deployment, api_version)?,
    };
    log::info!(
        "[AI] Using {} backend: {}",
        config.backend.label(),
        client.describe()
    );
    Ok(Arc::new(client))
}
