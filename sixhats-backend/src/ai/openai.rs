use crate::ai::{Backend, GenerateOptions, Message};
use crate::error::{HatError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const OPENROUTER_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Chat-completions client for OpenAI-compatible services.
///
/// OpenRouter and plain OpenAI authenticate with a bearer token; Azure uses
/// an `api-key` header and carries the model in the deployment URL.
#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<OpenAIMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage<'a> {
    role: String,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIStreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIStreamDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self> {
        let endpoint_url = endpoint.unwrap_or(OPENAI_ENDPOINT).to_string();
        let model_name = match model {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => "gpt-4o".to_string(),
        };
        Self::build(bearer_headers(api_key)?, endpoint_url, Some(model_name))
    }

    pub fn openrouter(api_key: &str, model: &str) -> Result<Self> {
        Self::new(api_key, Some(OPENROUTER_ENDPOINT), Some(model))
    }

    pub fn azure(api_key: &str, endpoint: &str, deployment: &str, api_version: &str) -> Result<Self> {
        let mut headers = json_headers();
        let key_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| HatError::Config(format!("Invalid API key format: {}", e)))?;
        headers.insert("api-key", key_value);

        let endpoint_url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        );
        Self::build(headers, endpoint_url, None)
    }

    fn build(headers: header::HeaderMap, endpoint: String, model: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| HatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            model,
        })
    }

    fn request<'a>(
        &'a self,
        messages: &'a [Message],
        options: GenerateOptions,
        stream: bool,
    ) -> OpenAICompletionRequest<'a> {
        OpenAICompletionRequest {
            model: self.model.as_deref(),
            messages: messages
                .iter()
                .map(|m| OpenAIMessage {
                    role: m.role.to_string(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
        }
    }

    async fn send(&self, request: &OpenAICompletionRequest<'_>) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| HatError::backend("openai", format!("API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(HatError::backend("openai", describe_error(status, &error_text)));
        }
        Ok(response)
    }
}

#[async_trait]
impl Backend for OpenAIClient {
    async fn generate(&self, messages: &[Message], options: GenerateOptions) -> Result<String> {
        let request = self.request(messages, options, false);
        log::info!(
            "[OPENAI] Sending {} messages to {} (model: {}, max_tokens: {}, temperature: {})",
            messages.len(),
            self.endpoint,
            self.model.as_deref().unwrap_or("deployment"),
            options.max_tokens,
            options.temperature
        );

        let response = self.send(&request).await?;
        let response_text = response
            .text()
            .await
            .map_err(|e| HatError::backend("openai", format!("Failed to read response: {}", e)))?;
        log::debug!("[OPENAI] Raw response:\n{}", response_text);

        parse_completion(&response_text)
    }

    async fn generate_stream(&self, messages: &[Message], options: GenerateOptions) -> Result<String> {
        let request = self.request(messages, options, true);
        log::info!("[OPENAI] Streaming {} messages to {}", messages.len(), self.endpoint);

        let response = self.send(&request).await?;
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk
                .map_err(|e| HatError::backend("openai", format!("stream interrupted: {}", e)))?;
            decoder.push(&bytes);
        }
        let content = decoder.finish();

        log::info!("[OPENAI] Stream finished - content_len: {}", content.len());
        Ok(content)
    }

    fn describe(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({})", self.endpoint, model),
            None => self.endpoint.clone(),
        }
    }
}

fn json_headers() -> header::HeaderMap {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    headers
}

fn bearer_headers(api_key: &str) -> Result<header::HeaderMap> {
    let mut headers = json_headers();
    // Only add auth header if API key is provided and not empty
    if !api_key.is_empty() {
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| HatError::Config(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);
    }
    Ok(headers)
}

fn describe_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(error_response) = serde_json::from_str::<OpenAIErrorResponse>(body) {
        return format!("API error: {}", error_response.error.message);
    }
    format!("API returned error status: {}, body: {}", status, body)
}

fn parse_completion(body: &str) -> Result<String> {
    let response: OpenAICompletionResponse = serde_json::from_str(body).map_err(|e| {
        HatError::backend("openai", format!("Failed to parse response: {} - body: {}", e, body))
    })?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| HatError::backend("openai", "API returned no choices"))?;

    log::info!(
        "[OPENAI] Response - content_len: {}, finish_reason: {:?}",
        choice.message.content.as_ref().map(|c| c.len()).unwrap_or(0),
        choice.finish_reason
    );
    Ok(choice.message.content.unwrap_or_default())
}

/// Accumulates raw SSE bytes and collects content fragments line by line.
///
/// Lines are only decoded once their `\n` has arrived, so a multi-byte
/// character split across network chunks stays intact.
#[derive(Default)]
struct SseDecoder {
    pending: Vec<u8>,
    content: String,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.take_line(&line);
        }
    }

    /// Flush a trailing line that never got its newline
    fn finish(mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        self.take_line(&rest);
        self.content
    }

    fn take_line(&mut self, line: &[u8]) {
        if let Some(fragment) = parse_sse_line(&String::from_utf8_lossy(line)) {
            self.content.push_str(&fragment);
        }
    }
}

/// Extract the content fragment from one `data:` line of an SSE stream
fn parse_sse_line(line: &str) -> Option<String> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    let chunk: OpenAIStreamChunk = serde_json::from_str(data).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Facts first."},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_completion(body).unwrap(), "Facts first.");
    }

    #[test]
    fn test_parse_completion_without_choices_is_backend_error() {
        let err = parse_completion(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, HatError::Backend { .. }));
        assert!(parse_completion("not json").is_err());
    }

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#),
            Some("Hel".to_string())
        );
        assert_eq!(parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#), None);
        assert_eq!(parse_sse_line("data: [DONE]"), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line(""), None);
    }

    #[test]
    fn test_sse_decoder_keeps_split_characters() {
        let stream = "data: {\"choices\":[{\"delta\":{\"content\":\"风险\"}}]}\n\ndata: [DONE]\n";
        let bytes = stream.as_bytes();
        // cut inside the first CJK character
        let cut = stream.find('风').unwrap() + 1;

        let mut decoder = SseDecoder::default();
        decoder.push(&bytes[..cut]);
        decoder.push(&bytes[cut..]);
        assert_eq!(decoder.finish(), "风险");
    }

    #[test]
    fn test_sse_decoder_joins_split_lines_and_flushes_tail() {
        let mut decoder = SseDecoder::default();
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"con");
        decoder.push(b"tent\":\"Hel\"}}]}\r\n: keep-alive\n");
        decoder.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}");
        assert_eq!(decoder.finish(), "Hello");
    }

    #[test]
    fn test_describe_error_prefers_api_message() {
        let msg = describe_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"Rate limit reached"}}"#,
        );
        assert_eq!(msg, "API error: Rate limit reached");
        let raw = describe_error(reqwest::StatusCode::BAD_GATEWAY, "upstream down");
        assert!(raw.contains("502"));
        assert!(raw.contains("upstream down"));
    }

    #[test]
    fn test_azure_endpoint_shape() {
        let client = OpenAIClient::azure("k", "https://res.openai.azure.com/", "gpt4", "2023-05-15").unwrap();
        assert_eq!(
            client.endpoint,
            "https://res.openai.azure.com/openai/deployments/gpt4/chat/completions?api-version=2023-05-15"
        );
        assert!(client.model.is_none());
    }

    #[test]
    fn test_request_omits_model_for_azure() {
        let client = OpenAIClient::azure("k", "https://res.openai.azure.com", "d", "v").unwrap();
        let messages = vec![Message::user("hi")];
        let req = client.request(&messages, GenerateOptions::new(0.5, 3000), false);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(json["max_tokens"], 3000);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_openrouter_uses_model() {
        let client = OpenAIClient::openrouter("key", "anthropic/claude-3-opus:beta").unwrap();
        assert_eq!(client.endpoint, OPENROUTER_ENDPOINT);
        assert_eq!(client.model.as_deref(), Some("anthropic/claude-3-opus:beta"));
    }
}
