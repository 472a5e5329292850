//! Scripted doubles for the backend and for capabilities

use crate::ai::{Backend, GenerateOptions, Message};
use crate::error::{HatError, Result};
use crate::tools::{Tool, ToolDefinition, ToolGroup};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

enum Reply {
    Text(String),
    Fail(String),
}

/// Backend that answers by substring rules over the submitted history.
///
/// Rules are checked in insertion order against the last message first, then
/// against the whole history; the first rule that matches wins.
pub struct MockBackend {
    rules: Vec<(String, Reply)>,
    fallback: String,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Vec<Message>, GenerateOptions)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: "ok".to_string(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Text(reply.to_string())));
        self
    }

    pub fn with_failure(mut self, needle: &str, cause: &str) -> Self {
        self.rules.push((needle.to_string(), Reply::Fail(cause.to_string())));
        self
    }

    pub fn with_fallback(mut self, reply: &str) -> Self {
        self.fallback = reply.to_string();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn into_arc(self) -> Arc<MockBackend> {
        Arc::new(self)
    }

    /// Every history submitted so far
    pub fn calls(&self) -> Vec<(Vec<Message>, GenerateOptions)> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Histories whose final message contains `needle`
    pub fn calls_matching(&self, needle: &str) -> Vec<(Vec<Message>, GenerateOptions)> {
        self.calls
            .lock()
            .iter()
            .filter(|(history, _)| history.last().is_some_and(|m| m.content.contains(needle)))
            .cloned()
            .collect()
    }

    fn answer(&self, messages: &[Message]) -> Result<String> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| last.contains(needle.as_str()))
            .or_else(|| {
                self.rules
                    .iter()
                    .find(|(needle, _)| messages.iter().any(|m| m.content.contains(needle.as_str())))
            });
        match rule {
            Some((_, Reply::Text(text))) => Ok(text.clone()),
            Some((_, Reply::Fail(cause))) => Err(HatError::backend("mock", cause)),
            None => Ok(self.fallback.clone()),
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn generate(&self, messages: &[Message], options: GenerateOptions) -> Result<String> {
        self.calls.lock().push((messages.to_vec(), options));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer(messages)
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}

type Handler = Box<dyn Fn(Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Capability backed by a closure
pub struct FnTool {
    name: String,
    group: ToolGroup,
    delay: Option<Duration>,
    handler: Handler,
}

impl FnTool {
    pub fn arc<F>(name: &str, handler: F) -> Arc<dyn Tool>
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self::grouped_arc(name, ToolGroup::Other, handler)
    }

    pub fn grouped_arc<F>(name: &str, group: ToolGroup, handler: F) -> Arc<dyn Tool>
    where
        F: Fn(Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Arc::new(FnTool {
            name: name.to_string(),
            group,
            delay: None,
            handler: Box::new(handler),
        })
    }

    /// Sleeps for `delay`, then answers `value`
    pub fn slow_arc(name: &str, delay: Duration, value: Value) -> Arc<dyn Tool> {
        Arc::new(FnTool {
            name: name.to_string(),
            group: ToolGroup::Other,
            delay: Some(delay),
            handler: Box::new(move |_| Ok(value.clone())),
        })
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(&self.name, "test capability", self.group)
    }

    async fn execute(&self, params: Value) -> std::result::Result<Value, String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.handler)(params)
    }
}
