//! Agent base: message history, shared store access and the process contract

use super::types::{AgentContext, DEGRADED_PREFIX};
use crate::ai::{generate_with_timeout, Backend, GenerateOptions, Message, MessageRole};
use crate::error::{HatError, Result};
use crate::memory::{SharedStore, Stamp};
use crate::tools::ToolRegistry;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// State shared by every agent variant.
///
/// The history is owned exclusively by this agent and replayed verbatim to
/// the backend on every call. Other agents only ever see what is published
/// to the store.
pub struct AgentCore {
    name: String,
    role: String,
    history: Vec<Message>,
    backend: Arc<dyn Backend>,
    store: SharedStore,
    tools: Arc<ToolRegistry>,
    timeout: Duration,
    verbose: bool,
}

impl AgentCore {
    /// Create an agent whose first message is the persona preamble
    pub fn new(name: &str, role: &str, preamble: &str, ctx: &AgentContext) -> Self {
        log::info!("[AGENT] Created '{}' ({})", name, role);
        let mut core = Self {
            name: name.to_string(),
            role: role.to_string(),
            history: Vec::new(),
            backend: ctx.backend.clone(),
            store: ctx.store.clone(),
            tools: ctx.tools.clone(),
            timeout: ctx.backend_timeout,
            verbose: ctx.verbose,
        };
        core.add_message(MessageRole::System, preamble);
        core
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    pub fn add_message(&mut self, role: MessageRole, content: impl Into<String>) {
        let content = content.into();
        if self.verbose {
            log::info!("[AGENT] [{}] + {} message: {}", self.name, role, preview(&content, 200));
        } else {
            log::debug!("[AGENT] [{}] + {} message ({} chars)", self.name, role, content.len());
        }
        self.history.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    /// Drop the whole history, persona preamble included
    pub fn clear_messages(&mut self) {
        log::info!("[AGENT] [{}] History cleared ({} messages)", self.name, self.history.len());
        self.history.clear();
    }

    /// Append `input`, submit the whole history and append the reply.
    ///
    /// On failure the user message stays and no assistant message is added.
    pub async fn submit(&mut self, input: &str, options: GenerateOptions) -> Result<String> {
        self.add_message(MessageRole::User, input);
        let reply = generate_with_timeout(
            self.backend.as_ref(),
            &self.history,
            options,
            self.timeout,
            &self.name,
        )
        .await?;
        self.add_message(MessageRole::Assistant, reply.clone());
        Ok(reply)
    }

    /// The base contract: like `submit`, but failures come back as text
    pub async fn converse(&mut self, input: &str, options: GenerateOptions) -> String {
        match self.submit(input, options).await {
            Ok(reply) => reply,
            Err(e) => self.degrade(e),
        }
    }

    /// One call that neither reads nor touches the history
    pub async fn ask(&self, messages: &[Message], options: GenerateOptions) -> Result<String> {
        generate_with_timeout(self.backend.as_ref(), messages, options, self.timeout, &self.name).await
    }

    /// Log a failure and turn it into the degraded output text
    pub fn degrade(&self, err: HatError) -> String {
        log::error!("[AGENT] [{}] {}", self.name, err);
        format!("{} {}", DEGRADED_PREFIX, err)
    }

    /// Set an unstamped value in this agent's namespace
    pub fn share_info(&self, key: &str, value: impl Into<Value>) {
        self.store.set(&self.name, key, value);
    }

    /// Add a stamped value in this agent's namespace
    pub fn publish(&self, topic: &str, value: impl Into<Value>) -> Stamp {
        self.store.record(&self.name, topic, value)
    }

    /// Read what `agent` shared under `key`: the unstamped value if there is
    /// one, else the latest stamped entry for that topic, else `default`
    pub fn get_shared_info(&self, agent: &str, key: &str, default: Value) -> Value {
        if let Some(value) = self.store.get_entry(agent, &crate::memory::EntryKey::plain(key)) {
            return value;
        }
        self.store
            .latest(agent, key)
            .map(|(_, value)| value)
            .unwrap_or(default)
    }
}

/// A conversational agent. `&mut self` keeps every agent to one caller at a time.
#[async_trait]
pub trait Agent: Send {
    fn core(&self) -> &AgentCore;

    fn core_mut(&mut self) -> &mut AgentCore;

    /// Handle one input and return the reply. Never fails: backend errors come
    /// back as degraded text.
    async fn process(&mut self, input: &str) -> String;

    fn name(&self) -> &str {
        self.core().name()
    }
}

/// First `max` characters, on one line
pub(crate) fn preview(text: &str, max: usize) -> String {
    let flat: String = text.chars().map(|c| if c == '\n' { ' ' } else { c }).collect();
    match flat.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}
