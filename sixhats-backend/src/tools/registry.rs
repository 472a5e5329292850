use crate::error::{HatError, Result};
use crate::tools::types::{ToolDefinition, ToolGroup};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Trait that all capabilities must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the capability's static description
    fn definition(&self) -> ToolDefinition;

    /// Runs the capability. `Err` carries the underlying cause.
    async fn execute(&self, params: Value) -> std::result::Result<Value, String>;

    /// Returns the capability's name
    fn name(&self) -> String {
        self.definition().name
    }

    fn group(&self) -> ToolGroup {
        self.definition().group
    }
}

/// Name -> capability lookup.
///
/// Agents call through `call` so they never need to know which concrete
/// search or fetch implementation is wired in, and so every failure comes
/// back as `HatError::Capability`.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    call_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(call_timeout: Duration) -> Self {
        ToolRegistry {
            tools: RwLock::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Register a capability under its definition name, replacing any previous one
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        log::info!("[TOOLS] Registered '{}' ({})", name, tool.group().as_str());
        self.tools.write().insert(name, tool);
    }

    /// Unregister a capability by name. Returns true if it was present.
    pub fn unregister(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke a capability by name, bounded by the registry's call timeout
    pub async fn call(&self, name: &str, params: Value) -> Result<Value> {
        // clone the Arc so the lock is not held across the await
        let tool = self
            .get(name)
            .ok_or_else(|| HatError::capability(name, "capability is not registered"))?;

        log::debug!("[TOOLS] Calling '{}' with {}", name, params);

        match tokio::time::timeout(self.call_timeout, tool.execute(params)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => {
                log::error!("[TOOLS] '{}' failed: {}", name, cause);
                Err(HatError::capability(name, cause))
            }
            Err(_) => {
                log::error!(
                    "[TOOLS] '{}' timed out after {}s",
                    name,
                    self.call_timeout.as_secs()
                );
                Err(HatError::capability(
                    name,
                    format!("timed out after {}s", self.call_timeout.as_secs()),
                ))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
