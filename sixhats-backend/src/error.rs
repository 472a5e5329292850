//! Error types for the six-hats engine
//!
//! Failures travel as values. Agents turn `Backend` and `Capability` errors
//! into degraded text at their own boundary; only `Config` is allowed to reach
//! `main`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HatError {
    /// A completion call to the model backend failed or timed out
    #[error("backend call failed ({context}): {cause}")]
    Backend { context: String, cause: String },

    /// A capability was not registered, or raised while running
    #[error("capability '{name}' failed: {cause}")]
    Capability { name: String, cause: String },

    /// Agent-level failure marker
    #[error("agent '{agent}' failed: {cause}")]
    Agent { agent: String, cause: String },

    /// Startup configuration is missing or invalid
    #[error("configuration error: {0}")]
    Config(String),
}

impl HatError {
    pub fn backend(context: impl Into<String>, cause: impl ToString) -> Self {
        HatError::Backend {
            context: context.into(),
            cause: cause.to_string(),
        }
    }

    pub fn capability(name: impl Into<String>, cause: impl ToString) -> Self {
        HatError::Capability {
            name: name.into(),
            cause: cause.to_string(),
        }
    }

    pub fn agent(agent: impl Into<String>, cause: impl ToString) -> Self {
        HatError::Agent {
            agent: agent.into(),
            cause: cause.to_string(),
        }
    }

    pub fn is_capability(&self) -> bool {
        matches!(self, HatError::Capability { .. })
    }
}

pub type Result<T> = std::result::Result<T, HatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_error_names_the_capability() {
        let err = HatError::capability("google_search", "not registered");
        assert!(err.is_capability());
        assert_eq!(
            err.to_string(),
            "capability 'google_search' failed: not registered"
        );
    }

    #[test]
    fn test_backend_error_carries_context() {
        let err = HatError::backend("White Hat", "HTTP 500");
        assert!(!err.is_capability());
        assert!(err.to_string().contains("White Hat"));
        assert!(err.to_string().contains("HTTP 500"));
    }
}
