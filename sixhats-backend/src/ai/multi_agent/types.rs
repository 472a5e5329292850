//! Multi-agent system types

use crate::ai::Backend;
use crate::memory::SharedStore;
use crate::tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Topic every hat publishes its analysis under
pub const RESULT_TOPIC: &str = "result";
/// Topic the report agent publishes reports under
pub const REPORT_TOPIC: &str = "report";
/// Namespace holding search summaries, one topic per query
pub const SEARCH_NAMESPACE: &str = "search-result";
/// Namespace holding reflection critiques, one topic per hat
pub const FEEDBACK_NAMESPACE: &str = "feedback";
/// Namespace holding per-session facts
pub const SESSION_NAMESPACE: &str = "session";
pub const REQUIREMENT_TOPIC: &str = "requirement";
pub const SESSION_ID_TOPIC: &str = "id";

/// Prefix of every degraded agent output
pub const DEGRADED_PREFIX: &str = "thinking process failed:";
/// Stand-in for a hat that produced nothing
pub const NO_ANALYSIS_PLACEHOLDER: &str = "No analysis available.";

/// Shared handles every agent is built from.
///
/// Cloning is cheap: the store shares state and the rest are `Arc`s.
#[derive(Clone)]
pub struct AgentContext {
    pub backend: Arc<dyn Backend>,
    pub store: SharedStore,
    pub tools: Arc<ToolRegistry>,
    pub backend_timeout: Duration,
    pub verbose: bool,
}

impl AgentContext {
    pub fn new(backend: Arc<dyn Backend>, store: SharedStore, tools: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            store,
            tools,
            backend_timeout: Duration::from_secs(120),
            verbose: false,
        }
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Pipeline phase of one analysis session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    /// Blue hat frames the requirement
    Framing,
    /// Information gatherer runs one search
    Gathering,
    /// Analytical hats run concurrently
    Fanout,
    /// Critique and continue decision (extended mode)
    Refine,
    /// Report agent writes the report
    Synthesize,
    /// Report scoring (extended mode)
    Evaluate,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Framing => write!(f, "framing"),
            Phase::Gathering => write!(f, "gathering"),
            Phase::Fanout => write!(f, "fanout"),
            Phase::Refine => write!(f, "refine"),
            Phase::Synthesize => write!(f, "synthesize"),
            Phase::Evaluate => write!(f, "evaluate"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Report quality scores, each in `0..=100`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scores {
    pub completeness: f64,
    pub consistency: f64,
    pub practicality: f64,
}

impl std::fmt::Display for Scores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "completeness {:.0}, consistency {:.0}, practicality {:.0}",
            self.completeness, self.consistency, self.practicality
        )
    }
}

/// Everything one `analyze` run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub session_id: Uuid,
    pub report: String,
    /// Number of fan-out rounds that ran
    pub rounds: u32,
    pub scores: Option<Scores>,
}
