pub mod ai;
pub mod config;
pub mod error;
pub mod memory;
pub mod tools;

#[cfg(test)]
mod testing;

pub use ai::multi_agent::{AnalysisOutcome, Hat, Orchestrator};
pub use config::{Config, PipelineMode};
pub use error::{HatError, Result};
