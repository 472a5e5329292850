//! The six thinking hats: one agent type parameterized by persona

use super::agent::{Agent, AgentCore};
use super::types::{AgentContext, RESULT_TOPIC};
use crate::ai::GenerateOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Hat {
    /// Process control and framing
    Blue,
    /// Objective facts
    White,
    /// Emotion and intuition
    Red,
    /// Value and feasibility
    Yellow,
    /// Risk
    Black,
    /// Creativity
    Green,
}

/// Hats that run in the fan-out phase
pub const ANALYTICAL_HATS: [Hat; 5] = [Hat::White, Hat::Red, Hat::Yellow, Hat::Black, Hat::Green];

impl Hat {
    pub fn all() -> impl Iterator<Item = Hat> {
        Hat::iter()
    }

    /// Agent name, also the hat's store namespace
    pub fn name(&self) -> &'static str {
        match self {
            Hat::Blue => "Blue Hat",
            Hat::White => "White Hat",
            Hat::Red => "Red Hat",
            Hat::Yellow => "Yellow Hat",
            Hat::Black => "Black Hat",
            Hat::Green => "Green Hat",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Hat::Blue => "blue",
            Hat::White => "white",
            Hat::Red => "red",
            Hat::Yellow => "yellow",
            Hat::Black => "black",
            Hat::Green => "green",
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Hat::Blue => "process control",
            Hat::White => "facts and data",
            Hat::Red => "emotion and intuition",
            Hat::Yellow => "value and feasibility",
            Hat::Black => "risk assessment",
            Hat::Green => "creative thinking",
        }
    }

    pub fn persona(&self) -> &'static str {
        match self {
            Hat::Blue => include_str!("prompts/blue.md"),
            Hat::White => include_str!("prompts/white.md"),
            Hat::Red => include_str!("prompts/red.md"),
            Hat::Yellow => include_str!("prompts/yellow.md"),
            Hat::Black => include_str!("prompts/black.md"),
            Hat::Green => include_str!("prompts/green.md"),
        }
    }

    /// The task this hat is given for a requirement. Rounds after the first
    /// are numbered so the hat knows it is revisiting its analysis.
    pub fn task_prompt(&self, requirement: &str, round: Option<u32>) -> String {
        let task = match self {
            Hat::Blue => "Design the thinking process for the following requirement",
            Hat::White => "Analyze the objective facts of the following requirement",
            Hat::Red => "Give your emotional and intuitive reaction to the following requirement",
            Hat::Yellow => "Analyze the value and feasibility of the following requirement",
            Hat::Black => "Analyze the risks and problems of the following requirement",
            Hat::Green => "Propose creative ideas and new approaches for the following requirement",
        };
        match round {
            Some(n) => format!("{} (round {}):\n{}", task, n, requirement),
            None => format!("{}:\n{}", task, requirement),
        }
    }

    /// Look a hat up by color or agent name, case-insensitively
    pub fn from_str(s: &str) -> Option<Self> {
        let wanted = s.trim().to_lowercase();
        Hat::iter().find(|hat| wanted == hat.color() || wanted == hat.name().to_lowercase())
    }
}

impl std::fmt::Display for Hat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A thinking-hat agent.
///
/// Every successful reply is published under the hat's namespace, topic
/// `result`, with a fresh stamp, so the report agent can find the latest one.
pub struct HatAgent {
    hat: Hat,
    core: AgentCore,
}

impl HatAgent {
    pub fn new(hat: Hat, ctx: &AgentContext) -> Self {
        Self {
            hat,
            core: AgentCore::new(hat.name(), hat.role(), hat.persona(), ctx),
        }
    }

    pub fn hat(&self) -> Hat {
        self.hat
    }

    /// Ask for `count` unconventional solutions to `topic`
    pub async fn generate_ideas(&mut self, topic: &str, count: usize) -> String {
        let prompt = format!(
            "Propose {} innovative solutions or alternatives for '{}' that break with conventional thinking.",
            count, topic
        );
        self.process(&prompt).await
    }

    /// Reframe `problem` from an entirely different angle
    pub async fn lateral_thinking(&mut self, problem: &str) -> String {
        let prompt = format!(
            "Use lateral thinking to analyze this problem from a completely different angle: {}",
            problem
        );
        self.process(&prompt).await
    }
}

#[async_trait]
impl Agent for HatAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, input: &str) -> String {
        match self.core.submit(input, GenerateOptions::default()).await {
            Ok(reply) => {
                let stamp = self.core.publish(RESULT_TOPIC, reply.clone());
                log::info!("[AGENT] {} published result @ {}", self.hat, stamp);
                reply
            }
            Err(e) => self.core.degrade(e),
        }
    }
}
