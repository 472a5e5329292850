//! Reflection: per-agent critique and the continue/stop decision

use super::agent::{Agent, AgentCore};
use super::types::AgentContext;
use crate::ai::{GenerateOptions, Message};
use futures_util::future::join_all;
use std::collections::BTreeMap;

pub const REFLECT_AGENT_NAME: &str = "Reviewer";

/// Outcome of the continue question
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Stop,
}

pub struct ReflectAgent {
    core: AgentCore,
}

impl ReflectAgent {
    pub fn new(ctx: &AgentContext) -> Self {
        Self {
            core: AgentCore::new(
                REFLECT_AGENT_NAME,
                "reviews and improves the other agents' analysis",
                include_str!("prompts/reflect.md"),
                ctx,
            ),
        }
    }

    /// Critique every output independently. A failed critique degrades to text.
    pub async fn reflect(&self, outputs: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        log::info!("[REFLECT] Reviewing {} outputs", outputs.len());
        let reviews = outputs.iter().map(|(agent, output)| async move {
            let messages = [Message::user(format!(
                "Review the following analysis by {}. List its strengths, its gaps, and concrete suggestions for improvement.\n\n{}",
                agent, output
            ))];
            let critique = match self.core.ask(&messages, GenerateOptions::new(0.5, 500)).await {
                Ok(critique) => critique,
                Err(e) => self.core.degrade(e),
            };
            (agent.clone(), critique)
        });
        join_all(reviews).await.into_iter().collect()
    }

    /// Ask whether another round is worth running.
    ///
    /// The model must answer `CONTINUE` or `STOP`. Anything else, including a
    /// failed call, stops the loop.
    pub async fn decide_continue(&self, round: u32, feedback: &BTreeMap<String, String>) -> bool {
        let mut prompt = format!(
            "Round {} of the analysis is complete. Reviewer feedback per agent:\n\n",
            round
        );
        for (agent, critique) in feedback {
            prompt.push_str(&format!("## {}\n{}\n\n", agent, critique));
        }
        prompt.push_str(
            "Based on the current analysis and this feedback, is another round warranted? \
             Answer with exactly one word: CONTINUE or STOP.",
        );

        let answer = match self
            .core
            .ask(&[Message::user(prompt)], GenerateOptions::new(0.3, 10))
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("[REFLECT] Continue decision failed, stopping: {}", e);
                return false;
            }
        };

        match parse_decision(&answer) {
            Some(Decision::Continue) => {
                log::info!("[REFLECT] Round {}: continue", round);
                true
            }
            Some(Decision::Stop) => {
                log::info!("[REFLECT] Round {}: stop", round);
                false
            }
            None => {
                log::warn!("[REFLECT] Unrecognized decision '{}', stopping", answer.trim());
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl Agent for ReflectAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    async fn process(&mut self, input: &str) -> String {
        self.core.converse(input, GenerateOptions::default()).await
    }
}

/// First non-empty line, trimmed of whitespace, quotes, asterisks and trailing
/// punctuation, compared case-insensitively
pub fn parse_decision(answer: &str) -> Option<Decision> {
    let line = answer.lines().map(str::trim).find(|l| !l.is_empty())?;
    let word = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '*' || c == '`')
        .trim_end_matches(['.', '!'])
        .to_uppercase();
    match word.as_str() {
        "CONTINUE" => Some(Decision::Continue),
        "STOP" => Some(Decision::Stop),
        _ => None,
    }
}
