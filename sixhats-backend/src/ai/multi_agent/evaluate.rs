//! Report scoring

use super::types::Scores;
use crate::ai::{generate_with_timeout, Backend, GenerateOptions, Message};
use crate::error::{HatError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*?\}").expect("json object regex"));
static SCORE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s\-*#]*(completeness|consistency|practicality)\W*[:=]\s*(\d+(?:\.\d+)?)\s*(?:/\s*100)?\s*$")
        .expect("score line regex")
});

/// Scores a finished report with one backend call
pub struct Evaluator {
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl Evaluator {
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn evaluate(&self, report: &str) -> Result<Scores> {
        let prompt = format!(
            "Evaluate the following analysis report. Score its completeness, consistency and practicality, each from 0 to 100.\n\
             Reply with only a JSON object of the form {{\"completeness\": <number>, \"consistency\": <number>, \"practicality\": <number>}}.\n\n{}",
            report
        );
        let reply = generate_with_timeout(
            self.backend.as_ref(),
            &[Message::user(prompt)],
            GenerateOptions::new(0.3, 300),
            self.timeout,
            "evaluation",
        )
        .await?;

        let scores = parse_scores(&reply)?;
        log::info!("[EVAL] Report scores: {}", scores);
        Ok(scores)
    }
}

/// Extract scores from a model reply.
///
/// 1. The first `{...}` block must deserialize into exactly the three fields,
///    each a JSON number.
/// 2. Otherwise every field must appear on its own `name: number` line.
///
/// Every score must lie in `0..=100`; anything else is an error.
pub fn parse_scores(reply: &str) -> Result<Scores> {
    if let Some(block) = JSON_OBJECT.find(reply) {
        if let Ok(scores) = serde_json::from_str::<Scores>(block.as_str()) {
            return validate(scores);
        }
    }

    let mut completeness = None;
    let mut consistency = None;
    let mut practicality = None;
    for caps in SCORE_LINE.captures_iter(reply) {
        let value: f64 = caps[2]
            .parse()
            .map_err(|_| HatError::backend("evaluation", format!("bad score '{}'", &caps[2])))?;
        match caps[1].to_lowercase().as_str() {
            "completeness" => completeness = Some(value),
            "consistency" => consistency = Some(value),
            _ => practicality = Some(value),
        }
    }

    match (completeness, consistency, practicality) {
        (Some(completeness), Some(consistency), Some(practicality)) => validate(Scores {
            completeness,
            consistency,
            practicality,
        }),
        _ => Err(HatError::backend(
            "evaluation",
            format!("could not extract scores from reply: {}", reply.trim()),
        )),
    }
}

fn validate(scores: Scores) -> Result<Scores> {
    let in_range = |v: f64| (0.0..=100.0).contains(&v);
    if in_range(scores.completeness) && in_range(scores.consistency) && in_range(scores.practicality) {
        Ok(scores)
    } else {
        Err(HatError::backend("evaluation", format!("score out of range: {}", scores)))
    }
}
