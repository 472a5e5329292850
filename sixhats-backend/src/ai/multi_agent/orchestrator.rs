//! Multi-agent orchestrator - drives one analysis through its phases

use super::agent::Agent;
use super::evaluate::Evaluator;
use super::hats::{Hat, HatAgent, ANALYTICAL_HATS};
use super::info::InfoAgent;
use super::reflect::ReflectAgent;
use super::report::{ReportAgent, DEFAULT_REPORT_REQUEST};
use super::types::{
    AgentContext, AnalysisOutcome, Phase, Scores, DEGRADED_PREFIX, FEEDBACK_NAMESPACE,
    NO_ANALYSIS_PLACEHOLDER, REQUIREMENT_TOPIC, SESSION_ID_TOPIC, SESSION_NAMESPACE,
};
use crate::ai::{backend_from_config, Backend};
use crate::config::{Config, PipelineMode};
use crate::error::Result;
use crate::memory::{value_to_text, SharedStore};
use crate::tools::{create_default_registry, ToolRegistry};
use futures_util::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Number of query tokens taken from the requirement in basic mode
const BASIC_QUERY_TOKENS: usize = 3;
/// Ideas requested from the Green hat in basic mode
const GREEN_IDEA_COUNT: usize = 5;

/// Owns the store, the capability registry and every agent.
///
/// Agents sit behind their own `tokio::sync::Mutex`, so a fan-out task holds
/// exclusive access to its agent for the whole `process` call.
pub struct Orchestrator {
    store: SharedStore,
    tools: Arc<ToolRegistry>,
    hats: HashMap<Hat, Arc<Mutex<HatAgent>>>,
    info: Arc<Mutex<InfoAgent>>,
    report: Arc<Mutex<ReportAgent>>,
    reflect: Arc<Mutex<ReflectAgent>>,
    evaluator: Evaluator,
    mode: PipelineMode,
    max_rounds: u32,
    search_results: usize,
    phase: Phase,
}

impl Orchestrator {
    /// Build the configured backend and capabilities, then every agent.
    ///
    /// This is the only fallible step: a bad backend configuration stops here,
    /// before any agent exists.
    pub fn new(config: &Config) -> Result<Self> {
        let backend = backend_from_config(config)?;
        let tools = Arc::new(create_default_registry(config));
        Ok(Self::with_parts(config, backend, tools))
    }

    /// Assemble from an existing backend and registry
    pub fn with_parts(config: &Config, backend: Arc<dyn Backend>, tools: Arc<ToolRegistry>) -> Self {
        let store = SharedStore::new();
        let ctx = AgentContext::new(backend.clone(), store.clone(), tools.clone())
            .with_backend_timeout(config.backend_timeout)
            .with_verbose(config.verbose);

        let hats = Hat::all()
            .map(|hat| (hat, Arc::new(Mutex::new(HatAgent::new(hat, &ctx)))))
            .collect();

        log::info!(
            "[ORCHESTRATOR] Ready: mode {:?}, max rounds {}, capabilities {:?}",
            config.mode,
            config.max_rounds,
            tools.list()
        );

        Self {
            store,
            tools,
            hats,
            info: Arc::new(Mutex::new(
                InfoAgent::new(&ctx).with_result_count(config.search_results),
            )),
            report: Arc::new(Mutex::new(ReportAgent::new(&ctx))),
            reflect: Arc::new(Mutex::new(ReflectAgent::new(&ctx))),
            evaluator: Evaluator::new(backend, config.backend_timeout),
            mode: config.mode,
            max_rounds: config.max_rounds.max(1),
            search_results: config.search_results,
            phase: Phase::Idle,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Run the whole pipeline and return the report
    pub async fn analyze(&mut self, requirement: &str) -> String {
        self.analyze_detailed(requirement).await.report
    }

    /// Run the whole pipeline. Never fails: degraded phases show up as text
    /// inside the report.
    pub async fn analyze_detailed(&mut self, requirement: &str) -> AnalysisOutcome {
        let session_id = Uuid::new_v4();
        log::info!(
            "[ORCHESTRATOR] Session {} started ({:?} mode)",
            session_id,
            self.mode
        );
        self.set_requirement(requirement);
        self.store
            .set(SESSION_NAMESPACE, SESSION_ID_TOPIC, session_id.to_string());

        let rounds = match self.mode {
            PipelineMode::Basic => {
                self.run_basic(requirement).await;
                1
            }
            PipelineMode::Extended => self.run_extended(requirement).await,
        };

        self.transition_to(Phase::Synthesize);
        let report = self.generate_report(DEFAULT_REPORT_REQUEST).await;

        let scores = match self.mode {
            PipelineMode::Basic => None,
            PipelineMode::Extended => {
                self.transition_to(Phase::Evaluate);
                self.score(&report).await
            }
        };

        self.transition_to(Phase::Done);
        log::info!(
            "[ORCHESTRATOR] Session {} finished after {} round(s)",
            session_id,
            rounds
        );
        AnalysisOutcome {
            session_id,
            report,
            rounds,
            scores,
        }
    }

    pub fn set_requirement(&self, requirement: &str) {
        self.store.set(SESSION_NAMESPACE, REQUIREMENT_TOPIC, requirement);
    }

    /// Framing, a short-query search, then all five analytical hats with the
    /// Green hat taking its lateral-thinking and idea-generation path
    async fn run_basic(&mut self, requirement: &str) {
        self.frame(requirement, None).await;

        self.transition_to(Phase::Gathering);
        let query = requirement
            .split_whitespace()
            .take(BASIC_QUERY_TOKENS)
            .collect::<Vec<_>>()
            .join(" ");
        self.gather(&query).await;

        self.transition_to(Phase::Fanout);
        self.fan_out(requirement, None, true).await;
    }

    /// Gather once with the whole requirement, then run framing and fan-out
    /// per round, reflecting after each. Returns the number of rounds run.
    async fn run_extended(&mut self, requirement: &str) -> u32 {
        let mut round = 1;
        loop {
            log::info!("[ORCHESTRATOR] Round {}/{}", round, self.max_rounds);
            self.frame(requirement, Some(round)).await;

            if round == 1 {
                self.transition_to(Phase::Gathering);
                self.gather(requirement).await;
            }

            self.transition_to(Phase::Fanout);
            let replies = self.fan_out(requirement, Some(round), false).await;

            self.transition_to(Phase::Refine);
            let feedback = self.reflect_round(&replies).await;

            if round >= self.max_rounds {
                log::info!("[ORCHESTRATOR] Reached max rounds ({})", self.max_rounds);
                break;
            }
            let proceed = self.reflect.lock().await.decide_continue(round, &feedback).await;
            if !proceed {
                break;
            }
            round += 1;
        }
        round
    }

    async fn frame(&mut self, requirement: &str, round: Option<u32>) {
        self.transition_to(Phase::Framing);
        let prompt = Hat::Blue.task_prompt(requirement, round);
        self.process_with_hat(Hat::Blue, &prompt).await;
    }

    async fn gather(&self, query: &str) {
        let summary = self.info.lock().await.search_info(query, self.search_results, true).await;
        log::info!("[ORCHESTRATOR] Gathering done for '{}' ({} chars)", query, summary.len());
    }

    /// Spawn every analytical hat and wait for all of them. Returns each hat's
    /// final reply of this fan-out.
    ///
    /// From round 2 on each hat's prompt carries the critique it got last round.
    async fn fan_out(&self, requirement: &str, round: Option<u32>, green_helpers: bool) -> HashMap<Hat, String> {
        let mut tasks: Vec<(Hat, JoinHandle<String>)> = Vec::new();

        for hat in ANALYTICAL_HATS {
            let Some(agent) = self.hats.get(&hat).cloned() else {
                continue;
            };
            let prompt = self.fanout_prompt(hat, requirement, round);

            let handle = if hat == Hat::Green && green_helpers {
                let requirement = requirement.to_string();
                tokio::spawn(async move {
                    let mut green = agent.lock().await;
                    green
                        .lateral_thinking(&format!("Apply lateral thinking to this requirement:\n{}", requirement))
                        .await;
                    green.generate_ideas(&requirement, GREEN_IDEA_COUNT).await
                })
            } else {
                tokio::spawn(async move { agent.lock().await.process(&prompt).await })
            };
            tasks.push((hat, handle));
        }

        let (hats, handles): (Vec<Hat>, Vec<JoinHandle<String>>) = tasks.into_iter().unzip();
        let mut replies = HashMap::new();
        for (hat, result) in hats.into_iter().zip(join_all(handles).await) {
            match result {
                Ok(reply) => {
                    replies.insert(hat, reply);
                }
                Err(e) => log::error!("[ORCHESTRATOR] {} task aborted: {}", hat, e),
            }
        }
        log::info!("[ORCHESTRATOR] Fan-out complete ({} replies)", replies.len());
        replies
    }

    fn fanout_prompt(&self, hat: Hat, requirement: &str, round: Option<u32>) -> String {
        let prompt = hat.task_prompt(requirement, round);
        match round {
            Some(n) if n > 1 => match self.feedback_for(hat) {
                Some(critique) => format!(
                    "{}\n\nReviewer feedback on your previous analysis:\n{}",
                    prompt, critique
                ),
                None => prompt,
            },
            _ => prompt,
        }
    }

    fn feedback_for(&self, hat: Hat) -> Option<String> {
        self.store
            .get_entry(FEEDBACK_NAMESPACE, &crate::memory::EntryKey::plain(hat.name()))
            .map(|v| value_to_text(&v))
    }

    /// Critique this round's hat replies and store the critiques.
    ///
    /// A hat that failed or aborted this round is reviewed as the placeholder,
    /// never as an older result still in the store.
    async fn reflect_round(&self, replies: &HashMap<Hat, String>) -> BTreeMap<String, String> {
        let outputs: BTreeMap<String, String> = ANALYTICAL_HATS
            .iter()
            .map(|hat| {
                let text = match replies.get(hat) {
                    Some(reply) if !reply.starts_with(DEGRADED_PREFIX) => reply.clone(),
                    _ => NO_ANALYSIS_PLACEHOLDER.to_string(),
                };
                (hat.name().to_string(), text)
            })
            .collect();

        let feedback = self.reflect.lock().await.reflect(&outputs).await;
        for (agent, critique) in &feedback {
            self.store.set(FEEDBACK_NAMESPACE, agent, critique.clone());
        }
        log::info!("[ORCHESTRATOR] Stored {} critiques", feedback.len());
        feedback
    }

    async fn score(&self, report: &str) -> Option<Scores> {
        match self.evaluator.evaluate(report).await {
            Ok(scores) => {
                log::info!("[ORCHESTRATOR] Report evaluation: {}", scores);
                Some(scores)
            }
            Err(e) => {
                log::warn!("[ORCHESTRATOR] Report evaluation unavailable: {}", e);
                None
            }
        }
    }

    /// Send one message to one hat
    pub async fn process_with_hat(&self, hat: Hat, message: &str) -> String {
        match self.hats.get(&hat) {
            Some(agent) => agent.lock().await.process(message).await,
            None => {
                log::error!("[ORCHESTRATOR] No agent for {}", hat);
                format!("No agent for {}", hat)
            }
        }
    }

    pub async fn search_info(&self, query: &str) -> String {
        self.info.lock().await.search_info(query, self.search_results, true).await
    }

    pub async fn generate_report(&self, message: &str) -> String {
        self.report.lock().await.process(message).await
    }

    /// Clear the store. Agent histories are kept.
    pub fn reset(&mut self) {
        self.store.clear();
        self.phase = Phase::Idle;
    }

    fn transition_to(&mut self, next: Phase) {
        log::info!("[ORCHESTRATOR] Transitioning {} → {}", self.phase, next);
        self.phase = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::multi_agent::report::{REPORT_AGENT_NAME, REPORT_SECTIONS};
    use crate::ai::multi_agent::types::{REPORT_TOPIC, RESULT_TOPIC, SEARCH_NAMESPACE};
    use crate::config::BackendConfig;
    use crate::memory::EntryKey;
    use crate::testing::{FnTool, MockBackend};
    use crate::tools::{ToolGroup, DUCKDUCKGO_SEARCH, FETCH_WEBPAGE};
    use serde_json::json;
    use std::time::Duration;

    const REQUIREMENT: &str = "design a payment retry queue";

    fn config(mode: PipelineMode) -> Config {
        let mut config = Config::new(BackendConfig::OpenRouter {
            api_key: "test".to_string(),
            model: "test-model".to_string(),
        });
        config.mode = mode;
        config.backend_timeout = Duration::from_secs(5);
        config
    }

    fn report_text() -> String {
        let mut report = String::from("# Six Thinking Hats Analysis Report\n\n");
        for (i, section) in REPORT_SECTIONS.iter().enumerate() {
            report.push_str(&format!("## {}. {}\n", i + 1, section));
            if i == 0 {
                report.push_str(&format!("The requirement is: {}\n", REQUIREMENT));
            }
            report.push_str("...\n\n");
        }
        report
    }

    fn scripted_backend() -> MockBackend {
        MockBackend::new()
            .with_reply("Write a complete analysis report", &report_text())
            .with_reply("Extract the core information", "a page digest")
            .with_reply("Design the thinking process", "BLUE framing")
            .with_reply("objective facts", "WHITE facts")
            .with_reply("emotional and intuitive", "RED feelings")
            .with_reply("value and feasibility", "YELLOW value")
            .with_reply("risks and problems", "BLACK risks")
            .with_reply("lateral thinking", "GREEN lateral")
            .with_reply("innovative solutions", "GREEN ideas")
            .with_reply("creative ideas", "GREEN plain")
            .with_reply("Review the following analysis", "needs more numbers")
            .with_reply("CONTINUE or STOP", "STOP")
            .with_reply(
                "Evaluate the following analysis report",
                "{\"completeness\": 80, \"consistency\": 75, \"practicality\": 85}",
            )
    }

    fn registry() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry.register(FnTool::grouped_arc(DUCKDUCKGO_SEARCH, ToolGroup::Search, |_| {
            Ok(json!([{"title": "Retries", "url": "https://retry.example", "snippet": "backoff"}]))
        }));
        registry.register(FnTool::grouped_arc(FETCH_WEBPAGE, ToolGroup::Fetch, |_| {
            Ok(json!("page body"))
        }));
        Arc::new(registry)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_end_to_end_basic() {
        let backend = scripted_backend().into_arc();
        let mut orchestrator =
            Orchestrator::with_parts(&config(PipelineMode::Basic), backend.clone(), registry());

        let outcome = orchestrator.analyze_detailed(REQUIREMENT).await;
        let store = orchestrator.store();

        // framing
        let (_, blue) = store.latest("Blue Hat", RESULT_TOPIC).unwrap();
        assert_eq!(blue, json!("BLUE framing"));
        // one search summary, keyed by the first three tokens
        let searches = store.latest_in(SEARCH_NAMESPACE, 10);
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].0.topic, "design a payment");
        assert!(value_to_text(&searches[0].1).contains("**Source: https://retry.example**"));
        assert!(store.list_keys().iter().any(|k| k.starts_with("search-result_")));
        // fan-out
        for (hat, expected) in [
            (Hat::White, "WHITE facts"),
            (Hat::Red, "RED feelings"),
            (Hat::Yellow, "YELLOW value"),
            (Hat::Black, "BLACK risks"),
            (Hat::Green, "GREEN ideas"),
        ] {
            let (_, value) = store.latest(hat.name(), RESULT_TOPIC).unwrap();
            assert_eq!(value, json!(expected), "{}", hat);
        }
        assert_eq!(backend.calls_matching("lateral thinking").len(), 1);

        // report with every section, in order, requirement in the first
        let report = &outcome.report;
        let positions: Vec<usize> = REPORT_SECTIONS.iter().map(|s| report.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        let first_section = &report[positions[0]..positions[1]];
        assert!(first_section.contains(REQUIREMENT));

        let (_, stored) = store.latest(REPORT_AGENT_NAME, REPORT_TOPIC).unwrap();
        assert_eq!(value_to_text(&stored), outcome.report);
        assert_eq!(outcome.rounds, 1);
        assert!(outcome.scores.is_none());
        assert_eq!(orchestrator.phase(), Phase::Done);

        // the synthesis prompt saw every hat and the search bucket
        let synthesis = backend.calls_matching("Write a complete analysis report");
        let prompt = &synthesis[0].0.last().unwrap().content;
        for needle in ["BLUE framing", "WHITE facts", "Retries", "RED feelings", "GREEN ideas", REQUIREMENT] {
            assert!(prompt.contains(needle), "missing {}", needle);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_extended_reflects_and_scores() {
        let backend = scripted_backend().into_arc();
        let mut orchestrator =
            Orchestrator::with_parts(&config(PipelineMode::Extended), backend.clone(), registry());

        let outcome = orchestrator.analyze_detailed(REQUIREMENT).await;

        assert_eq!(outcome.rounds, 1);
        let scores = outcome.scores.unwrap();
        assert_eq!(scores.completeness, 80.0);

        let store = orchestrator.store();
        for hat in ANALYTICAL_HATS {
            let critique = store.get_entry(FEEDBACK_NAMESPACE, &EntryKey::plain(hat.name()));
            assert_eq!(critique, Some(json!("needs more numbers")), "{}", hat);
        }
        // whole requirement as query
        assert!(store.latest(SEARCH_NAMESPACE, REQUIREMENT).is_some());
        // extended green runs the plain contract
        assert_eq!(backend.calls_matching("lateral thinking").len(), 0);
        assert!(backend.calls_matching("(round 1)").len() >= 6);
        assert_eq!(backend.calls_matching("CONTINUE or STOP").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_extended_continues_up_to_max_rounds() {
        let backend = MockBackend::new()
            .with_reply("Write a complete analysis report", "final")
            .with_reply("Round 1 of the analysis", "CONTINUE")
            .with_reply("Round 2 of the analysis", "CONTINUE")
            .into_arc();
        let mut config = config(PipelineMode::Extended);
        config.max_rounds = 3;
        let mut orchestrator = Orchestrator::with_parts(&config, backend.clone(), registry());

        let outcome = orchestrator.analyze_detailed(REQUIREMENT).await;

        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.report, "final");
        // decision asked after rounds 1 and 2 only
        assert_eq!(backend.calls_matching("CONTINUE or STOP").len(), 2);
        // round 2 prompts carry last round's critique
        let revisited = backend.calls_matching("Reviewer feedback on your previous analysis");
        assert_eq!(revisited.len(), 10);
        // the fallback answers everything else, including the evaluation
        assert!(outcome.scores.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reviewer_never_sees_a_stale_round() {
        let backend = MockBackend::new()
            .with_failure("risks and problems of the following requirement (round 2)", "overloaded")
            .with_reply("Round 1 of the analysis", "CONTINUE")
            .with_reply("Write a complete analysis report", "final")
            .with_reply("Review the following analysis", "needs more numbers")
            .with_reply("risks and problems", "BLACK risks")
            .into_arc();
        let mut config = config(PipelineMode::Extended);
        config.max_rounds = 2;
        let mut orchestrator =
            Orchestrator::with_parts(&config, backend.clone(), Arc::new(ToolRegistry::new()));

        let outcome = orchestrator.analyze_detailed(REQUIREMENT).await;
        assert_eq!(outcome.rounds, 2);

        let reviews = backend.calls_matching("analysis by Black Hat");
        assert_eq!(reviews.len(), 2);
        let first = &reviews[0].0.last().unwrap().content;
        let second = &reviews[1].0.last().unwrap().content;
        assert!(first.contains("BLACK risks"));
        assert!(second.contains(NO_ANALYSIS_PLACEHOLDER));
        assert!(!second.contains("BLACK risks"));
        // the store still holds the round 1 result
        let (_, kept) = orchestrator.store().latest("Black Hat", RESULT_TOPIC).unwrap();
        assert_eq!(kept, json!("BLACK risks"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failed_phases_degrade_into_report() {
        let backend = MockBackend::new()
            .with_reply("Write a complete analysis report", "report")
            .with_failure("risks and problems", "backend exploded")
            .into_arc();
        let mut orchestrator = Orchestrator::with_parts(
            &config(PipelineMode::Basic),
            backend.clone(),
            Arc::new(ToolRegistry::new()),
        );

        assert_eq!(orchestrator.analyze(REQUIREMENT).await, "report");

        let synthesis = backend.calls_matching("Write a complete analysis report");
        let prompt = &synthesis[0].0.last().unwrap().content;
        // the failed hat never published, so its slot is the placeholder
        assert!(prompt.contains(NO_ANALYSIS_PLACEHOLDER));
        assert!(orchestrator.store().latest("Black Hat", RESULT_TOPIC).is_none());
        assert!(orchestrator.store().latest_in(SEARCH_NAMESPACE, 1).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_out_runs_concurrently() {
        // five hats at 200ms each finish well under the 1s a serial run needs
        let backend = MockBackend::new().with_delay(Duration::from_millis(200)).into_arc();
        let orchestrator = Orchestrator::with_parts(
            &config(PipelineMode::Basic),
            backend,
            Arc::new(ToolRegistry::new()),
        );

        let started = std::time::Instant::now();
        orchestrator.fan_out(REQUIREMENT, None, false).await;
        assert!(started.elapsed() < Duration::from_millis(800), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_reset_and_process_with_hat() {
        let backend = MockBackend::new().with_fallback("hi").into_arc();
        let mut orchestrator = Orchestrator::with_parts(
            &config(PipelineMode::Basic),
            backend,
            Arc::new(ToolRegistry::new()),
        );

        assert_eq!(orchestrator.process_with_hat(Hat::Red, "how does this feel?").await, "hi");
        assert!(!orchestrator.store().is_empty());

        orchestrator.reset();
        assert!(orchestrator.store().is_empty());
        assert_eq!(orchestrator.phase(), Phase::Idle);
    }
}
