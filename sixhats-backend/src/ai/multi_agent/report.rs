//! Report synthesis from every hat's latest result

use super::agent::{Agent, AgentCore};
use super::hats::Hat;
use super::types::{
    AgentContext, NO_ANALYSIS_PLACEHOLDER, REPORT_TOPIC, REQUIREMENT_TOPIC, RESULT_TOPIC,
    SEARCH_NAMESPACE, SESSION_NAMESPACE,
};
use crate::ai::GenerateOptions;
use crate::memory::{value_to_text, SharedStore};
use async_trait::async_trait;
use std::collections::BTreeMap;

pub const REPORT_AGENT_NAME: &str = "Report Writer";

/// Request that triggers synthesis
pub const DEFAULT_REPORT_REQUEST: &str = "Generate the analysis report";

/// Required report sections, in order
pub const REPORT_SECTIONS: [&str; 7] = [
    "Requirement Overview",
    "Objective Facts",
    "Emotional Reaction",
    "Value & Feasibility",
    "Risks & Challenges",
    "Innovative Alternatives",
    "Conclusion & Recommendations",
];

/// Case-insensitive substrings that make a message a report request
const REPORT_TRIGGERS: [&str; 3] = ["report", "summar", "synthesi"];

const RECENT_SEARCHES: usize = 3;

/// Where a block of synthesis input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ThoughtSource {
    Hat(Hat),
    Search,
}

/// Order of sections in the synthesis prompt
pub const PROMPT_ORDER: [ThoughtSource; 7] = [
    ThoughtSource::Hat(Hat::Blue),
    ThoughtSource::Hat(Hat::White),
    ThoughtSource::Search,
    ThoughtSource::Hat(Hat::Red),
    ThoughtSource::Hat(Hat::Yellow),
    ThoughtSource::Hat(Hat::Black),
    ThoughtSource::Hat(Hat::Green),
];

impl ThoughtSource {
    pub fn label(&self) -> &'static str {
        match self {
            ThoughtSource::Hat(Hat::Blue) => "Blue Hat (process control) analysis",
            ThoughtSource::Hat(Hat::White) => "White Hat (facts and data) analysis",
            ThoughtSource::Hat(Hat::Red) => "Red Hat (emotion and intuition) analysis",
            ThoughtSource::Hat(Hat::Yellow) => "Yellow Hat (value and benefits) analysis",
            ThoughtSource::Hat(Hat::Black) => "Black Hat (risk assessment) analysis",
            ThoughtSource::Hat(Hat::Green) => "Green Hat (creative thinking) analysis",
            ThoughtSource::Search => "Collected external information",
        }
    }
}

pub struct ReportAgent {
    core: AgentCore,
}

impl ReportAgent {
    pub fn new(ctx: &AgentContext) -> Self {
        Self {
            core: AgentCore::new(
                REPORT_AGENT_NAME,
                "consolidates the hats' analysis into the final report",
                include_str!("prompts/report.md"),
                ctx,
            ),
        }
    }

    /// Latest result per hat plus the recent search summaries
    pub fn collect_hat_thoughts(&self) -> BTreeMap<ThoughtSource, String> {
        collect_thoughts(self.core.store())
    }
}

/// For each hat the latest `result`, or the placeholder; plus a `Search`
/// bucket with the three most recent search summaries, newest first.
pub fn collect_thoughts(store: &SharedStore) -> BTreeMap<ThoughtSource, String> {
    let mut thoughts: BTreeMap<ThoughtSource, String> = Hat::all()
        .map(|hat| {
            let text = store
                .latest(hat.name(), RESULT_TOPIC)
                .map(|(_, value)| value_to_text(&value))
                .unwrap_or_else(|| NO_ANALYSIS_PLACEHOLDER.to_string());
            (ThoughtSource::Hat(hat), text)
        })
        .collect();

    let searches: Vec<String> = store
        .latest_in(SEARCH_NAMESPACE, RECENT_SEARCHES)
        .into_iter()
        .map(|(_, value)| value_to_text(&value))
        .filter(|text| !text.is_empty())
        .collect();
    thoughts.insert(ThoughtSource::Search, searches.join("\n\n"));
    thoughts
}

/// Build the synthesis prompt. Sections follow [`PROMPT_ORDER`] whatever the
/// map holds; missing or empty sections are left out.
pub fn build_report_prompt(requirement: &str, thoughts: &BTreeMap<ThoughtSource, String>) -> String {
    let mut prompt = String::from(
        "Write a complete analysis report based on the following six thinking hats results.\n\n",
    );
    prompt.push_str(&format!("Original requirement:\n{}\n\n", requirement));

    for source in PROMPT_ORDER {
        if let Some(text) = thoughts.get(&source).filter(|t| !t.trim().is_empty()) {
            prompt.push_str(&format!("{}:\n{}\n\n", source.label(), text));
        }
    }

    prompt.push_str("Using all of the above, write a well-structured and thorough report with these sections, as Markdown headings in this order:\n");
    let guidance = [
        "restate the original requirement verbatim and briefly",
        "based on the White Hat and the collected information",
        "based on the Red Hat",
        "based on the Yellow Hat",
        "based on the Black Hat",
        "based on the Green Hat",
        "the final recommendations drawing on every perspective",
    ];
    for (i, (section, hint)) in REPORT_SECTIONS.iter().zip(guidance).enumerate() {
        prompt.push_str(&format!("{}. {}: {}\n", i + 1, section, hint));
    }
    prompt.push_str("\nUse Markdown and keep the structure clear, complete and insightful.");
    prompt
}

pub fn is_report_request(message: &str) -> bool {
    let lowered = message.to_lowercase();
    REPORT_TRIGGERS.iter().any(|t| lowered.contains(t))
}

#[async_trait]
impl Agent for ReportAgent {
    fn core(&self) -> &AgentCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut AgentCore {
        &mut self.core
    }

    /// A report request is expanded into the synthesis prompt, which becomes
    /// the user message; anything else is plain conversation.
    async fn process(&mut self, input: &str) -> String {
        if !is_report_request(input) {
            return self.core.converse(input, GenerateOptions::default()).await;
        }

        let thoughts = self.collect_hat_thoughts();
        let missing = thoughts.values().filter(|t| *t == NO_ANALYSIS_PLACEHOLDER).count();
        let requirement =
            self.core
                .store()
                .get_text(SESSION_NAMESPACE, REQUIREMENT_TOPIC, "No requirement provided.");
        log::info!(
            "[REPORT] Synthesizing from {} sources ({} without analysis)",
            thoughts.len(),
            missing
        );

        let prompt = build_report_prompt(&requirement, &thoughts);
        match self.core.submit(&prompt, GenerateOptions::new(0.5, 3000)).await {
            Ok(report) => {
                let stamp = self.core.publish(REPORT_TOPIC, report.clone());
                log::info!("[REPORT] Report stored @ {} ({} chars)", stamp, report.len());
                report
            }
            Err(e) => self.core.degrade(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Stamp;
    use crate::testing::MockBackend;
    use crate::tools::ToolRegistry;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn stamp(compact: &str) -> Stamp {
        Stamp::parse_compact(compact).unwrap()
    }

    #[test]
    fn test_latest_result_by_stamp() {
        let store = SharedStore::new();
        store.record_at("White Hat", RESULT_TOPIC, stamp("20240101_000002"), json!("newer"));
        store.record_at("White Hat", RESULT_TOPIC, stamp("20240101_000001"), json!("older"));

        let thoughts = collect_thoughts(&store);
        assert_eq!(thoughts[&ThoughtSource::Hat(Hat::White)], "newer");
        assert_eq!(thoughts[&ThoughtSource::Hat(Hat::Red)], NO_ANALYSIS_PLACEHOLDER);
        assert_eq!(thoughts[&ThoughtSource::Search], "");
    }

    #[test]
    fn test_search_bucket_keeps_three_newest() {
        let store = SharedStore::new();
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..5u64 {
            let at = base + chrono::Duration::seconds(i as i64);
            store.record_at(SEARCH_NAMESPACE, &format!("q{}", i), Stamp::new(at, 0), json!(format!("summary {}", i)));
        }

        let thoughts = collect_thoughts(&store);
        assert_eq!(thoughts[&ThoughtSource::Search], "summary 4\n\nsummary 3\n\nsummary 2");
    }

    #[test]
    fn test_prompt_order_is_fixed() {
        let mut thoughts = BTreeMap::new();
        // inserted in reverse on purpose
        thoughts.insert(ThoughtSource::Hat(Hat::Green), "GREEN-TEXT".to_string());
        thoughts.insert(ThoughtSource::Hat(Hat::Black), "BLACK-TEXT".to_string());
        thoughts.insert(ThoughtSource::Hat(Hat::Yellow), "YELLOW-TEXT".to_string());
        thoughts.insert(ThoughtSource::Hat(Hat::Red), "RED-TEXT".to_string());
        thoughts.insert(ThoughtSource::Search, "SEARCH-TEXT".to_string());
        thoughts.insert(ThoughtSource::Hat(Hat::White), "WHITE-TEXT".to_string());
        thoughts.insert(ThoughtSource::Hat(Hat::Blue), "BLUE-TEXT".to_string());

        let prompt = build_report_prompt("req", &thoughts);
        let positions: Vec<usize> = [
            "BLUE-TEXT",
            "WHITE-TEXT",
            "SEARCH-TEXT",
            "RED-TEXT",
            "YELLOW-TEXT",
            "BLACK-TEXT",
            "GREEN-TEXT",
        ]
        .iter()
        .map(|needle| prompt.find(needle).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);

        let sections: Vec<usize> = REPORT_SECTIONS.iter().map(|s| prompt.find(s).unwrap()).collect();
        assert!(sections.windows(2).all(|w| w[0] < w[1]));
        assert!(positions[6] < sections[0]);
    }

    #[test]
    fn test_empty_sections_are_skipped() {
        let mut thoughts = BTreeMap::new();
        thoughts.insert(ThoughtSource::Search, String::new());
        let prompt = build_report_prompt("req", &thoughts);
        assert!(!prompt.contains(ThoughtSource::Search.label()));
    }

    #[test]
    fn test_report_triggers() {
        assert!(is_report_request("Generate the analysis REPORT"));
        assert!(is_report_request("please summarize"));
        assert!(is_report_request("Synthesis time"));
        assert!(!is_report_request("what do you think?"));
    }

    #[tokio::test]
    async fn test_process_synthesizes_and_stores() {
        let backend = MockBackend::new()
            .with_reply("Write a complete analysis report", "# Report")
            .into_arc();
        let store = SharedStore::new();
        store.set(SESSION_NAMESPACE, REQUIREMENT_TOPIC, "design a payment retry queue");
        store.record("Blue Hat", RESULT_TOPIC, "frame it");
        let ctx = AgentContext::new(backend.clone(), store.clone(), Arc::new(ToolRegistry::new()));
        let mut agent = ReportAgent::new(&ctx);

        assert_eq!(agent.process(DEFAULT_REPORT_REQUEST).await, "# Report");

        let calls = backend.calls();
        let (history, options) = calls.last().unwrap();
        assert_eq!(options.max_tokens, 3000);
        assert_eq!(options.temperature, 0.5);
        let prompt = &history.last().unwrap().content;
        assert!(prompt.contains("design a payment retry queue"));
        assert!(prompt.contains("frame it"));
        assert!(prompt.contains(NO_ANALYSIS_PLACEHOLDER));

        let (_, stored) = store.latest(REPORT_AGENT_NAME, REPORT_TOPIC).unwrap();
        assert_eq!(stored, json!("# Report"));
    }

    #[tokio::test]
    async fn test_non_report_message_is_plain_chat() {
        let backend = MockBackend::new().with_fallback("sure").into_arc();
        let ctx = AgentContext::new(backend.clone(), SharedStore::new(), Arc::new(ToolRegistry::new()));
        let mut agent = ReportAgent::new(&ctx);

        assert_eq!(agent.process("hello").await, "sure");
        assert_eq!(backend.calls()[0].1, GenerateOptions::default());
    }
}
