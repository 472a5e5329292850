//! Six-hats multi-agent analysis
//!
//! One requirement is analyzed by a team of agents that share a store:
//!
//! 1. **Framing** - the Blue hat designs the thinking process
//! 2. **Gathering** - the info gatherer searches the web and digests the hits
//! 3. **Fan-out** - White, Red, Yellow, Black and Green run concurrently
//! 4. **Refine** (extended mode) - the reviewer critiques every hat and decides
//!    whether another round is needed
//! 5. **Synthesize** - the report writer turns the latest outputs into a report
//! 6. **Evaluate** (extended mode) - the report is scored
//!
//! ## Flow
//!
//! ```text
//! Requirement → Framing → Gathering → Fan-out ─┬→ Synthesize → Report
//!                  ▲                            │
//!                  └──── Refine (extended) ◄────┘
//! ```
//!
//! ## Store layout
//!
//! - `<Hat name>` / `result` - stamped hat outputs, the newest wins
//! - `search-result` / `<query>` - stamped search summaries
//! - `feedback` / `<Hat name>` - latest critique per hat
//! - `Report Writer` / `report` - stamped reports
//! - `session` / `requirement`, `id`

pub mod agent;
pub mod evaluate;
pub mod hats;
pub mod info;
pub mod orchestrator;
pub mod reflect;
pub mod report;
pub mod types;

pub use agent::{Agent, AgentCore};
pub use evaluate::{parse_scores, Evaluator};
pub use hats::{Hat, HatAgent, ANALYTICAL_HATS};
pub use info::{InfoAgent, NO_SEARCH_RESULTS};
pub use orchestrator::Orchestrator;
pub use reflect::{parse_decision, Decision, ReflectAgent};
pub use report::{build_report_prompt, collect_thoughts, ReportAgent, ThoughtSource};
pub use types::{AgentContext, AnalysisOutcome, Phase, Scores};
