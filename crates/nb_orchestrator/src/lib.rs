//! Briefing orchestration: the agent dispatch table, the bounded
//! tool-calling loop, the report lifecycle service, and the background
//! job entry points.

pub mod agents;
pub mod orchestrator;
pub mod prompts;
pub mod service;
pub mod tasks;

pub use agents::{
    AgentKind, AgentSet, NewsAnalyzerAgent, NewsFetcherAgent, NewsFilterAgent, UserProfilerAgent,
};
pub use orchestrator::{OrchestrationResult, Orchestrator, MAX_ITERATIONS, MAX_WALL_CLOCK};
pub use service::BriefingService;
