//! The bounded tool-calling loop that sequences profile lookup, fetch,
//! filter and analysis into a final structured report.

use crate::agents::{AgentKind, AgentSet};
use crate::prompts;
use nb_core::json::extract_json;
use nb_core::{Article, ChatProvider, UserProfile};
use nb_storage::VectorEntityStore;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const MAX_ITERATIONS: usize = 15;
pub const MAX_WALL_CLOCK: Duration = Duration::from_secs(600);

/// Terminal outcome of one orchestration run.
#[derive(Debug, Clone)]
pub enum OrchestrationResult {
    Complete(Value),
    Error(String),
}

pub struct Orchestrator<S, P> {
    agents: AgentSet<S, P>,
    chat: Arc<dyn ChatProvider>,
    max_iterations: usize,
    max_wall_clock: Duration,
}

impl<S, P> Orchestrator<S, P>
where
    S: nb_core::ArticleStore + VectorEntityStore<Article>,
    P: VectorEntityStore<UserProfile>,
{
    pub fn new(agents: AgentSet<S, P>, chat: Arc<dyn ChatProvider>) -> Self {
        Self {
            agents,
            chat,
            max_iterations: MAX_ITERATIONS,
            max_wall_clock: MAX_WALL_CLOCK,
        }
    }

    pub fn with_limits(mut self, max_iterations: usize, max_wall_clock: Duration) -> Self {
        self.max_iterations = max_iterations;
        self.max_wall_clock = max_wall_clock;
        self
    }

    /// Drive the model through the tool loop until it produces a final
    /// report, the iteration cap is hit, or the wall clock runs out.
    /// Never returns Err; every failure maps to an error outcome.
    pub async fn run(&self, user_id: u64) -> OrchestrationResult {
        let system = prompts::orchestrator_system(user_id, &AgentKind::listing());
        let mut transcript = String::new();
        let mut executed: HashSet<AgentKind> = HashSet::new();
        let started = Instant::now();

        for iteration in 0..self.max_iterations {
            if started.elapsed() > self.max_wall_clock {
                warn!(user_id, ?iteration, "orchestration wall clock exceeded");
                return OrchestrationResult::Error(
                    "orchestration timed out before producing a report".to_string(),
                );
            }

            let prompt = if transcript.is_empty() {
                system.clone()
            } else {
                format!("{}\n\nProgress so far:\n{}", system, transcript)
            };
            let output = match self.chat.complete(&prompt).await {
                Ok(output) => output,
                Err(e) => {
                    return OrchestrationResult::Error(format!("model call failed: {}", e));
                }
            };

            match parse_tool_call(&output) {
                Some((name, input)) => {
                    let Some(kind) = AgentKind::parse(&name) else {
                        warn!(tool = %name, "model asked for an unknown tool");
                        transcript.push_str(&format!(
                            "Tool call: {}\nResult: error, unknown tool\n",
                            name
                        ));
                        continue;
                    };
                    let input = with_user_id(input, user_id);
                    debug!(tool = %kind, iteration, "dispatching tool call");
                    let observation = match self.agents.invoke(kind, input).await {
                        Ok(result) => {
                            executed.insert(kind);
                            result.to_string()
                        }
                        Err(e) => {
                            warn!(tool = %kind, error = %e, "tool call failed");
                            format!("error: {}", e)
                        }
                    };
                    transcript.push_str(&format!(
                        "Tool call: {}\nResult: {}\n",
                        kind, observation
                    ));
                }
                None => {
                    self.verify_trace(&executed);
                    return finalize(&output);
                }
            }
        }

        warn!(user_id, "iteration cap reached without a final report");
        OrchestrationResult::Error(
            "iteration limit reached without a final report".to_string(),
        )
    }

    /// Required-step check after the loop. Missing tools are logged,
    /// not failed; the report is still used as produced.
    fn verify_trace(&self, executed: &HashSet<AgentKind>) {
        for kind in AgentKind::ALL {
            if !executed.contains(&kind) {
                warn!(tool = %kind, "required tool was never invoked");
            }
        }
        info!(executed = executed.len(), "tool trace verified");
    }
}

/// A model reply is a tool call when its JSON payload is an object
/// with a string `tool` field. Anything else is a final answer.
fn parse_tool_call(output: &str) -> Option<(String, Value)> {
    let value = extract_json(output)?;
    let tool = value.get("tool")?.as_str()?.to_string();
    let input = value.get("input").cloned().unwrap_or(Value::Null);
    Some((tool, input))
}

fn with_user_id(input: Value, user_id: u64) -> Value {
    match input {
        Value::Object(mut map) => {
            map.entry("user_id").or_insert(user_id.into());
            Value::Object(map)
        }
        Value::Null => serde_json::json!({ "user_id": user_id }),
        other => other,
    }
}

/// Validate and wrap the model's final output: it must carry a JSON
/// object with a non-empty `full_report_content`.
fn finalize(output: &str) -> OrchestrationResult {
    let Some(payload) = extract_json(output) else {
        return OrchestrationResult::Error(
            "final output contained no parseable JSON".to_string(),
        );
    };
    let Value::Object(_) = &payload else {
        return OrchestrationResult::Error("final output was not a JSON object".to_string());
    };
    let narrative = payload
        .get("full_report_content")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if narrative.trim().is_empty() {
        return OrchestrationResult::Error(
            "final report is missing full_report_content".to_string(),
        );
    }
    info!(chars = narrative.len(), "final report accepted");
    OrchestrationResult::Complete(payload)
}
