//! The request / execute / respond loop.
//!
//! ```text
//! AWAITING_RESPONSE ──(no tool calls)──────────────► DONE
//!        ▲                    │
//!        │             (tool calls)
//!        │                    ▼
//!        └──── EXECUTING_TOOLS ◄── HAS_TOOL_CALLS
//! ```
//!
//! A service error ends the run immediately. The iteration ceiling ends it
//! after the tools of the last allowed response have run.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::llm::{CompletionRequest, CompletionService};
use crate::registry::Registry;
use crate::report::WorkflowResult;
use crate::tools::ToolResult;
use crate::transcript::{ToolCallRequest, Transcript, Turn};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous agent with tool access. \
Break complex tasks into steps, use the available tools to carry them out, \
inspect each tool result before continuing, and finish with a concise summary \
once the task is complete.";

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum completion requests per run.
    pub max_iterations: usize,
    pub system_prompt: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

pub struct Dispatcher {
    service: Arc<dyn CompletionService>,
    registry: Arc<Registry>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn CompletionService>, registry: Arc<Registry>, config: DispatchConfig) -> Self {
        Self {
            service,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn run(&self, workflow: &str, task: &str) -> WorkflowResult {
        let started = Instant::now();
        let mut transcript = Transcript::seeded(&self.config.system_prompt, task);
        let declarations = self.registry.declarations();
        let max_iterations = self.config.max_iterations.max(1);
        let mut iterations = 0;

        info!(workflow, max_iterations, tools = declarations.len(), "workflow started");

        loop {
            // AWAITING_RESPONSE
            iterations += 1;
            let request = CompletionRequest {
                turns: transcript.turns().to_vec(),
                tools: declarations.clone(),
            };

            let completion = match self.service.complete(request).await {
                Ok(completion) => completion,
                Err(e) => {
                    error!(workflow, iteration = iterations, "completion service error: {e}");
                    return WorkflowResult::failed(workflow, started.elapsed(), iterations, transcript, e.to_string());
                }
            };

            if completion.tool_calls.is_empty() {
                info!(workflow, iterations, "workflow finished");
                transcript.push(Turn::assistant(completion.content.clone().unwrap_or_default(), Vec::new()));
                return WorkflowResult::finished(workflow, started.elapsed(), iterations, transcript, completion, false);
            }

            // HAS_TOOL_CALLS -> EXECUTING_TOOLS
            info!(workflow, iteration = iterations, calls = completion.tool_calls.len(), "executing tool calls");
            transcript.push(Turn::assistant(
                completion.content.clone().unwrap_or_default(),
                completion.tool_calls.clone(),
            ));
            for call in &completion.tool_calls {
                let result = self.dispatch(call).await;
                transcript.push(Turn::tool(call.id.clone(), result.to_content()));
            }

            if iterations >= max_iterations {
                warn!(workflow, iterations, "iteration ceiling reached with tool calls outstanding");
                return WorkflowResult::finished(workflow, started.elapsed(), iterations, transcript, completion, true);
            }
        }
    }

    /// Execute one requested call. Never fails: unknown tools, bad arguments,
    /// handler errors and panics all become failed results.
    pub async fn dispatch(&self, call: &ToolCallRequest) -> ToolResult {
        let tool = match self.registry.resolve(&call.name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!(tool = %call.name, call_id = %call.id, "unknown tool requested: {e}");
                return ToolResult::failure(format!("Tool {} not implemented", call.name));
            }
        };

        let args = match call.parse_arguments() {
            Ok(args) => args,
            Err(e) => return ToolResult::failure(format!("{e:#}")),
        };

        info!(tool = %call.name, call_id = %call.id, "calling tool");
        let result = match AssertUnwindSafe(tool.execute(args)).catch_unwind().await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::failure(format!("{e:#}")),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = %call.name, "tool panicked: {message}");
                ToolResult::failure(format!("Tool {} panicked: {message}", call.name))
            }
        };

        if !result.success {
            warn!(tool = %call.name, call_id = %call.id, error = ?result.error, "tool reported failure");
        }
        result
    }
}
