//! Single-shot coding tasks: one completion request, no tools.

use std::time::Instant;
use tracing::{info, warn};

use crate::llm::{CompletionRequest, CompletionService};
use crate::report::CodingResult;
use crate::transcript::Turn;

pub const CODING_SYSTEM_PROMPT: &str = "You are an expert software engineer. \
Provide complete, production-ready code with a clean, well-commented implementation, \
comprehensive error handling, unit tests, a performance analysis and a clear \
explanation of your approach. Focus on correctness, efficiency and maintainability.";

/// Sends `prompt` once with an empty tool list and times the round trip.
/// A service error is recorded on the result rather than returned.
pub async fn run_coding_task(
    service: &dyn CompletionService,
    system_prompt: &str,
    task: &str,
    prompt: &str,
) -> CodingResult {
    info!(task, "executing coding task");
    let started = Instant::now();
    let request = CompletionRequest {
        turns: vec![Turn::system(system_prompt), Turn::user(prompt)],
        tools: Vec::new(),
    };

    match service.complete(request).await {
        Ok(completion) => {
            let result = CodingResult::completed(task, started.elapsed(), completion);
            info!(
                task,
                secs = result.execution_time,
                tokens = ?result.total_tokens(),
                "coding task completed"
            );
            result
        }
        Err(e) => {
            warn!(task, "coding task failed: {e}");
            CodingResult::failed(task, started.elapsed(), e.to_string())
        }
    }
}
