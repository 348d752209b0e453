//! Workflow results and the files they are persisted to.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::llm::Completion;
use crate::transcript::Transcript;

/// Summary of one dispatcher run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow: String,
    pub elapsed_secs: f64,
    /// Completion requests made, including the final one.
    pub iterations: usize,
    pub success: bool,
    /// The run stopped at the iteration ceiling with tool calls still coming.
    pub exhausted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<Completion>,
    pub transcript: Transcript,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowResult {
    pub(crate) fn finished(
        workflow: &str,
        elapsed: Duration,
        iterations: usize,
        transcript: Transcript,
        final_response: Completion,
        exhausted: bool,
    ) -> Self {
        Self {
            workflow: workflow.to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            iterations,
            success: true,
            exhausted,
            error: None,
            final_response: Some(final_response),
            transcript,
            finished_at: Utc::now(),
        }
    }

    pub(crate) fn failed(
        workflow: &str,
        elapsed: Duration,
        iterations: usize,
        transcript: Transcript,
        error: String,
    ) -> Self {
        Self {
            workflow: workflow.to_string(),
            elapsed_secs: elapsed.as_secs_f64(),
            iterations,
            success: false,
            exhausted: false,
            error: Some(error),
            final_response: None,
            transcript,
            finished_at: Utc::now(),
        }
    }

    /// Text of the last model reply, if there was one.
    pub fn answer(&self) -> Option<&str> {
        self.final_response.as_ref()?.content.as_deref()
    }
}

/// `"Data Analysis Workflow"` -> `"data_analysis_workflow"`.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() {
        "workflow".to_string()
    } else {
        out
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

/// Writes `<dir>/<slug>_workflow.json`, replacing any earlier run of the same
/// workflow.
pub fn persist_workflow(dir: &Path, result: &WorkflowResult) -> Result<PathBuf> {
    let path = dir.join(format!("{}_workflow.json", slug(&result.workflow)));
    write_json(&path, result)?;
    info!("Workflow saved to: {}", path.display());
    Ok(path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoSummary {
    pub total_workflows: usize,
    pub successful_workflows: usize,
    pub failed_workflows: usize,
    pub total_time: f64,
    /// Averages cover successful workflows only.
    pub average_time: f64,
    pub total_tool_iterations: usize,
    pub average_iterations: f64,
    pub results: Vec<WorkflowResult>,
    pub timestamp: DateTime<Utc>,
}

impl DemoSummary {
    pub fn from_results(results: Vec<WorkflowResult>, total_time: Duration) -> Self {
        let successful: Vec<&WorkflowResult> = results.iter().filter(|r| r.success).collect();
        let ok = successful.len();
        let total_iterations: usize = successful.iter().map(|r| r.iterations).sum();
        let (average_time, average_iterations) = if ok == 0 {
            (0.0, 0.0)
        } else {
            (
                successful.iter().map(|r| r.elapsed_secs).sum::<f64>() / ok as f64,
                total_iterations as f64 / ok as f64,
            )
        };

        Self {
            total_workflows: results.len(),
            successful_workflows: ok,
            failed_workflows: results.len() - ok,
            total_time: total_time.as_secs_f64(),
            average_time,
            total_tool_iterations: total_iterations,
            average_iterations,
            results,
            timestamp: Utc::now(),
        }
    }
}

/// Writes `<dir>/agentic_demo_<unix-secs>.json`.
pub fn persist_summary(dir: &Path, summary: &DemoSummary) -> Result<PathBuf> {
    let path = dir.join(format!("agentic_demo_{}.json", summary.timestamp.timestamp()));
    write_json(&path, summary)?;
    info!("Detailed report saved to: {}", path.display());
    Ok(path)
}

/// One tool-free coding completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingResult {
    pub task: String,
    pub execution_time: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Completion>,
}

impl CodingResult {
    pub(crate) fn completed(task: &str, elapsed: Duration, response: Completion) -> Self {
        Self {
            task: task.to_string(),
            execution_time: elapsed.as_secs_f64(),
            success: true,
            error: None,
            response: Some(response),
        }
    }

    pub(crate) fn failed(task: &str, elapsed: Duration, error: String) -> Self {
        Self {
            task: task.to_string(),
            execution_time: elapsed.as_secs_f64(),
            success: false,
            error: Some(error),
            response: None,
        }
    }

    pub fn total_tokens(&self) -> Option<u32> {
        Some(self.response.as_ref()?.usage?.total_tokens)
    }

    /// Markdown rendering of the answer with its timing and token usage.
    pub fn to_markdown(&self) -> String {
        let tokens = self
            .total_tokens()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let content = self
            .response
            .as_ref()
            .and_then(|r| r.content.as_deref())
            .unwrap_or("No content");

        format!(
            "# {}\n\n**Execution Time**: {:.2}s\n**Tokens Used**: {tokens}\n\n## Response\n\n{content}",
            self.task, self.execution_time
        )
    }
}

/// Writes `<dir>/<slug>_output.md`. Only successful tasks are written.
pub fn persist_coding_output(dir: &Path, result: &CodingResult) -> Result<Option<PathBuf>> {
    if !result.success {
        return Ok(None);
    }
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}_output.md", slug(&result.task)));
    std::fs::write(&path, result.to_markdown()).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Output saved to: {}", path.display());
    Ok(Some(path))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodingSummary {
    pub total_tests: usize,
    pub successful_tests: usize,
    pub failed_tests: usize,
    pub total_time: f64,
    /// Mean over successful tasks; zero when none succeeded.
    pub average_time: f64,
    pub results: Vec<CodingResult>,
    pub timestamp: DateTime<Utc>,
}

impl CodingSummary {
    pub fn from_results(results: Vec<CodingResult>, total_time: Duration) -> Self {
        let times: Vec<f64> = results.iter().filter(|r| r.success).map(|r| r.execution_time).collect();
        let ok = times.len();
        let average_time = if ok == 0 { 0.0 } else { times.iter().sum::<f64>() / ok as f64 };

        Self {
            total_tests: results.len(),
            successful_tests: ok,
            failed_tests: results.len() - ok,
            total_time: total_time.as_secs_f64(),
            average_time,
            results,
            timestamp: Utc::now(),
        }
    }
}

/// Writes `<dir>/coding_demo_<unix-secs>.json`.
pub fn persist_coding_summary(dir: &Path, summary: &CodingSummary) -> Result<PathBuf> {
    let path = dir.join(format!("coding_demo_{}.json", summary.timestamp.timestamp()));
    write_json(&path, summary)?;
    info!("Detailed report saved to: {}", path.display());
    Ok(path)
}
