use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::ToolResult;
use crate::registry::{Capability, ParamSpec, Tool};
use crate::sandbox::Sandbox;

#[derive(Debug, Deserialize)]
struct ExecuteCodeArgs {
    code: String,
}

/// Runs a snippet inside the WASI sandbox and reports captured stdout.
pub struct ExecuteCodeTool {
    sandbox: Arc<Sandbox>,
}

impl ExecuteCodeTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ExecuteCodeTool {
    fn capability(&self) -> Capability {
        Capability::ExecuteCode
    }

    fn description(&self) -> &str {
        "Execute Python code in an isolated sandbox and return what it prints"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::string("code", "Python code to execute").required()]
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: ExecuteCodeArgs =
            serde_json::from_value(args).context("Failed to parse execute-code arguments")?;
        info!("Executing {} bytes of code in sandbox", args.code.len());

        let outcome = match self.sandbox.execute(&args.code).await {
            Ok(outcome) => outcome,
            Err(e) => return Ok(ToolResult::failure(e.to_string())),
        };

        if outcome.succeeded() {
            return Ok(ToolResult::ok().with("output", outcome.stdout));
        }

        let mut error = format!("Process exited with status {}", outcome.exit_code);
        let stderr = outcome.stderr.trim();
        if !stderr.is_empty() {
            error.push_str(": ");
            error.push_str(stderr);
        }
        Ok(ToolResult::failure(error).with("output", outcome.stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;
    use serde_json::json;

    // Writes "2\n" to stdout, then "boom\n" to stderr and exits 1 when argv
    // has more than two entries.
    const PRINTER: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "args_sizes_get"
            (func $args_sizes_get (param i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
          (memory (export "memory") 1)
          (data (i32.const 64) "2\n")
          (data (i32.const 80) "boom\n")
          (func (export "_start")
            (i32.store (i32.const 0) (i32.const 64))
            (i32.store (i32.const 4) (i32.const 2))
            (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 32)))
            (drop (call $args_sizes_get (i32.const 40) (i32.const 44)))
            (if (i32.gt_u (i32.load (i32.const 40)) (i32.const 2))
              (then
                (i32.store (i32.const 0) (i32.const 80))
                (i32.store (i32.const 4) (i32.const 5))
                (drop (call $fd_write (i32.const 2) (i32.const 0) (i32.const 1) (i32.const 32)))
                (call $exit (i32.const 1))))))
    "#;

    fn tool(interpreter_args: &[&str]) -> ExecuteCodeTool {
        let config = SandboxConfig {
            interpreter_args: interpreter_args.iter().map(|a| a.to_string()).collect(),
            ..SandboxConfig::default()
        };
        ExecuteCodeTool::new(Arc::new(Sandbox::with_module(config, PRINTER).unwrap()))
    }

    #[tokio::test]
    async fn reports_captured_output() {
        let result = tool(&["python"])
            .execute(json!({"code": "print(1 + 1)"}))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.get("output"), Some(&json!("2\n")));
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_with_stderr() {
        let result = tool(&["python", "-c"])
            .execute(json!({"code": "raise SystemExit(1)"}))
            .await
            .unwrap();

        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("Process exited with status 1: boom")
        );
        assert_eq!(result.get("output"), Some(&json!("2\n")));
    }

    #[tokio::test]
    async fn unconfigured_sandbox_is_a_failure_not_a_fault() {
        let tool = ExecuteCodeTool::new(Arc::new(Sandbox::new(SandboxConfig::default()).unwrap()));
        let result = tool.execute(json!({"code": "print(1)"})).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn missing_code_is_a_fault() {
        assert!(tool(&["python"]).execute(json!({})).await.is_err());
    }
}
