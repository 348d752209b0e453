//! Built-in tool handlers and the result shape they all share.

mod chart;
mod execute_code;
mod file_ops;
mod search;
mod visualize;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::config::ToolsConfig;
use crate::registry::{Registry, RegistryError};
use crate::sandbox::Sandbox;

pub use chart::{ChartKind, ChartRenderer, DataTable, Series, SvgRenderer};
pub use execute_code::ExecuteCodeTool;
pub use file_ops::FileOperationTool;
pub use search::{PlaceholderSearch, SearchBackend, SearchHit, SearchWebTool, SearxngSearch};
pub use visualize::VisualizeDataTool;

/// Outcome of one tool invocation, serialized flat into the `tool` turn:
/// `{"success": true, "output": ...}` or `{"success": false, "error": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl ToolResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            payload: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            payload: Map::new(),
        }
    }

    /// Attach a payload field. `success` and `error` are reserved.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != "success" && key != "error" {
            self.payload.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn from_content(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Tool turn content is not a tool result")
    }
}

/// Registry holding all four built-in capabilities.
pub fn builtin_registry(config: &ToolsConfig, sandbox: Arc<Sandbox>) -> Result<Registry, RegistryError> {
    let search: Box<dyn SearchBackend> = match &config.search_endpoint {
        Some(endpoint) => Box::new(SearxngSearch::new(endpoint.clone())),
        None => Box::new(PlaceholderSearch),
    };

    let mut registry = Registry::new();
    registry.register(Box::new(ExecuteCodeTool::new(sandbox)))?;
    registry.register(Box::new(VisualizeDataTool::new(
        config.visualization_dir.clone(),
        Box::new(SvgRenderer::default()),
    )))?;
    registry.register(Box::new(SearchWebTool::new(search)))?;
    registry.register(Box::new(FileOperationTool::new(config.workspace_dir.clone())))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_result_round_trips_through_content() {
        let result = ToolResult::ok()
            .with("output", "42\n")
            .with("lines", 1);
        let parsed = ToolResult::from_content(&result.to_content()).unwrap();

        assert_eq!(parsed, result);
        assert!(parsed.success);
        assert_eq!(parsed.get("output"), Some(&json!("42\n")));
    }

    #[test]
    fn failure_result_round_trips_through_content() {
        let result = ToolResult::failure("No such file or directory");
        let content = result.to_content();
        let parsed = ToolResult::from_content(&content).unwrap();

        assert!(!parsed.success);
        assert_eq!(parsed.error.as_deref(), Some("No such file or directory"));
        assert!(parsed.payload.is_empty());
        assert_eq!(
            serde_json::from_str::<Value>(&content).unwrap(),
            json!({"success": false, "error": "No such file or directory"})
        );
    }

    #[test]
    fn reserved_keys_are_not_payload() {
        let result = ToolResult::ok().with("success", false).with("error", "x");
        assert!(result.payload.is_empty());
        assert!(result.success);
    }

    #[test]
    fn builtin_registry_declares_every_capability() {
        let dir = tempfile::tempdir().unwrap();
        let config = ToolsConfig {
            workspace_dir: dir.path().to_path_buf(),
            visualization_dir: dir.path().join("charts"),
            search_endpoint: None,
        };
        let sandbox = Arc::new(Sandbox::new(Default::default()).unwrap());
        let registry = builtin_registry(&config, sandbox).unwrap();

        let names: Vec<String> = registry.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["execute-code", "visualize-data", "search-web", "file-operation"]
        );
    }
}
