use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use super::ToolResult;
use crate::registry::{Capability, ParamSpec, Tool};

#[derive(Debug, Deserialize)]
struct FileArgs {
    operation: String,
    filename: String,
    #[serde(default)]
    content: Option<String>,
}

/// Reads, writes and deletes files beneath a workspace root.
pub struct FileOperationTool {
    root: PathBuf,
}

impl FileOperationTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Relative paths only, and never above the root.
    fn resolve(&self, filename: &str) -> Result<PathBuf> {
        let relative = Path::new(filename);
        if filename.trim().is_empty() {
            bail!("Filename must not be empty");
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => bail!("Path '{filename}' is outside the workspace"),
            }
        }
        Ok(self.root.join(relative))
    }

    async fn run(&self, args: FileArgs) -> Result<ToolResult> {
        let path = self.resolve(&args.filename)?;
        match args.operation.as_str() {
            "read" => {
                let content = tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", args.filename))?;
                Ok(ToolResult::ok().with("content", content))
            }
            op @ ("write" | "create") => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create parent of {}", args.filename))?;
                }
                tokio::fs::write(&path, args.content.unwrap_or_default())
                    .await
                    .with_context(|| format!("Failed to write {}", args.filename))?;
                let verb = if op == "create" { "created" } else { "written" };
                Ok(ToolResult::ok().with("message", format!("File {} {verb}", args.filename)))
            }
            "delete" => {
                tokio::fs::remove_file(&path)
                    .await
                    .with_context(|| format!("Failed to delete {}", args.filename))?;
                Ok(ToolResult::ok().with("message", format!("File {} deleted", args.filename)))
            }
            other => Ok(ToolResult::failure(format!("Unknown operation: {other}"))),
        }
    }
}

#[async_trait]
impl Tool for FileOperationTool {
    fn capability(&self) -> Capability {
        Capability::FileOperation
    }

    fn description(&self) -> &str {
        "Perform file operations (read, write, create, delete)"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::string("operation", "File operation to perform")
                .one_of(&["read", "write", "create", "delete"])
                .required(),
            ParamSpec::string("filename", "Path of the file, relative to the workspace").required(),
            ParamSpec::string("content", "Content to write (for write/create operations)"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: FileArgs =
            serde_json::from_value(args).context("Failed to parse file-operation arguments")?;
        info!(operation = %args.operation, filename = %args.filename, "file operation");

        // I/O faults are reported to the model, not raised.
        Ok(self
            .run(args)
            .await
            .unwrap_or_else(|e| ToolResult::failure(format!("{e:#}"))))
    }
}
