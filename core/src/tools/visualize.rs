use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::chart::{ChartKind, ChartRenderer, DataTable};
use super::ToolResult;
use crate::registry::{Capability, ParamSpec, Tool};

#[derive(Debug, Deserialize)]
struct VisualizeArgs {
    data: String,
    chart_type: String,
    #[serde(default)]
    title: Option<String>,
}

/// Renders tabular data to a chart file under the visualization directory.
pub struct VisualizeDataTool {
    output_dir: PathBuf,
    renderer: Box<dyn ChartRenderer>,
    sequence: AtomicU64,
}

impl VisualizeDataTool {
    pub fn new(output_dir: PathBuf, renderer: Box<dyn ChartRenderer>) -> Self {
        Self {
            output_dir,
            renderer,
            sequence: AtomicU64::new(0),
        }
    }

    async fn render_to_file(&self, args: &VisualizeArgs, kind: ChartKind) -> Result<PathBuf> {
        let table = DataTable::parse(&args.data)?;
        let document = self.renderer.render(kind, &table, args.title.as_deref())?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;
        // Millisecond stamp plus a per-tool sequence: same-millisecond renders get distinct files.
        let path = self.output_dir.join(format!(
            "chart_{}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            self.sequence.fetch_add(1, Ordering::Relaxed),
            self.renderer.extension()
        ));
        tokio::fs::write(&path, document)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[async_trait]
impl Tool for VisualizeDataTool {
    fn capability(&self) -> Capability {
        Capability::VisualizeData
    }

    fn description(&self) -> &str {
        "Create a chart from CSV or JSON data and save it as an image file"
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::string("data", "Data to visualize (CSV with a header row, or JSON)").required(),
            ParamSpec::string("chart_type", "Type of chart to create")
                .one_of(&ChartKind::NAMES)
                .required(),
            ParamSpec::string("title", "Chart title"),
        ]
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let args: VisualizeArgs =
            serde_json::from_value(args).context("Failed to parse visualize-data arguments")?;

        let Some(kind) = ChartKind::parse(&args.chart_type) else {
            return Ok(ToolResult::failure(format!(
                "Unsupported chart type '{}'; expected one of: {}",
                args.chart_type,
                ChartKind::NAMES.join(", ")
            )));
        };

        match self.render_to_file(&args, kind).await {
            Ok(path) => {
                let filename = path.display().to_string();
                info!("Chart saved to {}", filename);
                Ok(ToolResult::ok()
                    .with("message", format!("Chart saved as {filename}"))
                    .with("filename", filename))
            }
            Err(e) => Ok(ToolResult::failure(format!("{e:#}"))),
        }
    }
}
