use agentic_core::{ToolSpec, WorkflowResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Input: What the caller sends us
#[derive(Debug, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub workflow: Option<String>, // Name used for the persisted artifact
    pub task: String,             // What do they want done?
}

// Tool Definition: A description of a capability
#[derive(Debug, Serialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Value, // JSON schema sent to the model
}

impl From<ToolSpec> for ToolDef {
    fn from(spec: ToolSpec) -> Self {
        Self {
            parameters: spec.parameters_schema(),
            name: spec.name,
            description: spec.description,
        }
    }
}

// Output: What we send back
#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub artifact: Option<String>,
    #[serde(flatten)]
    pub result: WorkflowResult,
}
