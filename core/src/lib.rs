//! Tool-calling agent workflows: a completion-service client, a registry of
//! local tools, and the dispatcher loop that connects them.

pub mod coding;
pub mod config;
pub mod dispatcher;
pub mod llm;
pub mod registry;
pub mod report;
pub mod sandbox;
pub mod tools;
pub mod transcript;

pub use config::Settings;
pub use dispatcher::{DispatchConfig, Dispatcher};
pub use llm::{Brain, Completion, CompletionRequest, CompletionService, ServiceError};
pub use registry::{Capability, Registry, RegistryError, Tool, ToolSpec};
pub use report::{CodingResult, CodingSummary, DemoSummary, WorkflowResult};
pub use sandbox::{Sandbox, SandboxConfig};
pub use tools::ToolResult;
pub use transcript::{Role, ToolCallRequest, Transcript, Turn};
