use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use thiserror::Error;

use crate::tools::ToolResult;

/// The closed set of capabilities the model can be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Capability {
    ExecuteCode,
    VisualizeData,
    SearchWeb,
    FileOperation,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::ExecuteCode,
        Capability::VisualizeData,
        Capability::SearchWeb,
        Capability::FileOperation,
    ];

    /// Name advertised to (and requested by) the model.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ExecuteCode => "execute-code",
            Capability::VisualizeData => "visualize-data",
            Capability::SearchWeb => "search-web",
            Capability::FileOperation => "file-operation",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamType,
    pub description: String,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: &str, kind: ParamType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            description: description.to_string(),
            enum_values: None,
            required: false,
            default: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: &str, description: &str) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// A tool declaration as advertised to the completion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// JSON Schema for the function's argument object.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            let mut prop = json!({
                "type": param.kind,
                "description": param.description,
            });
            if let Some(values) = &param.enum_values {
                prop["enum"] = json!(values);
            }
            if let Some(default) = &param.default {
                prop["default"] = default.clone();
            }
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
            properties.insert(param.name.clone(), prop);
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Contract every capability handler implements.
#[async_trait]
pub trait Tool: Send + Sync {
    fn capability(&self) -> Capability;

    fn description(&self) -> &str;

    fn params(&self) -> Vec<ParamSpec>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.capability().as_str().to_string(),
            description: self.description().to_string(),
            params: self.params(),
        }
    }

    /// Run the tool. An `Err` is a handler fault; the dispatcher turns it
    /// into a failed [`ToolResult`].
    async fn execute(&self, args: Value) -> Result<ToolResult>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
    #[error("tool '{0}' not implemented")]
    NotFound(String),
}

/// Maps requested tool names to their handlers. Registration order is
/// preserved for the declarations sent to the model.
#[derive(Default)]
pub struct Registry {
    tools: Vec<Box<dyn Tool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), RegistryError> {
        let capability = tool.capability();
        if self.tools.iter().any(|t| t.capability() == capability) {
            return Err(RegistryError::DuplicateTool(capability.to_string()));
        }
        tracing::debug!(tool = %capability, "registered tool");
        self.tools.push(tool);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&dyn Tool, RegistryError> {
        Capability::from_name(name)
            .and_then(|capability| self.tools.iter().find(|t| t.capability() == capability))
            .map(|t| t.as_ref())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn declarations(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(Capability);

    #[async_trait]
    impl Tool for Stub {
        fn capability(&self) -> Capability {
            self.0
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn params(&self) -> Vec<ParamSpec> {
            vec![
                ParamSpec::string("mode", "Mode").one_of(&["a", "b"]).required(),
                ParamSpec::integer("count", "Count").default_value(json!(5)),
            ]
        }

        async fn execute(&self, _args: Value) -> Result<ToolResult> {
            Ok(ToolResult::ok())
        }
    }

    #[test]
    fn capability_names_round_trip() {
        for capability in Capability::ALL {
            assert_eq!(Capability::from_name(capability.as_str()), Some(capability));
        }
        assert_eq!(Capability::from_name("execute_python_code"), None);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = Registry::new();
        registry.register(Box::new(Stub(Capability::SearchWeb))).unwrap();

        let err = registry
            .register(Box::new(Stub(Capability::SearchWeb)))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("search-web".into()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_unknown_and_unregistered_names() {
        let mut registry = Registry::new();
        registry.register(Box::new(Stub(Capability::FileOperation))).unwrap();

        assert!(registry.resolve("file-operation").is_ok());
        assert!(matches!(
            registry.resolve("search-web"),
            Err(RegistryError::NotFound(name)) if name == "search-web"
        ));
        assert!(matches!(registry.resolve("launch-rocket"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn schema_lists_enum_default_and_required() {
        let schema = Stub(Capability::SearchWeb).spec().parameters_schema();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["mode"]["enum"], json!(["a", "b"]));
        assert_eq!(schema["properties"]["count"]["type"], "integer");
        assert_eq!(schema["properties"]["count"]["default"], 5);
        assert_eq!(schema["required"], json!(["mode"]));
    }
}
