use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model. The `id` must travel back
/// unchanged on the matching `tool` turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    /// Raw JSON text exactly as the service sent it.
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the argument payload into a JSON object. Models sometimes send an
    /// empty string for tools without parameters, which reads as `{}`.
    pub fn parse_arguments(&self) -> Result<Value> {
        let raw = self.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        let value: Value = serde_json::from_str(raw)
            .with_context(|| format!("Invalid JSON arguments for tool '{}'", self.name))?;
        if !value.is_object() {
            bail!("Arguments for tool '{}' must be a JSON object", self.name);
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Turn {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }
}

/// Ordered conversation state for one workflow run. Append-only: turns
/// cannot be edited or dropped once pushed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn seeded(system_prompt: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::system(system_prompt), Turn::user(task)],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn tool_turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter().filter(|t| t.role == Role::Tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_transcript_has_system_then_user() {
        let transcript = Transcript::seeded("be helpful", "add numbers");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[0].role, Role::System);
        assert_eq!(transcript.turns()[1].role, Role::User);
        assert_eq!(transcript.turns()[1].content, "add numbers");
    }

    #[test]
    fn empty_arguments_parse_as_object() {
        let call = ToolCallRequest::new("call_1", "search-web", "  ");
        assert_eq!(call.parse_arguments().unwrap(), serde_json::json!({}));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let call = ToolCallRequest::new("call_1", "search-web", "[1, 2]");
        assert!(call.parse_arguments().is_err());

        let call = ToolCallRequest::new("call_2", "search-web", "{not json");
        assert!(call.parse_arguments().is_err());
    }

    #[test]
    fn tool_turn_serializes_call_id_and_lowercase_role() {
        let turn = Turn::tool("call_9", "{\"success\":true}");
        let json = serde_json::to_value(&turn).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
        assert!(json.get("tool_calls").is_none());
    }
}
