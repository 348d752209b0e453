use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
        ChatCompletionTool, ChatCompletionToolArgs, ChatCompletionToolChoiceOption,
        ChatCompletionToolType, CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
        FunctionCall, FunctionObjectArgs,
    },
    Client,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::registry::ToolSpec;
use crate::transcript::{Role, ToolCallRequest, Turn};

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolSpec>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            finish_reason: Some("stop".to_string()),
            ..Self::default()
        }
    }

    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: Some(content.into()),
            finish_reason: Some("tool_calls".to_string()),
            tool_calls,
            ..Self::default()
        }
    }
}

/// Error payload from the completion service. Fatal to the workflow run.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[error("{0}")]
pub struct ServiceError(pub String);

/// Request/response boundary to the hosted model.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError>;
}

/// Connectivity check: one tool-free request asking for a fixed reply.
pub async fn say_hello(service: &dyn CompletionService) -> Result<String, ServiceError> {
    let completion = service
        .complete(CompletionRequest {
            turns: vec![Turn::user("Hello! Reply with 'System Online'.")],
            tools: Vec::new(),
        })
        .await?;
    Ok(completion.content.unwrap_or_default())
}

/// OpenAI-compatible chat client (OpenRouter, Moonshot, ...).
pub struct Brain {
    client: Client<OpenAIConfig>,
    config: LlmConfig,
}

impl Brain {
    pub fn new(config: LlmConfig) -> Self {
        let openai = OpenAIConfig::new()
            .with_api_key(config.api_key.clone())
            .with_api_base(config.base_url.clone());
        let client = Client::with_config(openai);

        info!("Brain connected. Model: {} via {}", config.model, config.base_url);
        Self { client, config }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn to_message(turn: &Turn) -> Result<ChatCompletionRequestMessage> {
        let message: ChatCompletionRequestMessage = match turn.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(turn.content.clone())
                .build()?
                .into(),
            Role::Assistant => {
                let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                if !turn.content.is_empty() {
                    args.content(turn.content.clone());
                }
                if !turn.tool_calls.is_empty() {
                    args.tool_calls(
                        turn.tool_calls
                            .iter()
                            .map(|call| ChatCompletionMessageToolCall {
                                id: call.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect::<Vec<_>>(),
                    );
                }
                args.build()?.into()
            }
            Role::Tool => ChatCompletionRequestToolMessageArgs::default()
                .content(turn.content.clone())
                .tool_call_id(turn.tool_call_id.clone().unwrap_or_default())
                .build()?
                .into(),
        };
        Ok(message)
    }

    fn to_tool(spec: &ToolSpec) -> Result<ChatCompletionTool> {
        Ok(ChatCompletionToolArgs::default()
            .r#type(ChatCompletionToolType::Function)
            .function(
                FunctionObjectArgs::default()
                    .name(&spec.name)
                    .description(&spec.description)
                    .parameters(spec.parameters_schema())
                    .build()?,
            )
            .build()?)
    }

    #[allow(deprecated)]
    async fn send(&self, request: CompletionRequest) -> Result<Completion> {
        let messages = request
            .turns
            .iter()
            .map(Self::to_message)
            .collect::<Result<Vec<_>>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.config.model)
            .messages(messages)
            .max_tokens(self.config.max_tokens)
            .temperature(self.config.temperature);
        if !request.tools.is_empty() {
            let tools = request
                .tools
                .iter()
                .map(Self::to_tool)
                .collect::<Result<Vec<_>>>()?;
            args.tools(tools).tool_choice(ChatCompletionToolChoiceOption::Auto);
        }

        let response = self.client.chat().create(args.build()?).await?;
        from_response(response)
    }
}

fn from_response(response: CreateChatCompletionResponse) -> Result<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Completion contained no choices"))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCallRequest::new(call.id, call.function.name, call.function.arguments))
        .collect();

    Ok(Completion {
        content: choice.message.content,
        finish_reason: choice
            .finish_reason
            .and_then(|r| serde_json::to_value(r).ok())
            .and_then(|v| v.as_str().map(str::to_string)),
        usage: response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
        tool_calls,
    })
}

#[async_trait]
impl CompletionService for Brain {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError> {
        debug!(turns = request.turns.len(), tools = request.tools.len(), "requesting completion");
        self.send(request)
            .await
            .map_err(|e| ServiceError(format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParamSpec;

    struct Echo;

    #[async_trait]
    impl CompletionService for Echo {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError> {
            if !request.tools.is_empty() {
                return Err(ServiceError("unexpected tools".into()));
            }
            Ok(Completion::text(format!("System Online ({} turn)", request.turns.len())))
        }
    }

    #[tokio::test]
    async fn say_hello_returns_the_reply() {
        assert_eq!(say_hello(&Echo).await.unwrap(), "System Online (1 turn)");
    }

    #[test]
    fn every_turn_kind_converts() {
        let turns = vec![
            Turn::system("sys"),
            Turn::user("task"),
            Turn::assistant("", vec![ToolCallRequest::new("call_1", "search-web", "{\"query\":\"x\"}")]),
            Turn::tool("call_1", "{\"success\":true}"),
            Turn::assistant("done", Vec::new()),
        ];

        for turn in &turns {
            assert!(Brain::to_message(turn).is_ok(), "{turn:?}");
        }
        assert!(matches!(
            Brain::to_message(&turns[3]).unwrap(),
            ChatCompletionRequestMessage::Tool(ref m) if m.tool_call_id == "call_1"
        ));
    }

    #[test]
    fn tool_declaration_carries_schema() {
        let spec = ToolSpec {
            name: "search-web".into(),
            description: "Search".into(),
            params: vec![ParamSpec::string("query", "q").required()],
        };
        let tool = Brain::to_tool(&spec).unwrap();

        assert_eq!(tool.function.name, "search-web");
        let params = tool.function.parameters.unwrap();
        assert_eq!(params["required"][0], "query");
    }

    #[test]
    fn response_maps_tool_calls_and_usage() {
        let response: CreateChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "created": 1,
            "model": "moonshotai/kimi-k2",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_7",
                        "type": "function",
                        "function": {"name": "file-operation", "arguments": "{\"operation\":\"read\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }))
        .unwrap();

        let completion = from_response(response).unwrap();
        assert_eq!(completion.content, None);
        assert_eq!(completion.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(completion.tool_calls[0].id, "call_7");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }
}
