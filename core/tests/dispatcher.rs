use agentic_core::config::ToolsConfig;
use agentic_core::tools::{builtin_registry, FileOperationTool};
use agentic_core::{
    Completion, CompletionRequest, CompletionService, DispatchConfig, Dispatcher, Registry, Role,
    Sandbox, SandboxConfig, ServiceError, ToolCallRequest, ToolResult,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays canned replies and records every request it receives.
#[derive(Default)]
struct ScriptedService {
    replies: Mutex<VecDeque<Result<Completion, ServiceError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    fn new(replies: Vec<Result<Completion, ServiceError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ServiceError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::text("script exhausted")))
    }
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, args.to_string())
}

fn file_registry(root: &std::path::Path) -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register(Box::new(FileOperationTool::new(root))).unwrap();
    Arc::new(registry)
}

fn dispatcher(service: Arc<ScriptedService>, registry: Arc<Registry>, max_iterations: usize) -> Dispatcher {
    let config = DispatchConfig {
        max_iterations,
        ..DispatchConfig::default()
    };
    Dispatcher::new(service, registry, config)
}

#[tokio::test]
async fn write_then_finish_takes_two_iterations() {
    let dir = tempfile::tempdir().unwrap();
    let service = ScriptedService::new(vec![
        Ok(Completion::with_tool_calls(
            "Writing the file",
            vec![call(
                "call_a",
                "file-operation",
                serde_json::json!({"operation": "write", "filename": "a.txt", "content": "hi"}),
            )],
        )),
        Ok(Completion::text("All done")),
    ]);

    let result = dispatcher(service.clone(), file_registry(dir.path()), 10)
        .run("File Workflow", "write hi to a.txt")
        .await;

    assert!(result.success);
    assert!(!result.exhausted);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.answer(), Some("All done"));
    assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "hi");

    let tool_turns: Vec<_> = result.transcript.tool_turns().collect();
    assert_eq!(tool_turns.len(), 1);
    assert_eq!(tool_turns[0].tool_call_id.as_deref(), Some("call_a"));
    assert!(ToolResult::from_content(&tool_turns[0].content).unwrap().success);

    // The second request carries the assistant turn and the tool result.
    let requests = service.requests.lock().unwrap();
    assert_eq!(requests[1].turns.len(), 4);
    assert_eq!(requests[1].turns[2].role, Role::Assistant);
    assert_eq!(requests[1].turns[3].role, Role::Tool);
    assert_eq!(requests[1].tools.len(), 1);
}

#[tokio::test]
async fn no_tool_calls_finishes_in_one_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let service = ScriptedService::new(vec![Ok(Completion::text("Nothing to do"))]);

    let result = dispatcher(service.clone(), file_registry(dir.path()), 10)
        .run("Chat", "say hi")
        .await;

    assert!(result.success);
    assert_eq!(result.iterations, 1);
    assert_eq!(service.request_count(), 1);
    assert_eq!(result.transcript.tool_turns().count(), 0);
}

#[tokio::test]
async fn service_error_on_first_call_fails_run() {
    let dir = tempfile::tempdir().unwrap();
    let service = ScriptedService::new(vec![Err(ServiceError("rate limited".into()))]);

    let result = dispatcher(service, file_registry(dir.path()), 10)
        .run("Limited", "anything")
        .await;

    assert!(!result.success);
    assert_eq!(result.iterations, 1);
    assert_eq!(result.error.as_deref(), Some("rate limited"));
    assert_eq!(result.transcript.len(), 2);
    assert_eq!(result.transcript.turns()[0].role, Role::System);
    assert_eq!(result.transcript.turns()[1].role, Role::User);
}

#[tokio::test]
async fn service_error_mid_run_keeps_partial_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let service = ScriptedService::new(vec![
        Ok(Completion::with_tool_calls(
            "",
            vec![call("c1", "file-operation", serde_json::json!({"operation": "read", "filename": "x"}))],
        )),
        Err(ServiceError("upstream 502".into())),
    ]);

    let result = dispatcher(service, file_registry(dir.path()), 10)
        .run("Partial", "read x")
        .await;

    assert!(!result.success);
    assert_eq!(result.iterations, 2);
    assert_eq!(result.transcript.len(), 4);
}

#[tokio::test]
async fn unknown_tool_is_fed_back_and_loop_continues() {
    let dir = tempfile::tempdir().unwrap();
    let service = ScriptedService::new(vec![
        Ok(Completion::with_tool_calls(
            "",
            vec![call("c1", "launch_rocket", serde_json::json!({}))],
        )),
        Ok(Completion::text("Sorry, I cannot do that")),
    ]);

    let result = dispatcher(service, file_registry(dir.path()), 10)
        .run("Unknown", "launch")
        .await;

    assert!(result.success);
    assert_eq!(result.iterations, 2);
    let turn = result.transcript.tool_turns().next().unwrap();
    let tool_result = ToolResult::from_content(&turn.content).unwrap();
    assert!(!tool_result.success);
    assert!(!tool_result.error.unwrap().is_empty());
}

#[tokio::test]
async fn every_call_id_is_echoed_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let calls = vec![
        call("first", "file-operation", serde_json::json!({"operation": "create", "filename": "1.txt"})),
        call("second", "search-web", serde_json::json!({"query": "q"})),
        call("third", "file-operation", serde_json::json!({"operation": "read", "filename": "1.txt"})),
    ];
    let service = ScriptedService::new(vec![
        Ok(Completion::with_tool_calls("", calls)),
        Ok(Completion::text("done")),
    ]);

    let result = dispatcher(service, file_registry(dir.path()), 10)
        .run("Ids", "three calls")
        .await;

    let ids: Vec<_> = result
        .transcript
        .tool_turns()
        .map(|t| t.tool_call_id.clone().unwrap())
        .collect();
    assert_eq!(ids, vec!["first", "second", "third"]);

    let outcomes: Vec<bool> = result
        .transcript
        .tool_turns()
        .map(|t| ToolResult::from_content(&t.content).unwrap().success)
        .collect();
    assert_eq!(outcomes, vec![true, false, true]);
}

#[tokio::test]
async fn iteration_ceiling_stops_a_chatty_model() {
    let dir = tempfile::tempdir().unwrap();
    let replies = (0..10)
        .map(|i| {
            Ok(Completion::with_tool_calls(
                "",
                vec![call(
                    &format!("c{i}"),
                    "file-operation",
                    serde_json::json!({"operation": "write", "filename": "log.txt", "content": i.to_string()}),
                )],
            ))
        })
        .collect();
    let service = ScriptedService::new(replies);

    let result = dispatcher(service.clone(), file_registry(dir.path()), 3)
        .run("Chatty", "loop forever")
        .await;

    assert!(result.success);
    assert!(result.exhausted);
    assert_eq!(result.iterations, 3);
    assert_eq!(service.request_count(), 3);
    assert_eq!(result.transcript.tool_turns().count(), 3);
    assert_eq!(std::fs::read_to_string(dir.path().join("log.txt")).unwrap(), "2");
}

#[tokio::test]
async fn builtin_tools_are_declared_to_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let config = ToolsConfig {
        workspace_dir: dir.path().to_path_buf(),
        visualization_dir: dir.path().join("visualizations"),
        search_endpoint: None,
    };
    let sandbox = Arc::new(Sandbox::new(SandboxConfig::default()).unwrap());
    let registry = Arc::new(builtin_registry(&config, sandbox).unwrap());
    let service = ScriptedService::new(vec![
        Ok(Completion::with_tool_calls(
            "",
            vec![
                call("v", "visualize-data", serde_json::json!({"data": "a,b\n1,2\n2,3", "chart_type": "pie"})),
                call("x", "execute-code", serde_json::json!({"code": "print(1)"})),
            ],
        )),
        Ok(Completion::text("done")),
    ]);

    let result = dispatcher(service.clone(), registry, 10).run("Builtins", "chart it").await;

    assert!(result.success);
    let declared: Vec<String> = service.requests.lock().unwrap()[0]
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(declared.len(), 4);

    // Unsupported chart type and an unconfigured sandbox both come back as failures.
    for turn in result.transcript.tool_turns() {
        assert!(!ToolResult::from_content(&turn.content).unwrap().success);
    }
}
