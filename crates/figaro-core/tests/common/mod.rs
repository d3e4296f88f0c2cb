//! Shared test helpers: a scripted LLM bridge and bash mock tool servers.
#![allow(dead_code)] // each test binary uses a different subset

use figaro_mcp::{DockerTransport, McpClient, Peer, ToolRegistry};
use figaro_types::{
    ApiError, AssistantMessage, ContentBlock, LlmBridge, MessageRequest, StopReason, TurnHandle,
    Usage,
};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// One pre-scripted assistant turn.
pub struct ScriptedTurn {
    pub deltas: Vec<String>,
    pub message: AssistantMessage,
}

/// A text-only turn.
pub fn text_turn(id: &str, text: &str) -> ScriptedTurn {
    ScriptedTurn {
        deltas: vec![text.to_string()],
        message: AssistantMessage {
            id: id.to_string(),
            content: vec![ContentBlock::Text {
                text: text.to_string(),
            }],
            stop_reason: Some(StopReason::EndTurn),
            usage: Usage {
                input_tokens: 10,
                output_tokens: 5,
            },
        },
    }
}

/// A turn requesting one tool invocation.
pub fn tool_turn(id: &str, tool_use_id: &str, name: &str, input: serde_json::Value) -> ScriptedTurn {
    ScriptedTurn {
        deltas: vec![],
        message: AssistantMessage {
            id: id.to_string(),
            content: vec![ContentBlock::ToolUse {
                id: tool_use_id.to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: Some(StopReason::ToolUse),
            usage: Usage::default(),
        },
    }
}

/// A bridge that replays scripted turns and counts stream calls.
pub struct MockBridge {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    pub calls: AtomicUsize,
}

impl MockBridge {
    pub fn new(turns: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LlmBridge for MockBridge {
    fn stream(
        &self,
        _request: MessageRequest,
        _cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TurnHandle, ApiError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let turn = self.turns.lock().unwrap().pop_front();
        Box::pin(async move {
            let turn = turn.expect("mock bridge script exhausted");
            let (progress_tx, progress) = mpsc::channel(64);
            let (result_tx, result) = oneshot::channel();
            let (_error_tx, error) = oneshot::channel();
            tokio::spawn(async move {
                for delta in turn.deltas {
                    let _ = progress_tx.send(delta).await;
                }
                drop(progress_tx);
                let _ = result_tx.send(turn.message);
            });
            Ok(TurnHandle {
                progress,
                result,
                error,
            })
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// A bridge whose turn always fails through the error slot.
pub struct FailingBridge;

impl LlmBridge for FailingBridge {
    fn stream(
        &self,
        _request: MessageRequest,
        _cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TurnHandle, ApiError>> + Send + '_>> {
        Box::pin(async move {
            let (_progress_tx, progress) = mpsc::channel(1);
            let (_result_tx, result) = oneshot::channel::<AssistantMessage>();
            let (error_tx, error) = oneshot::channel();
            let _ = error_tx.send(ApiError::Server {
                status: 500,
                message: "boom".to_string(),
            });
            Ok(TurnHandle {
                progress,
                result,
                error,
            })
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// A bridge that stays silent until cancelled, then reports the abort.
pub struct StuckBridge;

impl LlmBridge for StuckBridge {
    fn stream(
        &self,
        _request: MessageRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TurnHandle, ApiError>> + Send + '_>> {
        Box::pin(async move {
            let (progress_tx, progress) = mpsc::channel::<String>(1);
            let (_result_tx, result) = oneshot::channel();
            let (error_tx, error) = oneshot::channel();
            tokio::spawn(async move {
                cancel.cancelled().await;
                let _ = error_tx.send(ApiError::Cancelled);
                drop(progress_tx);
            });
            Ok(TurnHandle {
                progress,
                result,
                error,
            })
        })
    }

    fn name(&self) -> &str {
        "stuck"
    }
}

/// A live mock MCP server connection, kept alive for the test's duration.
pub struct MockServer {
    pub client: Arc<McpClient>,
    peer: Arc<Peer>,
    transport: DockerTransport,
}

impl MockServer {
    pub async fn teardown(self) {
        self.peer.shutdown().await;
        self.transport.shutdown().await;
    }
}

/// Bash mock MCP server advertising one `echo` tool; `tools/call` answers
/// with the given result payload.
pub fn echo_server_script(call_result: &str) -> String {
    let extract =
        r#"id=$(printf '%s' "$line" | grep -o '"id":[0-9]*' | head -n 1 | cut -d: -f2)"#;
    format!(
        r#"while IFS= read -r line; do
  case "$line" in
    *'"method":"initialize"'*)
      {extract}
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"protocolVersion":"2025-06-18","capabilities":{{}},"serverInfo":{{"name":"mock","version":"0"}}}}}}\n' "$id"
      ;;
    *'"method":"notifications/initialized"'*)
      ;;
    *'"method":"tools/list"'*)
      {extract}
      printf '{{"jsonrpc":"2.0","id":%s,"result":{{"tools":[{{"name":"echo","description":"Echo text back","inputSchema":{{"type":"object","properties":{{"text":{{"type":"string"}}}},"required":["text"]}}}}]}}}}\n' "$id"
      ;;
    *'"method":"tools/call"'*)
      {extract}
      printf '{{"jsonrpc":"2.0","id":%s,"result":{call_result}}}\n' "$id"
      ;;
  esac
done"#
    )
}

/// Launch a bash script as a connected MCP server. `None` when bash is
/// unavailable; callers skip the test.
pub async fn connect_mock_server(script: &str) -> Option<MockServer> {
    let mut cmd = Command::new("bash");
    cmd.arg("-c").arg(script);
    let cancel = CancellationToken::new();
    let mut transport = DockerTransport::launch("mock", cmd, cancel.clone()).ok()?;
    let (writer, reader) = transport.take_io()?;
    let peer = Arc::new(Peer::spawn("mock", writer, reader, cancel));
    let client = McpClient::initialize("mock".to_string(), Arc::clone(&peer))
        .await
        .expect("handshake should succeed");
    Some(MockServer {
        client: Arc::new(client),
        peer,
        transport,
    })
}

/// Registry over a set of live mock servers.
pub fn registry_of(servers: &[&MockServer]) -> Arc<ToolRegistry> {
    let clients: Vec<Arc<McpClient>> = servers
        .iter()
        .map(|server| Arc::clone(&server.client))
        .collect();
    Arc::new(ToolRegistry::build(&clients))
}
