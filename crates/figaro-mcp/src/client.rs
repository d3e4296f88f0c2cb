//! MCP client: handshake, tool discovery, tool invocation.

use crate::error::McpError;
use crate::peer::Peer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// MCP protocol version this host speaks.
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Bound on the initialize / initialized / tools-list handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// A tool advertised by a server, as carried on the MCP wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: serde_json::Value,
}

fn default_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl From<&ToolDescriptor> for figaro_types::ToolDefinition {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema.clone(),
        }
    }
}

/// Outcome of one `tools/call`: stringified content plus the server's
/// error marker. An `is_error` outcome is *not* an `Err` — the agent loop
/// feeds it back to the model as text.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub text: String,
    pub is_error: bool,
}

/// Client for one MCP server connection.
pub struct McpClient {
    server_name: String,
    peer: Arc<Peer>,
    protocol_version: String,
    tools: Vec<ToolDescriptor>,
}

#[derive(Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: Option<String>,
}

#[derive(Deserialize)]
struct ToolsListResult {
    // A null or absent list means no tools; some servers answer that way.
    #[serde(default)]
    tools: Option<Vec<ToolDescriptor>>,
}

impl McpClient {
    /// Run the MCP handshake over an established peer and cache the
    /// server's tool catalogue. Bounded by a 30 s timeout.
    pub async fn initialize(server_name: String, peer: Arc<Peer>) -> Result<Self, McpError> {
        match tokio::time::timeout(HANDSHAKE_TIMEOUT, Self::handshake(server_name.clone(), peer))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout {
                server: server_name,
                operation: "initialize".to_string(),
                seconds: HANDSHAKE_TIMEOUT.as_secs(),
            }),
        }
    }

    async fn handshake(server_name: String, peer: Arc<Peer>) -> Result<Self, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "figaro",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let response = peer.call("initialize", Some(params)).await?;
        let result = expect_result(&server_name, "initialize", response)?;

        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad initialize response: {e}")))?;
        let protocol_version = init.protocol_version.ok_or_else(|| {
            McpError::Protocol(format!(
                "server '{server_name}' reported no protocol version"
            ))
        })?;
        if protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                "server '{server_name}' speaks protocol {protocol_version}, \
                 host speaks {PROTOCOL_VERSION}"
            );
        }

        peer.notify("notifications/initialized", None).await?;

        let response = peer.call("tools/list", None).await?;
        let result = expect_result(&server_name, "tools/list", response)?;
        let list: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad tools/list response: {e}")))?;
        let tools = list.tools.unwrap_or_default();

        tracing::info!("server '{server_name}' connected with {} tools", tools.len());

        Ok(Self {
            server_name,
            peer,
            protocol_version,
            tools,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn protocol_version(&self) -> &str {
        &self.protocol_version
    }

    /// The cached tool catalogue from initialize time.
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn contains_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|tool| tool.name == name)
    }

    /// Invoke a tool on this server.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolOutcome, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let response = self.peer.call("tools/call", Some(params)).await?;
        let result = expect_result(&self.server_name, "tools/call", response)?;

        #[derive(Deserialize)]
        struct CallResult {
            #[serde(default)]
            content: Vec<serde_json::Value>,
            #[serde(default, rename = "isError")]
            is_error: bool,
        }

        let call: CallResult = serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("bad tools/call result: {e}")))?;

        Ok(ToolOutcome {
            text: stringify_content(&call.content),
            is_error: call.is_error,
        })
    }
}

/// Unwrap a response's result, mapping a JSON-RPC error object to an error.
fn expect_result(
    server_name: &str,
    method: &str,
    response: crate::jsonrpc::JsonRpcResponse,
) -> Result<serde_json::Value, McpError> {
    if let Some(error) = response.error {
        return Err(McpError::JsonRpc {
            server: server_name.to_string(),
            code: error.code,
            message: error.message,
        });
    }
    response.result.ok_or_else(|| {
        McpError::Protocol(format!(
            "{method} response from '{server_name}' has neither result nor error"
        ))
    })
}

/// Flatten result content into one string: text entries verbatim, anything
/// else JSON-encoded.
fn stringify_content(content: &[serde_json::Value]) -> String {
    content
        .iter()
        .map(|entry| {
            match entry
                .get("type")
                .and_then(|t| t.as_str())
                .zip(entry.get("text").and_then(|t| t.as_str()))
            {
                Some(("text", text)) => text.to_string(),
                _ => entry.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_tool_descriptor() {
        let json = r#"{
            "name": "echo",
            "description": "Echo text back",
            "inputSchema": {
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }
        }"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "echo");
        assert_eq!(tool.input_schema["required"][0], "text");
    }

    #[test]
    fn descriptor_defaults_for_sparse_servers() {
        let tool: ToolDescriptor = serde_json::from_str(r#"{"name": "list"}"#).unwrap();
        assert!(tool.description.is_empty());
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn null_tools_means_empty_catalogue() {
        let list: ToolsListResult = serde_json::from_str(r#"{"tools": null}"#).unwrap();
        assert!(list.tools.unwrap_or_default().is_empty());
        let list: ToolsListResult = serde_json::from_str(r#"{}"#).unwrap();
        assert!(list.tools.unwrap_or_default().is_empty());
    }

    #[test]
    fn stringify_joins_text_blocks() {
        let content = vec![
            serde_json::json!({"type": "text", "text": "line one"}),
            serde_json::json!({"type": "text", "text": "line two"}),
        ];
        assert_eq!(stringify_content(&content), "line one\nline two");
    }

    #[test]
    fn stringify_encodes_non_text_entries() {
        let content = vec![serde_json::json!({"type": "image", "data": "ZmFrZQ=="})];
        let text = stringify_content(&content);
        assert!(text.contains("\"type\":\"image\""));
    }

    #[test]
    fn descriptor_maps_to_definition_unchanged() {
        let tool = ToolDescriptor {
            name: "echo".to_string(),
            description: "Echo".to_string(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let definition = figaro_types::ToolDefinition::from(&tool);
        assert_eq!(definition.name, "echo");
        assert_eq!(definition.input_schema, tool.input_schema);
    }
}
