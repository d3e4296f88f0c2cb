//! Error types for the MCP stack.

use thiserror::Error;

/// Errors from tool-server communication.
#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn tool server '{name}': {source}")]
    SpawnFailed {
        name: String,
        source: std::io::Error,
    },

    #[error("connection to tool server closed")]
    ConnectionClosed,

    #[error("tool server '{name}' exited: {detail}")]
    ServerExited { name: String, detail: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("JSON-RPC error from '{server}' (code {code}): {message}")]
    JsonRpc {
        server: String,
        code: i64,
        message: String,
    },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("'{server}' timed out during {operation} after {seconds}s")]
    Timeout {
        server: String,
        operation: String,
        seconds: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Whether this error means the server connection itself is unsound,
    /// as opposed to a single request going wrong.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            McpError::SpawnFailed { .. }
                | McpError::ConnectionClosed
                | McpError::ServerExited { .. }
                | McpError::Cancelled
                | McpError::Protocol(_)
                | McpError::Io(_)
        )
    }
}
