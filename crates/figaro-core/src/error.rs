//! Top-level error type for the agent runtime.

use figaro_mcp::McpError;
use figaro_types::{ApiError, ConfigError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FigaroError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("tool server error: {0}")]
    Mcp(#[from] McpError),

    #[error("LLM error: {0}")]
    Api(#[from] ApiError),

    #[error("no server for tool {name}")]
    UnknownTool { name: String },

    #[error("maximum iteration count was exhausted")]
    IterationBound,

    #[error("request timed out after {seconds}s")]
    RequestTimeout { seconds: u64 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FigaroError {
    /// Cancellation exits cleanly; everything else is a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FigaroError::Cancelled)
    }
}
