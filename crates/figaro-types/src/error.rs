//! Error types shared across the workspace.

use thiserror::Error;

/// Errors from the LLM streaming API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed: {message}")]
    Auth { message: String },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("server overloaded")]
    Overloaded,

    #[error("server error: {status} {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("stream parse error: {0}")]
    StreamParse(String),

    #[error("stream error: {error_type}: {message}")]
    Stream { error_type: String, message: String },

    #[error("stream ended without a terminal message")]
    StreamTruncated,

    #[error("request cancelled")]
    Cancelled,
}

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("missing required configuration: {key}")]
    MissingKey { key: String },
}
