//! MCP (Model Context Protocol) client stack for Figaro.
//!
//! Each configured tool server is launched as a container child process
//! ([`transport`]), spoken to over newline-delimited JSON-RPC 2.0
//! ([`jsonrpc`], [`peer`]), initialized with the MCP handshake ([`client`]),
//! and its tools aggregated for lookup ([`registry`]).

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod peer;
pub mod registry;
pub mod transport;

pub use client::{McpClient, ToolDescriptor, ToolOutcome};
pub use config::{ContainerDefinition, ServerRegistry};
pub use error::McpError;
pub use peer::Peer;
pub use registry::ToolRegistry;
pub use transport::DockerTransport;
