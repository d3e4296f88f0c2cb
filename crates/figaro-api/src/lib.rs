//! Anthropic Messages API bridge with SSE streaming for Figaro.

mod bridge;
mod client;
mod sse;
mod stream;
mod turn;

pub use bridge::AnthropicBridge;
pub use client::ApiClient;
pub use stream::MessageStream;
