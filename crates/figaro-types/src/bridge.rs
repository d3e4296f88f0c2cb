//! The LLM bridge interface consumed by the agent loop.

use crate::error::ApiError;
use crate::message::{ContentBlock, MessageRequest, StopReason, Usage};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// A fully assembled assistant turn, delivered once the stream completes.
#[derive(Debug, Clone)]
pub struct AssistantMessage {
    pub id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

impl AssistantMessage {
    /// The tool-use blocks of this turn, in stream order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }
}

/// Handle over one streamed assistant turn.
///
/// `progress` yields text deltas as they arrive and closes when the turn is
/// over; exactly one of `result` or `error` then resolves. None of the
/// channels is restartable.
pub struct TurnHandle {
    pub progress: mpsc::Receiver<String>,
    pub result: oneshot::Receiver<AssistantMessage>,
    pub error: oneshot::Receiver<ApiError>,
}

/// An LLM provider able to stream one assistant turn at a time.
///
/// Dyn-compatible so the agent loop works with `Arc<dyn LlmBridge>`;
/// new vendors add an implementation rather than touching the loop.
pub trait LlmBridge: Send + Sync {
    /// Start streaming a turn. Cancelling the token aborts the underlying
    /// HTTP stream and completes the handle's `error` slot.
    fn stream(
        &self,
        request: MessageRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TurnHandle, ApiError>> + Send + '_>>;

    /// Vendor name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bridge_is_dyn_compatible() {
        fn _accept(_bridge: &dyn LlmBridge) {}
        fn _assert_send_sync<T: Send + Sync>() {}
        _assert_send_sync::<Arc<dyn LlmBridge>>();
    }

    #[test]
    fn tool_uses_preserve_order() {
        let message = AssistantMessage {
            id: "msg_1".to_string(),
            content: vec![
                ContentBlock::Text {
                    text: "calling".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "u1".to_string(),
                    name: "echo".to_string(),
                    input: serde_json::json!({}),
                },
                ContentBlock::ToolUse {
                    id: "u2".to_string(),
                    name: "read".to_string(),
                    input: serde_json::json!({}),
                },
            ],
            stop_reason: Some(StopReason::ToolUse),
            usage: Usage::default(),
        };
        let ids: Vec<&str> = message.tool_uses().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec!["u1", "u2"]);
    }
}
