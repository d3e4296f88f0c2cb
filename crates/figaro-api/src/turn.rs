//! Turn assembly: fold a typed event stream into one assistant message.

use figaro_types::{
    ApiError, AssistantMessage, ContentBlock, ContentDelta, StreamEvent, TurnHandle, Usage,
};
use futures_core::Stream;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const PROGRESS_QUEUE: usize = 64;

/// Drive a stream of events in a background task, forwarding text deltas as
/// progress and completing the handle with the assembled message or the
/// first error.
pub(crate) fn spawn_turn<S>(stream: S, cancel: CancellationToken) -> TurnHandle
where
    S: Stream<Item = Result<StreamEvent, ApiError>> + Send + 'static,
{
    let (progress_tx, progress) = mpsc::channel(PROGRESS_QUEUE);
    let (result_tx, result) = oneshot::channel();
    let (error_tx, error) = oneshot::channel();

    tokio::spawn(async move {
        match assemble(stream, progress_tx, cancel).await {
            Ok(message) => {
                let _ = result_tx.send(message);
            }
            Err(e) => {
                let _ = error_tx.send(e);
            }
        }
    });

    TurnHandle {
        progress,
        result,
        error,
    }
}

async fn assemble<S>(
    stream: S,
    progress: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> Result<AssistantMessage, ApiError>
where
    S: Stream<Item = Result<StreamEvent, ApiError>> + Send + 'static,
{
    tokio::pin!(stream);

    let mut message_id = String::new();
    let mut usage = Usage::default();
    let mut stop_reason = None;
    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut text_buf = String::new();
    // (id, name, accumulated input json) of the tool-use block in flight
    let mut tool_buf: Option<(String, String, String)> = None;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
            next = stream.next() => next,
        };
        let Some(event) = next else { break };

        match event? {
            StreamEvent::MessageStart { message } => {
                message_id = message.id;
                usage.add(&message.usage);
            }
            StreamEvent::ContentBlockStart { content_block, .. } => match content_block {
                ContentBlock::Text { text } => text_buf = text,
                ContentBlock::ToolUse { id, name, .. } => {
                    tool_buf = Some((id, name, String::new()));
                }
                ContentBlock::ToolResult { .. } => {
                    // The model never emits tool results.
                }
            },
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                ContentDelta::TextDelta { text } => {
                    let _ = progress.send(text.clone()).await;
                    text_buf.push_str(&text);
                }
                ContentDelta::InputJsonDelta { partial_json } => {
                    if let Some((_, _, json)) = tool_buf.as_mut() {
                        json.push_str(&partial_json);
                    }
                }
            },
            StreamEvent::ContentBlockStop { .. } => {
                if !text_buf.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: std::mem::take(&mut text_buf),
                    });
                }
                if let Some((id, name, json)) = tool_buf.take() {
                    let input = if json.is_empty() {
                        serde_json::json!({})
                    } else {
                        // Keep unparseable input as-is; the agent loop turns
                        // a non-object into a tool error the model can see.
                        serde_json::from_str(&json)
                            .unwrap_or(serde_json::Value::String(json))
                    };
                    blocks.push(ContentBlock::ToolUse { id, name, input });
                }
            }
            StreamEvent::MessageDelta {
                delta,
                usage: delta_usage,
            } => {
                if delta.stop_reason.is_some() {
                    stop_reason = delta.stop_reason;
                }
                if let Some(u) = delta_usage {
                    usage.add(&u);
                }
            }
            StreamEvent::MessageStop => break,
            StreamEvent::Ping => {}
            StreamEvent::Error { error } => {
                return Err(ApiError::Stream {
                    error_type: error.error_type,
                    message: error.message,
                });
            }
        }
    }

    if message_id.is_empty() && blocks.is_empty() {
        return Err(ApiError::StreamTruncated);
    }

    Ok(AssistantMessage {
        id: message_id,
        content: blocks,
        stop_reason,
        usage,
    })
}
