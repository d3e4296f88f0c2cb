//! Typed event stream over the raw SSE response.

use crate::sse::SseScanner;
use figaro_types::{
    ApiError, ApiErrorBody, ContentBlock, ContentDelta, MessageDelta, MessageEnvelope,
    StreamEvent, Usage,
};
use futures_core::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// An async stream of typed [`StreamEvent`]s decoded from an HTTP
    /// byte stream.
    pub struct MessageStream {
        #[pin]
        inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
        scanner: SseScanner,
        ready: VecDeque<Result<StreamEvent, ApiError>>,
        done: bool,
    }
}

impl MessageStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            scanner: SseScanner::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl Stream for MessageStream {
    type Item = Result<StreamEvent, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.ready.pop_front() {
                return Poll::Ready(Some(item));
            }
            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    for sse in this.scanner.feed(&bytes) {
                        match decode_event(sse.event.as_deref(), &sse.data) {
                            Ok(Some(event)) => this.ready.push_back(Ok(event)),
                            Ok(None) => {}
                            Err(e) => this.ready.push_back(Err(e)),
                        }
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    *this.done = true;
                    this.ready.push_back(Err(ApiError::Network(e.to_string())));
                }
                Poll::Ready(None) => *this.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Wire shape of the SSE data payloads; each carries its own `type` tag.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: MessageEnvelope,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        usage: Option<Usage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
}

impl From<WireEvent> for StreamEvent {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::MessageStart { message } => StreamEvent::MessageStart { message },
            WireEvent::ContentBlockStart {
                index,
                content_block,
            } => StreamEvent::ContentBlockStart {
                index,
                content_block,
            },
            WireEvent::ContentBlockDelta { index, delta } => {
                StreamEvent::ContentBlockDelta { index, delta }
            }
            WireEvent::ContentBlockStop { index } => StreamEvent::ContentBlockStop { index },
            WireEvent::MessageDelta { delta, usage } => StreamEvent::MessageDelta { delta, usage },
            WireEvent::MessageStop => StreamEvent::MessageStop,
            WireEvent::Ping => StreamEvent::Ping,
            WireEvent::Error { error } => StreamEvent::Error { error },
        }
    }
}

const KNOWN_EVENTS: &[&str] = &[
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
    "ping",
    "error",
];

/// Decode one SSE event into a typed stream event. Unknown event names are
/// skipped so newer API revisions don't break the stream.
fn decode_event(name: Option<&str>, data: &str) -> Result<Option<StreamEvent>, ApiError> {
    let Some(name) = name else {
        return Ok(None);
    };
    if !KNOWN_EVENTS.contains(&name) {
        tracing::debug!("skipping unknown SSE event type: {name}");
        return Ok(None);
    }
    let wire: WireEvent = serde_json::from_str(data)
        .map_err(|e| ApiError::StreamParse(format!("{name}: {e}")))?;
    Ok(Some(wire.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_message_start() {
        let data = r#"{"type":"message_start","message":{"id":"msg_1","role":"assistant","content":[],"stop_reason":null,"usage":{"input_tokens":10,"output_tokens":0}}}"#;
        let event = decode_event(Some("message_start"), data).unwrap().unwrap();
        match event {
            StreamEvent::MessageStart { message } => {
                assert_eq!(message.id, "msg_1");
                assert_eq!(message.usage.input_tokens, 10);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_text_delta() {
        let data = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        let event = decode_event(Some("content_block_delta"), data)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::ContentBlockDelta {
                index,
                delta: ContentDelta::TextDelta { text },
            } => {
                assert_eq!(index, 0);
                assert_eq!(text, "Hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_tool_use_block_start() {
        let data = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"u1","name":"echo","input":{}}}"#;
        let event = decode_event(Some("content_block_start"), data)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::ContentBlockStart {
                content_block: ContentBlock::ToolUse { id, name, .. },
                ..
            } => {
                assert_eq!(id, "u1");
                assert_eq!(name, "echo");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_message_delta_with_stop_reason() {
        let data = r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":7}}"#;
        let event = decode_event(Some("message_delta"), data).unwrap().unwrap();
        match event {
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(delta.stop_reason, Some(figaro_types::StopReason::ToolUse));
                assert_eq!(usage.unwrap().output_tokens, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decode_error_event() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#;
        let event = decode_event(Some("error"), data).unwrap().unwrap();
        match event {
            StreamEvent::Error { error } => {
                assert_eq!(error.error_type, "overloaded_error");
                assert_eq!(error.message, "busy");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_event_is_skipped() {
        let decoded = decode_event(Some("content_block_shimmer"), "{}").unwrap();
        assert!(decoded.is_none());
        assert!(decode_event(None, "{}").unwrap().is_none());
    }

    #[test]
    fn garbage_data_is_a_parse_error() {
        let result = decode_event(Some("message_start"), "{nope");
        assert!(matches!(result, Err(ApiError::StreamParse(_))));
    }
}
