//! The agent loop: stream a turn, dispatch tool uses, feed results back,
//! repeat until the model stops asking for tools.

use crate::error::FigaroError;
use crate::sink::ConversationSink;
use figaro_mcp::{ToolOutcome, ToolRegistry};
use figaro_types::{
    AssistantMessage, ContentBlock, Event, EventType, LlmBridge, Message, MessageRequest, Role,
    StopReason,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Upper bound on stream → tool → restream cycles for one request.
pub const MAX_ITERATIONS: usize = 10;

/// Drives one conversation against the LLM bridge and the tool registry.
pub struct Agent {
    bridge: Arc<dyn LlmBridge>,
    registry: Arc<ToolRegistry>,
    events: mpsc::UnboundedSender<Event>,
    model: String,
    max_tokens: u32,
    sink: Option<Arc<dyn ConversationSink>>,
}

impl Agent {
    pub fn new(
        bridge: Arc<dyn LlmBridge>,
        registry: Arc<ToolRegistry>,
        events: mpsc::UnboundedSender<Event>,
        model: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            bridge,
            registry,
            events,
            model,
            max_tokens,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ConversationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run one user request to completion and return the conversation.
    ///
    /// Tool invocation failures are folded into `tool_result` text so the
    /// model can react; a dead connection or an unknown tool is fatal.
    pub async fn run(
        &self,
        task_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<Message>, FigaroError> {
        let mut conversation = vec![Message::user_text(text)];

        for _iteration in 0..MAX_ITERATIONS {
            let message = self
                .stream_turn(task_id, &mut conversation, &cancel)
                .await?;

            let wants_tools = message.stop_reason == Some(StopReason::ToolUse)
                && message.tool_uses().next().is_some();
            if !wants_tools {
                self.persist(&conversation).await;
                return Ok(conversation);
            }

            let results = self.dispatch_tools(&message).await?;
            conversation.push(Message {
                role: Role::User,
                content: results,
            });
            self.persist(&conversation).await;
        }

        Err(FigaroError::IterationBound)
    }

    /// Stream one assistant turn, forwarding deltas to the event bus
    /// verbatim, and append the assembled turn to the conversation.
    async fn stream_turn(
        &self,
        task_id: &str,
        conversation: &mut Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<AssistantMessage, FigaroError> {
        let request = MessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: conversation.clone(),
            tools: self.registry.definitions(),
            stream: true,
        };

        let mut handle = self
            .bridge
            .stream(request, cancel.child_token())
            .await
            .map_err(map_api)?;

        let mut started = false;
        while let Some(delta) = handle.progress.recv().await {
            let event_type = if started {
                EventType::MessagePart
            } else {
                started = true;
                EventType::MessageStarted
            };
            let _ = self
                .events
                .send(Event::new(event_type, task_id).with_data(delta));
        }

        // Progress is closed: exactly one of result or error resolves. The
        // bridge completes result before releasing error, so awaiting
        // result first cannot race.
        let message = match handle.result.await {
            Ok(message) => message,
            Err(_) => {
                let cause = handle
                    .error
                    .await
                    .unwrap_or(figaro_types::ApiError::StreamTruncated);
                return Err(map_api(cause));
            }
        };

        let _ = self.events.send(
            Event::new(EventType::MessageEnded, task_id)
                .with_message_id(message.id.as_str())
                .with_metadata(
                    "input_tokens",
                    serde_json::json!(message.usage.input_tokens),
                )
                .with_metadata(
                    "output_tokens",
                    serde_json::json!(message.usage.output_tokens),
                ),
        );

        conversation.push(Message {
            role: Role::Assistant,
            content: message.content.clone(),
        });
        Ok(message)
    }

    /// Dispatch every tool-use block sequentially, in stream order.
    async fn dispatch_tools(
        &self,
        message: &AssistantMessage,
    ) -> Result<Vec<ContentBlock>, FigaroError> {
        let mut results = Vec::new();

        for (id, name, input) in message.tool_uses() {
            let client = self
                .registry
                .client_for(name)
                .ok_or_else(|| FigaroError::UnknownTool {
                    name: name.to_string(),
                })?;

            let outcome = match input.as_object() {
                Some(arguments) => {
                    match client.call_tool(name, arguments.clone()).await {
                        Ok(outcome) => outcome,
                        Err(e) if e.is_fatal() => return Err(e.into()),
                        // Invocation-level failure: hand the message back to
                        // the model instead of killing the session.
                        Err(e) => ToolOutcome {
                            text: e.to_string(),
                            is_error: true,
                        },
                    }
                }
                None => ToolOutcome {
                    text: format!("tool arguments for '{name}' are not a JSON object"),
                    is_error: true,
                },
            };

            if outcome.is_error {
                tracing::warn!("tool '{name}' returned an error: {}", outcome.text);
            }
            results.push(ContentBlock::ToolResult {
                tool_use_id: id.to_string(),
                content: outcome.text,
            });
        }

        Ok(results)
    }

    async fn persist(&self, conversation: &[Message]) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.persist(conversation).await {
                tracing::warn!("failed to persist conversation: {e}");
            }
        }
    }
}

fn map_api(error: figaro_types::ApiError) -> FigaroError {
    match error {
        figaro_types::ApiError::Cancelled => FigaroError::Cancelled,
        other => FigaroError::Api(other),
    }
}
