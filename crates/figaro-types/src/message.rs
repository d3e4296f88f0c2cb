//! Conversation and Messages API wire types.

use serde::{Deserialize, Serialize};

/// Role of a conversation participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// A user turn containing a single text block.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// A block of content within a turn.
///
/// The `type` tag matches the Anthropic wire format, so the same types
/// serve both the API request body and conversation persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

/// A tool made available to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A streaming request to the Messages API. Model-agnostic: any bridge
/// implementation maps these fields onto its vendor's request shape.
#[derive(Debug, Clone, Serialize)]
pub struct MessageRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    pub stream: bool,
}

/// The message envelope carried by a `message_start` stream event.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageEnvelope {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub usage: Usage,
}

/// Typed events decoded from the vendor's SSE stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
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

/// A delta within one content block.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
}

/// Message-level delta (carries the stop reason).
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDelta {
    pub stop_reason: Option<StopReason>,
}

/// Error payload embedded in an SSE `error` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_blocks_tagged_by_type() {
        let blocks = vec![
            ContentBlock::Text {
                text: "hi".to_string(),
            },
            ContentBlock::ToolUse {
                id: "u1".to_string(),
                name: "echo".to_string(),
                input: serde_json::json!({"text": "foo"}),
            },
            ContentBlock::ToolResult {
                tool_use_id: "u1".to_string(),
                content: "foo".to_string(),
            },
        ];
        let json = serde_json::to_value(&blocks).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[1]["type"], "tool_use");
        assert_eq!(json[1]["input"]["text"], "foo");
        assert_eq!(json[2]["type"], "tool_result");
        assert_eq!(json[2]["tool_use_id"], "u1");
    }

    #[test]
    fn conversation_roundtrip() {
        let conversation = vec![
            Message::user_text("echo foo"),
            Message {
                role: Role::Assistant,
                content: vec![ContentBlock::ToolUse {
                    id: "u1".to_string(),
                    name: "echo".to_string(),
                    input: serde_json::json!({"text": "foo"}),
                }],
            },
            Message {
                role: Role::User,
                content: vec![ContentBlock::ToolResult {
                    tool_use_id: "u1".to_string(),
                    content: "foo".to_string(),
                }],
            },
        ];
        let json = serde_json::to_string(&conversation).unwrap();
        let reloaded: Vec<Message> = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded.len(), 3);
        for (a, b) in conversation.iter().zip(&reloaded) {
            assert_eq!(a.role, b.role);
            assert_eq!(a.content, b.content);
        }
    }

    #[test]
    fn request_omits_empty_tools() {
        let req = MessageRequest {
            model: "test-model".to_string(),
            max_tokens: 1024,
            messages: vec![Message::user_text("hi")],
            tools: vec![],
            stream: true,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("tools").is_none());
        assert_eq!(json["stream"], true);
    }

    #[test]
    fn stop_reason_wire_names() {
        let json = serde_json::to_value(StopReason::ToolUse).unwrap();
        assert_eq!(json, "tool_use");
        let parsed: StopReason = serde_json::from_str("\"end_turn\"").unwrap();
        assert_eq!(parsed, StopReason::EndTurn);
    }

    #[test]
    fn envelope_tolerates_missing_usage() {
        let json = r#"{"id":"msg_1","role":"assistant","content":[],"stop_reason":null}"#;
        let env: MessageEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.id, "msg_1");
        assert_eq!(env.usage.input_tokens, 0);
    }
}
