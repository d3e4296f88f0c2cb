//! Events published for the UI collaborator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    MessageStarted,
    MessagePart,
    MessageEnded,
}

/// One entry on the outbound event bus. The UI never sees agent-loop
/// internals, only these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub task_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl Event {
    pub fn new(event_type: EventType, task_id: impl Into<String>) -> Self {
        Self {
            event_type,
            task_id: task_id.into(),
            message_id: String::new(),
            data: None,
            metadata: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(
            serde_json::to_value(EventType::MessageStarted).unwrap(),
            "message_started"
        );
        assert_eq!(
            serde_json::to_value(EventType::TaskFailed).unwrap(),
            "task_failed"
        );
    }

    #[test]
    fn event_serializes_sparsely() {
        let event = Event::new(EventType::MessagePart, "t1").with_data("hello");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message_part");
        assert_eq!(json["task_id"], "t1");
        assert_eq!(json["data"], "hello");
        assert!(json.get("metadata").is_none());
    }

    #[test]
    fn metadata_accumulates() {
        let event = Event::new(EventType::MessageEnded, "t1")
            .with_message_id("msg_1")
            .with_metadata("output_tokens", serde_json::json!(5))
            .with_metadata("input_tokens", serde_json::json!(12));
        let meta = event.metadata.unwrap();
        assert_eq!(meta.len(), 2);
        assert_eq!(meta["output_tokens"], 5);
    }
}
