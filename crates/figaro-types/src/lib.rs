//! Shared types and error hierarchy for Figaro.

pub mod bridge;
pub mod error;
pub mod event;
pub mod message;

pub use bridge::{AssistantMessage, LlmBridge, TurnHandle};
pub use error::{ApiError, ConfigError};
pub use event::{Event, EventType};
pub use message::*;
