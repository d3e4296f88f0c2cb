//! `LlmBridge` implementation over the Anthropic Messages API.

use crate::client::ApiClient;
use crate::turn;
use figaro_types::{ApiError, LlmBridge, MessageRequest, TurnHandle};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Streams assistant turns from the Anthropic API.
#[derive(Clone)]
pub struct AnthropicBridge {
    client: ApiClient,
}

impl AnthropicBridge {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ApiError> {
        Ok(Self {
            client: ApiClient::new(api_key, base_url)?,
        })
    }
}

impl LlmBridge for AnthropicBridge {
    fn stream(
        &self,
        mut request: MessageRequest,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<TurnHandle, ApiError>> + Send + '_>> {
        Box::pin(async move {
            request.stream = true;
            let events = self.client.stream_message(&request).await?;
            Ok(turn::spawn_turn(events, cancel))
        })
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
