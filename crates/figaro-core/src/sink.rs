//! Conversation persistence.
//!
//! The agent loop hands the whole conversation to a caller-supplied sink
//! after each iteration; a failing sink is logged, never fatal.

use figaro_types::Message;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Receives the serialized conversation after each agent-loop iteration.
pub trait ConversationSink: Send + Sync {
    fn persist<'a>(
        &'a self,
        conversation: &'a [Message],
    ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>>;
}

/// Writes the conversation as JSON to a file, atomically (tmp then rename).
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ConversationSink for FileSink {
    fn persist<'a>(
        &'a self,
        conversation: &'a [Message],
    ) -> Pin<Box<dyn Future<Output = std::io::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let json = serde_json::to_vec(conversation)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let tmp = self.path.with_extension("tmp");
            tokio::fs::write(&tmp, json).await?;
            tokio::fs::rename(&tmp, &self.path).await
        })
    }
}
