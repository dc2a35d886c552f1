//! Provider trait

use std::sync::Arc;

use async_trait::async_trait;
use netops_core::{CancellationToken, ChatMessage, Result};

/// Something that turns a conversation into the assistant's next reply.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Generate one reply to `history` (oldest first).
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String>;
}

/// Shared provider for dynamic dispatch
pub type BoxedProvider = Arc<dyn LlmProvider>;
