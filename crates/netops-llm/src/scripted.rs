//! Scripted provider for tests
//!
//! Replies are returned in the order they were queued; every call is
//! recorded so tests can inspect what the assistant was shown.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use netops_core::{ensure_active, CancellationToken, ChatMessage, EngineError, Result};

use crate::provider::LlmProvider;

/// What one `generate` call received
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub system_instruction: String,
    pub history: Vec<ChatMessage>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Result<String>>,
    calls: Vec<ProviderCall>,
}

#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn reply(&self, text: impl Into<String>) {
        self.script().replies.push_back(Ok(text.into()));
    }

    pub fn fail(&self, message: impl Into<String>) {
        self.script()
            .replies
            .push_back(Err(EngineError::assistant(message.into())));
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.script().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.script().calls.len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String> {
        ensure_active(cancel)?;
        let mut script = self.script();
        script.calls.push(ProviderCall {
            system_instruction: system_instruction.to_string(),
            history: history.to_vec(),
        });
        script
            .replies
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::assistant("no scripted reply left")))
    }
}
