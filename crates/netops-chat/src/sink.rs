//! Message sink
//!
//! The engine hands every message it produces (operator input, assistant
//! replies, status notices) to a sink, which renders and persists it. How
//! that happens is up to the front-end.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use netops_core::{ChatMessage, NoticeLevel, Result};

#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: &ChatMessage) -> Result<()>;
}

/// Keeps every delivered message in memory
#[derive(Default)]
pub struct MemorySink {
    messages: Mutex<Vec<ChatMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ChatMessage>> {
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.lock().clone()
    }

    /// Status notices only, in delivery order
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.lock()
            .iter()
            .filter_map(|m| m.level.map(|level| (level, m.text.clone())))
            .collect()
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    async fn deliver(&self, message: &ChatMessage) -> Result<()> {
        self.lock().push(message.clone());
        Ok(())
    }
}
