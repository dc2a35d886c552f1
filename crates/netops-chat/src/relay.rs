//! Chat relay
//!
//! Mirrors the conversation into the Webex space: assistant replies (with
//! command blocks stripped), messages typed locally, and status notices.
//! Relay failures are logged and never fail the command that produced the
//! message.

use std::sync::Arc;
use std::time::Duration;

use netops_core::config::WebexSettings;
use netops_core::{CancellationToken, Result};
use netops_meraki::WebexApi;
use tracing::{debug, info, warn};

use crate::chunker::chunk_message;
use crate::parser::strip_commands;

pub struct ChatRelay {
    api: Arc<WebexApi>,
    space_id: String,
    max_len: usize,
    chunk_delay: Duration,
    cancel: CancellationToken,
}

impl ChatRelay {
    pub fn new(
        api: Arc<WebexApi>,
        space_id: impl Into<String>,
        max_len: usize,
        chunk_delay: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            space_id: space_id.into(),
            max_len,
            chunk_delay,
            cancel,
        }
    }

    pub fn from_settings(api: Arc<WebexApi>, settings: &WebexSettings, cancel: CancellationToken) -> Self {
        Self::new(
            api,
            settings.space_id.clone(),
            settings.max_message_len,
            Duration::from_millis(settings.chunk_delay_ms),
            cancel,
        )
    }

    pub fn api(&self) -> &Arc<WebexApi> {
        &self.api
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    /// Post `markdown`, chunked when it exceeds the length cap. Returns the
    /// number of messages posted.
    pub async fn send(&self, markdown: &str) -> Result<usize> {
        let chunks: Vec<_> = chunk_message(markdown, self.max_len)
            .into_iter()
            .filter(|c| !c.is_blank())
            .collect();

        if chunks.len() > 1 {
            info!(parts = chunks.len(), "relay message too long, sending in parts");
        }

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.chunk_delay).await;
            }
            self.api
                .post_markdown(&self.space_id, &chunk.render(), &self.cancel)
                .await?;
        }
        Ok(chunks.len())
    }

    async fn send_logged(&self, markdown: &str) {
        if let Err(e) = self.send(markdown).await {
            warn!(error = %e, "failed to relay message");
        }
    }

    /// Relay an assistant reply. `reply_to` is the relay author the reply
    /// answers, if any.
    pub async fn relay_assistant(&self, text: &str, reply_to: Option<&str>) {
        let visible = strip_commands(text);
        if visible.is_empty() {
            debug!("assistant reply has no visible text, not relayed");
            return;
        }
        let prefix = match reply_to {
            Some(email) => format!("**[AI Reply to {}]**:", email),
            None => "**[From AI]:**".to_string(),
        };
        self.send_logged(&format!("{}\n\n{}", prefix, visible)).await;
    }

    /// Relay a message the operator typed locally
    pub async fn relay_operator(&self, text: &str) {
        self.send_logged(&format!("**[From UI]**: {}", text)).await;
    }

    pub async fn relay_notice(&self, text: &str) {
        self.send_logged(&format!("*System: {}*", text)).await;
    }
}
