//! Google Gemini provider
//!
//! Uses the `generateContent` endpoint with the API key sent as the
//! `x-goog-api-key` header. Conversation turns map onto Gemini roles:
//! assistant replies become `model`, operator and relayed messages become
//! `user`, status notices are not sent.

use std::sync::Arc;

use async_trait::async_trait;
use netops_core::config::AssistantSettings;
use netops_core::{CancellationToken, ChatMessage, EngineError, Result, Sender};
use netops_meraki::{Auth, HttpTransport, ResilientClient, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::provider::LlmProvider;

pub const API_KEY_HEADER: &str = "x-goog-api-key";

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: Option<f32>,
    #[serde(rename = "topP")]
    top_p: Option<f32>,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContentResponse>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

// =============================================================================
// CLIENT IMPLEMENTATION
// =============================================================================

pub struct GeminiClient {
    client: ResilientClient,
    model: String,
}

impl GeminiClient {
    pub fn new(client: ResilientClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    pub fn from_settings(
        transport: Arc<dyn HttpTransport>,
        settings: &AssistantSettings,
        policy: RetryPolicy,
    ) -> Self {
        let client = ResilientClient::new(
            transport,
            settings.base_url.clone(),
            Auth::Header {
                name: API_KEY_HEADER.to_string(),
                value: settings.api_key.clone(),
            },
            policy,
        );
        info!(model = %settings.model, "Gemini provider configured");
        Self::new(client, settings.model.clone())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
    ) -> GeminiRequest {
        let contents: Vec<GeminiContent> = history
            .iter()
            .filter_map(|message| {
                let role = match message.sender {
                    Sender::Assistant => "model",
                    Sender::User | Sender::Relay => "user",
                    Sender::System => return None,
                };
                let text = match (&message.sender, &message.person_email) {
                    (Sender::Relay, Some(email)) => {
                        format!("(Message from Webex user: {})\n{}", email, message.text)
                    }
                    _ => message.text.clone(),
                };
                Some(GeminiContent {
                    role: role.to_string(),
                    parts: vec![GeminiPart { text }],
                })
            })
            .collect();

        let system_instruction = if system_instruction.trim().is_empty() {
            None
        } else {
            Some(GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: system_instruction.to_string(),
                }],
            })
        };

        GeminiRequest {
            contents,
            system_instruction,
            generation_config: Some(GenerationConfig {
                temperature: Some(0.7),
                top_p: Some(0.95),
                max_output_tokens: Some(8192),
            }),
        }
    }
}

fn reply_text(response: GeminiResponse) -> Result<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(EngineError::assistant(format!("prompt blocked: {}", reason)));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| EngineError::assistant("response contained no candidates"))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        if let Some(reason) = candidate.finish_reason {
            warn!(finish_reason = %reason, "Gemini returned an empty reply");
        }
    }
    Ok(text)
}

#[async_trait]
impl LlmProvider for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> Result<String> {
        let request = self.build_request(system_instruction, history);
        let path = format!("/models/{}:generateContent", self.model);
        debug!(model = %self.model, turns = request.contents.len(), "Gemini request");

        let body = serde_json::to_value(&request)?;
        let value = self
            .client
            .post(&path, body, cancel)
            .await
            .map_err(|err| match err {
                EngineError::Cancelled => err,
                other => EngineError::assistant(other.operator_message()),
            })?;

        let response: GeminiResponse = serde_json::from_value(value)
            .map_err(|e| EngineError::assistant(format!("failed to parse Gemini response: {}", e)))?;
        reply_text(response)
    }
}
