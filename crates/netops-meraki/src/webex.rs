//! Webex relay API
//!
//! The relay space mirrors the conversation: the engine posts replies and
//! notices, and polls for messages people write there.

use std::sync::Arc;

use netops_core::config::WebexSettings;
use netops_core::{CancellationToken, EngineError, Result};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::client::{Auth, ResilientClient, RetryPolicy};
use crate::models::{WebexMessage, WebexPerson};
use crate::transport::HttpTransport;

pub const CONNECTED_NOTICE: &str =
    "✅ Your NetOps AI Assistant has been successfully connected to this space.";

pub struct WebexApi {
    client: ResilientClient,
}

impl WebexApi {
    pub fn new(client: ResilientClient) -> Self {
        Self { client }
    }

    pub fn from_settings(
        transport: Arc<dyn HttpTransport>,
        settings: &WebexSettings,
        policy: RetryPolicy,
    ) -> Self {
        let client = ResilientClient::new(
            transport,
            settings.base_url.clone(),
            Auth::Bearer(settings.bot_token.clone()),
            policy,
        );
        Self::new(client)
    }

    /// Identity of the bot the token belongs to
    pub async fn me(&self, cancel: &CancellationToken) -> Result<WebexPerson> {
        let value = self
            .client
            .get("/people/me", cancel)
            .await
            .map_err(explain)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Latest `max` messages of a space, newest first as the API returns them
    pub async fn messages(
        &self,
        space_id: &str,
        max: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<WebexMessage>> {
        let path = format!("/messages?roomId={}&max={}", space_id, max);
        let data = self.client.get(&path, cancel).await.map_err(explain)?;
        let items = data
            .get("items")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        Ok(serde_json::from_value(items)?)
    }

    pub async fn post_markdown(
        &self,
        space_id: &str,
        markdown: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        debug!(space = %space_id, len = markdown.chars().count(), "posting relay message");
        self.client
            .post(
                "/messages",
                json!({ "roomId": space_id, "markdown": markdown }),
                cancel,
            )
            .await
            .map_err(explain)
    }

    /// Check the token and the space membership by posting a greeting.
    pub async fn verify(&self, space_id: &str, cancel: &CancellationToken) -> Result<WebexPerson> {
        let me = self.me(cancel).await?;
        info!(
            bot = %me.primary_email().unwrap_or("<no email>"),
            "relay token verified"
        );
        self.post_markdown(space_id, CONNECTED_NOTICE, cancel).await?;
        Ok(me)
    }
}

/// Replace the generic status text for the two failures operators hit most.
fn explain(err: EngineError) -> EngineError {
    match err {
        EngineError::Remote {
            endpoint,
            status: 401,
            ..
        } => EngineError::Remote {
            endpoint,
            status: 401,
            message: "Invalid Bot Token.".to_string(),
        },
        EngineError::Remote {
            endpoint,
            status: 404,
            ..
        } if endpoint.starts_with("/messages") => EngineError::Remote {
            endpoint,
            status: 404,
            message: "Invalid Space ID or bot is not in the space.".to_string(),
        },
        other => other,
    }
}
