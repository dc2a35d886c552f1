//! Typed views of dashboard and relay API payloads
//!
//! Only the fields the engine reads are typed; everything else the API sends
//! is kept in `extra` so it can be passed back to the assistant untouched.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Organisation network
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub product_types: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// Inventory entry joined with its current status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub serial: String,
    #[serde(default = "unnamed")]
    pub name: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default = "unknown")]
    pub status: String,
}

fn unnamed() -> String {
    "Unnamed Device".to_string()
}

fn unknown() -> String {
    "unknown".to_string()
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.status == "online"
    }

    /// Statuses that warrant a root-cause analysis
    pub fn is_unhealthy(&self) -> bool {
        matches!(self.status.as_str(), "offline" | "alerting")
    }
}

/// Entry of `/organizations/{id}/devices/statuses`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceStatus {
    pub serial: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Identity of the relay bot
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebexPerson {
    pub id: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl WebexPerson {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }
}

/// Message in the relay space
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebexMessage {
    pub id: String,
    #[serde(default)]
    pub person_email: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
    pub created: DateTime<Utc>,
}

impl WebexMessage {
    /// Plain text if present, else the markdown source
    pub fn body(&self) -> &str {
        self.text
            .as_deref()
            .or(self.markdown.as_deref())
            .unwrap_or_default()
    }
}
