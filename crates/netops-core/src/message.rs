//! Chat messages exchanged between the operator, the assistant and the engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
    System,
    /// A person writing in the external chat space
    Relay,
}

/// Severity of a system status notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
    Cancelled,
}

impl NoticeLevel {
    pub fn label(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "success",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
            NoticeLevel::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Author of a relayed message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_email: Option<String>,
    /// Set for status notices only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<NoticeLevel>,
}

impl ChatMessage {
    fn with_sender(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
            person_email: None,
            level: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::with_sender(Sender::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_sender(Sender::Assistant, text)
    }

    pub fn relay(text: impl Into<String>, person_email: impl Into<String>) -> Self {
        let mut msg = Self::with_sender(Sender::Relay, text);
        msg.person_email = Some(person_email.into());
        msg
    }

    pub fn notice(level: NoticeLevel, text: impl Into<String>) -> Self {
        let mut msg = Self::with_sender(Sender::System, text);
        msg.level = Some(level);
        msg
    }

    pub fn is_notice(&self) -> bool {
        self.sender == Sender::System
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_carries_level() {
        let msg = ChatMessage::notice(NoticeLevel::Cancelled, "Operation cancelled.");
        assert!(msg.is_notice());
        assert_eq!(msg.level, Some(NoticeLevel::Cancelled));
    }

    #[test]
    fn test_relay_serialization_keeps_email() {
        let msg = ChatMessage::relay("show me the VPN", "ops@example.com");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["sender"], "relay");
        assert_eq!(json["person_email"], "ops@example.com");
        assert!(json.get("level").is_none());
    }
}
