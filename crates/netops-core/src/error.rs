//! Error types for the netops action engine

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Coarse classification of an [`EngineError`], used to pick the status notice
/// shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed command or missing field; nothing was sent to the remote API
    Validation,
    /// Rate limited and still rate limited after every retry
    TransientRemote,
    /// Any other remote failure; never retried
    FatalRemote,
    /// Intentional stop requested by the operator
    Cancellation,
    /// Command name not present in the catalog
    UnknownCommand,
    /// Assistant, configuration or programming errors
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::TransientRemote => "transient_remote",
            ErrorKind::FatalRemote => "fatal_remote",
            ErrorKind::Cancellation => "cancellation",
            ErrorKind::UnknownCommand => "unknown_command",
            ErrorKind::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Rate limit exceeded for {endpoint} after {attempts} attempts")]
    RateLimited { endpoint: String, attempts: u32 },

    #[error("Failed to fetch {endpoint}: {message}")]
    Remote {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Failed to reach {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    /// First failing sub-call of a range expansion. Sub-calls that completed
    /// before it are kept in `completed`; their remote side effects stand.
    #[error("Step {failed_unit} failed after {} completed step(s): {source}", .completed.len())]
    RangeAborted {
        failed_unit: String,
        completed: Vec<Value>,
        source: Box<EngineError>,
    },

    #[error("Assistant error: {0}")]
    Assistant(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Create an assistant error
    pub fn assistant(msg: impl Into<String>) -> Self {
        EngineError::Assistant(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::UnknownCommand(_) => ErrorKind::UnknownCommand,
            EngineError::RateLimited { .. } => ErrorKind::TransientRemote,
            EngineError::Remote { .. } | EngineError::Transport { .. } | EngineError::Decode(_) => {
                ErrorKind::FatalRemote
            }
            EngineError::Cancelled => ErrorKind::Cancellation,
            EngineError::RangeAborted { source, .. } => source.kind(),
            EngineError::Assistant(_) | EngineError::Config(_) | EngineError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    /// Results gathered before a range expansion was aborted.
    pub fn partial_results(&self) -> &[Value] {
        match self {
            EngineError::RangeAborted { completed, .. } => completed,
            _ => &[],
        }
    }

    /// Message suitable for the operator: the remote text without the
    /// wrapping added for logs.
    pub fn operator_message(&self) -> String {
        match self {
            EngineError::Remote { message, .. } => message.clone(),
            EngineError::RangeAborted {
                failed_unit,
                completed,
                source,
            } => format!(
                "{} (stopped at {}, {} earlier step(s) already applied)",
                source.operator_message(),
                failed_unit,
                completed.len()
            ),
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_aborted_reports_cause_kind() {
        let err = EngineError::RangeAborted {
            failed_unit: "7".into(),
            completed: vec![serde_json::json!({"portId": "5"}), serde_json::json!({"portId": "6"})],
            source: Box::new(EngineError::Remote {
                endpoint: "/devices/Q2/switch/ports/7".into(),
                status: 400,
                message: "Invalid VLAN".into(),
            }),
        };
        assert_eq!(err.kind(), ErrorKind::FatalRemote);
        assert_eq!(err.partial_results().len(), 2);
        assert!(err.operator_message().contains("Invalid VLAN"));
        assert!(err.operator_message().contains("2 earlier step(s)"));
    }

    #[test]
    fn test_cancelled_inside_range_is_cancellation() {
        let err = EngineError::RangeAborted {
            failed_unit: "6".into(),
            completed: vec![],
            source: Box::new(EngineError::Cancelled),
        };
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_rate_limited_names_endpoint_and_attempts() {
        let err = EngineError::RateLimited {
            endpoint: "/organizations/1/devices".into(),
            attempts: 4,
        };
        let text = err.to_string();
        assert!(text.contains("/organizations/1/devices"));
        assert!(text.contains('4'));
        assert_eq!(err.kind(), ErrorKind::TransientRemote);
    }
}
