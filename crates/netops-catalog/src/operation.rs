//! Core Operation trait and types
//!
//! An operation is one named remote action the assistant may request. It
//! validates its payload, composes one or more dashboard calls, and reports
//! whether the result should be rendered directly or handed back to the
//! assistant as a follow-up prompt.

use std::sync::Arc;

use async_trait::async_trait;
use netops_core::{CancellationToken, Command, Result};
use netops_meraki::MerakiApi;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Behavioural family of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// One or a few calls that change remote state
    DirectMutation,
    /// A mutation applied per unit of a textual range, sequentially
    RangeExpansion,
    /// Fetch data and hand it to the assistant to narrate
    ReadChained,
    /// Fetch parallel series and merge them
    Aggregation,
    /// Two independent reads joined into one analysis
    Correlation,
}

impl Family {
    pub fn mutates(&self) -> bool {
        matches!(self, Family::DirectMutation | Family::RangeExpansion)
    }
}

/// Everything an operation may touch during one run
#[derive(Clone)]
pub struct OperationContext {
    api: Arc<MerakiApi>,
    cancel: CancellationToken,
}

impl OperationContext {
    pub fn new(api: Arc<MerakiApi>, cancel: CancellationToken) -> Self {
        Self { api, cancel }
    }

    pub fn api(&self) -> &MerakiApi {
        &self.api
    }

    pub fn org_id(&self) -> &str {
        self.api.org_id()
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Result of a successful operation
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutput {
    pub data: Value,
    pub summary: String,
    /// Prompt for a new assistant turn; `Some` means the result is chained
    pub follow_up: Option<String>,
}

impl OperationOutput {
    pub fn terminal(data: Value, summary: impl Into<String>) -> Self {
        Self {
            data,
            summary: summary.into(),
            follow_up: None,
        }
    }

    pub fn chained(data: Value, summary: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            data,
            summary: summary.into(),
            follow_up: Some(prompt.into()),
        }
    }

    pub fn is_chained(&self) -> bool {
        self.follow_up.is_some()
    }
}

/// Build a follow-up prompt that embeds `data` verbatim.
pub fn analysis_prompt(context: &str, label: &str, data: &Value) -> String {
    let pretty = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
    format!("CONTEXT: {}\n\n{}:\n{}", context, label, pretty)
}

/// Core trait for all catalog operations
#[async_trait]
pub trait Operation: Send + Sync {
    /// Unique command name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Payload fields checked before any remote call is made
    fn required_fields(&self) -> Vec<&str> {
        Vec::new()
    }

    fn family(&self) -> Family;

    fn mutates(&self) -> bool {
        self.family().mutates()
    }

    /// Short payload example shown to the assistant
    fn example_payload(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput>;
}

pub type BoxedOperation = Arc<dyn Operation>;
