//! Command block parser
//!
//! The assistant issues a command by embedding one JSON object between
//! `<execute_action>` and `</execute_action>` anywhere in its reply:
//!
//! ```text
//! I'll update those ports now.
//! <execute_action>{"action": "update_port", "payload": {"serial": "Q2AB-1234", "portId": "5-8"}}</execute_action>
//! ```
//!
//! Arguments may also be flattened next to `action` instead of nested under
//! `payload`.

use std::sync::OnceLock;

use netops_core::{Command, EngineError, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

pub const ACTION_OPEN: &str = "<execute_action>";
pub const ACTION_CLOSE: &str = "</execute_action>";

fn action_block() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<execute_action>([\s\S]*?)</execute_action>").ok())
        .as_ref()
}

fn code_fence() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[a-zA-Z]*\s*([\s\S]*?)\s*```$").ok())
        .as_ref()
}

/// Extract the command from an assistant reply.
///
/// No block is `Ok(None)`. A block whose body is not a JSON object with an
/// action name is a validation error. When several blocks are present only
/// the first is used.
pub fn parse_command(text: &str) -> Result<Option<Command>> {
    let Some(re) = action_block() else {
        return Ok(None);
    };
    let mut blocks = re.captures_iter(text);
    let body = match blocks.next().and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => return Ok(None),
    };

    let extra = blocks.count();
    if extra > 0 {
        warn!(ignored = extra, "reply carried more than one action block; using the first");
    }

    let body = strip_fence(body.trim());
    let value: Value = serde_json::from_str(body).map_err(|e| {
        EngineError::validation(format!("Could not parse action block as JSON: {}", e))
    })?;

    let Value::Object(mut object) = value else {
        return Err(EngineError::validation("Action block must contain a JSON object"));
    };

    let name = ["action", "name"]
        .iter()
        .find_map(|key| match object.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .ok_or_else(|| EngineError::validation("Action block is missing an \"action\" name"))?;

    let payload = match object.remove("payload") {
        Some(Value::Object(map)) => map,
        _ => {
            // Flattened form: every sibling of the name is an argument.
            object.remove("action");
            object.remove("name");
            object
        }
    };

    debug!(action = %name, fields = payload.len(), "parsed action block");
    Ok(Some(Command::new(name, payload)))
}

/// Reply text with every command block removed, trimmed.
pub fn strip_commands(text: &str) -> String {
    match action_block() {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

fn strip_fence(body: &str) -> &str {
    code_fence()
        .and_then(|re| re.captures(body))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(body)
}
