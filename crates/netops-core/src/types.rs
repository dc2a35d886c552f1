//! Commands and command results

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{EngineError, ErrorKind, Result};

/// Alternate payload field names the assistant uses for the same thing.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("resourceId", "serial"),
    ("containerName", "networkName"),
    ("ids", "serials"),
];

/// The other accepted name for a payload field, if it has one
pub fn alias_of(key: &str) -> Option<&'static str> {
    FIELD_ALIASES.iter().find_map(|(a, b)| {
        if *a == key {
            Some(*b)
        } else if *b == key {
            Some(*a)
        } else {
            None
        }
    })
}

/// A structured, machine-issued request to run one catalog operation.
///
/// Payload fields are validated lazily by the operation through the
/// `require_*` accessors. A command is immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    name: String,
    payload: Map<String, Value>,
}

impl Command {
    pub fn new(name: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Build a command from a JSON object payload; any other value yields an
    /// empty payload.
    pub fn from_value(name: impl Into<String>, payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(name, payload)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    /// Same payload under another name (used to canonicalise aliases).
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: self.payload.clone(),
        }
    }

    /// Look up a payload field, falling back to its known alias.
    /// Null values and empty strings count as absent.
    pub fn field(&self, key: &str) -> Option<&Value> {
        let present = |k: &str| {
            self.payload.get(k).filter(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
        };

        present(key).or_else(|| alias_of(key).and_then(present))
    }

    pub fn has_field(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    /// Required scalar field rendered as a string. Numbers are accepted because
    /// the assistant often sends port ids and VLANs unquoted.
    pub fn require_string(&self, key: &str) -> Result<String> {
        self.optional_string(key)
            .ok_or_else(|| self.missing(key))
    }

    pub fn optional_string(&self, key: &str) -> Option<String> {
        match self.field(key)? {
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn require_array(&self, key: &str) -> Result<&Vec<Value>> {
        match self.field(key) {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => Err(EngineError::validation(format!(
                "Command '{}' expects field '{}' to be a list",
                self.name, key
            ))),
            None => Err(self.missing(key)),
        }
    }

    /// Required non-empty list of strings.
    pub fn require_string_list(&self, key: &str) -> Result<Vec<String>> {
        let items = self.require_array(key)?;
        let values: Vec<String> = items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect();

        if values.is_empty() {
            return Err(self.missing(key));
        }
        Ok(values)
    }

    /// Ensure every listed field is present before any remote call is made.
    pub fn require_fields(&self, keys: &[&str]) -> Result<()> {
        match keys.iter().find(|k| !self.has_field(k)) {
            Some(missing) => Err(self.missing(missing)),
            None => Ok(()),
        }
    }

    /// Payload without the given fields (or their aliases).
    pub fn payload_without(&self, keys: &[&str]) -> Map<String, Value> {
        self.payload
            .iter()
            .filter(|(k, _)| {
                !keys
                    .iter()
                    .any(|key| *key == k.as_str() || alias_of(key) == Some(k.as_str()))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn missing(&self, key: &str) -> EngineError {
        EngineError::validation(format!(
            "Command '{}' is missing required payload field '{}'",
            self.name, key
        ))
    }
}

/// Outcome of one dispatched command. Never both a value and an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandResult {
    Ok {
        data: Value,
        summary: String,
    },
    Err {
        kind: ErrorKind,
        message: String,
        /// Results of sub-calls that completed before the failure
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        partial: Vec<Value>,
    },
}

impl CommandResult {
    pub fn ok(data: Value, summary: impl Into<String>) -> Self {
        CommandResult::Ok {
            data,
            summary: summary.into(),
        }
    }

    pub fn from_error(err: &EngineError) -> Self {
        CommandResult::Err {
            kind: err.kind(),
            message: err.operator_message(),
            partial: err.partial_results().to_vec(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandResult::Ok { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            CommandResult::Err { kind, .. } => Some(*kind),
            CommandResult::Ok { .. } => None,
        }
    }
}
