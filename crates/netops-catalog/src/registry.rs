//! Operation catalog
//!
//! Maps command names (and the alternate names the assistant uses) to
//! operations, validates required fields before dispatching, and keeps
//! per-entry call counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use netops_core::{Command, EngineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::operation::{BoxedOperation, Family, OperationContext, OperationOutput};

/// Operation metadata without the implementation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDefinition {
    pub name: String,
    pub description: String,
    pub required_fields: Vec<String>,
    pub family: Family,
    pub mutates: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example_payload: Option<Value>,
}

struct RegisteredOperation {
    operation: BoxedOperation,
    definition: OperationDefinition,
    use_count: AtomicU64,
    failure_count: AtomicU64,
}

/// Call counters for one entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationStats {
    pub calls: u64,
    pub failures: u64,
}

#[derive(Default)]
pub struct OperationCatalog {
    operations: HashMap<Arc<str>, RegisteredOperation>,
    aliases: HashMap<Arc<str>, Arc<str>>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operation under its own name. A second registration with
    /// the same name replaces the first.
    pub fn register(&mut self, operation: BoxedOperation) {
        let definition = OperationDefinition {
            name: operation.name().to_string(),
            description: operation.description().to_string(),
            required_fields: operation
                .required_fields()
                .into_iter()
                .map(str::to_string)
                .collect(),
            family: operation.family(),
            mutates: operation.mutates(),
            example_payload: operation.example_payload(),
        };
        let name: Arc<str> = Arc::from(operation.name());
        if self.operations.contains_key(&name) {
            warn!("Replacing catalog entry: {}", name);
        }
        debug!("Registered operation: {}", name);
        self.operations.insert(
            name,
            RegisteredOperation {
                operation,
                definition,
                use_count: AtomicU64::new(0),
                failure_count: AtomicU64::new(0),
            },
        );
    }

    /// Accept `alias` as another name for `target`.
    pub fn alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(Arc::from(alias), Arc::from(target));
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Canonical name for `name`, following aliases.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        if let Some((key, _)) = self.operations.get_key_value(name) {
            return Some(&**key);
        }
        let target = self.aliases.get(name)?;
        self.operations.get_key_value(target).map(|(k, _)| &**k)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub fn definition(&self, name: &str) -> Option<&OperationDefinition> {
        let name = self.resolve(name)?;
        self.operations.get(name).map(|r| &r.definition)
    }

    /// All definitions sorted by name
    pub fn definitions(&self) -> Vec<&OperationDefinition> {
        let mut defs: Vec<_> = self.operations.values().map(|r| &r.definition).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn stats(&self) -> BTreeMap<String, OperationStats> {
        self.operations
            .iter()
            .map(|(name, r)| {
                (
                    name.to_string(),
                    OperationStats {
                        calls: r.use_count.load(Ordering::Relaxed),
                        failures: r.failure_count.load(Ordering::Relaxed),
                    },
                )
            })
            .collect()
    }

    /// Validate and run a command.
    ///
    /// Unknown names fail with [`EngineError::UnknownCommand`] and missing
    /// required fields with [`EngineError::Validation`]; neither touches the
    /// remote API.
    pub async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let name = self
            .resolve(command.name())
            .ok_or_else(|| EngineError::UnknownCommand(command.name().to_string()))?;
        let entry = self
            .operations
            .get(name)
            .ok_or_else(|| EngineError::UnknownCommand(command.name().to_string()))?;

        let command = if name != command.name() {
            debug!(alias = %command.name(), name = %name, "resolved command alias");
            command.renamed(name)
        } else {
            command.clone()
        };

        let required: Vec<&str> = entry
            .definition
            .required_fields
            .iter()
            .map(String::as_str)
            .collect();
        command.require_fields(&required)?;

        entry.use_count.fetch_add(1, Ordering::Relaxed);
        info!(operation = %name, mutates = entry.definition.mutates, "executing operation");

        let result = entry.operation.execute(ctx, &command).await;
        if let Err(e) = &result {
            if !e.is_cancelled() {
                entry.failure_count.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}
