//! Configuration loading
//!
//! Two layers, loaded in this order by the service binary:
//!
//! 1. [`load_environment`] reads a `KEY=VALUE` environment file into the process
//!    environment (never overriding variables that are already set).
//! 2. [`Settings::load`] builds the structured settings with the `config` crate:
//!    built-in defaults, then an optional TOML file, then `NETOPS_*` variables
//!    (`NETOPS_MERAKI__API_KEY` sets `meraki.api_key`).
//!
//! ```no_run
//! use netops_core::config::{load_environment, Settings};
//!
//! load_environment();
//! let settings = Settings::load(Some("config/netops.toml".as_ref())).unwrap();
//! ```

use std::fmt;
use std::fs;
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Environment file locations, checked in order after `$NETOPS_ENV_FILE`
pub const ENV_FILE_PATHS: &[&str] = &["/etc/netops/environment", ".env"];

pub const DEFAULT_MERAKI_BASE_URL: &str = "https://api.meraki.com/api/v1";
pub const DEFAULT_WEBEX_BASE_URL: &str = "https://webexapis.com/v1";
pub const DEFAULT_ASSISTANT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_ASSISTANT_MODEL: &str = "gemini-2.5-flash";

/// Load variables from the first environment file found.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("NETOPS_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded) = try_load_env_file(path) {
            return Some(loaded);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);
    if !path_obj.exists() {
        return None;
    }

    let content = match fs::read_to_string(path_obj) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            return None;
        }
    };

    let mut loaded = 0;
    let mut skipped = 0;
    for (key, value) in content.lines().filter_map(parse_env_line) {
        if std::env::var(&key).is_ok() {
            skipped += 1;
            debug!("Skipped (already set): {}", key);
            continue;
        }
        debug!("Loaded: {}={}", key, mask_value(&key, &value));
        std::env::set_var(&key, &value);
        loaded += 1;
    }

    info!(
        "Loaded {} environment variables from {} ({} skipped - already set)",
        loaded, path, skipped
    );
    Some(path.to_string())
}

/// Parse `KEY=VALUE`, `KEY="VALUE"`, `KEY='VALUE'` and `export KEY=VALUE`.
/// Comments and blank lines yield None.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);

    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    let value = value.trim();
    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

fn mask_value<'a>(key: &str, value: &'a str) -> &'a str {
    let upper = key.to_ascii_uppercase();
    if ["KEY", "TOKEN", "SECRET"].iter().any(|s| upper.contains(s)) {
        "***"
    } else {
        value
    }
}

/// A credential that never shows up in `Debug` output or logs.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("<unset>")
        } else {
            f.write_str("***")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub meraki: MerakiSettings,
    pub webex: WebexSettings,
    pub assistant: AssistantSettings,
    pub retry: RetrySettings,
    pub engine: EngineSettings,
    pub polling: PollingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerakiSettings {
    pub api_key: Secret,
    pub org_id: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebexSettings {
    pub enabled: bool,
    pub bot_token: Secret,
    pub space_id: String,
    pub base_url: String,
    pub max_message_len: usize,
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantSettings {
    pub api_key: Secret,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_jitter_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    pub max_chain_depth: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingSettings {
    pub device_health_secs: u64,
    pub chat_relay_secs: u64,
    pub relay_fetch_max: u32,
}

impl Settings {
    /// Defaults, then the TOML file (if it exists), then `NETOPS_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::defaults()?;
        if let Some(path) = path {
            if path.exists() {
                info!("Loading settings from {}", path.display());
            } else {
                debug!("Settings file {} not found, skipping", path.display());
            }
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix("NETOPS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Self::finish(builder)
    }

    /// Defaults overlaid with an inline TOML document; no environment layer.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let builder = Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = Config::builder()
            .set_default("meraki.api_key", "")?
            .set_default("meraki.org_id", "")?
            .set_default("meraki.base_url", DEFAULT_MERAKI_BASE_URL)?
            .set_default("webex.enabled", false)?
            .set_default("webex.bot_token", "")?
            .set_default("webex.space_id", "")?
            .set_default("webex.base_url", DEFAULT_WEBEX_BASE_URL)?
            .set_default("webex.max_message_len", 7400)?
            .set_default("webex.chunk_delay_ms", 500)?
            .set_default("assistant.api_key", "")?
            .set_default("assistant.model", DEFAULT_ASSISTANT_MODEL)?
            .set_default("assistant.base_url", DEFAULT_ASSISTANT_BASE_URL)?
            .set_default("retry.max_retries", 3)?
            .set_default("retry.base_backoff_ms", 2000)?
            .set_default("retry.max_jitter_ms", 1000)?
            .set_default("engine.max_chain_depth", 2)?
            .set_default("polling.device_health_secs", 60)?
            .set_default("polling.chat_relay_secs", 7)?
            .set_default("polling.relay_fetch_max", 10)?;
        Ok(builder)
    }

    fn finish(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject missing credentials and nonsensical limits, naming the key.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.meraki.api_key.is_empty() {
            missing.push("meraki.api_key");
        }
        if self.meraki.org_id.trim().is_empty() {
            missing.push("meraki.org_id");
        }
        if self.assistant.api_key.is_empty() {
            missing.push("assistant.api_key");
        }
        if self.webex.enabled {
            if self.webex.bot_token.is_empty() {
                missing.push("webex.bot_token");
            }
            if self.webex.space_id.trim().is_empty() {
                missing.push("webex.space_id");
            }
        }
        if !missing.is_empty() {
            return Err(EngineError::config(format!(
                "missing required setting(s): {}",
                missing.join(", ")
            )));
        }

        if self.webex.max_message_len < 64 {
            return Err(EngineError::config(
                "webex.max_message_len must be at least 64 characters",
            ));
        }
        if self.polling.device_health_secs == 0 || self.polling.chat_relay_secs == 0 {
            return Err(EngineError::config("polling intervals must be non-zero"));
        }
        Ok(())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}
