//! Core types and utilities for the netops action engine
//!
//! # Modules
//!
//! - `cancel`: Cooperative cancellation helpers
//! - `config`: Environment file loading and layered settings
//! - `error`: Error taxonomy and Result alias
//! - `message`: Chat messages exchanged with the assistant and the operator
//! - `types`: Commands and command results

pub mod cancel;
pub mod config;
pub mod error;
pub mod message;
pub mod types;

// Re-exports
pub use cancel::{ensure_active, CancellationToken};
pub use config::Settings;
pub use error::{EngineError, ErrorKind, Result};
pub use message::{ChatMessage, NoticeLevel, Sender};
pub use types::{Command, CommandResult};
