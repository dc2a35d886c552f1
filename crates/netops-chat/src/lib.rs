//! Conversation engine for the netops action engine
//!
//! # Modules
//!
//! - `parser`: Extracts the command block from an assistant reply
//! - `guard`: Single-flight guard and per-run cancellation tokens
//! - `dispatcher`: Assistant turns, command execution and chaining
//! - `prompt`: System instruction built from the catalog
//! - `sink`: Where rendered messages go
//! - `chunker`: Splits long relay messages
//! - `relay`: Mirrors the conversation into the Webex space
//! - `poller`: Device-health and relay polling

pub mod chunker;
pub mod dispatcher;
pub mod guard;
pub mod parser;
pub mod poller;
pub mod prompt;
pub mod relay;
pub mod sink;

pub use chunker::{chunk_message, Chunk};
pub use dispatcher::{Dispatcher, DispatcherBuilder, Origin, TurnOutcome};
pub use guard::{DispatchState, RunGuard, SingleFlight};
pub use parser::{parse_command, strip_commands};
pub use poller::{run_poller, ChatRelayPoll, DeviceHealthPoll, PollTask};
pub use relay::ChatRelay;
pub use sink::{MemorySink, MessageSink};
