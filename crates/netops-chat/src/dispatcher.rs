//! Dispatcher
//!
//! Drives one conversation: asks the assistant for a reply, extracts the
//! command it carries, runs it through the catalog under the single-flight
//! guard, and reports the outcome.
//!
//! ## Flow
//!
//! ```text
//! message ──▶ assistant reply ──▶ parse ──▶ guard ──▶ catalog entry
//!                                                        │
//!                         terminal ◀─────────────────────┤
//!                                                        ▼ chained
//!                            assistant reply to CONTEXT prompt ──▶ parse ──▶ ... (depth + 1)
//! ```
//!
//! Every command outcome produces exactly one status notice. The guard is
//! held across a whole chain, and each step runs under a fresh token so the
//! cancel control always reaches the step in flight.

use std::sync::Arc;

use async_recursion::async_recursion;
use netops_catalog::{OperationCatalog, OperationContext};
use netops_core::{
    CancellationToken, ChatMessage, Command, CommandResult, EngineError, ErrorKind, NoticeLevel,
};
use netops_llm::BoxedProvider;
use netops_meraki::{Device, MerakiApi};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::guard::{DispatchState, RunGuard, SingleFlight};
use crate::parser::parse_command;
use crate::prompt::system_instruction;
use crate::relay::ChatRelay;
use crate::sink::{MemorySink, MessageSink};

pub const DEFAULT_MAX_CHAIN_DEPTH: u32 = 2;

/// Where the message that started a turn came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Typed by the local operator
    Operator,
    /// Written by someone in the relay space
    Relay { email: String },
    /// Synthesized by a poller
    Automated,
}

impl Origin {
    fn reply_to(&self) -> Option<&str> {
        match self {
            Origin::Relay { email } => Some(email),
            _ => None,
        }
    }
}

/// What one turn produced
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// The assistant's reply, if it answered
    pub reply: Option<String>,
    /// Result of the command the reply carried, if one ran
    pub result: Option<CommandResult>,
}

pub struct DispatcherBuilder {
    catalog: Arc<OperationCatalog>,
    api: Arc<MerakiApi>,
    provider: BoxedProvider,
    sink: Option<Arc<dyn MessageSink>>,
    relay: Option<Arc<ChatRelay>>,
    max_chain_depth: u32,
    shutdown: CancellationToken,
}

impl DispatcherBuilder {
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn relay(mut self, relay: Arc<ChatRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn max_chain_depth(mut self, depth: u32) -> Self {
        self.max_chain_depth = depth;
        self
    }

    /// Token whose cancellation stops every run (process shutdown)
    pub fn shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            catalog: self.catalog,
            api: self.api,
            provider: self.provider,
            sink: self.sink.unwrap_or_else(|| Arc::new(MemorySink::new())),
            relay: self.relay,
            flight: SingleFlight::new(self.shutdown.clone()),
            shutdown: self.shutdown,
            turn: Mutex::new(()),
            history: RwLock::new(Vec::new()),
            inventory: RwLock::new(Vec::new()),
            max_chain_depth: self.max_chain_depth,
        }
    }
}

pub struct Dispatcher {
    catalog: Arc<OperationCatalog>,
    api: Arc<MerakiApi>,
    provider: BoxedProvider,
    sink: Arc<dyn MessageSink>,
    relay: Option<Arc<ChatRelay>>,
    flight: SingleFlight,
    shutdown: CancellationToken,
    /// Serialises assistant turns
    turn: Mutex<()>,
    history: RwLock<Vec<ChatMessage>>,
    /// Latest device list, shown to the assistant
    inventory: RwLock<Vec<Device>>,
    max_chain_depth: u32,
}

impl Dispatcher {
    pub fn builder(
        catalog: Arc<OperationCatalog>,
        api: Arc<MerakiApi>,
        provider: BoxedProvider,
    ) -> DispatcherBuilder {
        DispatcherBuilder {
            catalog,
            api,
            provider,
            sink: None,
            relay: None,
            max_chain_depth: DEFAULT_MAX_CHAIN_DEPTH,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn api(&self) -> &Arc<MerakiApi> {
        &self.api
    }

    pub fn state(&self) -> DispatchState {
        self.flight.state()
    }

    /// No turn in progress and no command executing
    pub fn is_idle(&self) -> bool {
        self.flight.is_idle() && self.turn.try_lock().is_ok()
    }

    /// Signal the running command, if any
    pub fn cancel_current(&self) -> bool {
        self.flight.cancel_current()
    }

    pub async fn history(&self) -> Vec<ChatMessage> {
        self.history.read().await.clone()
    }

    pub async fn set_inventory(&self, devices: Vec<Device>) {
        *self.inventory.write().await = devices;
    }

    pub async fn inventory(&self) -> Vec<Device> {
        self.inventory.read().await.clone()
    }

    /// A message typed by the local operator
    pub async fn handle_user_message(&self, text: &str) -> TurnOutcome {
        if let Some(relay) = &self.relay {
            relay.relay_operator(text).await;
        }
        self.run_turn(ChatMessage::user(text), Origin::Operator).await
    }

    /// A message someone wrote in the relay space
    pub async fn handle_relay_message(&self, text: &str, email: &str) -> TurnOutcome {
        self.run_turn(
            ChatMessage::relay(text, email),
            Origin::Relay {
                email: email.to_string(),
            },
        )
        .await
    }

    /// Run a command that did not come from the assistant (e.g. a poller's
    /// root-cause trigger). Returns `None` when a turn or another command is
    /// in progress; the command is dropped, not queued.
    pub async fn dispatch_command(&self, command: Command) -> Option<CommandResult> {
        let Ok(_turn) = self.turn.try_lock() else {
            warn!(action = %command.name(), "Turn in progress. Ignoring automated call.");
            return None;
        };
        let Some(run) = self.flight.try_acquire() else {
            warn!(action = %command.name(), "Action already in progress. Ignoring duplicate call.");
            return None;
        };
        Some(self.run_chain(&run, command, 0, &Origin::Automated).await)
    }

    /// Post a status notice: rendered, persisted and relayed.
    pub async fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        self.emit(ChatMessage::notice(level, text.clone())).await;
        if let Some(relay) = &self.relay {
            relay.relay_notice(&text).await;
        }
    }

    async fn emit(&self, message: ChatMessage) {
        if let Err(e) = self.sink.deliver(&message).await {
            error!(error = %e, "message sink failed");
        }
        self.history.write().await.push(message);
    }

    async fn ask(&self, cancel: &CancellationToken) -> netops_core::Result<String> {
        let system = {
            let inventory = self.inventory.read().await;
            system_instruction(&self.catalog.definitions(), &inventory)
        };
        let history = self.history.read().await.clone();
        debug!(provider = %self.provider.name(), turns = history.len(), "asking assistant");
        self.provider.generate(&system, &history, cancel).await
    }

    /// Get the assistant's reply and show it. `None` means the assistant
    /// call failed and the failure has been reported.
    async fn reply(&self, origin: &Origin, cancel: &CancellationToken) -> Option<String> {
        match self.ask(cancel).await {
            Ok(reply) => {
                self.emit(ChatMessage::assistant(reply.clone())).await;
                if let Some(relay) = &self.relay {
                    relay.relay_assistant(&reply, origin.reply_to()).await;
                }
                Some(reply)
            }
            Err(e) if e.is_cancelled() => {
                self.notify(NoticeLevel::Cancelled, "Operation cancelled by user.").await;
                None
            }
            Err(e) => {
                warn!(error = %e, "assistant call failed");
                self.notify(
                    NoticeLevel::Error,
                    format!("Error communicating with AI: {}", e.operator_message()),
                )
                .await;
                None
            }
        }
    }

    async fn run_turn(&self, incoming: ChatMessage, origin: Origin) -> TurnOutcome {
        let _turn = self.turn.lock().await;
        self.emit(incoming).await;

        let Some(reply) = self.reply(&origin, &self.shutdown).await else {
            return TurnOutcome::default();
        };

        let command = match parse_command(&reply) {
            Ok(Some(command)) => command,
            Ok(None) => {
                return TurnOutcome {
                    reply: Some(reply),
                    result: None,
                }
            }
            Err(e) => {
                self.report_failure(None, &e, &origin).await;
                return TurnOutcome {
                    reply: Some(reply),
                    result: Some(CommandResult::from_error(&e)),
                };
            }
        };

        let Some(run) = self.flight.try_acquire() else {
            warn!(action = %command.name(), "Action already in progress. Ignoring duplicate call.");
            self.notify(
                NoticeLevel::Warning,
                format!(
                    "Action '{}' ignored: another action is already in progress.",
                    command.name()
                ),
            )
            .await;
            return TurnOutcome {
                reply: Some(reply),
                result: None,
            };
        };

        let result = self.run_chain(&run, command, 0, &origin).await;
        TurnOutcome {
            reply: Some(reply),
            result: Some(result),
        }
    }

    /// Execute `command` and, when its result is chained, the command the
    /// assistant answers with, up to the depth cap.
    #[async_recursion]
    async fn run_chain<'a>(
        &self,
        run: &RunGuard<'a>,
        command: Command,
        depth: u32,
        origin: &Origin,
    ) -> CommandResult {
        let token = run.renew();
        let ctx = OperationContext::new(self.api.clone(), token.clone());
        info!(action = %command.name(), depth, "dispatching command");

        let output = match self.catalog.execute(&ctx, &command).await {
            Ok(output) => output,
            Err(e) => {
                self.report_failure(Some(&command), &e, origin).await;
                return CommandResult::from_error(&e);
            }
        };

        let result = CommandResult::ok(output.data, output.summary.clone());
        let mutates = self
            .catalog
            .definition(command.name())
            .map(|d| d.mutates)
            .unwrap_or(false);
        let level = if mutates || output.follow_up.is_some() {
            NoticeLevel::Success
        } else {
            NoticeLevel::Info
        };
        self.notify(level, output.summary).await;

        let Some(prompt) = output.follow_up else {
            return result;
        };

        // The chained prompt joins the history so later turns can refer to
        // the data, but it is not rendered.
        debug!(action = %command.name(), len = prompt.len(), "chaining result to assistant");
        self.history.write().await.push(ChatMessage::user(prompt));

        let token = run.token();
        let Some(reply) = self.reply(origin, &token).await else {
            return result;
        };

        match parse_command(&reply) {
            Ok(None) => {}
            Ok(Some(next)) if depth + 1 > self.max_chain_depth => {
                warn!(action = %next.name(), depth = depth + 1, "chain depth cap reached");
                self.notify(
                    NoticeLevel::Warning,
                    format!(
                        "Follow-up action '{}' was not run: the limit of {} chained action(s) was reached.",
                        next.name(),
                        self.max_chain_depth
                    ),
                )
                .await;
            }
            Ok(Some(next)) => {
                self.run_chain(run, next, depth + 1, origin).await;
            }
            Err(e) => self.report_failure(None, &e, origin).await,
        }

        result
    }

    /// The one status notice for a failed command
    async fn report_failure(&self, command: Option<&Command>, err: &EngineError, origin: &Origin) {
        let name = command.map(Command::name).unwrap_or("action");
        let diagnosis = command.is_some_and(|c| {
            self.catalog.resolve(c.name()) == Some("diagnose_device")
        });

        let (level, text) = match err.kind() {
            ErrorKind::Cancellation => {
                let text = match (diagnosis, origin) {
                    (true, Origin::Automated) => {
                        "Automated Root Cause Analysis cancelled by user.".to_string()
                    }
                    (true, _) => "Root Cause Analysis cancelled by user.".to_string(),
                    _ => format!("Action '{}' cancelled by user.", name),
                };
                (NoticeLevel::Cancelled, text)
            }
            ErrorKind::UnknownCommand => (
                NoticeLevel::Warning,
                format!("Unknown action '{}'. No action was taken.", name),
            ),
            _ if diagnosis && *origin == Origin::Automated => (
                NoticeLevel::Error,
                format!("❌ Error during automated RCA: {}", err.operator_message()),
            ),
            _ => (
                NoticeLevel::Error,
                format!("❌ Error executing action: {}", err.operator_message()),
            ),
        };

        match level {
            NoticeLevel::Cancelled => info!(action = %name, "command cancelled"),
            _ => warn!(action = %name, kind = %err.kind(), error = %err, "command failed"),
        }
        self.notify(level, text).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netops_catalog::default_catalog;
    use netops_core::config::Secret;
    use netops_llm::ScriptedProvider;
    use netops_meraki::testing::ScriptedTransport;
    use netops_meraki::{Auth, ResilientClient, RetryPolicy};
    use serde_json::json;

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        provider: Arc<ScriptedProvider>,
        sink: Arc<MemorySink>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let provider = Arc::new(ScriptedProvider::new());
        let sink = Arc::new(MemorySink::new());
        let client = ResilientClient::new(
            transport.clone(),
            "https://api.meraki.com/api/v1",
            Auth::Header {
                name: "X-Cisco-Meraki-API-Key".into(),
                value: Secret::new("key"),
            },
            RetryPolicy::default(),
        );
        let dispatcher = Dispatcher::builder(
            Arc::new(default_catalog()),
            Arc::new(MerakiApi::new(client, "549236")),
            provider.clone(),
        )
        .sink(sink.clone())
        .build();
        Fixture {
            transport,
            provider,
            sink,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_automated_command_dropped_while_busy() {
        let f = fixture();
        let _held = f.dispatcher.flight.try_acquire().unwrap();
        assert!(!f.dispatcher.is_idle());

        let result = f
            .dispatcher
            .dispatch_command(Command::from_value("reboot_device", json!({"serial": "Q2AP"})))
            .await;

        assert!(result.is_none());
        assert_eq!(f.transport.request_count(), 0);
        assert!(f.sink.notices().is_empty());
    }

    #[tokio::test]
    async fn test_assistant_command_ignored_while_busy() {
        let f = fixture();
        f.provider.reply(
            "<execute_action>{\"action\": \"reboot_device\", \"payload\": {\"serial\": \"Q2AP\"}}</execute_action>",
        );
        let held = f.dispatcher.flight.try_acquire().unwrap();

        let outcome = f.dispatcher.handle_user_message("reboot it").await;

        assert!(outcome.reply.is_some());
        assert!(outcome.result.is_none());
        assert_eq!(f.transport.request_count(), 0);
        assert_eq!(
            f.sink.notices(),
            vec![(
                NoticeLevel::Warning,
                "Action 'reboot_device' ignored: another action is already in progress.".to_string()
            )]
        );

        drop(held);
        assert!(f.dispatcher.is_idle());
        assert!(f.dispatcher.state().is_idle());
    }

    #[tokio::test]
    async fn test_cancel_current_without_run_is_noop() {
        let f = fixture();
        assert!(!f.dispatcher.cancel_current());
    }

    #[tokio::test]
    async fn test_system_instruction_tracks_inventory() {
        let f = fixture();
        f.dispatcher
            .set_inventory(vec![Device {
                serial: "Q2AP".into(),
                name: "lobby-ap".into(),
                model: "MR46".into(),
                network_id: Some("N_1".into()),
                status: "online".into(),
            }])
            .await;
        f.provider.reply("Hello.");

        f.dispatcher.handle_user_message("hi").await;

        let call = &f.provider.calls()[0];
        assert!(call.system_instruction.contains("lobby-ap"));
        assert_eq!(call.history.len(), 1);
    }
}
