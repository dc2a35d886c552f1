//! Shared wiring for the engine integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use netops_catalog::default_catalog;
use netops_chat::{ChatRelay, Dispatcher, MemorySink};
use netops_core::config::Secret;
use netops_core::{CancellationToken, ChatMessage, NoticeLevel};
use netops_llm::{BoxedProvider, LlmProvider, ScriptedProvider};
use tokio::sync::Notify;
use netops_meraki::testing::ScriptedTransport;
use netops_meraki::{Auth, MerakiApi, ResilientClient, RetryPolicy, WebexApi};

pub const ORG: &str = "549236";

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub provider: Arc<ScriptedProvider>,
    pub sink: Arc<MemorySink>,
    pub shutdown: CancellationToken,
    pub dispatcher: Arc<Dispatcher>,
    pub relay: Option<Arc<ChatRelay>>,
    /// Set when the provider was gated: each assistant call waits for one permit
    pub gate: Option<Arc<Notify>>,
}

pub struct Options {
    pub max_chain_depth: u32,
    pub with_relay: bool,
    pub gated: bool,
}

/// Holds every assistant call until the test releases it, then answers
/// from the script.
struct GatedProvider {
    gate: Arc<Notify>,
    inner: Arc<ScriptedProvider>,
}

#[async_trait]
impl LlmProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatMessage],
        cancel: &CancellationToken,
    ) -> netops_core::Result<String> {
        self.gate.notified().await;
        self.inner.generate(system_instruction, history, cancel).await
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_chain_depth: 2,
            with_relay: false,
            gated: false,
        }
    }
}

pub fn harness() -> Harness {
    harness_with(Options::default())
}

pub fn harness_with(options: Options) -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let provider = Arc::new(ScriptedProvider::new());
    let sink = Arc::new(MemorySink::new());
    let shutdown = CancellationToken::new();

    let meraki = ResilientClient::new(
        transport.clone(),
        "https://api.meraki.com/api/v1",
        Auth::Header {
            name: "X-Cisco-Meraki-API-Key".into(),
            value: Secret::new("meraki-key"),
        },
        RetryPolicy::default(),
    );
    let api = Arc::new(MerakiApi::new(meraki, ORG));

    let gate = options.gated.then(|| Arc::new(Notify::new()));
    let assistant: BoxedProvider = match &gate {
        Some(gate) => Arc::new(GatedProvider {
            gate: gate.clone(),
            inner: provider.clone(),
        }),
        None => provider.clone(),
    };

    let mut builder = Dispatcher::builder(Arc::new(default_catalog()), api, assistant)
        .sink(sink.clone())
        .max_chain_depth(options.max_chain_depth)
        .shutdown(shutdown.clone());

    let relay = options.with_relay.then(|| {
        let webex = ResilientClient::new(
            transport.clone(),
            "https://webexapis.com/v1",
            Auth::Bearer(Secret::new("bot-token")),
            RetryPolicy::default(),
        );
        Arc::new(ChatRelay::new(
            Arc::new(WebexApi::new(webex)),
            "ROOM",
            7400,
            Duration::from_millis(0),
            shutdown.clone(),
        ))
    });
    if let Some(relay) = &relay {
        builder = builder.relay(relay.clone());
    }

    Harness {
        transport,
        provider,
        sink,
        shutdown,
        dispatcher: Arc::new(builder.build()),
        relay,
        gate,
    }
}

pub fn action(json: &str) -> String {
    format!("<execute_action>{}</execute_action>", json)
}

impl Harness {
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.sink.notices()
    }

    pub fn notice_levels(&self) -> Vec<NoticeLevel> {
        self.notices().into_iter().map(|(level, _)| level).collect()
    }

    /// Let one held assistant call through
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    /// Yield until a spawned turn has taken the dispatcher
    pub async fn wait_until_busy(&self) {
        while self.dispatcher.is_idle() {
            tokio::task::yield_now().await;
        }
    }
}
