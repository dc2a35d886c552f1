//! NetOps Service
//!
//! Runs the action engine against a Meraki organisation:
//! - Console front-end (stdin in, stdout plus a JSON-lines transcript out)
//! - Gemini as the assistant, Webex as the optional relay space
//! - Device-health and relay pollers

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use netops_catalog::default_catalog;
use netops_chat::{run_poller, ChatRelay, ChatRelayPoll, DeviceHealthPoll, Dispatcher, PollTask};
use netops_core::config::{load_environment, Settings};
use netops_core::CancellationToken;
use netops_llm::GeminiClient;
use netops_meraki::{HttpTransport, MerakiApi, ReqwestTransport, RetryPolicy, WebexApi};

mod console;

use console::ConsoleSink;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "netops-service")]
#[command(about = "AI-driven action engine for Meraki networks")]
struct Args {
    /// Settings file (TOML); missing files are skipped
    #[arg(short, long, default_value = "config/netops.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Do not start the device-health and relay pollers
    #[arg(long)]
    no_polling: bool,

    /// JSON-lines transcript of the conversation
    #[arg(long, default_value = "netops-transcript.jsonl")]
    transcript: PathBuf,
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("netops_service=info".parse()?)
        .add_directive("netops_chat=info".parse()?)
        .add_directive("netops_catalog=info".parse()?)
        .add_directive("netops_meraki=info".parse()?)
        .add_directive("netops_llm=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_file = load_environment();

    let args = Args::parse();
    init_tracing(args.json_logs)?;
    if let Some(path) = env_file {
        info!("Environment loaded from {}", path);
    }

    let settings = Settings::load(Some(&args.config)).context("failed to load settings")?;
    let policy = RetryPolicy::from(&settings.retry);
    let shutdown = CancellationToken::new();

    // --- 1. Remote APIs ---

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(HTTP_TIMEOUT)?);
    let meraki = Arc::new(MerakiApi::from_settings(
        transport.clone(),
        &settings.meraki,
        policy.clone(),
    ));
    info!(org = %settings.meraki.org_id, "Meraki API configured");

    let relay = if settings.webex.enabled {
        let webex = Arc::new(WebexApi::from_settings(
            transport.clone(),
            &settings.webex,
            policy.clone(),
        ));
        match webex.verify(&settings.webex.space_id, &shutdown).await {
            Ok(_) => Some(Arc::new(ChatRelay::from_settings(
                webex,
                &settings.webex,
                shutdown.clone(),
            ))),
            Err(e) => {
                error!("Webex relay disabled: {}", e.operator_message());
                None
            }
        }
    } else {
        info!("Webex relay not enabled");
        None
    };

    let provider = Arc::new(GeminiClient::from_settings(
        transport.clone(),
        &settings.assistant,
        policy,
    ));

    // --- 2. Engine ---

    let sink = Arc::new(ConsoleSink::open(&args.transcript)?);
    info!("Transcript at {}", sink.path().display());

    let catalog = Arc::new(default_catalog());
    let mut builder = Dispatcher::builder(catalog, meraki, provider)
        .sink(sink)
        .max_chain_depth(settings.engine.max_chain_depth)
        .shutdown(shutdown.clone());
    if let Some(relay) = &relay {
        builder = builder.relay(relay.clone());
    }
    let dispatcher = Arc::new(builder.build());

    // --- 3. Pollers ---

    let pollers = if args.no_polling {
        info!("Polling disabled");
        Vec::new()
    } else {
        start_pollers(&settings, &dispatcher, relay.as_ref(), &shutdown).await
    };

    // --- 4. Signals and console ---

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            ctrl_c.cancel();
        }
    });

    println!("NetOps AI ready. Type a request; /cancel stops the running action, /stats shows usage, /quit exits.");
    console_loop(dispatcher.clone(), shutdown.clone()).await;

    // --- 5. Shutdown ---

    shutdown.cancel();
    for handle in pollers {
        if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
            warn!("Poller did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
    info!("NetOps service stopped");
    Ok(())
}

async fn start_pollers(
    settings: &Settings,
    dispatcher: &Arc<Dispatcher>,
    relay: Option<&Arc<ChatRelay>>,
    shutdown: &CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut tasks: Vec<Arc<dyn PollTask>> = Vec::new();

    let health = Arc::new(DeviceHealthPoll::new(
        Duration::from_secs(settings.polling.device_health_secs),
        shutdown.clone(),
    ));
    match health.seed(dispatcher).await {
        Ok(count) => info!("Loaded {} Meraki devices", count),
        Err(e) => warn!("Could not load Meraki devices yet: {}", e.operator_message()),
    }
    tasks.push(health);

    if let Some(relay) = relay {
        let poll = Arc::new(ChatRelayPoll::new(
            relay.clone(),
            Duration::from_secs(settings.polling.chat_relay_secs),
            settings.polling.relay_fetch_max,
            shutdown.clone(),
        ));
        match poll.seed().await {
            Ok(()) => tasks.push(poll),
            Err(e) => error!("Relay polling disabled: {}", e.operator_message()),
        }
    }

    tasks
        .into_iter()
        .map(|task| tokio::spawn(run_poller(task, dispatcher.clone(), shutdown.clone())))
        .collect()
}

/// Read operator input until `/quit`, end of input or shutdown. Each message
/// runs as its own task so `/cancel` stays responsive while it executes.
async fn console_loop(dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                return;
            }
            Err(e) => {
                error!("Failed to read console input: {}", e);
                return;
            }
        };

        match line.trim() {
            "" => {}
            "/quit" | "/exit" => return,
            "/cancel" => {
                if !dispatcher.cancel_current() {
                    println!("Nothing is running.");
                }
            }
            "/stats" => {
                for (name, stats) in dispatcher.catalog().stats() {
                    if stats.calls > 0 {
                        println!("{:<32} calls={} failures={}", name, stats.calls, stats.failures);
                    }
                }
            }
            text => {
                let dispatcher = dispatcher.clone();
                let text = text.to_string();
                tokio::spawn(async move {
                    dispatcher.handle_user_message(&text).await;
                });
            }
        }
    }
}
