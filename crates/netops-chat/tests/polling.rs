mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::{harness, harness_with, Options};
use netops_chat::{run_poller, ChatRelayPoll, DeviceHealthPoll, Dispatcher, PollTask};
use netops_core::{EngineError, NoticeLevel, Sender};
use netops_meraki::{ApiResponse, Method};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn script_devices(h: &common::Harness, first: &str, second: &str) {
    h.transport.respond_json(
        Method::Get,
        "/organizations/549236/devices",
        json!([{"serial": "Q2AP", "name": "lobby-ap", "model": "MR46", "networkId": "N_1"}]),
    );
    h.transport.respond_json(
        Method::Get,
        "/organizations/549236/devices/statuses",
        json!([{"serial": "Q2AP", "status": first}]),
    );
    h.transport.respond_json(
        Method::Get,
        "/organizations/549236/devices/statuses",
        json!([{"serial": "Q2AP", "status": second}]),
    );
}

#[tokio::test]
async fn test_device_going_offline_starts_root_cause_analysis() {
    let h = harness();
    script_devices(&h, "online", "offline");
    h.transport.respond_json(
        Method::Get,
        "/networks/N_1/events",
        json!({"events": [{"type": "disassociation", "occurredAt": "2024-05-01T10:00:00Z"}]}),
    );
    h.transport.respond_json(
        Method::Get,
        "/organizations/549236/configurationChanges",
        json!([]),
    );
    h.provider.reply("## Executive Summary\nThe AP lost its uplink.");

    let poll = DeviceHealthPoll::new(Duration::from_secs(60), h.shutdown.clone());
    assert_eq!(assert_ok!(poll.seed(&h.dispatcher).await), 1);
    assert_eq!(h.provider.call_count(), 0);

    assert_ok!(poll.poll_once(&h.dispatcher).await);

    assert_eq!(
        h.notices(),
        vec![
            (
                NoticeLevel::Info,
                "Device lobby-ap (Q2AP) has a new status: 'offline'. Starting Root Cause Analysis..."
                    .to_string()
            ),
            (
                NoticeLevel::Success,
                "Found 1 relevant events and 0 configuration changes. Sending to AI for analysis..."
                    .to_string()
            ),
        ]
    );
    assert_eq!(h.provider.call_count(), 1);
    let prompt = h.provider.calls()[0]
        .history
        .last()
        .map(|m| m.text.clone())
        .unwrap_or_default();
    assert!(prompt.starts_with("CONTEXT: The device \"lobby-ap\" (Q2AP)"));

    let inventory = h.dispatcher.inventory().await;
    assert_eq!(inventory[0].status, "offline");
    assert!(h.dispatcher.is_idle());
}

#[tokio::test]
async fn test_device_staying_offline_triggers_once() {
    let h = harness();
    script_devices(&h, "online", "offline");
    h.transport
        .respond_json(Method::Get, "/networks/N_1/events", json!({"events": []}));
    h.transport.respond_json(
        Method::Get,
        "/organizations/549236/configurationChanges",
        json!([]),
    );

    let poll = DeviceHealthPoll::new(Duration::from_secs(60), h.shutdown.clone());
    assert_ok!(poll.seed(&h.dispatcher).await);
    assert_ok!(poll.poll_once(&h.dispatcher).await);
    assert_ok!(poll.poll_once(&h.dispatcher).await);

    let notices = h.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(
        notices[1].1,
        "No recent events or configuration changes found for lobby-ap. Unable to determine cause."
    );
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test]
async fn test_failed_automated_analysis_uses_rca_notice() {
    let h = harness();
    script_devices(&h, "online", "alerting");
    h.transport
        .respond_json(Method::Get, "/networks/N_1/events", json!({"events": []}));
    h.transport.respond(
        Method::Get,
        "/organizations/549236/configurationChanges",
        ApiResponse::json(403, json!({"errors": ["Forbidden"]})),
    );

    let poll = DeviceHealthPoll::new(Duration::from_secs(60), h.shutdown.clone());
    assert_ok!(poll.seed(&h.dispatcher).await);
    assert_ok!(poll.poll_once(&h.dispatcher).await);

    let notices = h.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[1].0, NoticeLevel::Error);
    assert_eq!(notices[1].1, "❌ Error during automated RCA: Forbidden");
}

#[tokio::test]
async fn test_first_poll_without_seed_only_records() {
    let h = harness();
    script_devices(&h, "offline", "offline");

    let poll = DeviceHealthPoll::new(Duration::from_secs(60), h.shutdown.clone());
    assert_ok!(poll.poll_once(&h.dispatcher).await);

    assert!(h.notices().is_empty());
    assert_eq!(h.dispatcher.inventory().await.len(), 1);
}

#[tokio::test]
async fn test_device_listing_failure_is_returned() {
    let h = harness();
    h.transport.respond(
        Method::Get,
        "/organizations/549236/devices",
        ApiResponse::json(401, json!({"errors": ["Invalid API key"]})),
    );

    let poll = DeviceHealthPoll::new(Duration::from_secs(60), h.shutdown.clone());
    let err: EngineError = assert_err!(poll.seed(&h.dispatcher).await);
    assert_eq!(err.operator_message(), "Invalid API key");
}

fn relay_harness() -> common::Harness {
    harness_with(Options {
        with_relay: true,
        ..Options::default()
    })
}

fn at(minute: u32) -> String {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0)
        .single()
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_relay_poll_answers_new_messages_oldest_first() {
    let h = relay_harness();
    h.transport.respond_json(
        Method::Get,
        "/people/me",
        json!({"id": "bot", "emails": ["netops@webex.bot"]}),
    );
    h.transport.respond_json(
        Method::Get,
        "/messages",
        json!({"items": [
            {"id": "m0", "personEmail": "bob@example.com", "text": "old question", "created": at(0)}
        ]}),
    );
    h.transport.respond_json(
        Method::Get,
        "/messages",
        json!({"items": [
            {"id": "m3", "personEmail": "netops@webex.bot", "markdown": "**[From AI]:** hi", "created": at(3)},
            {"id": "m2", "personEmail": "alice@example.com", "text": "second", "created": at(2)},
            {"id": "m1", "personEmail": "bob@example.com", "text": "first", "created": at(1)},
            {"id": "m0", "personEmail": "bob@example.com", "text": "old question", "created": at(0)}
        ]}),
    );
    h.transport
        .respond_json(Method::Post, "/messages", json!({"id": "posted"}));
    h.provider.reply("Answer one");
    h.provider.reply("Answer two");

    let relay = h.relay.clone().unwrap();
    let poll = ChatRelayPoll::new(relay, Duration::from_secs(10), 50, h.shutdown.clone());
    assert_ok!(poll.seed().await);
    assert_eq!(
        poll.last_seen().await.map(|t| t.to_rfc3339()),
        Some(at(0))
    );

    assert_ok!(poll.poll_once(&h.dispatcher).await);

    let calls = h.provider.calls();
    assert_eq!(calls.len(), 2);
    let first = calls[0].history.last().cloned().unwrap();
    assert_eq!(first.sender, Sender::Relay);
    assert_eq!(first.text, "first");
    assert_eq!(first.person_email.as_deref(), Some("bob@example.com"));
    assert_eq!(calls[1].history.last().unwrap().text, "second");

    let posted: Vec<String> = h
        .transport
        .requests()
        .into_iter()
        .filter(|r| r.method == Method::Post)
        .filter_map(|r| r.body)
        .map(|b| b["markdown"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        posted,
        vec![
            "**[AI Reply to bob@example.com]**:\n\nAnswer one".to_string(),
            "**[AI Reply to alice@example.com]**:\n\nAnswer two".to_string(),
        ]
    );
    assert_eq!(
        poll.last_seen().await.map(|t| t.to_rfc3339()),
        Some(at(2))
    );

    // Nothing newer than the marker: no further turns.
    assert_ok!(poll.poll_once(&h.dispatcher).await);
    assert_eq!(h.provider.call_count(), 2);
}

#[tokio::test]
async fn test_unseeded_relay_poll_does_nothing() {
    let h = relay_harness();
    let relay = h.relay.clone().unwrap();
    let poll = ChatRelayPoll::new(relay, Duration::from_secs(10), 50, h.shutdown.clone());

    assert_ok!(poll.poll_once(&h.dispatcher).await);
    assert_eq!(h.transport.request_count(), 0);
}

struct CountingPoll {
    polls: AtomicUsize,
}

#[async_trait]
impl PollTask for CountingPoll {
    fn name(&self) -> &str {
        "counting"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    async fn poll_once(&self, _dispatcher: &Dispatcher) -> netops_core::Result<()> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_poller_ticks_until_shutdown() {
    let h = harness();
    let task = Arc::new(CountingPoll {
        polls: AtomicUsize::new(0),
    });

    let handle = tokio::spawn(run_poller(
        task.clone(),
        h.dispatcher.clone(),
        h.shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(task.polls.load(Ordering::SeqCst), 3);

    h.shutdown.cancel();
    assert_ok!(handle.await);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(task.polls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_poller_skips_ticks_while_a_turn_is_in_progress() {
    let h = harness_with(Options {
        gated: true,
        ..Options::default()
    });
    h.provider.reply("Nothing to do.");
    let task = Arc::new(CountingPoll {
        polls: AtomicUsize::new(0),
    });

    let dispatcher = h.dispatcher.clone();
    let turn = tokio::spawn(async move { dispatcher.handle_user_message("status?").await });
    h.wait_until_busy().await;

    let poller = tokio::spawn(run_poller(
        task.clone(),
        h.dispatcher.clone(),
        h.shutdown.clone(),
    ));

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(task.polls.load(Ordering::SeqCst), 0);

    h.release();
    assert_ok!(turn.await);
    assert!(h.dispatcher.is_idle());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(task.polls.load(Ordering::SeqCst), 1);

    h.shutdown.cancel();
    assert_ok!(poller.await);
}
