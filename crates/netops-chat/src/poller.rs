//! Polling coordinators
//!
//! Each poll runs on its own fixed interval and only fires when the
//! dispatcher is idle. A tick that finds it busy is skipped; missed ticks do
//! not accumulate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use netops_core::{CancellationToken, Command, NoticeLevel, Result};
use netops_meraki::Device;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::relay::ChatRelay;

#[async_trait]
pub trait PollTask: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn poll_once(&self, dispatcher: &Dispatcher) -> Result<()>;
}

/// Run `task` every interval until `shutdown` is cancelled.
pub async fn run_poller(task: Arc<dyn PollTask>, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(task.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; polling starts one interval in.
    ticker.tick().await;

    info!(poller = %task.name(), interval_secs = task.interval().as_secs(), "poller started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!(poller = %task.name(), "poller stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        if !dispatcher.is_idle() {
            debug!(poller = %task.name(), "dispatcher busy, skipping tick");
            continue;
        }

        if let Err(e) = task.poll_once(&dispatcher).await {
            warn!(poller = %task.name(), error = %e, "poll failed");
        }
    }
}

// =============================================================================
// DEVICE HEALTH
// =============================================================================

/// Watches device statuses and starts a root-cause analysis for every device
/// that went from `online` to `offline` or `alerting`.
pub struct DeviceHealthPoll {
    interval: Duration,
    cancel: CancellationToken,
    /// serial -> status from the previous poll; `None` until seeded
    previous: Mutex<Option<HashMap<String, String>>>,
}

impl DeviceHealthPoll {
    pub fn new(interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            interval,
            cancel,
            previous: Mutex::new(None),
        }
    }

    /// Record the current statuses without triggering anything.
    pub async fn seed(&self, dispatcher: &Dispatcher) -> Result<usize> {
        let devices = dispatcher.api().devices(&self.cancel).await?;
        let count = devices.len();
        *self.previous.lock().await = Some(snapshot(&devices));
        dispatcher.set_inventory(devices).await;
        info!(devices = count, "device health baseline recorded");
        Ok(count)
    }
}

fn snapshot(devices: &[Device]) -> HashMap<String, String> {
    devices
        .iter()
        .map(|d| (d.serial.clone(), d.status.clone()))
        .collect()
}

/// Devices that were online in `previous` and are unhealthy now
pub fn newly_unhealthy<'a>(previous: &HashMap<String, String>, current: &'a [Device]) -> Vec<&'a Device> {
    current
        .iter()
        .filter(|d| d.is_unhealthy())
        .filter(|d| previous.get(&d.serial).map(String::as_str) == Some("online"))
        .collect()
}

fn diagnosis_command(device: &Device) -> Command {
    Command::from_value(
        "diagnose_device",
        json!({
            "serial": device.serial,
            "status": device.status,
            "networkId": device.network_id,
            "model": device.model,
            "name": device.name,
        }),
    )
}

#[async_trait]
impl PollTask for DeviceHealthPoll {
    fn name(&self) -> &str {
        "device-health"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll_once(&self, dispatcher: &Dispatcher) -> Result<()> {
        let devices = dispatcher.api().devices(&self.cancel).await?;

        let triggered: Vec<Device> = {
            let mut previous = self.previous.lock().await;
            let triggered = match previous.as_ref() {
                Some(before) => newly_unhealthy(before, &devices).into_iter().cloned().collect(),
                None => {
                    debug!("first device snapshot, nothing to compare");
                    Vec::new()
                }
            };
            *previous = Some(snapshot(&devices));
            triggered
        };
        dispatcher.set_inventory(devices).await;

        for device in triggered {
            if !dispatcher.is_idle() {
                warn!(serial = %device.serial, "dispatcher busy, root cause analysis skipped");
                continue;
            }
            dispatcher
                .notify(
                    NoticeLevel::Info,
                    format!(
                        "Device {} ({}) has a new status: '{}'. Starting Root Cause Analysis...",
                        device.name, device.serial, device.status
                    ),
                )
                .await;
            if dispatcher.dispatch_command(diagnosis_command(&device)).await.is_none() {
                warn!(serial = %device.serial, "root cause analysis dropped, another action is running");
            }
        }
        Ok(())
    }
}

// =============================================================================
// CHAT RELAY
// =============================================================================

#[derive(Debug, Clone, Default)]
struct RelayMarker {
    bot_email: Option<String>,
    last_seen: Option<DateTime<Utc>>,
}

/// Picks up messages people write in the relay space and feeds them to the
/// dispatcher, oldest first.
pub struct ChatRelayPoll {
    relay: Arc<ChatRelay>,
    interval: Duration,
    fetch_max: u32,
    cancel: CancellationToken,
    marker: Mutex<RelayMarker>,
}

impl ChatRelayPoll {
    pub fn new(relay: Arc<ChatRelay>, interval: Duration, fetch_max: u32, cancel: CancellationToken) -> Self {
        Self {
            relay,
            interval,
            fetch_max,
            cancel,
            marker: Mutex::new(RelayMarker::default()),
        }
    }

    /// Learn the bot's identity and start after the newest existing message,
    /// so history is not replayed.
    pub async fn seed(&self) -> Result<()> {
        let me = self.relay.api().me(&self.cancel).await?;
        let messages = self
            .relay
            .api()
            .messages(self.relay.space_id(), self.fetch_max, &self.cancel)
            .await?;

        let mut marker = self.marker.lock().await;
        marker.bot_email = me.primary_email().map(str::to_string);
        marker.last_seen = messages.iter().map(|m| m.created).max();
        info!(
            bot = ?marker.bot_email,
            last_seen = ?marker.last_seen,
            "relay poll seeded"
        );
        Ok(())
    }

    pub async fn last_seen(&self) -> Option<DateTime<Utc>> {
        self.marker.lock().await.last_seen
    }
}

#[async_trait]
impl PollTask for ChatRelayPoll {
    fn name(&self) -> &str {
        "chat-relay"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn poll_once(&self, dispatcher: &Dispatcher) -> Result<()> {
        let marker = self.marker.lock().await.clone();
        let Some(bot_email) = marker.bot_email else {
            debug!("relay poll not seeded, skipping");
            return Ok(());
        };

        let messages = self
            .relay
            .api()
            .messages(self.relay.space_id(), self.fetch_max, &self.cancel)
            .await?;

        let mut fresh: Vec<_> = messages
            .into_iter()
            .filter(|m| m.person_email.as_deref() != Some(bot_email.as_str()))
            .filter(|m| marker.last_seen.map_or(true, |seen| m.created > seen))
            .collect();
        fresh.sort_by_key(|m| m.created);

        for message in fresh {
            let body = message.body().trim();
            if body.is_empty() {
                debug!(id = %message.id, "skipping empty relay message");
            } else {
                let email = message.person_email.as_deref().unwrap_or("unknown");
                info!(from = %email, "relay message received");
                dispatcher.handle_relay_message(body, email).await;
            }
            self.marker.lock().await.last_seen = Some(message.created);
        }
        Ok(())
    }
}
