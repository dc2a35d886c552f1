//! Meraki dashboard API
//!
//! Thin typed wrappers over [`ResilientClient`]. Identifiers are passed through
//! unchanged; the dashboard's own error responses are the validation signal.

use std::sync::Arc;

use netops_core::config::MerakiSettings;
use netops_core::{CancellationToken, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::{Auth, ResilientClient, RetryPolicy};
use crate::models::{Device, DeviceStatus, Network};
use crate::transport::{HttpTransport, Method};

pub const API_KEY_HEADER: &str = "X-Cisco-Meraki-API-Key";

/// Look-back window for events, configuration changes and port statistics
pub const TIMESPAN_SECS: u32 = 3600;
pub const EVENTS_PER_PAGE: u32 = 100;

pub struct MerakiApi {
    client: ResilientClient,
    org_id: String,
}

impl MerakiApi {
    pub fn new(client: ResilientClient, org_id: impl Into<String>) -> Self {
        Self {
            client,
            org_id: org_id.into(),
        }
    }

    pub fn from_settings(
        transport: Arc<dyn HttpTransport>,
        settings: &MerakiSettings,
        policy: RetryPolicy,
    ) -> Self {
        let client = ResilientClient::new(
            transport,
            settings.base_url.clone(),
            Auth::Header {
                name: API_KEY_HEADER.to_string(),
                value: settings.api_key.clone(),
            },
            policy,
        );
        Self::new(client, settings.org_id.clone())
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Generic call used by declarative catalog entries
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.client.request(method, path, body, cancel).await
    }

    pub async fn networks(&self, cancel: &CancellationToken) -> Result<Vec<Network>> {
        let path = format!("/organizations/{}/networks", self.org_id);
        let items = self.client.get_paginated(&path, cancel).await?;
        let networks = items
            .into_iter()
            .filter_map(|v| match serde_json::from_value::<Network>(v) {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!("Skipping malformed network entry: {}", e);
                    None
                }
            })
            .collect::<Vec<_>>();
        debug!(count = networks.len(), "fetched organisation networks");
        Ok(networks)
    }

    /// Organisation inventory joined with device statuses. The two lists are
    /// fetched concurrently; a statuses failure degrades every status to
    /// `unknown`, an inventory failure is fatal.
    pub async fn devices(&self, cancel: &CancellationToken) -> Result<Vec<Device>> {
        let devices_path = format!("/organizations/{}/devices", self.org_id);
        let statuses_path = format!("/organizations/{}/devices/statuses", self.org_id);

        let (devices, statuses) = tokio::join!(
            self.client.get_paginated(&devices_path, cancel),
            self.client.get_paginated(&statuses_path, cancel),
        );

        let devices = devices?;
        let statuses: Vec<DeviceStatus> = match statuses {
            Ok(items) => items
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Could not fetch device statuses, proceeding without them: {}", e);
                Vec::new()
            }
        };

        let devices: Vec<Device> = devices
            .into_iter()
            .filter_map(|v| serde_json::from_value::<Device>(v).ok())
            .map(|mut device| {
                device.status = statuses
                    .iter()
                    .find(|s| s.serial == device.serial)
                    .and_then(|s| s.status.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                device
            })
            .collect();

        info!(count = devices.len(), "fetched organisation devices");
        Ok(devices)
    }

    pub async fn device(&self, serial: &str, cancel: &CancellationToken) -> Result<Value> {
        self.client.get(&format!("/devices/{}", serial), cancel).await
    }

    pub async fn switch_ports(&self, serial: &str, cancel: &CancellationToken) -> Result<Value> {
        self.client
            .get(&format!("/devices/{}/switch/ports", serial), cancel)
            .await
    }

    pub async fn update_switch_port(
        &self,
        serial: &str,
        port_id: &str,
        settings: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.client
            .put(&format!("/devices/{}/switch/ports/{}", serial, port_id), settings, cancel)
            .await
    }

    pub async fn cycle_ports(
        &self,
        serial: &str,
        ports: &[String],
        cancel: &CancellationToken,
    ) -> Result<Value> {
        self.client
            .post(
                &format!("/devices/{}/switch/ports/cycle", serial),
                json!({ "ports": ports }),
                cancel,
            )
            .await
    }

    pub async fn port_stats(
        &self,
        serial: &str,
        port_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let path = format!(
            "/devices/{}/switch/ports/{}/stats?timespan={}",
            serial, port_id, TIMESPAN_SECS
        );
        self.client.get(&path, cancel).await
    }

    /// Events of one device in its network over the last hour
    pub async fn network_events(
        &self,
        network_id: &str,
        product_type: &str,
        serial: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>> {
        let path = format!(
            "/networks/{}/events?productType={}&deviceSerial={}&timespan={}&perPage={}",
            network_id, product_type, serial, TIMESPAN_SECS, EVENTS_PER_PAGE
        );
        let data = self.client.get(&path, cancel).await?;
        Ok(data
            .get("events")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// Organisation configuration changes over the last hour, optionally
    /// scoped to one network.
    pub async fn config_changes(
        &self,
        network_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>> {
        let mut path = format!(
            "/organizations/{}/configurationChanges?timespan={}",
            self.org_id, TIMESPAN_SECS
        );
        if let Some(network_id) = network_id {
            path.push_str(&format!("&networkId={}", network_id));
        }
        self.client.get_paginated(&path, cancel).await
    }

    pub async fn vpn_statuses(&self, cancel: &CancellationToken) -> Result<Vec<Value>> {
        let path = format!("/organizations/{}/appliance/vpn/statuses", self.org_id);
        self.client.get_paginated(&path, cancel).await
    }

    pub async fn l3_firewall_rules(
        &self,
        network_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let path = format!("/networks/{}/appliance/firewall/l3FirewallRules", network_id);
        self.client.get(&path, cancel).await
    }

    /// Replace the whole L3 rule list of a network
    pub async fn update_l3_firewall_rules(
        &self,
        network_id: &str,
        rules: Vec<Value>,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let path = format!("/networks/{}/appliance/firewall/l3FirewallRules", network_id);
        self.client.put(&path, json!({ "rules": rules }), cancel).await
    }

    pub async fn claim_devices(
        &self,
        network_id: &str,
        serials: &[String],
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let path = format!("/networks/{}/devices/claim", network_id);
        self.client
            .post(&path, json!({ "serials": serials }), cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::transport::ApiResponse;
    use netops_core::config::Secret;

    fn api(transport: Arc<ScriptedTransport>) -> MerakiApi {
        let settings = MerakiSettings {
            api_key: Secret::new("k"),
            org_id: "549236".into(),
            base_url: "https://api.meraki.com/api/v1".into(),
        };
        MerakiApi::from_settings(transport, &settings, RetryPolicy::default())
    }

    #[tokio::test]
    async fn test_devices_joined_with_statuses() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            Method::Get,
            "/organizations/549236/devices",
            json!([
                {"serial": "Q2AA", "name": "core", "model": "MS250", "networkId": "N_1"},
                {"serial": "Q2BB", "model": "MR46", "networkId": "N_1"}
            ]),
        );
        transport.respond_json(
            Method::Get,
            "/organizations/549236/devices/statuses",
            json!([{"serial": "Q2AA", "status": "online"}]),
        );

        let devices = api(transport).devices(&CancellationToken::new()).await.unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].status, "online");
        assert_eq!(devices[1].status, "unknown");
        assert_eq!(devices[1].name, "Unnamed Device");
    }

    #[tokio::test]
    async fn test_statuses_failure_degrades_to_unknown() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            Method::Get,
            "/organizations/549236/devices",
            json!([{"serial": "Q2AA", "model": "MS250"}]),
        );
        transport.respond(
            Method::Get,
            "/organizations/549236/devices/statuses",
            ApiResponse::json(500, json!({"errors": ["boom"]})),
        );

        let devices = api(transport).devices(&CancellationToken::new()).await.unwrap();
        assert_eq!(devices[0].status, "unknown");
    }

    #[tokio::test]
    async fn test_events_query_and_extraction() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            Method::Get,
            "/networks/N_1/events",
            json!({"events": [{"type": "port_down"}], "pageStartAt": "x"}),
        );

        let events = api(transport.clone())
            .network_events("N_1", "switch", "Q2AA", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            transport.calls(),
            vec!["GET /networks/N_1/events?productType=switch&deviceSerial=Q2AA&timespan=3600&perPage=100"]
        );
    }

    #[tokio::test]
    async fn test_config_changes_network_scope() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(Method::Get, "/organizations/549236/configurationChanges", json!([]));

        let changes = api(transport.clone())
            .config_changes(Some("N_1"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(changes.is_empty());
        assert_eq!(
            transport.calls(),
            vec!["GET /organizations/549236/configurationChanges?timespan=3600&networkId=N_1"]
        );
    }
}
