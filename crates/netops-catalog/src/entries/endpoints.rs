//! Declarative endpoint entries
//!
//! Most catalog entries are a single dashboard call. Each row names the
//! command, its HTTP method and a path template; `{placeholders}` in the path
//! are required payload fields, except `{orgId}` which comes from the
//! context. Reads hand their data to the assistant; writes are terminal and
//! send the remaining payload as the JSON body.

use std::sync::OnceLock;

use async_trait::async_trait;
use netops_core::{Command, Result};
use netops_meraki::Method;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::operation::{
    analysis_prompt, BoxedOperation, Family, Operation, OperationContext, OperationOutput,
};

/// One row of the endpoint table
#[derive(Debug, Clone, Copy)]
pub struct EndpointSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub method: Method,
    pub path: &'static str,
    /// What the data is, used in prompts and "nothing found" notices
    pub topic: &'static str,
    /// Optional payload fields forwarded as query parameters on reads
    pub query: &'static [&'static str],
}

const fn read(
    name: &'static str,
    path: &'static str,
    topic: &'static str,
    description: &'static str,
) -> EndpointSpec {
    EndpointSpec {
        name,
        description,
        method: Method::Get,
        path,
        topic,
        query: &[],
    }
}

const fn read_window(
    name: &'static str,
    path: &'static str,
    topic: &'static str,
    description: &'static str,
) -> EndpointSpec {
    EndpointSpec {
        query: &["timespan", "perPage"],
        ..read(name, path, topic, description)
    }
}

const fn write(
    name: &'static str,
    method: Method,
    path: &'static str,
    topic: &'static str,
    description: &'static str,
) -> EndpointSpec {
    EndpointSpec {
        name,
        description,
        method,
        path,
        topic,
        query: &[],
    }
}

pub const ENDPOINTS: &[EndpointSpec] = &[
    // Devices
    read("get_device_details", "/devices/{resourceId}", "device details", "Show model, firmware, LAN IP, address and tags of a device."),
    read_window("get_device_clients", "/devices/{resourceId}/clients", "clients of the device", "List clients seen by a device (optional timespan in seconds)."),
    read("get_lldp_cdp", "/devices/{resourceId}/lldpCdp", "LLDP/CDP neighbours", "Show LLDP and CDP neighbours discovered on each port of a device."),
    read("get_management_interface", "/devices/{resourceId}/managementInterface", "management interface settings", "Show the management interface (uplink IP) settings of a device."),
    read("get_switch_ports", "/devices/{resourceId}/switch/ports", "switch ports", "List every port of a switch with its configuration."),
    read_window("get_switch_port_statuses", "/devices/{resourceId}/switch/ports/statuses", "switch port statuses", "Show link status, speed, PoE usage and errors for every port of a switch."),
    read("get_routing_interfaces", "/devices/{resourceId}/switch/routing/interfaces", "layer 3 routing interfaces", "List layer 3 interfaces of a switch."),
    read("get_wireless_status", "/devices/{resourceId}/wireless/status", "wireless radio status", "Show the SSIDs and radio status broadcast by an access point."),
    read("get_appliance_performance", "/devices/{resourceId}/appliance/performance", "appliance performance", "Show the performance score of a security appliance."),
    read("get_camera_video_link", "/devices/{resourceId}/camera/videoLink", "camera video link", "Get the dashboard video link for a camera."),
    read("get_cellular_sims", "/devices/{resourceId}/cellular/sims", "cellular SIM settings", "Show SIM configuration of a cellular gateway."),
    write("reboot_device", Method::Post, "/devices/{resourceId}/reboot", "device reboot", "Reboot a device."),
    write("blink_device_leds", Method::Post, "/devices/{resourceId}/blinkLeds", "LED blink", "Blink the LEDs of a device to locate it (optional duration, period, duty)."),
    write("update_device", Method::Put, "/devices/{resourceId}", "device attributes", "Update name, tags, address or notes of a device."),
    write("update_management_interface", Method::Put, "/devices/{resourceId}/managementInterface", "management interface settings", "Update the management interface (wan1/wan2) of a device."),
    // Organisation
    read("list_networks", "/organizations/{orgId}/networks", "networks", "List every network in the organisation."),
    read("list_devices", "/organizations/{orgId}/devices", "devices", "List every device in the organisation."),
    read("get_device_statuses", "/organizations/{orgId}/devices/statuses", "device statuses", "Show online/offline/alerting status of every device."),
    read("get_inventory", "/organizations/{orgId}/inventory/devices", "inventory devices", "List devices in the organisation inventory, claimed or not."),
    read("get_license_overview", "/organizations/{orgId}/licenses/overview", "license overview", "Summarize licensing state and expiration."),
    read("get_org_admins", "/organizations/{orgId}/admins", "dashboard administrators", "List dashboard administrators and their access."),
    read("get_uplink_statuses", "/organizations/{orgId}/appliance/uplink/statuses", "appliance uplink statuses", "Show WAN uplink status of every security appliance."),
    read("get_firmware_upgrades", "/organizations/{orgId}/firmware/upgrades", "firmware upgrades", "List scheduled and completed firmware upgrades."),
    read_window("get_api_requests", "/organizations/{orgId}/apiRequests", "API requests", "List recent dashboard API requests (optional timespan)."),
    read("get_sensor_readings", "/organizations/{orgId}/sensor/readings/latest", "sensor readings", "Show the latest reading of every environmental sensor."),
    read("get_assurance_alerts", "/organizations/{orgId}/assurance/alerts", "assurance alerts", "List open health alerts across the organisation."),
    // Networks
    read("get_network", "/networks/{networkId}", "network settings", "Show name, time zone, tags and product types of a network."),
    read_window("get_network_clients", "/networks/{networkId}/clients", "network clients", "List clients in a network (optional timespan, perPage)."),
    read("get_client_details", "/networks/{networkId}/clients/{clientId}", "client details", "Show details of one client in a network."),
    read("get_alert_settings", "/networks/{networkId}/alerts/settings", "alert settings", "Show the alert configuration of a network."),
    read("get_network_health_alerts", "/networks/{networkId}/health/alerts", "network health alerts", "List current health alerts of a network."),
    read("get_network_firmware", "/networks/{networkId}/firmwareUpgrades", "firmware upgrade settings", "Show firmware versions and upgrade windows of a network."),
    read_window("get_traffic_analysis", "/networks/{networkId}/traffic", "traffic analysis", "Show application traffic in a network (timespan required by the dashboard, e.g. 7200)."),
    read("get_group_policies", "/networks/{networkId}/groupPolicies", "group policies", "List group policies of a network."),
    read("get_syslog_servers", "/networks/{networkId}/syslogServers", "syslog servers", "Show syslog servers of a network."),
    read("get_snmp_settings", "/networks/{networkId}/snmp", "SNMP settings", "Show SNMP settings of a network."),
    read("get_topology", "/networks/{networkId}/topology/linkLayer", "link layer topology", "Show the link layer topology of a network."),
    write("update_network", Method::Put, "/networks/{networkId}", "network settings", "Update name, time zone, tags or notes of a network."),
    write("remove_device", Method::Post, "/networks/{networkId}/devices/remove", "device removal", "Remove a device (by serial in the body) from a network."),
    // Wireless
    read("get_ssids", "/networks/{networkId}/wireless/ssids", "SSIDs", "List SSIDs of a wireless network."),
    read_window("get_wireless_connection_stats", "/networks/{networkId}/wireless/connectionStats", "wireless connection statistics", "Show association, authentication, DHCP and DNS success counts (timespan)."),
    read_window("get_wireless_failed_connections", "/networks/{networkId}/wireless/failedConnections", "failed wireless connections", "List failed client connection attempts (timespan)."),
    read("get_rf_profiles", "/networks/{networkId}/wireless/rfProfiles", "RF profiles", "List RF profiles of a wireless network."),
    write("update_ssid", Method::Put, "/networks/{networkId}/wireless/ssids/{number}", "SSID settings", "Update an SSID by number (name, enabled, authMode, psk, ...)."),
    // Appliance
    read("get_appliance_vlans", "/networks/{networkId}/appliance/vlans", "appliance VLANs", "List VLANs of a security appliance network."),
    read("get_content_filtering", "/networks/{networkId}/appliance/contentFiltering", "content filtering settings", "Show content filtering of a network."),
    read("get_site_to_site_vpn", "/networks/{networkId}/appliance/vpn/siteToSiteVpn", "site-to-site VPN settings", "Show VPN mode, hubs and subnets of a network."),
    read("get_static_routes", "/networks/{networkId}/appliance/staticRoutes", "static routes", "List static routes of a security appliance."),
    read_window("get_security_events", "/networks/{networkId}/appliance/security/events", "security events", "List intrusion and malware events (timespan)."),
    read("get_port_forwarding_rules", "/networks/{networkId}/appliance/firewall/portForwardingRules", "port forwarding rules", "List port forwarding rules of a network."),
    write("create_appliance_vlan", Method::Post, "/networks/{networkId}/appliance/vlans", "VLAN creation", "Create an appliance VLAN (id, name, subnet, applianceIp)."),
    write("update_appliance_vlan", Method::Put, "/networks/{networkId}/appliance/vlans/{vlanId}", "VLAN settings", "Update an appliance VLAN."),
    write("update_site_to_site_vpn", Method::Put, "/networks/{networkId}/appliance/vpn/siteToSiteVpn", "site-to-site VPN settings", "Update VPN mode, hubs and subnets of a network."),
    // Switching
    read("get_switch_stacks", "/networks/{networkId}/switch/stacks", "switch stacks", "List switch stacks of a network."),
    read("get_switch_acls", "/networks/{networkId}/switch/accessControlLists", "switch access control lists", "Show switch ACL rules of a network."),
];

fn placeholders(path: &str) -> Vec<&str> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\{(\w+)\}").ok())
        .as_ref()
    else {
        return Vec::new();
    };
    re.captures_iter(path)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

pub struct EndpointOperation {
    spec: &'static EndpointSpec,
    path_fields: Vec<&'static str>,
}

impl EndpointOperation {
    pub fn new(spec: &'static EndpointSpec) -> Self {
        let path_fields = placeholders(spec.path)
            .into_iter()
            .filter(|p| *p != "orgId")
            .collect();
        Self { spec, path_fields }
    }

    fn resolve_path(&self, ctx: &OperationContext, command: &Command) -> Result<String> {
        let mut path = self.spec.path.replace("{orgId}", ctx.org_id());
        for field in &self.path_fields {
            let value = command.require_string(field)?;
            path = path.replace(&format!("{{{}}}", field), &value);
        }

        if self.spec.method == Method::Get {
            let params: Vec<String> = self
                .spec
                .query
                .iter()
                .filter_map(|q| command.optional_string(q).map(|v| format!("{}={}", q, v)))
                .collect();
            if !params.is_empty() {
                path.push('?');
                path.push_str(&params.join("&"));
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl Operation for EndpointOperation {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    fn required_fields(&self) -> Vec<&str> {
        self.path_fields.clone()
    }

    fn family(&self) -> Family {
        if self.spec.method == Method::Get {
            Family::ReadChained
        } else {
            Family::DirectMutation
        }
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let path = self.resolve_path(ctx, command)?;

        if self.spec.method == Method::Get {
            let data = ctx.api().call(Method::Get, &path, None, ctx.cancel()).await?;
            let empty = match &data {
                Value::Array(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::Null => true,
                _ => false,
            };
            if empty {
                return Ok(OperationOutput::terminal(
                    data,
                    format!("No relevant {} found.", self.spec.topic),
                ));
            }

            let prompt = analysis_prompt(
                &format!(
                    "Here are the {} you requested. Please analyze them and provide a concise, user-friendly summary.",
                    self.spec.topic
                ),
                "DATA",
                &data,
            );
            return Ok(OperationOutput::chained(
                data,
                format!("Fetched {}. Sending to AI for summary...", self.spec.topic),
                prompt,
            ));
        }

        let body = command.payload_without(&self.path_fields);
        let body = (!body.is_empty()).then_some(Value::Object(body));
        debug!(operation = %self.spec.name, path = %path, "sending write");
        let result = ctx.api().call(self.spec.method, &path, body, ctx.cancel()).await?;

        Ok(OperationOutput::terminal(
            result,
            format!("✅ Success! {} completed on {}.", self.spec.name, path),
        ))
    }
}

/// Every table row as an operation
pub fn endpoint_operations() -> Vec<BoxedOperation> {
    ENDPOINTS
        .iter()
        .map(|spec| std::sync::Arc::new(EndpointOperation::new(spec)) as BoxedOperation)
        .collect()
}
