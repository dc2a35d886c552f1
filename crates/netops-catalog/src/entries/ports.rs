//! Switch port operations

use std::collections::BTreeMap;

use async_trait::async_trait;
use netops_core::{ensure_active, Command, EngineError, Result};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::aggregate::{merge_series, parse_series, StatSample};
use crate::operation::{analysis_prompt, Family, Operation, OperationContext, OperationOutput};
use crate::range::{expand_port_range, is_range, run_sequential};

/// Port settings forwarded by `update_port`; anything else in the payload is ignored.
pub const PORT_SETTING_FIELDS: &[&str] = &[
    "name",
    "enabled",
    "type",
    "vlan",
    "voiceVlan",
    "nativeVlan",
    "allowedVlans",
    "poeEnabled",
    "stpGuard",
    "linkNegotiation",
];

fn port_settings(command: &Command) -> Result<Value> {
    let settings: Map<String, Value> = PORT_SETTING_FIELDS
        .iter()
        .filter_map(|field| {
            command
                .payload()
                .get(*field)
                .filter(|v| !v.is_null())
                .map(|v| (field.to_string(), v.clone()))
        })
        .collect();

    if settings.is_empty() {
        return Err(EngineError::validation(format!(
            "Command '{}' has no port settings to apply (expected one of: {})",
            command.name(),
            PORT_SETTING_FIELDS.join(", ")
        )));
    }
    Ok(Value::Object(settings))
}

fn collapse(mut results: Vec<Value>) -> Value {
    if results.len() == 1 {
        results.remove(0)
    } else {
        Value::Array(results)
    }
}

/// Fetch the device's ports and keep the requested one or range.
async fn select_ports(ctx: &OperationContext, serial: &str, port_id: &str) -> Result<Value> {
    let all = ctx.api().switch_ports(serial, ctx.cancel()).await?;
    let Value::Array(ports) = all else {
        return Err(EngineError::internal(
            "Failed to fetch switch ports or unexpected API response format.",
        ));
    };

    if is_range(port_id) {
        let wanted = expand_port_range(port_id)?;
        let selected: Vec<Value> = ports
            .into_iter()
            .filter(|p| {
                p.get("portId")
                    .and_then(Value::as_str)
                    .map(|id| wanted.iter().any(|w| w == id))
                    .unwrap_or(false)
            })
            .collect();
        return Ok(Value::Array(selected));
    }

    ports
        .into_iter()
        .find(|p| p.get("portId").and_then(Value::as_str) == Some(port_id))
        .ok_or_else(|| EngineError::Remote {
            endpoint: format!("/devices/{}/switch/ports", serial),
            status: 404,
            message: format!("Port {} not found on device {}.", port_id, serial),
        })
}

pub struct UpdatePort;

#[async_trait]
impl Operation for UpdatePort {
    fn name(&self) -> &str {
        "update_port"
    }

    fn description(&self) -> &str {
        "Update switch port settings on one port or an inclusive range like \"5-8\". Only name, enabled, type, vlan, voiceVlan, nativeVlan, allowedVlans, poeEnabled, stpGuard and linkNegotiation are applied."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId", "portId"]
    }

    fn family(&self) -> Family {
        Family::RangeExpansion
    }

    fn example_payload(&self) -> Option<Value> {
        Some(json!({"resourceId": "Q2XX-XXXX-XXXX", "portId": "5-8", "vlan": 20, "enabled": true}))
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let serial = command.require_string("resourceId")?;
        let port_id = command.require_string("portId")?;
        let settings = port_settings(command)?;
        let ports = expand_port_range(&port_id)?;

        info!(serial = %serial, ports = ports.len(), "updating switch port(s)");
        let api = ctx.api();
        let cancel = ctx.cancel();
        let device = serial.as_str();
        let results = run_sequential(&ports, cancel, |port| {
            let settings = settings.clone();
            async move { api.update_switch_port(device, &port, settings, cancel).await }
        })
        .await?;

        Ok(OperationOutput::terminal(
            collapse(results),
            format!("✅ Success! Port(s) {} on {} have been updated.", port_id, serial),
        ))
    }
}

pub struct CyclePort;

#[async_trait]
impl Operation for CyclePort {
    fn name(&self) -> &str {
        "cycle_port"
    }

    fn description(&self) -> &str {
        "Power-cycle one switch port or an inclusive range like \"5-8\", one port at a time."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId", "portId"]
    }

    fn family(&self) -> Family {
        Family::RangeExpansion
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let serial = command.require_string("resourceId")?;
        let port_id = command.require_string("portId")?;
        let ports = expand_port_range(&port_id)?;

        let api = ctx.api();
        let cancel = ctx.cancel();
        let device = serial.as_str();
        let results = run_sequential(&ports, cancel, |port| async move {
            api.cycle_ports(device, &[port], cancel).await
        })
        .await?;

        Ok(OperationOutput::terminal(
            collapse(results),
            format!("✅ Success! Port(s) {} on {} have been power-cycled.", port_id, serial),
        ))
    }
}

pub struct GetPortConfig;

#[async_trait]
impl Operation for GetPortConfig {
    fn name(&self) -> &str {
        "get_port_config"
    }

    fn description(&self) -> &str {
        "Show the configuration of one switch port or a range of ports."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId", "portId"]
    }

    fn family(&self) -> Family {
        Family::ReadChained
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let serial = command.require_string("resourceId")?;
        let port_id = command.require_string("portId")?;
        if is_range(&port_id) {
            expand_port_range(&port_id)?;
        }

        let details = select_ports(ctx, &serial, &port_id).await?;
        if details.as_array().is_some_and(|a| a.is_empty()) {
            return Ok(OperationOutput::terminal(
                details,
                format!("No relevant ports matching {} found on {}.", port_id, serial),
            ));
        }

        let prompt = analysis_prompt(
            "Here is the configuration of the requested switch port(s). Please summarize it for the user, mentioning names, enabled state and VLAN configuration.",
            "PORT CONFIGURATION(S)",
            &details,
        );
        Ok(OperationOutput::chained(
            details,
            format!("Fetched configuration for port(s) {} on {}.", port_id, serial),
            prompt,
        ))
    }
}

pub struct GetPortStats;

#[async_trait]
impl Operation for GetPortStats {
    fn name(&self) -> &str {
        "get_port_stats"
    }

    fn description(&self) -> &str {
        "Fetch configuration and last-hour traffic for one switch port or a range; range traffic is also summed into one series."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId", "portId"]
    }

    fn family(&self) -> Family {
        Family::Aggregation
    }

    fn example_payload(&self) -> Option<Value> {
        Some(json!({"resourceId": "Q2XX-XXXX-XXXX", "portId": "1-4"}))
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let serial = command.require_string("resourceId")?;
        let port_id = command.require_string("portId")?;
        let ports = expand_port_range(&port_id)?;

        let details = select_ports(ctx, &serial, &port_id).await?;

        let mut stats_by_port: BTreeMap<String, Vec<StatSample>> = BTreeMap::new();
        for port in &ports {
            ensure_active(ctx.cancel())?;
            let series = match ctx.api().port_stats(&serial, port, ctx.cancel()).await {
                Ok(value) => parse_series(&value),
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(serial = %serial, port = %port, "Failed to fetch stats for port: {}", e);
                    Vec::new()
                }
            };
            stats_by_port.insert(port.clone(), series);
        }

        let all: Vec<Vec<StatSample>> = ports
            .iter()
            .filter_map(|p| stats_by_port.get(p).cloned())
            .collect();
        let aggregated = merge_series(&all);

        let ranged = ports.len() > 1;
        let guidance = if ranged {
            "This is a range of ports. Summarize the configuration (e.g., if VLANs are consistent) and provide aggregate traffic stats."
        } else {
            "Mention the port's name, enabled status, VLAN config, and a summary of the traffic (e.g., total data transferred)."
        };
        let data = json!({
            "configuration": details,
            "statsByPort": stats_by_port,
            "aggregated": aggregated,
        });
        let prompt = analysis_prompt(
            &format!(
                "Here is the configuration and recent traffic statistics for the requested switch port(s). Please analyze and provide a user-friendly summary. {}",
                guidance
            ),
            "PORT DATA (traffic is bytes sent/received over the last hour)",
            &data,
        );

        Ok(OperationOutput::chained(
            data,
            format!(
                "Fetched traffic for {} port(s) on {} ({} aggregated samples).",
                ports.len(),
                serial,
                aggregated.len()
            ),
            prompt,
        ))
    }
}
