//! Device, event, configuration-change, VPN and claim operations

use async_trait::async_trait;
use netops_core::{Command, EngineError, Result};
use netops_meraki::product_type_for_model;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::operation::{analysis_prompt, Family, Operation, OperationContext, OperationOutput};

/// What an operation needs to know about a device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFacts {
    pub serial: String,
    pub name: String,
    pub model: String,
    pub network_id: String,
}

/// Device facts from the payload, completed by one device read when the
/// network or the model is missing.
pub async fn device_facts(ctx: &OperationContext, command: &Command) -> Result<DeviceFacts> {
    let serial = command.require_string("resourceId")?;
    let network_id = command.optional_string("networkId");
    let model = command.optional_string("model");
    let name = command.optional_string("name");

    if let (Some(network_id), Some(model)) = (&network_id, &model) {
        return Ok(DeviceFacts {
            name: name.unwrap_or_else(|| serial.clone()),
            serial,
            model: model.clone(),
            network_id: network_id.clone(),
        });
    }

    debug!(serial = %serial, "looking up device details");
    let device = ctx.api().device(&serial, ctx.cancel()).await?;
    let field = |key: &str| device.get(key).and_then(Value::as_str).map(str::to_string);

    let network_id = network_id.or_else(|| field("networkId")).ok_or_else(|| {
        EngineError::validation(format!("Device {} is not assigned to a network", serial))
    })?;

    Ok(DeviceFacts {
        name: name
            .or_else(|| field("name").filter(|n| !n.is_empty()))
            .unwrap_or_else(|| serial.clone()),
        model: model.or_else(|| field("model")).unwrap_or_default(),
        network_id,
        serial,
    })
}

pub struct GetEvents;

#[async_trait]
impl Operation for GetEvents {
    fn name(&self) -> &str {
        "get_events"
    }

    fn description(&self) -> &str {
        "Fetch the last hour of event logs for a device and analyze them."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId"]
    }

    fn family(&self) -> Family {
        Family::ReadChained
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let device = device_facts(ctx, command).await?;
        let product_type = command
            .optional_string("productType")
            .unwrap_or_else(|| product_type_for_model(&device.model).to_string());

        let events = ctx
            .api()
            .network_events(&device.network_id, &product_type, &device.serial, ctx.cancel())
            .await?;

        let topic = format!("event logs for device {}", device.name);
        if events.is_empty() {
            return Ok(OperationOutput::terminal(
                json!([]),
                format!("No relevant {} found.", topic),
            ));
        }

        let data = Value::Array(events);
        let prompt = analysis_prompt(
            &format!(
                "Here are the {} you requested. Please analyze them, provide a summary, and determine the probable root cause of the issue discussed.",
                topic
            ),
            "DATA",
            &data,
        );
        Ok(OperationOutput::chained(
            data.clone(),
            format!("Found {} events. Sending to AI for analysis...", data.as_array().map_or(0, Vec::len)),
            prompt,
        ))
    }
}

pub struct GetConfigChanges;

#[async_trait]
impl Operation for GetConfigChanges {
    fn name(&self) -> &str {
        "get_config_changes"
    }

    fn description(&self) -> &str {
        "Fetch the last hour of organisation configuration changes, optionally limited to one networkId."
    }

    fn family(&self) -> Family {
        Family::ReadChained
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let network_id = command.optional_string("networkId");
        let changes = ctx
            .api()
            .config_changes(network_id.as_deref(), ctx.cancel())
            .await?;

        if changes.is_empty() {
            return Ok(OperationOutput::terminal(
                json!([]),
                "No relevant configuration changes found.",
            ));
        }

        let count = changes.len();
        let data = Value::Array(changes);
        let prompt = analysis_prompt(
            "Here are the configuration changes you requested. Please analyze them, provide a summary, and determine the probable root cause of the issue discussed.",
            "DATA",
            &data,
        );
        Ok(OperationOutput::chained(
            data,
            format!("Found {} configuration changes. Sending to AI for analysis...", count),
            prompt,
        ))
    }
}

pub struct GetVpnStatus;

#[async_trait]
impl Operation for GetVpnStatus {
    fn name(&self) -> &str {
        "get_vpn_status"
    }

    fn description(&self) -> &str {
        "Summarize site-to-site VPN status for every network in the organisation."
    }

    fn family(&self) -> Family {
        Family::ReadChained
    }

    async fn execute(&self, ctx: &OperationContext, _command: &Command) -> Result<OperationOutput> {
        let statuses = ctx.api().vpn_statuses(ctx.cancel()).await?;
        if statuses.is_empty() {
            return Ok(OperationOutput::terminal(json!([]), "No relevant VPN statuses found."));
        }

        let count = statuses.len();
        let data = Value::Array(statuses);
        let prompt = analysis_prompt(
            "Here is the site-to-site VPN status information you requested. Please analyze this data and provide a concise, user-friendly summary. Mention how many networks are participating in the VPN and a high-level overview of their connection status.",
            "VPN STATUS DATA",
            &data,
        );
        Ok(OperationOutput::chained(
            data,
            format!("Found VPN status for {} networks. Sending to AI for summary...", count),
            prompt,
        ))
    }
}

pub struct ClaimResources;

#[async_trait]
impl Operation for ClaimResources {
    fn name(&self) -> &str {
        "claim_resources"
    }

    fn description(&self) -> &str {
        "Claim devices by serial into the network with the given name (case-insensitive)."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["containerName", "ids"]
    }

    fn family(&self) -> Family {
        Family::DirectMutation
    }

    fn example_payload(&self) -> Option<Value> {
        Some(json!({"containerName": "Branch Office", "ids": ["Q2XX-XXXX-XXXX"]}))
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let container = command.require_string("containerName")?;
        let serials = command.require_string_list("ids")?;

        let networks = ctx.api().networks(ctx.cancel()).await?;
        let target = networks
            .iter()
            .find(|n| n.name.eq_ignore_ascii_case(&container))
            .ok_or_else(|| {
                let available: Vec<&str> = networks.iter().map(|n| n.name.as_str()).collect();
                EngineError::validation(format!(
                    "Could not find a network named \"{}\". Available networks: {}",
                    container,
                    available.join(", ")
                ))
            })?;

        info!(network = %target.id, count = serials.len(), "claiming devices");
        let result = ctx
            .api()
            .claim_devices(&target.id, &serials, ctx.cancel())
            .await?;

        Ok(OperationOutput::terminal(
            result,
            format!(
                "✅ Success! Claimed {} device(s) into network \"{}\".",
                serials.len(),
                target.name
            ),
        ))
    }
}
