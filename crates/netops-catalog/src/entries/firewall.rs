//! L3 firewall operations

use async_trait::async_trait;
use netops_core::{Command, Result};
use serde_json::{json, Value};

use super::devices::device_facts;
use crate::operation::{analysis_prompt, Family, Operation, OperationContext, OperationOutput};

pub struct GetFirewallRules;

#[async_trait]
impl Operation for GetFirewallRules {
    fn name(&self) -> &str {
        "get_firewall_rules"
    }

    fn description(&self) -> &str {
        "Show the L3 firewall rules of the network containing a device."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId"]
    }

    fn family(&self) -> Family {
        Family::ReadChained
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let device = device_facts(ctx, command).await?;
        let data = ctx
            .api()
            .l3_firewall_rules(&device.network_id, ctx.cancel())
            .await?;
        let rules = data.get("rules").cloned().unwrap_or_else(|| json!([]));
        let count = rules.as_array().map_or(0, Vec::len);
        if count == 0 {
            return Ok(OperationOutput::terminal(
                json!([]),
                format!("No relevant firewall rules for device {} found.", device.name),
            ));
        }

        let prompt = analysis_prompt(
            &format!(
                "Here are the current L3 firewall rules for the network containing device \"{}\". Please summarize them for the user.",
                device.name
            ),
            "FIREWALL RULES",
            &rules,
        );
        Ok(OperationOutput::chained(
            rules,
            format!("Found {} rules. Sending to AI for summary...", count),
            prompt,
        ))
    }
}

pub struct UpdateFirewallRules;

#[async_trait]
impl Operation for UpdateFirewallRules {
    fn name(&self) -> &str {
        "update_firewall_rules"
    }

    fn description(&self) -> &str {
        "Replace ALL L3 firewall rules of the network containing a device with the given list."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId", "rules"]
    }

    fn family(&self) -> Family {
        Family::DirectMutation
    }

    fn example_payload(&self) -> Option<Value> {
        Some(json!({
            "resourceId": "Q2XX-XXXX-XXXX",
            "rules": [{"comment": "Block guest", "policy": "deny", "protocol": "any", "srcCidr": "10.0.50.0/24", "destCidr": "Any"}]
        }))
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let rules = command.require_array("rules")?.clone();
        let device = device_facts(ctx, command).await?;

        let result = ctx
            .api()
            .update_l3_firewall_rules(&device.network_id, rules, ctx.cancel())
            .await?;

        Ok(OperationOutput::terminal(
            result,
            "✅ Success! L3 firewall rules have been updated.",
        ))
    }
}
