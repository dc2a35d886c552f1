//! Root-cause correlation
//!
//! Runs when a device moves from healthy to unhealthy (or on request): the
//! device's recent events and its network's recent configuration changes are
//! read concurrently and handed to the assistant together.

use async_trait::async_trait;
use netops_core::{Command, Result};
use netops_meraki::product_type_for_model;
use serde_json::{json, Value};
use tracing::info;

use super::devices::device_facts;
use crate::operation::{Family, Operation, OperationContext, OperationOutput};

pub struct DiagnoseDevice;

#[async_trait]
impl Operation for DiagnoseDevice {
    fn name(&self) -> &str {
        "diagnose_device"
    }

    fn description(&self) -> &str {
        "Root-cause analysis for a device: correlates its recent event logs with recent configuration changes in its network."
    }

    fn required_fields(&self) -> Vec<&str> {
        vec!["resourceId"]
    }

    fn family(&self) -> Family {
        Family::Correlation
    }

    async fn execute(&self, ctx: &OperationContext, command: &Command) -> Result<OperationOutput> {
        let device = device_facts(ctx, command).await?;
        let status = command
            .optional_string("status")
            .unwrap_or_else(|| "unknown".to_string());
        let product_type = product_type_for_model(&device.model);

        info!(serial = %device.serial, status = %status, "starting root cause analysis");
        let api = ctx.api();
        let (events, changes) = tokio::try_join!(
            api.network_events(&device.network_id, product_type, &device.serial, ctx.cancel()),
            api.config_changes(Some(&device.network_id), ctx.cancel()),
        )?;

        if events.is_empty() && changes.is_empty() {
            return Ok(OperationOutput::terminal(
                json!({"events": [], "configurationChanges": []}),
                format!(
                    "No recent events or configuration changes found for {}. Unable to determine cause.",
                    device.name
                ),
            ));
        }

        let summary = format!(
            "Found {} relevant events and {} configuration changes. Sending to AI for analysis...",
            events.len(),
            changes.len()
        );
        let prompt = format!(
            "CONTEXT: The device \"{name}\" ({serial}) has just entered a problematic state: \"{status}\". \
             I have automatically retrieved its recent event logs and the network's recent configuration changes for you to analyze. \
             Please provide a summary of these findings and determine the probable root cause for this status change.\n\n\
             DEVICE EVENT LOGS:\n{events}\n\nNETWORK CONFIGURATION CHANGES:\n{changes}\n",
            name = device.name,
            serial = device.serial,
            status = status,
            events = pretty(&events),
            changes = pretty(&changes),
        );

        Ok(OperationOutput::chained(
            json!({"events": events, "configurationChanges": changes}),
            summary,
            prompt,
        ))
    }
}

fn pretty(items: &[Value]) -> String {
    serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::test_support::{context, scripted};
    use netops_core::{CancellationToken, ErrorKind};
    use netops_meraki::{ApiResponse, Method};

    fn command() -> Command {
        Command::from_value(
            "diagnose_device",
            json!({"serial": "Q2AP", "status": "offline", "networkId": "N_1", "model": "MR46", "name": "lobby-ap"}),
        )
    }

    #[tokio::test]
    async fn test_correlates_both_reads() {
        let transport = scripted();
        transport.respond_json(Method::Get, "/networks/N_1/events", json!({"events": [{"type": "disassociation"}]}));
        transport.respond_json(Method::Get, "/organizations/549236/configurationChanges", json!([]));

        let out = DiagnoseDevice
            .execute(&context(&transport, CancellationToken::new()), &command())
            .await
            .unwrap();

        let prompt = out.follow_up.unwrap();
        assert!(prompt.contains("\"lobby-ap\" (Q2AP) has just entered a problematic state: \"offline\""));
        assert!(prompt.contains("DEVICE EVENT LOGS:\n["));
        assert_eq!(transport.request_count(), 2);
        assert!(transport.calls()[0].contains("productType=wireless") || transport.calls()[1].contains("productType=wireless"));
    }

    #[tokio::test]
    async fn test_no_evidence_terminates() {
        let transport = scripted();
        transport.respond_json(Method::Get, "/networks/N_1/events", json!({"events": []}));
        transport.respond_json(Method::Get, "/organizations/549236/configurationChanges", json!([]));

        let out = DiagnoseDevice
            .execute(&context(&transport, CancellationToken::new()), &command())
            .await
            .unwrap();

        assert!(!out.is_chained());
        assert_eq!(
            out.summary,
            "No recent events or configuration changes found for lobby-ap. Unable to determine cause."
        );
    }

    #[tokio::test]
    async fn test_one_failed_read_fails_the_analysis() {
        let transport = scripted();
        transport.respond_json(Method::Get, "/networks/N_1/events", json!({"events": []}));
        transport.respond(
            Method::Get,
            "/organizations/549236/configurationChanges",
            ApiResponse::json(403, json!({"errors": ["Forbidden"]})),
        );

        let err = DiagnoseDevice
            .execute(&context(&transport, CancellationToken::new()), &command())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FatalRemote);
    }
}
