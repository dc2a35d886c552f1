//! Catalog entries

pub mod devices;
pub mod diagnostics;
pub mod endpoints;
pub mod firewall;
pub mod ports;

use std::sync::Arc;

use crate::registry::OperationCatalog;

/// Names the assistant uses for hand-written entries
pub const COMMAND_ALIASES: &[(&str, &str)] = &[
    ("update_switch_port", "update_port"),
    ("cycle_switch_port", "cycle_port"),
    ("get_device_events", "get_events"),
    ("get_switch_port_stats", "get_port_stats"),
    ("get_switch_port_details", "get_port_config"),
    ("claim_devices", "claim_resources"),
    ("get_site_to_site_vpn_status", "get_vpn_status"),
    ("get_l3_firewall_rules", "get_firewall_rules"),
    ("update_l3_firewall_rules", "update_firewall_rules"),
    ("run_rca", "diagnose_device"),
];

/// Catalog with every built-in entry and alias registered
pub fn default_catalog() -> OperationCatalog {
    let mut catalog = OperationCatalog::new();

    catalog.register(Arc::new(ports::UpdatePort));
    catalog.register(Arc::new(ports::CyclePort));
    catalog.register(Arc::new(ports::GetPortConfig));
    catalog.register(Arc::new(ports::GetPortStats));
    catalog.register(Arc::new(devices::GetEvents));
    catalog.register(Arc::new(devices::GetConfigChanges));
    catalog.register(Arc::new(devices::GetVpnStatus));
    catalog.register(Arc::new(devices::ClaimResources));
    catalog.register(Arc::new(firewall::GetFirewallRules));
    catalog.register(Arc::new(firewall::UpdateFirewallRules));
    catalog.register(Arc::new(diagnostics::DiagnoseDevice));

    for operation in endpoints::endpoint_operations() {
        catalog.register(operation);
    }

    for (alias, target) in COMMAND_ALIASES {
        catalog.alias(alias, target);
    }

    tracing::info!("Operation catalog ready with {} entries", catalog.len());
    catalog
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use netops_core::config::Secret;
    use netops_core::CancellationToken;
    use netops_meraki::testing::ScriptedTransport;
    use netops_meraki::{Auth, MerakiApi, ResilientClient, RetryPolicy};

    use crate::operation::OperationContext;

    pub fn scripted() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new())
    }

    pub fn context(transport: &Arc<ScriptedTransport>, cancel: CancellationToken) -> OperationContext {
        let client = ResilientClient::new(
            transport.clone(),
            "https://api.meraki.com/api/v1",
            Auth::Header {
                name: "X-Cisco-Meraki-API-Key".into(),
                value: Secret::new("test"),
            },
            RetryPolicy::default(),
        );
        OperationContext::new(Arc::new(MerakiApi::new(client, "549236")), cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Family;

    #[test]
    fn test_default_catalog_covers_contract_entries() {
        let catalog = default_catalog();
        assert!(catalog.len() >= 60);

        let expect = [
            ("update_port", vec!["resourceId", "portId"], Family::RangeExpansion),
            ("cycle_port", vec!["resourceId", "portId"], Family::RangeExpansion),
            ("get_events", vec!["resourceId"], Family::ReadChained),
            ("get_config_changes", vec![], Family::ReadChained),
            ("get_port_stats", vec!["resourceId", "portId"], Family::Aggregation),
            ("claim_resources", vec!["containerName", "ids"], Family::DirectMutation),
            ("get_vpn_status", vec![], Family::ReadChained),
            ("update_firewall_rules", vec!["resourceId", "rules"], Family::DirectMutation),
        ];
        for (name, required, family) in expect {
            let def = catalog.definition(name).unwrap();
            assert_eq!(def.required_fields, required, "{}", name);
            assert_eq!(def.family, family, "{}", name);
        }
    }

    #[test]
    fn test_aliases_resolve() {
        let catalog = default_catalog();
        for (alias, target) in COMMAND_ALIASES {
            assert_eq!(catalog.resolve(alias), Some(*target));
        }
    }
}
