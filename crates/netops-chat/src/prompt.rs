//! System instruction for the assistant
//!
//! Built from the catalog definitions so the action list the assistant sees
//! always matches what the dispatcher can run.

use netops_catalog::{Family, OperationDefinition};
use netops_meraki::Device;
use serde_json::{json, Value};

use crate::parser::{ACTION_CLOSE, ACTION_OPEN};

const RCA_GUIDE: &str = r#"
## ROOT CAUSE ANALYSIS

When you receive a message starting with "CONTEXT:" it carries JSON data the engine fetched for you
(event logs, configuration changes, port statistics, rules). Analyze it and answer in Markdown with
these sections, in order:

1. `## Executive Summary`: one sentence naming the problem and its most likely cause.
2. `## Analysis of Findings`: what the data shows. Be specific: port numbers, timestamps, device names.
3. `## Probable Root Cause`: the single most likely cause.
4. `## Recommended Actions`: a numbered list of steps.
5. `## Key Evidence`: the 3-5 most important log lines or changes inside a code block.

Do not issue another action while answering a CONTEXT message unless the user asked for one.
"#;

/// Assemble the system instruction from the catalog and the latest inventory.
pub fn system_instruction(definitions: &[&OperationDefinition], devices: &[Device]) -> String {
    let mut prompt = String::from(
        "You are NetOps AI. Your primary goal is to help users manage their Meraki network devices and diagnose issues.\n",
    );

    if devices.is_empty() {
        prompt.push_str("No Meraki devices have been loaded.\n");
    } else {
        let inventory: Vec<Value> = devices
            .iter()
            .map(|d| json!({"serial": d.serial, "name": d.name, "model": d.model, "status": d.status}))
            .collect();
        prompt.push_str("Here is the list of Meraki devices discovered: ");
        prompt.push_str(&serde_json::to_string_pretty(&inventory).unwrap_or_else(|_| "[]".into()));
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        r#"
## CRITICAL RULES

1. **ONE ACTION PER REPLY** - To run an action, include exactly one JSON object inside {open}...{close} tags.
2. **FORMAT** - {open}{{"action": "<name>", "payload": {{...}}}}{close}
3. **RANGES** - Port ranges like "ports 5 through 8" are written as "5-8" in the portId field.
4. **NO GUESSING** - Use serials and names from the device list; ask the user when something is missing.

## AVAILABLE ACTIONS

"#,
        open = ACTION_OPEN,
        close = ACTION_CLOSE
    ));

    let (changes, reads): (Vec<_>, Vec<_>) = definitions.iter().partition(|d| d.mutates);

    if !changes.is_empty() {
        prompt.push_str("### Actions that change the network\n");
        for def in changes {
            prompt.push_str(&entry(def));
        }
        prompt.push('\n');
    }

    if !reads.is_empty() {
        prompt.push_str("### Read and analysis actions\n");
        for def in reads {
            prompt.push_str(&entry(def));
        }
        prompt.push('\n');
    }

    prompt.push_str(RCA_GUIDE);
    prompt
}

fn entry(def: &OperationDefinition) -> String {
    let required = if def.required_fields.is_empty() {
        "none".to_string()
    } else {
        def.required_fields.join(", ")
    };
    let mut line = format!("- **{}**: {} Required: {}.", def.name, def.description, required);
    if def.family == Family::RangeExpansion {
        line.push_str(" Accepts a port range.");
    }
    if let Some(example) = &def.example_payload {
        line.push_str(&format!(" Example payload: `{}`", example));
    }
    line.push('\n');
    line
}
