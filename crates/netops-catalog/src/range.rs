//! Range expansion
//!
//! Port identifiers may be a single id (`"5"`, `"1_MA-MOD-4X10G_1"` is not a
//! range because it contains `_`) or an inclusive numeric range (`"5-8"`).
//! Ranges expand to one sub-call per unit, run strictly in order.

use std::future::Future;

use netops_core::{ensure_active, CancellationToken, EngineError, Result};
use serde_json::Value;
use tracing::{debug, warn};

/// Largest number of units a single range may expand to
pub const MAX_RANGE_UNITS: u32 = 256;

/// Expand a port id or range into the ids to visit, in ascending order.
/// Malformed ranges fail before anything is sent.
pub fn expand_port_range(input: &str) -> Result<Vec<String>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(EngineError::validation("Port identifier is empty"));
    }
    if !is_range(input) {
        return Ok(vec![input.to_string()]);
    }

    let invalid = || EngineError::validation(format!("Invalid port range: {}", input));
    let (start, end) = input.split_once('-').ok_or_else(invalid)?;
    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
    let end: u32 = end.trim().parse().map_err(|_| invalid())?;
    if start > end {
        return Err(invalid());
    }
    if end - start >= MAX_RANGE_UNITS {
        return Err(EngineError::validation(format!(
            "Port range {} spans more than {} ports",
            input, MAX_RANGE_UNITS
        )));
    }

    Ok((start..=end).map(|p| p.to_string()).collect())
}

/// Whether a port id is written as a range
pub fn is_range(input: &str) -> bool {
    input.contains('-') && !input.contains('_')
}

/// Run `step` once per unit, sequentially.
///
/// Cancellation is checked before each unit. The first failure stops the
/// expansion and is returned as [`EngineError::RangeAborted`] carrying the
/// results of the units that already completed; their side effects stand.
pub async fn run_sequential<F, Fut>(
    units: &[String],
    cancel: &CancellationToken,
    mut step: F,
) -> Result<Vec<Value>>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Value>>,
{
    let mut completed = Vec::with_capacity(units.len());

    for unit in units {
        let outcome = match ensure_active(cancel) {
            Ok(()) => step(unit.clone()).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(value) => {
                debug!(unit = %unit, "range step completed");
                completed.push(value);
            }
            Err(source) => {
                if units.len() == 1 {
                    return Err(source);
                }
                warn!(
                    unit = %unit,
                    completed = completed.len(),
                    remaining = units.len() - completed.len() - 1,
                    "range expansion aborted: {}",
                    source
                );
                return Err(EngineError::RangeAborted {
                    failed_unit: unit.clone(),
                    completed,
                    source: Box::new(source),
                });
            }
        }
    }

    Ok(completed)
}
