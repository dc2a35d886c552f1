//! Time series aggregation for per-port traffic counters

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One sample of a port traffic series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSample {
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub sent: f64,
    #[serde(default)]
    pub received: f64,
}

/// Parse a series from an API payload; unusable entries are dropped.
pub fn parse_series(value: &Value) -> Vec<StatSample> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Merge parallel series by summing aligned samples.
///
/// The longest series is the alignment base and supplies the timestamps;
/// a series that is shorter contributes zero past its end.
pub fn merge_series(series: &[Vec<StatSample>]) -> Vec<StatSample> {
    let Some(base) = series.iter().max_by_key(|s| s.len()) else {
        return Vec::new();
    };

    base.iter()
        .enumerate()
        .map(|(index, sample)| {
            let (sent, received) = series
                .iter()
                .filter_map(|s| s.get(index))
                .fold((0.0, 0.0), |(s, r), p| (s + p.sent, r + p.received));
            StatSample {
                ts: sample.ts.clone(),
                sent,
                received,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn series(values: &[(f64, f64)]) -> Vec<StatSample> {
        values
            .iter()
            .enumerate()
            .map(|(i, (sent, received))| StatSample {
                ts: Some(format!("t{}", i)),
                sent: *sent,
                received: *received,
            })
            .collect()
    }

    #[test]
    fn test_merge_uneven_lengths() {
        let short = series(&[(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);
        let long = series(&[(100.0, 1.0), (200.0, 2.0), (300.0, 3.0), (400.0, 4.0), (500.0, 5.0)]);

        let merged = merge_series(&[short, long]);
        assert_eq!(merged.len(), 5);
        assert_eq!((merged[0].sent, merged[0].received), (101.0, 11.0));
        assert_eq!((merged[2].sent, merged[2].received), (303.0, 33.0));
        assert_eq!((merged[3].sent, merged[3].received), (400.0, 4.0));
        assert_eq!((merged[4].sent, merged[4].received), (500.0, 5.0));
        assert_eq!(merged[4].ts.as_deref(), Some("t4"));
    }

    #[test]
    fn test_merge_empty_inputs() {
        assert!(merge_series(&[]).is_empty());
        assert!(merge_series(&[Vec::new(), Vec::new()]).is_empty());
    }

    #[test]
    fn test_parse_series_skips_garbage() {
        let parsed = parse_series(&json!([
            {"ts": "2024-05-01T10:00:00Z", "sent": 5, "received": 7},
            "nonsense",
            {"sent": 1}
        ]));
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].received, 0.0);
        assert!(parse_series(&json!({})).is_empty());
    }
}
