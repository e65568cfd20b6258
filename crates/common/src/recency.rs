//! Complaint-recency weighting
//!
//! Leads carry complaint counts bucketed by age. Recent complaints count
//! fully, supporting (31-90 days) complaints count half and historical ones
//! not at all. The derived metrics are recomputed on every read and never
//! stored.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const RECENT_WEIGHT: f64 = 1.0;
const SUPPORTING_WEIGHT: f64 = 0.5;
const HISTORICAL_WEIGHT: f64 = 0.0;

/// Complaint counts per age bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyData {
    #[serde(rename = "0_30_days", default)]
    pub recent: u32,

    #[serde(rename = "31_90_days", default)]
    pub supporting: u32,

    #[serde(rename = "90_plus_days", default)]
    pub historical: u32,
}

/// Derived recency metrics attached to every lead read
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RecencyMetrics {
    pub weighted_issues: f64,
    pub recency_score: f64,
}

impl RecencyData {
    pub fn total(&self) -> u64 {
        self.recent as u64 + self.supporting as u64 + self.historical as u64
    }

    pub fn metrics(&self) -> RecencyMetrics {
        let weighted_issues = self.recent as f64 * RECENT_WEIGHT
            + self.supporting as f64 * SUPPORTING_WEIGHT
            + self.historical as f64 * HISTORICAL_WEIGHT;

        let total = self.total();
        let recency_score = if total == 0 {
            0.0
        } else {
            self.recent as f64 / total as f64
        };

        RecencyMetrics {
            weighted_issues,
            recency_score,
        }
    }

    /// Best-effort extraction from loosely typed JSON.
    ///
    /// Counts may arrive as integers, floats or numeric strings. Anything
    /// unreadable counts as zero; a non-object yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let count = |key: &str| obj.get(key).map(lenient_count).unwrap_or(0);

        Some(Self {
            recent: count("0_30_days"),
            supporting: count("31_90_days"),
            historical: count("90_plus_days"),
        })
    }
}

fn lenient_count(value: &Value) -> u32 {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match raw {
        Some(v) if v.is_finite() && v > 0.0 => v.min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

/// Metrics for an optional bucket set; missing data yields zeroes.
pub fn weigh(data: Option<&RecencyData>) -> RecencyMetrics {
    data.map(RecencyData::metrics).unwrap_or_default()
}

/// Serde hook that never fails on malformed recency data.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<RecencyData>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(RecencyData::from_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_zero_buckets_give_zero_metrics() {
        let metrics = RecencyData::default().metrics();
        assert_eq!(metrics.weighted_issues, 0.0);
        assert_eq!(metrics.recency_score, 0.0);
        assert_eq!(weigh(None), RecencyMetrics::default());
    }

    #[test]
    fn test_weighting() {
        let data = RecencyData {
            recent: 6,
            supporting: 4,
            historical: 10,
        };
        let metrics = data.metrics();
        assert_eq!(metrics.weighted_issues, 8.0);
        assert!((metrics.recency_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_metrics_stay_in_range() {
        for recent in [0u32, 1, 7, 500] {
            for supporting in [0u32, 3, 90] {
                for historical in [0u32, 2, 1000] {
                    let m = RecencyData {
                        recent,
                        supporting,
                        historical,
                    }
                    .metrics();
                    assert!(m.weighted_issues >= 0.0);
                    assert!((0.0..=1.0).contains(&m.recency_score));
                }
            }
        }
    }

    #[test]
    fn test_malformed_values_are_tolerated() {
        let data = RecencyData::from_value(&json!({
            "0_30_days": "5",
            "31_90_days": -3,
            "90_plus_days": {"nested": true}
        }))
        .unwrap();
        assert_eq!(data.recent, 5);
        assert_eq!(data.supporting, 0);
        assert_eq!(data.historical, 0);

        assert!(RecencyData::from_value(&json!("garbage")).is_none());
    }

    #[test]
    fn test_lenient_deserializer_inside_struct() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(default, deserialize_with = "deserialize_lenient")]
            recency: Option<RecencyData>,
        }

        let holder: Holder = serde_json::from_value(json!({"recency": [1, 2, 3]})).unwrap();
        assert!(holder.recency.is_none());

        let holder: Holder = serde_json::from_value(json!({})).unwrap();
        assert!(holder.recency.is_none());

        let holder: Holder =
            serde_json::from_value(json!({"recency": {"0_30_days": 2.0}})).unwrap();
        assert_eq!(holder.recency.unwrap().recent, 2);
    }
}
