//! Polygon API data models.
//!
//! Only the crypto aggregates (bars) endpoint is used; account state and
//! order flow stay on the trading provider.

use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::types::Bar;

/// One aggregate window from `/v2/aggs/...`.
#[derive(Debug, Clone, Deserialize)]
pub struct PolygonAgg {
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v", default)]
    pub volume: f64,
    /// Window start, epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
}

impl From<PolygonAgg> for Bar {
    fn from(a: PolygonAgg) -> Self {
        // Render epoch millis to RFC 3339 so downstream age checks see the
        // same timestamp format both providers use.
        let timestamp = Utc
            .timestamp_millis_opt(a.timestamp_ms)
            .single()
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        Bar {
            timestamp,
            open: a.open,
            high: a.high,
            low: a.low,
            close: a.close,
            volume: a.volume,
        }
    }
}

/// Aggregates response envelope.
#[derive(Debug, Deserialize)]
pub struct AggsResponse {
    pub status: Option<String>,
    #[serde(default)]
    pub results: Vec<PolygonAgg>,
    #[serde(rename = "resultsCount", default)]
    pub results_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aggs_response() {
        let json = r#"{
            "status": "OK",
            "resultsCount": 2,
            "results": [
                {"o": 42000.0, "h": 42100.0, "l": 41900.0, "c": 42050.0, "v": 12.5, "t": 1735912800000},
                {"o": 42050.0, "h": 42200.0, "l": 42000.0, "c": 42150.0, "v": 9.1, "t": 1735912860000}
            ]
        }"#;
        let parsed: AggsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results_count, 2);
        let bar: Bar = parsed.results[0].clone().into();
        assert!(bar.is_valid());
        assert!(bar.timestamp.starts_with("2025-01-03T"));
    }
}
