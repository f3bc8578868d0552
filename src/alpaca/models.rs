//! Alpaca API data models.
//!
//! Request and response types for the Alpaca Trading and Market Data APIs.
//! Alpaca encodes most numeric account fields as JSON strings; the helpers
//! here parse them defensively.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::Bar;

fn parse_num(raw: &Option<String>) -> f64 {
    raw.as_deref()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

// ============================================================================
// Market Data
// ============================================================================

/// A single bar from the market-data API.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaBar {
    #[serde(rename = "t")]
    pub timestamp: String,
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: f64,
}

impl From<AlpacaBar> for Bar {
    fn from(b: AlpacaBar) -> Self {
        Bar {
            timestamp: b.timestamp,
            open: b.open,
            high: b.high,
            low: b.low,
            close: b.close,
            volume: b.volume,
        }
    }
}

/// Response from the bars endpoint. Alpaca returns either a `bars` array
/// (single-symbol endpoint) or a symbol-keyed map (multi-symbol endpoint);
/// we only use the former.
#[derive(Debug, Deserialize)]
pub struct BarsResponse {
    #[serde(default)]
    pub bars: Vec<AlpacaBar>,
    pub next_page_token: Option<String>,
}

/// Latest-quote payload.
#[derive(Debug, Deserialize)]
pub struct QuoteResponse {
    pub quote: AlpacaQuote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaQuote {
    #[serde(rename = "t")]
    pub timestamp: String,
    #[serde(rename = "bp")]
    pub bid_price: f64,
    #[serde(rename = "ap")]
    pub ask_price: f64,
    #[serde(rename = "bs", default)]
    pub bid_size: f64,
    #[serde(rename = "as", default)]
    pub ask_size: f64,
}

// ============================================================================
// Account
// ============================================================================

/// Account state from `/v2/account`. Numeric fields arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaAccount {
    pub id: String,
    pub status: String,
    pub equity: Option<String>,
    pub buying_power: Option<String>,
    pub cash: Option<String>,
    #[serde(default)]
    pub trading_blocked: bool,
}

impl AlpacaAccount {
    pub fn equity_f64(&self) -> f64 {
        parse_num(&self.equity)
    }

    pub fn buying_power_f64(&self) -> f64 {
        parse_num(&self.buying_power)
    }
}

/// One open position from `/v2/positions`.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaPosition {
    pub symbol: String,
    /// Signed share count as a string; negative for shorts.
    pub qty: Option<String>,
    pub side: Option<String>,
    pub market_value: Option<String>,
    pub unrealized_pl: Option<String>,
}

impl AlpacaPosition {
    pub fn qty_i64(&self) -> i64 {
        self.qty
            .as_deref()
            .and_then(|s| s.parse::<f64>().ok())
            .map(|q| q.trunc() as i64)
            .unwrap_or(0)
    }

    pub fn market_value_f64(&self) -> f64 {
        parse_num(&self.market_value)
    }

    pub fn unrealized_pl_f64(&self) -> f64 {
        parse_num(&self.unrealized_pl)
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Market clock from `/v2/clock`.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketClock {
    pub is_open: bool,
    /// RFC 3339 timestamp of the next session open.
    pub next_open: String,
    /// RFC 3339 timestamp of the next session close.
    pub next_close: String,
}

// ============================================================================
// Orders
// ============================================================================

/// Order placement request. `order_class = "bracket"` attaches the
/// take-profit and stop-loss legs atomically.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub time_in_force: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<TakeProfitSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLossSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TakeProfitSpec {
    pub limit_price: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopLossSpec {
    pub stop_price: String,
}

/// Subset of the order object we care about after submission.
#[derive(Debug, Clone, Deserialize)]
pub struct AlpacaOrder {
    pub id: String,
    pub status: String,
    pub symbol: String,
    #[serde(default)]
    pub side: String,
    pub qty: Option<String>,
    pub filled_qty: Option<String>,
}

/// Format a price for the order body: Alpaca wants <= 2 decimals above $1.
pub fn format_price(price: f64) -> String {
    format!("{:.2}", price)
}

/// Render an order request for the generic `place_order(order_json)` seam.
pub fn order_to_json(request: &PlaceOrderRequest) -> serde_json::Value {
    serde_json::to_value(request).unwrap_or_else(|_| serde_json::json!({}))
}

/// Substitute `{placeholder}` tokens in a URL template.
pub fn fill_template(template: &str, values: &HashMap<&str, String>) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bars_response() {
        let json = r#"{
            "bars": [
                {"t": "2025-01-03T14:30:00Z", "o": 100.0, "h": 101.5, "l": 99.9, "c": 101.2, "v": 1500}
            ],
            "next_page_token": null
        }"#;
        let parsed: BarsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.bars.len(), 1);
        let bar: Bar = parsed.bars[0].clone().into();
        assert_eq!(bar.close, 101.2);
        assert!(bar.is_valid());
    }

    #[test]
    fn parses_string_numerics() {
        let json = r#"{
            "id": "acct-1",
            "status": "ACTIVE",
            "equity": "100000.55",
            "buying_power": "200000",
            "cash": "50000"
        }"#;
        let account: AlpacaAccount = serde_json::from_str(json).unwrap();
        assert_eq!(account.equity_f64(), 100000.55);
        assert_eq!(account.buying_power_f64(), 200000.0);
        assert!(!account.trading_blocked);
    }

    #[test]
    fn parses_short_position() {
        let json = r#"{
            "symbol": "AAPL",
            "qty": "-25",
            "side": "short",
            "market_value": "-2500.00",
            "unrealized_pl": "12.50"
        }"#;
        let position: AlpacaPosition = serde_json::from_str(json).unwrap();
        assert_eq!(position.qty_i64(), -25);
        assert_eq!(position.market_value_f64(), -2500.0);
    }

    #[test]
    fn bracket_order_serialization() {
        let request = PlaceOrderRequest {
            symbol: "AAPL".to_string(),
            qty: "10".to_string(),
            side: "buy".to_string(),
            order_type: "market".to_string(),
            time_in_force: "day".to_string(),
            order_class: Some("bracket".to_string()),
            take_profit: Some(TakeProfitSpec {
                limit_price: format_price(103.2),
            }),
            stop_loss: Some(StopLossSpec {
                stop_price: format_price(100.0),
            }),
            client_order_id: Some("bt-test".to_string()),
        };
        let json = order_to_json(&request);
        assert_eq!(json["order_class"], "bracket");
        assert_eq!(json["take_profit"]["limit_price"], "103.20");
        assert_eq!(json["stop_loss"]["stop_price"], "100.00");

        // Plain market order omits the bracket legs entirely.
        let plain = PlaceOrderRequest {
            order_class: None,
            take_profit: None,
            stop_loss: None,
            ..request
        };
        let json = order_to_json(&plain);
        assert!(json.get("take_profit").is_none());
    }

    #[test]
    fn template_substitution() {
        let mut values = HashMap::new();
        values.insert("symbol", "AAPL".to_string());
        values.insert("limit", "30".to_string());
        let url = fill_template("/v2/stocks/{symbol}/bars?limit={limit}", &values);
        assert_eq!(url, "/v2/stocks/AAPL/bars?limit=30");
    }
}
