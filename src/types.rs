//! Core data model shared across the pipeline.
//!
//! Snapshots flow one way: provider bars -> `MarketSnapshot`, broker account
//! state -> `AccountSnapshot`, and the trader worker joins the two into a
//! `ProcessedData` view for the decision engine.

use serde::{Deserialize, Serialize};

/// A finite-duration OHLCV candle. Timestamps stay vendor-formatted
/// (RFC 3339) and are parsed only where age checks need them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// OHLC sanity: finite, strictly positive prices and no inversions.
    pub fn is_valid(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return false;
        }
        self.high >= self.low && self.high >= self.close && self.low <= self.close
    }
}

/// Top-of-book quote with a mid price.
#[derive(Debug, Clone, Default)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub bid_size: f64,
    pub ask_size: f64,
    pub timestamp: String,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn is_valid(&self) -> bool {
        self.mid() > 0.0 && chrono::DateTime::parse_from_rfc3339(&self.timestamp).is_ok()
    }
}

/// Broker-side position for the traded symbol.
/// Quantity is signed: positive long, negative short, zero flat.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionDetails {
    pub quantity: i64,
    pub unrealized_pnl: f64,
    pub market_value: f64,
}

impl PositionDetails {
    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }
}

/// Validated market view published by the market worker.
///
/// `atr == 0.0` is legal during warm-up: it means not enough bars have
/// accumulated yet, and the decision stage (not validation) blocks trading.
#[derive(Debug, Clone, Default)]
pub struct MarketSnapshot {
    pub atr: f64,
    pub avg_atr: f64,
    pub avg_volume: f64,
    pub current_bar: Bar,
    pub previous_bar: Bar,
    /// Timestamp of the oldest bar in the window, for accumulation-time checks.
    pub oldest_bar_timestamp: String,
}

/// Account view published by the account worker.
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    pub equity: f64,
    pub buying_power: f64,
    pub position: PositionDetails,
    pub open_order_count: u32,
    /// Broker-side trading block flag; no entries while set.
    pub trading_blocked: bool,
}

impl AccountSnapshot {
    /// Exposure as a percentage of equity. Zero when equity is unusable.
    pub fn exposure_pct(&self) -> f64 {
        if self.equity <= 0.0 {
            return 0.0;
        }
        self.position.market_value.abs() / self.equity * 100.0
    }
}

/// Union of the two snapshots handed to the decision engine.
#[derive(Debug, Clone, Default)]
pub struct ProcessedData {
    pub market: MarketSnapshot,
    pub account: AccountSnapshot,
}

/// Which side of the market a signal points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Output of the signal evaluator. Never `buy && sell`; on a tie the
/// stronger side wins.
#[derive(Debug, Clone, Default)]
pub struct SignalDecision {
    pub buy: bool,
    pub sell: bool,
    /// Accumulated score in [0, 1].
    pub signal_strength: f64,
    pub reason: String,
}

impl SignalDecision {
    pub fn side(&self) -> Option<Side> {
        match (self.buy, self.sell) {
            (true, false) => Some(Side::Buy),
            (false, true) => Some(Side::Sell),
            _ => None,
        }
    }
}

/// Filter gate results plus ratio diagnostics for the log.
#[derive(Debug, Clone, Default)]
pub struct FilterResult {
    pub atr_pass: bool,
    pub vol_pass: bool,
    pub doji_pass: bool,
    pub all_pass: bool,
    /// atr / avg_atr (0 when avg_atr is 0).
    pub atr_ratio: f64,
    /// current volume / avg_volume (0 when avg_volume is 0).
    pub vol_ratio: f64,
}

/// Final quantity plus the four per-cap quantities for observability.
#[derive(Debug, Clone, Default)]
pub struct PositionSizing {
    pub quantity: i64,
    pub risk_based_qty: i64,
    pub exposure_based_qty: i64,
    pub max_value_qty: i64,
    pub buying_power_qty: i64,
    pub risk_amount: f64,
}

/// Stop-loss / take-profit pair for a bracket order.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitTargets {
    pub stop_loss: f64,
    pub take_profit: f64,
}

/// Trading mode selects the market-data provider and session behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    Stocks,
    Crypto,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stocks => write!(f, "stocks"),
            Self::Crypto => write!(f, "crypto"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(o: f64, h: f64, l: f64, c: f64) -> Bar {
        Bar {
            timestamp: "2025-01-03T14:30:00Z".to_string(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 1000.0,
        }
    }

    #[test]
    fn valid_bar_passes() {
        assert!(bar(100.0, 101.5, 99.9, 101.2).is_valid());
    }

    #[test]
    fn inverted_ohlc_fails() {
        assert!(!bar(100.0, 99.0, 99.5, 99.2).is_valid()); // high < low
        assert!(!bar(100.0, 100.5, 99.5, 101.0).is_valid()); // close > high
        assert!(!bar(100.0, 100.5, 99.5, 99.0).is_valid()); // close < low
    }

    #[test]
    fn non_finite_or_non_positive_fails() {
        assert!(!bar(f64::NAN, 101.0, 99.0, 100.0).is_valid());
        assert!(!bar(100.0, f64::INFINITY, 99.0, 100.0).is_valid());
        assert!(!bar(0.0, 101.0, 99.0, 100.0).is_valid());
        assert!(!bar(100.0, 101.0, -1.0, 100.0).is_valid());
    }

    #[test]
    fn quote_validity() {
        let q = Quote {
            bid: 99.9,
            ask: 100.1,
            bid_size: 100.0,
            ask_size: 200.0,
            timestamp: "2025-01-03T14:30:00Z".to_string(),
        };
        assert!((q.mid() - 100.0).abs() < 1e-9);
        assert!(q.is_valid());

        let bad_ts = Quote {
            timestamp: "yesterday".to_string(),
            ..q.clone()
        };
        assert!(!bad_ts.is_valid());
    }

    #[test]
    fn exposure_pct() {
        let acct = AccountSnapshot {
            equity: 100_000.0,
            buying_power: 100_000.0,
            position: PositionDetails {
                quantity: -50,
                unrealized_pnl: 0.0,
                market_value: -5_000.0,
            },
            open_order_count: 0,
            trading_blocked: false,
        };
        assert!((acct.exposure_pct() - 5.0).abs() < 1e-9);

        let zero_equity = AccountSnapshot { equity: 0.0, ..acct };
        assert_eq!(zero_equity.exposure_pct(), 0.0);
    }

    #[test]
    fn decision_side() {
        let d = SignalDecision {
            buy: true,
            ..Default::default()
        };
        assert_eq!(d.side(), Some(Side::Buy));
        let none = SignalDecision::default();
        assert_eq!(none.side(), None);
    }
}
