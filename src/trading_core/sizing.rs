//! Position sizing under four independent caps.
//!
//! The final quantity is the minimum of the risk-based, exposure-based,
//! max-notional and buying-power quantities, unless the fixed-share override
//! is enabled (which skips the caps entirely).

use crate::config::RiskConfig;
use crate::types::{PositionSizing, ProcessedData, Side};

/// Compute the order quantity for a prospective entry at `price`.
pub fn compute_position_size(
    data: &ProcessedData,
    side: Side,
    price: f64,
    config: &RiskConfig,
) -> PositionSizing {
    let equity = data.account.equity;
    let risk_amount = equity * config.risk_percentage_per_trade;

    let mut sizing = PositionSizing {
        risk_amount,
        ..Default::default()
    };

    if price <= 0.0 || risk_amount <= 0.0 {
        return sizing;
    }

    // Fixed-share override skips every cap.
    if config.enable_fixed_share_quantity_per_trade {
        let mut qty = config.fixed_share_quantity_per_trade as f64;
        if config.enable_risk_based_multiplier {
            // Config validation forbids this combination; kept for safety
            // should a caller construct RiskConfig directly.
            qty *= config.risk_based_position_size_multiplier;
        }
        sizing.quantity = (qty.floor() as i64).max(1);
        return sizing;
    }

    // Risk-based cap: risk the configured equity fraction against one ATR
    // of adverse movement per share.
    let risk_per_share = data.market.atr;
    let scaling_in = config.allow_position_scaling && same_side_position(data, side);
    let size_multiplier = if scaling_in {
        config.position_scaling_multiplier
    } else {
        1.0
    };
    sizing.risk_based_qty = if risk_per_share > 0.0 {
        (risk_amount * size_multiplier / risk_per_share).floor() as i64
    } else {
        0
    };

    // Exposure cap: never exceed the configured share of equity in market
    // value, counting what is already deployed.
    let max_exposure_value = equity * config.max_account_exposure_pct / 100.0;
    let available_exposure =
        (max_exposure_value - data.account.position.market_value.abs()).max(0.0);
    sizing.exposure_based_qty = (available_exposure / price).floor() as i64;

    // Notional cap, when configured.
    sizing.max_value_qty = if config.maximum_dollar_value_per_trade > 0.0 {
        (config.maximum_dollar_value_per_trade / price).floor() as i64
    } else {
        i64::MAX
    };

    // Buying-power cap, when the broker reports buying power.
    sizing.buying_power_qty = if data.account.buying_power > 0.0 {
        (data.account.buying_power * config.buying_power_utilization_pct / price).floor() as i64
    } else {
        i64::MAX
    };

    sizing.quantity = sizing
        .risk_based_qty
        .min(sizing.exposure_based_qty)
        .min(sizing.max_value_qty)
        .min(sizing.buying_power_qty)
        .max(0);
    sizing
}

fn same_side_position(data: &ProcessedData, side: Side) -> bool {
    match side {
        Side::Buy => data.account.position.is_long(),
        Side::Sell => data.account.position.is_short(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;
    use crate::types::{AccountSnapshot, Bar, MarketSnapshot, PositionDetails};

    fn data(equity: f64, buying_power: f64, atr: f64, position_qty: i64, position_value: f64) -> ProcessedData {
        ProcessedData {
            market: MarketSnapshot {
                atr,
                avg_atr: atr,
                avg_volume: 1000.0,
                current_bar: Bar {
                    close: 100.0,
                    open: 99.5,
                    high: 100.5,
                    low: 99.0,
                    volume: 1000.0,
                    timestamp: String::new(),
                },
                previous_bar: Bar::default(),
                oldest_bar_timestamp: String::new(),
            },
            account: AccountSnapshot {
                equity,
                buying_power,
                position: PositionDetails {
                    quantity: position_qty,
                    unrealized_pnl: 0.0,
                    market_value: position_value,
                },
                open_order_count: 0,
                trading_blocked: false,
            },
        }
    }

    fn risk() -> crate::config::RiskConfig {
        test_config().risk
    }

    #[test]
    fn bullish_entry_risk_cap() {
        // Equity 100k, 1% risk, ATR 1.0 -> 1000 shares risk-based.
        let sizing = compute_position_size(&data(100_000.0, 100_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &risk());
        assert_eq!(sizing.risk_amount, 1000.0);
        assert_eq!(sizing.risk_based_qty, 1000);
        // Exposure cap (100% of equity / $100) and BP cap both allow 1000.
        assert_eq!(sizing.quantity, 1000);
        assert!(sizing.quantity <= sizing.risk_based_qty.min(sizing.exposure_based_qty));
    }

    #[test]
    fn zero_price_or_risk_returns_zero() {
        let sizing = compute_position_size(&data(100_000.0, 100_000.0, 1.0, 0, 0.0), Side::Buy, 0.0, &risk());
        assert_eq!(sizing.quantity, 0);

        let sizing = compute_position_size(&data(0.0, 100_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &risk());
        assert_eq!(sizing.quantity, 0);
    }

    #[test]
    fn fixed_share_override_is_exact() {
        let mut config = risk();
        config.enable_fixed_share_quantity_per_trade = true;
        config.fixed_share_quantity_per_trade = 7;
        let sizing = compute_position_size(&data(100_000.0, 100_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &config);
        assert_eq!(sizing.quantity, 7);

        // Clamped to at least one share.
        config.fixed_share_quantity_per_trade = 0;
        let sizing = compute_position_size(&data(100_000.0, 100_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &config);
        assert_eq!(sizing.quantity, 1);
    }

    #[test]
    fn exposure_cap_counts_existing_position() {
        let mut config = risk();
        config.max_account_exposure_pct = 10.0; // $10k max exposure
        let sizing = compute_position_size(
            &data(100_000.0, 100_000.0, 0.1, 60, 6_000.0),
            Side::Buy,
            100.0,
            &config,
        );
        // $4k headroom at $100/share.
        assert_eq!(sizing.exposure_based_qty, 40);
        assert!(sizing.quantity <= 40);
    }

    #[test]
    fn notional_cap_applies_when_set() {
        let mut config = risk();
        config.maximum_dollar_value_per_trade = 2_500.0;
        let sizing = compute_position_size(&data(100_000.0, 100_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &config);
        assert_eq!(sizing.max_value_qty, 25);
        assert_eq!(sizing.quantity, 25);
    }

    #[test]
    fn buying_power_cap_binds() {
        let sizing = compute_position_size(&data(100_000.0, 5_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &risk());
        assert_eq!(sizing.buying_power_qty, 50);
        assert_eq!(sizing.quantity, 50);
    }

    #[test]
    fn quantity_never_exceeds_any_cap() {
        let sizing = compute_position_size(&data(50_000.0, 20_000.0, 0.5, 0, 0.0), Side::Sell, 80.0, &risk());
        assert!(sizing.quantity >= 0);
        assert!(sizing.quantity <= sizing.risk_based_qty);
        assert!(sizing.quantity <= sizing.exposure_based_qty);
        assert!(sizing.quantity <= sizing.max_value_qty);
        assert!(sizing.quantity <= sizing.buying_power_qty);
    }

    #[test]
    fn scaling_in_multiplies_risk_cap_only() {
        let mut config = risk();
        config.allow_position_scaling = true;
        config.position_scaling_multiplier = 0.5;
        // Long position, buying more: multiplier applies.
        let scaled = compute_position_size(&data(100_000.0, 1_000_000.0, 1.0, 100, 10_000.0), Side::Buy, 100.0, &config);
        assert_eq!(scaled.risk_based_qty, 500);
        // Flat: no multiplier.
        let flat = compute_position_size(&data(100_000.0, 1_000_000.0, 1.0, 0, 0.0), Side::Buy, 100.0, &config);
        assert_eq!(flat.risk_based_qty, 1000);
    }

    #[test]
    fn zero_atr_gives_zero_risk_qty() {
        let sizing = compute_position_size(&data(100_000.0, 100_000.0, 0.0, 0, 0.0), Side::Buy, 100.0, &risk());
        assert_eq!(sizing.risk_based_qty, 0);
        assert_eq!(sizing.quantity, 0);
    }
}
