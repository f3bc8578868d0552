//! Exit target computation with the clamped price-buffer policy.
//!
//! The stop distance is the larger of the per-trade risk amount and a
//! price-proportional buffer clamped to [min, max], floored by the absolute
//! dollar buffer. Take-profit either uses a fixed percentage or the
//! risk/reward ratio against the risk amount.

use crate::config::RiskConfig;
use crate::types::{ExitTargets, Side};

/// Compute stop-loss and take-profit for an entry at `entry`.
/// `risk_amount` is the per-share risk (one ATR by default).
pub fn compute_exit_targets(
    side: Side,
    entry: f64,
    risk_amount: f64,
    config: &RiskConfig,
) -> ExitTargets {
    let price_buffer = (entry * config.price_buffer_pct)
        .clamp(config.min_price_buffer, config.max_price_buffer);
    let effective_buffer = risk_amount.max(price_buffer);
    let stop_buffer = effective_buffer.max(config.stop_loss_buffer_amount_dollars);

    let take_profit_distance = if config.use_take_profit_percentage {
        entry * config.take_profit_pct
    } else {
        config.rr_ratio * risk_amount
    };

    match side {
        Side::Buy => ExitTargets {
            stop_loss: entry - stop_buffer,
            take_profit: entry + take_profit_distance,
        },
        Side::Sell => ExitTargets {
            stop_loss: entry + stop_buffer,
            take_profit: entry - take_profit_distance,
        },
    }
}
