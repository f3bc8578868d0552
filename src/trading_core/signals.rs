//! Candlestick signal evaluation.
//!
//! Pure scoring over the current/previous bar pair: a base price pattern
//! earns the pattern weight, then momentum, volume and volatility each add
//! their weight when their threshold is cleared. A side fires when its total
//! reaches the strength threshold; if both fire, the stronger side wins and
//! the other is discarded.

use crate::config::StrategyConfig;
use crate::trading_core::indicators::detect_doji;
use crate::types::{FilterResult, ProcessedData, SignalDecision};

/// Momentum metrics shared by both sides of the evaluation.
#[derive(Debug, Clone, Copy)]
struct Metrics {
    price_change_pct: f64,
    volume_change_pct: f64,
    volatility_pct: f64,
}

fn compute_metrics(data: &ProcessedData) -> Metrics {
    let curr = &data.market.current_bar;
    let prev = &data.market.previous_bar;

    let price_change_pct = if prev.close > 0.0 {
        (curr.close - prev.close) / prev.close * 100.0
    } else {
        0.0
    };
    let volume_change_pct = if prev.volume > 0.0 {
        (curr.volume - prev.volume) / prev.volume * 100.0
    } else {
        0.0
    };
    let volatility_pct = if prev.close > 0.0 {
        data.market.atr / prev.close * 100.0
    } else {
        0.0
    };

    Metrics {
        price_change_pct,
        volume_change_pct,
        volatility_pct,
    }
}

fn buy_pattern(data: &ProcessedData, config: &StrategyConfig) -> bool {
    let curr = &data.market.current_bar;
    let prev = &data.market.previous_bar;

    let body_ok = if config.allow_equal_close_open {
        curr.close >= curr.open
    } else {
        curr.close > curr.open
    };
    let higher_high_ok = !config.require_higher_high || curr.high > prev.high;
    let higher_low_ok = !config.require_higher_low || curr.low >= prev.low;

    body_ok && higher_high_ok && higher_low_ok
}

fn sell_pattern(data: &ProcessedData, config: &StrategyConfig) -> bool {
    let curr = &data.market.current_bar;
    let prev = &data.market.previous_bar;

    let body_ok = if config.allow_equal_close_open {
        curr.close <= curr.open
    } else {
        curr.close < curr.open
    };
    let lower_low_ok = !config.require_higher_high || curr.low < prev.low;
    let lower_high_ok = !config.require_higher_low || curr.high <= prev.high;

    body_ok && lower_low_ok && lower_high_ok
}

fn score_side(is_buy: bool, metrics: Metrics, config: &StrategyConfig) -> (f64, Vec<&'static str>) {
    let mut score = config.basic_price_pattern_weight;
    let mut parts = vec!["pattern"];

    let momentum_ok = if is_buy {
        metrics.price_change_pct > config.minimum_price_change_pct_for_momentum
    } else {
        metrics.price_change_pct < -config.minimum_price_change_pct_for_momentum
    };
    if momentum_ok {
        score += config.momentum_indicator_weight;
        parts.push("momentum");
    }

    let vol_threshold = if is_buy {
        config.minimum_volume_increase_pct_for_buy
    } else {
        config.minimum_volume_increase_pct_for_sell
    };
    if metrics.volume_change_pct > vol_threshold {
        score += config.volume_analysis_weight;
        parts.push("volume");
    }

    let volatility_threshold = if is_buy {
        config.minimum_volatility_pct_for_buy
    } else {
        config.minimum_volatility_pct_for_sell
    };
    if metrics.volatility_pct > volatility_threshold {
        score += config.volatility_analysis_weight;
        parts.push("volatility");
    }

    (score, parts)
}

/// Evaluate the entry signal. Guarantees `!(buy && sell)`.
pub fn evaluate_signal(data: &ProcessedData, config: &StrategyConfig) -> SignalDecision {
    let metrics = compute_metrics(data);

    let buy_score = buy_pattern(data, config).then(|| score_side(true, metrics, config));
    let sell_score = sell_pattern(data, config).then(|| score_side(false, metrics, config));

    let threshold = config.minimum_signal_strength_threshold;
    let mut decision = SignalDecision::default();

    match (buy_score, sell_score) {
        (Some((b, b_parts)), Some((s, s_parts))) => {
            // Both patterns held (possible with permissive pattern flags);
            // keep the stronger side only.
            if b >= s {
                decision.buy = b >= threshold;
                decision.signal_strength = b;
                decision.reason = format!("buy: {}", b_parts.join("+"));
            } else {
                decision.sell = s >= threshold;
                decision.signal_strength = s;
                decision.reason = format!("sell: {}", s_parts.join("+"));
            }
        }
        (Some((b, parts)), None) => {
            decision.buy = b >= threshold;
            decision.signal_strength = b;
            decision.reason = format!("buy: {}", parts.join("+"));
        }
        (None, Some((s, parts))) => {
            decision.sell = s >= threshold;
            decision.signal_strength = s;
            decision.reason = format!("sell: {}", parts.join("+"));
        }
        (None, None) => {
            decision.reason = "no pattern".to_string();
        }
    }
    decision
}

/// Evaluate the ATR / volume / doji entry filters.
pub fn evaluate_filters(data: &ProcessedData, config: &StrategyConfig) -> FilterResult {
    let market = &data.market;
    let curr = &market.current_bar;

    let atr_pass = if config.use_atr_absolute_threshold {
        market.atr > config.atr_absolute_minimum_threshold
    } else {
        market.atr > config.entry_signal_atr_multiplier * market.avg_atr
    };
    let vol_pass = curr.volume > config.entry_signal_volume_multiplier * market.avg_volume;
    let doji_pass = !detect_doji(curr.open, curr.high, curr.low, curr.close);

    FilterResult {
        atr_pass,
        vol_pass,
        doji_pass,
        all_pass: atr_pass && vol_pass && doji_pass,
        atr_ratio: if market.avg_atr > 0.0 {
            market.atr / market.avg_atr
        } else {
            0.0
        },
        vol_ratio: if market.avg_volume > 0.0 {
            curr.volume / market.avg_volume
        } else {
            0.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;
    use crate::types::{Bar, MarketSnapshot};

    fn bar(o: f64, h: f64, l: f64, c: f64, v: f64) -> Bar {
        Bar {
            timestamp: "2025-01-03T14:30:00Z".to_string(),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
        }
    }

    /// The bullish-entry scenario: strong candle, rising volume, elevated ATR.
    fn bullish_data() -> ProcessedData {
        ProcessedData {
            market: MarketSnapshot {
                atr: 1.0,
                avg_atr: 0.8,
                avg_volume: 900.0,
                current_bar: bar(100.0, 101.5, 99.9, 101.2, 1500.0),
                previous_bar: bar(99.5, 100.2, 99.3, 100.0, 1000.0),
                oldest_bar_timestamp: "2025-01-03T14:00:00Z".to_string(),
            },
            ..Default::default()
        }
    }

    fn strategy() -> crate::config::StrategyConfig {
        test_config().strategy
    }

    #[test]
    fn bullish_entry_scores_full_strength() {
        let decision = evaluate_signal(&bullish_data(), &strategy());
        assert!(decision.buy);
        assert!(!decision.sell);
        // 0.3 pattern + 0.3 momentum (+1.2%) + 0.2 volume (+50%) + 0.2 volatility (1%)
        assert!((decision.signal_strength - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bullish_entry_passes_all_filters() {
        let filters = evaluate_filters(&bullish_data(), &strategy());
        assert!(filters.atr_pass); // 1.0 > 1.0 * 0.8
        assert!(filters.vol_pass); // 1500 > 1.0 * 900
        assert!(filters.doji_pass);
        assert!(filters.all_pass);
        assert!((filters.atr_ratio - 1.25).abs() < 1e-9);
    }

    #[test]
    fn doji_vetoes_entry() {
        let mut data = bullish_data();
        data.market.current_bar = bar(100.0, 100.4, 99.6, 100.02, 1500.0);
        let filters = evaluate_filters(&data, &strategy());
        assert!(!filters.doji_pass);
        assert!(!filters.all_pass);
    }

    #[test]
    fn bearish_mirror_fires_sell() {
        let mut data = bullish_data();
        data.market.current_bar = bar(100.0, 100.1, 98.5, 98.8, 1500.0);
        data.market.previous_bar = bar(100.5, 101.0, 100.2, 100.4, 1000.0);
        let decision = evaluate_signal(&data, &strategy());
        assert!(decision.sell);
        assert!(!decision.buy);
    }

    #[test]
    fn never_both_sides() {
        // Flat candle with permissive flags makes both patterns hold.
        let mut config = strategy();
        config.allow_equal_close_open = true;
        config.require_higher_high = false;
        config.require_higher_low = false;
        let mut data = bullish_data();
        data.market.current_bar = bar(100.0, 100.5, 99.5, 100.0, 1500.0);
        let decision = evaluate_signal(&data, &config);
        assert!(!(decision.buy && decision.sell));
    }

    #[test]
    fn weak_signal_below_threshold() {
        let mut data = bullish_data();
        // Up candle but no momentum, volume or volatility support.
        data.market.current_bar = bar(100.0, 100.31, 99.95, 100.01, 900.0);
        data.market.previous_bar = bar(99.9, 100.3, 99.8, 100.0, 1000.0);
        data.market.atr = 0.2;
        let decision = evaluate_signal(&data, &strategy());
        assert!(!decision.buy);
        assert!(decision.signal_strength < 0.5);
    }

    #[test]
    fn absolute_atr_threshold_mode() {
        let mut config = strategy();
        config.use_atr_absolute_threshold = true;
        config.atr_absolute_minimum_threshold = 2.0;
        let filters = evaluate_filters(&bullish_data(), &config);
        assert!(!filters.atr_pass); // atr 1.0 <= 2.0 absolute floor
    }

    #[test]
    fn zero_atr_warmup_fails_relative_filter() {
        let mut data = bullish_data();
        data.market.atr = 0.0;
        data.market.avg_atr = 0.0;
        let filters = evaluate_filters(&data, &strategy());
        // 0 > 1.0 * 0 is false: warm-up blocks entry at the filter stage.
        assert!(!filters.atr_pass);
        assert_eq!(filters.atr_ratio, 0.0);
    }
}
