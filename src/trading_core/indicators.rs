//! Pure technical indicators: ATR, average volume, doji detection.
//!
//! All functions are total over their inputs; insufficient history returns a
//! sentinel (0 for ATR) rather than an error, so the decision stage can tell
//! "warming up" from "broken data".

/// Average True Range over the last `min(period, len - 1)` true-range values.
///
/// Returns 0.0 when fewer than `min_bars` bars are available. As bars
/// accumulate the window grows toward `period`, so ATR ramps up smoothly
/// instead of flipping between 0 and the full-period value.
pub fn compute_atr(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    min_bars: usize,
) -> f64 {
    let len = highs.len().min(lows.len()).min(closes.len());
    if len < min_bars || len < 2 || period == 0 {
        return 0.0;
    }

    let window = period.min(len - 1);
    let start = len - window;

    let mut sum = 0.0;
    for i in start..len {
        let prev_close = closes[i - 1];
        let tr = (highs[i] - lows[i])
            .max((highs[i] - prev_close).abs())
            .max((lows[i] - prev_close).abs());
        sum += tr;
    }
    sum / window as f64
}

/// Arithmetic mean of the last `period` volumes.
///
/// Returns `minimum_threshold` when the mean would be zero, so downstream
/// volume ratios never divide by zero.
pub fn compute_average_volume(volumes: &[f64], period: usize, minimum_threshold: f64) -> f64 {
    if volumes.is_empty() || period == 0 {
        return minimum_threshold;
    }
    let window = period.min(volumes.len());
    let start = volumes.len() - window;
    let mean = volumes[start..].iter().sum::<f64>() / window as f64;
    if mean > 0.0 {
        mean
    } else {
        minimum_threshold
    }
}

/// Doji: combined wick length exceeds the candle body. A candle with no
/// body at all (open == close) is a doji regardless of its wicks.
pub fn detect_doji(open: f64, high: f64, low: f64, close: f64) -> bool {
    let body = (close - open).abs();
    if body == 0.0 {
        return true;
    }
    let upper = high - open.max(close);
    let lower = open.min(close) - low;
    upper + lower > body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atr_zero_below_min_bars() {
        let h = [101.0, 102.0];
        let l = [99.0, 100.0];
        let c = [100.0, 101.0];
        assert_eq!(compute_atr(&h, &l, &c, 14, 5), 0.0);
    }

    #[test]
    fn atr_of_identical_bars_is_range() {
        // Identical OHLC bars: TR = high - low for every bar.
        let h = vec![101.0; 20];
        let l = vec![99.0; 20];
        let c = vec![100.0; 20];
        let atr = compute_atr(&h, &l, &c, 14, 2);
        assert!((atr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn atr_of_flat_prices_is_zero() {
        // Degenerate flat candles: every TR is 0.
        let p = vec![100.0; 20];
        assert_eq!(compute_atr(&p, &p, &p, 14, 2), 0.0);
    }

    #[test]
    fn atr_ramps_up_with_accumulation() {
        // With fewer bars than the period, the window is len - 1 and grows.
        let h = vec![101.0; 5];
        let l = vec![99.0; 5];
        let c = vec![100.0; 5];
        let short = compute_atr(&h, &l, &c, 14, 2);
        assert!((short - 2.0).abs() < 1e-9); // window of 4 TRs, all 2.0
    }

    #[test]
    fn atr_uses_gap_true_range() {
        // Gap up: |high - prev_close| dominates high - low.
        let h = [100.5, 105.0];
        let l = [99.5, 104.0];
        let c = [100.0, 104.5];
        let atr = compute_atr(&h, &l, &c, 14, 2);
        assert!((atr - 5.0).abs() < 1e-9); // max(1.0, |105-100|, |104-100|)
    }

    #[test]
    fn average_volume_basic() {
        let v = [100.0, 200.0, 300.0];
        assert!((compute_average_volume(&v, 2, 1.0) - 250.0).abs() < 1e-9);
        assert!((compute_average_volume(&v, 10, 1.0) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn average_volume_zero_floors_to_threshold() {
        let zeros = [0.0; 8];
        assert_eq!(compute_average_volume(&zeros, 5, 42.0), 42.0);
        assert_eq!(compute_average_volume(&[], 5, 42.0), 42.0);
    }

    #[test]
    fn doji_detection() {
        // Small body with long wicks is a doji.
        assert!(detect_doji(100.0, 100.4, 99.6, 100.02));
        // Strong-bodied candle is not.
        assert!(!detect_doji(100.0, 101.5, 99.9, 101.2));
    }

    #[test]
    fn doji_degenerate_candles() {
        // open == close: no body at all.
        assert!(detect_doji(100.0, 100.1, 99.9, 100.0));
        assert!(detect_doji(100.0, 100.0, 100.0, 100.0));
    }
}
