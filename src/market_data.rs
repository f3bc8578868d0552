//! Market data pipeline: fetch bars, validate, compute indicators, assemble
//! the `MarketSnapshot`.
//!
//! Validation policy: a fetch with too few bars, or any bar failing the OHLC
//! invariants, discards the whole batch and leaves the previous snapshot in
//! place. A zero ATR during warm-up is not a validation failure; it flows
//! through and blocks trading at the decision stage instead.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::account::AccountManager;
use crate::api::ApiManager;
use crate::config::Config;
use crate::errors::ProviderError;
use crate::trading_core::indicators::{compute_atr, compute_average_volume};
use crate::types::{Bar, MarketSnapshot, ProcessedData};

/// Why a fetched batch of bars was rejected.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Bars validated and a snapshot was assembled.
    Processed(Box<ProcessedData>),
    /// Batch discarded; the prior snapshot stays in effect.
    Rejected(String),
}

pub struct MarketDataManager {
    config: Arc<Config>,
}

impl MarketDataManager {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Fetch bars for `symbol`, validate, compute indicators and join with
    /// the account snapshot.
    pub fn fetch_and_process(
        &self,
        api: &ApiManager,
        accounts: &AccountManager,
        symbol: &str,
    ) -> Result<FetchOutcome, ProviderError> {
        let want = self.config.strategy.bars_to_fetch_for_calculations;
        let bars = api.get_recent_bars(symbol, want)?;

        let snapshot = match self.create_snapshot_from_bars(&bars) {
            Ok(s) => s,
            Err(reason) => {
                warn!("bar batch rejected: {}", reason);
                return Ok(FetchOutcome::Rejected(reason));
            }
        };

        // Account side: prefer a fresh fetch, fall back to cache so a broker
        // hiccup does not discard good market data.
        let account = match accounts.fetch_snapshot(api) {
            Ok(a) => a,
            Err(e) => match accounts.cached_snapshot() {
                Some(cached) => {
                    warn!("account fetch failed, using cached snapshot: {}", e);
                    cached
                }
                None => return Err(e),
            },
        };

        debug!(
            "processed {} bars: atr={:.4} avg_atr={:.4} avg_vol={:.0}",
            bars.len(),
            snapshot.atr,
            snapshot.avg_atr,
            snapshot.avg_volume
        );

        Ok(FetchOutcome::Processed(Box::new(ProcessedData {
            market: snapshot,
            account,
        })))
    }

    /// Pure snapshot assembly from a bar window (oldest first).
    pub fn create_snapshot_from_bars(&self, bars: &[Bar]) -> Result<MarketSnapshot, String> {
        let strategy = &self.config.strategy;
        let want = strategy.bars_to_fetch_for_calculations;

        if bars.len() < want {
            return Err(format!("insufficient bars: got {}, need {}", bars.len(), want));
        }
        if let Some(bad) = bars.iter().find(|b| !b.is_valid()) {
            return Err(format!(
                "invalid bar at {}: o={} h={} l={} c={}",
                bad.timestamp, bad.open, bad.high, bad.low, bad.close
            ));
        }

        let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let atr_period = strategy.atr_calculation_bars;
        let avg_period = atr_period * strategy.average_atr_comparison_multiplier;
        let min_bars = 2;

        let atr = compute_atr(&highs, &lows, &closes, atr_period, min_bars);
        let avg_atr = compute_atr(&highs, &lows, &closes, avg_period, min_bars);
        let avg_volume = compute_average_volume(
            &volumes,
            avg_period,
            strategy.minimum_average_volume_threshold,
        );

        // len >= want >= 2 guaranteed above
        let current = bars[bars.len() - 1].clone();
        let previous = bars[bars.len() - 2].clone();
        let oldest = bars[0].timestamp.clone();

        Ok(MarketSnapshot {
            atr,
            avg_atr,
            avg_volume,
            current_bar: current,
            previous_bar: previous,
            oldest_bar_timestamp: oldest,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    fn manager() -> MarketDataManager {
        MarketDataManager::new(Arc::new(test_config()))
    }

    fn trending_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.1;
                Bar {
                    timestamp: format!("2025-01-03T14:{:02}:00Z", i),
                    open: base,
                    high: base + 1.0,
                    low: base - 0.5,
                    close: base + 0.8,
                    volume: 1000.0 + i as f64 * 10.0,
                }
            })
            .collect()
    }

    #[test]
    fn snapshot_from_full_window() {
        let m = manager();
        let bars = trending_bars(30); // bars_to_fetch default is 30
        let snapshot = m.create_snapshot_from_bars(&bars).unwrap();
        assert!(snapshot.atr > 0.0);
        assert!(snapshot.avg_atr > 0.0);
        assert!(snapshot.avg_volume > 0.0);
        assert_eq!(snapshot.current_bar.timestamp, bars[29].timestamp);
        assert_eq!(snapshot.previous_bar.timestamp, bars[28].timestamp);
        assert_eq!(snapshot.oldest_bar_timestamp, bars[0].timestamp);
    }

    #[test]
    fn exactly_enough_bars_succeeds_one_fewer_fails() {
        let m = manager();
        assert!(m.create_snapshot_from_bars(&trending_bars(30)).is_ok());
        assert!(m.create_snapshot_from_bars(&trending_bars(29)).is_err());
    }

    #[test]
    fn one_bad_bar_rejects_batch() {
        let m = manager();
        let mut bars = trending_bars(30);
        bars[17].high = bars[17].low - 1.0; // inversion
        assert!(m.create_snapshot_from_bars(&bars).is_err());

        let mut bars = trending_bars(30);
        bars[5].close = f64::NAN;
        assert!(m.create_snapshot_from_bars(&bars).is_err());
    }

}
