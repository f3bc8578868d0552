//! Account state caching and retrieval.
//!
//! Wraps the provider's account, position and order endpoints behind a small
//! cache so a transient fetch failure degrades to slightly stale data instead
//! of aborting the cycle. Equity as seen at startup is pinned as the daily
//! P&L baseline.

use std::sync::Mutex;
use std::time::Instant;

use tracing::{debug, warn};

use crate::api::ApiManager;
use crate::errors::ProviderError;
use crate::types::{AccountSnapshot, PositionDetails};

#[derive(Debug, Default, Clone)]
struct CachedAccount {
    snapshot: AccountSnapshot,
    has_data: bool,
}

/// Fetches and caches equity, buying power, position and open order counts.
pub struct AccountManager {
    symbol: String,
    cache: Mutex<CachedAccount>,
    last_fetch: Mutex<Option<Instant>>,
    /// Equity observed on the first successful fetch; the risk manager's
    /// daily-loss baseline.
    initial_equity: Mutex<Option<f64>>,
}

impl AccountManager {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            cache: Mutex::new(CachedAccount::default()),
            last_fetch: Mutex::new(None),
            initial_equity: Mutex::new(None),
        }
    }

    /// Fetch a fresh snapshot from the provider and update the cache.
    pub fn fetch_snapshot(&self, api: &ApiManager) -> Result<AccountSnapshot, ProviderError> {
        let account = api.get_account()?;
        let equity = account.equity_f64();
        let buying_power = account.buying_power_f64();

        let position = match api.get_position(&self.symbol) {
            Ok(Some(p)) => PositionDetails {
                quantity: p.qty_i64(),
                unrealized_pnl: p.unrealized_pl_f64(),
                market_value: p.market_value_f64(),
            },
            Ok(None) => PositionDetails::default(),
            Err(e) => {
                // A position fetch failure should not wipe a known position;
                // reuse the cached one.
                warn!("position fetch failed, using cached: {}", e);
                self.cache.lock().unwrap().snapshot.position
            }
        };

        let open_order_count = match api.get_open_orders() {
            Ok(orders) => orders.len() as u32,
            Err(e) => {
                warn!("open-orders fetch failed, using cached count: {}", e);
                self.cache.lock().unwrap().snapshot.open_order_count
            }
        };

        let snapshot = AccountSnapshot {
            equity,
            buying_power,
            position,
            open_order_count,
            trading_blocked: account.trading_blocked,
        };

        {
            let mut initial = self.initial_equity.lock().unwrap();
            if initial.is_none() && equity > 0.0 {
                debug!("pinning initial equity at {:.2}", equity);
                *initial = Some(equity);
            }
        }
        *self.cache.lock().unwrap() = CachedAccount {
            snapshot: snapshot.clone(),
            has_data: true,
        };
        *self.last_fetch.lock().unwrap() = Some(Instant::now());

        Ok(snapshot)
    }

    /// Last good snapshot, if any fetch has ever succeeded.
    pub fn cached_snapshot(&self) -> Option<AccountSnapshot> {
        let cache = self.cache.lock().unwrap();
        cache.has_data.then(|| cache.snapshot.clone())
    }

    /// Equity at the first successful fetch (the daily P&L baseline).
    pub fn initial_equity(&self) -> Option<f64> {
        *self.initial_equity.lock().unwrap()
    }

    /// Seconds since the last successful fetch, `None` if never fetched.
    pub fn seconds_since_fetch(&self) -> Option<f64> {
        self.last_fetch
            .lock()
            .unwrap()
            .map(|at| at.elapsed().as_secs_f64())
    }

    /// Re-read just the position from the provider (used by the executor's
    /// settlement verification loop).
    pub fn refresh_position(&self, api: &ApiManager) -> Result<PositionDetails, ProviderError> {
        let position = match api.get_position(&self.symbol)? {
            Some(p) => PositionDetails {
                quantity: p.qty_i64(),
                unrealized_pnl: p.unrealized_pl_f64(),
                market_value: p.market_value_f64(),
            },
            None => PositionDetails::default(),
        };
        self.cache.lock().unwrap().snapshot.position = position;
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_no_cache() {
        let manager = AccountManager::new("AAPL");
        assert!(manager.cached_snapshot().is_none());
        assert!(manager.initial_equity().is_none());
        assert!(manager.seconds_since_fetch().is_none());
    }
}
