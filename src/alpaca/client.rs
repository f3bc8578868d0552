//! Alpaca REST client.
//!
//! Blocking HTTP client for the Alpaca Trading API (account, positions,
//! orders, clock) and Market Data API (stock bars, quotes). Credentials ride
//! in the `APCA-API-KEY-ID` / `APCA-API-SECRET-KEY` headers. Every request
//! first consults the shared `ConnectivityManager` and reports its outcome
//! back, and transient failures are retried per the provider's configured
//! retry count and rate-limit delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, warn};

use super::models::*;
use crate::config::ProviderSettings;
use crate::connectivity::ConnectivityManager;
use crate::errors::ProviderError;
use crate::types::{Bar, Quote};

/// Alpaca API client shared by the account and market workers.
pub struct AlpacaClient {
    client: Client,
    settings: ProviderSettings,
    connectivity: Arc<ConnectivityManager>,
}

impl AlpacaClient {
    pub fn new(
        settings: ProviderSettings,
        connectivity: Arc<ConnectivityManager>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ProviderError::Unavailable(format!("http client build: {e}")))?;
        Ok(Self {
            client,
            settings,
            connectivity,
        })
    }

    fn endpoint(&self, name: &str) -> Result<&str, ProviderError> {
        self.settings
            .endpoints
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| {
                ProviderError::BadRequest(format!("no endpoint template configured for '{name}'"))
            })
    }

    /// Data-plane host when configured, trading host otherwise.
    fn data_host(&self) -> &str {
        if self.settings.data_url.is_empty() {
            &self.settings.base_url
        } else {
            &self.settings.data_url
        }
    }

    /// Issue a request with connectivity gating, retries and outcome
    /// reporting. `send` is re-invoked for each attempt.
    fn with_retries<T>(
        &self,
        what: &str,
        send: impl Fn() -> Result<T, ProviderError>,
    ) -> Result<T, ProviderError> {
        if !self.connectivity.should_attempt_connection() {
            return Err(ProviderError::Unavailable(format!(
                "in backoff window, retry in {:.0}s",
                self.connectivity.seconds_until_retry()
            )));
        }

        let mut last_err = None;
        for attempt in 0..=self.settings.retry_count {
            if attempt > 0 {
                std::thread::sleep(self.settings.rate_limit_delay);
            }
            match send() {
                Ok(value) => {
                    self.connectivity.record_success();
                    return Ok(value);
                }
                Err(e) => {
                    // Every failed attempt counts toward the health status.
                    self.connectivity.record_failure();
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    warn!("{} attempt {} failed: {}", what, attempt + 1, e);
                    if matches!(e, ProviderError::RateLimit(_)) {
                        std::thread::sleep(self.settings.rate_limit_delay.max(Duration::from_secs(1)));
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable(format!("{what}: no attempts"))))
    }

    fn get_json<R: serde::de::DeserializeOwned>(&self, url: &str) -> Result<R, ProviderError> {
        let response = self
            .client
            .get(url)
            .header("APCA-API-KEY-ID", &self.settings.api_key)
            .header("APCA-API-SECRET-KEY", &self.settings.api_secret)
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Unavailable(format!("parse {url}: {e}")))
    }

    fn post_json<R: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<R, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("APCA-API-KEY-ID", &self.settings.api_key)
            .header("APCA-API-SECRET-KEY", &self.settings.api_secret)
            .header("Content-Type", "application/json")
            .json(body)
            .send()?;

        let status = response.status();
        let text = response.text().unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::from_status(status, &text));
        }
        serde_json::from_str(&text)
            .map_err(|e| ProviderError::Unavailable(format!("parse {url}: {e}")))
    }

    fn delete(&self, url: &str) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(url)
            .header("APCA-API-KEY-ID", &self.settings.api_key)
            .header("APCA-API-SECRET-KEY", &self.settings.api_secret)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProviderError::from_status(status, &body));
        }
        Ok(())
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    /// Fetch the most recent `limit` minute bars for a symbol.
    pub fn get_recent_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, ProviderError> {
        let template = self.endpoint("bars")?;
        let mut values = HashMap::new();
        values.insert("symbol", symbol.to_string());
        values.insert("limit", limit.to_string());
        let url = format!("{}{}", self.data_host(), fill_template(template, &values));

        self.with_retries("get_recent_bars", || {
            let response: BarsResponse = self.get_json(&url)?;
            debug!("fetched {} bars for {}", response.bars.len(), symbol);
            Ok(response.bars.into_iter().map(Bar::from).collect())
        })
    }

    /// Latest top-of-book quote.
    pub fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        let template = self.endpoint("quote")?;
        let mut values = HashMap::new();
        values.insert("symbol", symbol.to_string());
        let url = format!("{}{}", self.data_host(), fill_template(template, &values));

        self.with_retries("get_quote", || {
            let response: QuoteResponse = self.get_json(&url)?;
            let q = response.quote;
            Ok(Quote {
                bid: q.bid_price,
                ask: q.ask_price,
                bid_size: q.bid_size,
                ask_size: q.ask_size,
                timestamp: q.timestamp,
            })
        })
    }

    /// Current mid price, falling back to the last bar close when the book
    /// is one-sided.
    pub fn get_current_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        let quote = self.get_quote(symbol)?;
        if quote.is_valid() {
            return Ok(quote.mid());
        }
        let bars = self.get_recent_bars(symbol, 1)?;
        bars.last()
            .map(|b| b.close)
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ProviderError::Unavailable(format!("no price available for {symbol}")))
    }

    /// Market clock: open flag plus next open/close instants.
    pub fn get_clock(&self) -> Result<MarketClock, ProviderError> {
        let url = format!("{}{}", self.settings.base_url, self.endpoint("clock")?);
        self.with_retries("get_clock", || self.get_json(&url))
    }

    // ========================================================================
    // Account
    // ========================================================================

    pub fn get_account(&self) -> Result<AlpacaAccount, ProviderError> {
        let url = format!("{}{}", self.settings.base_url, self.endpoint("account")?);
        self.with_retries("get_account", || self.get_json(&url))
    }

    pub fn get_positions(&self) -> Result<Vec<AlpacaPosition>, ProviderError> {
        let url = format!("{}{}", self.settings.base_url, self.endpoint("positions")?);
        self.with_retries("get_positions", || self.get_json(&url))
    }

    /// Position for one symbol, `None` when flat.
    pub fn get_position(&self, symbol: &str) -> Result<Option<AlpacaPosition>, ProviderError> {
        let positions = self.get_positions()?;
        Ok(positions.into_iter().find(|p| p.symbol == symbol))
    }

    // ========================================================================
    // Orders
    // ========================================================================

    pub fn get_open_orders(&self) -> Result<Vec<AlpacaOrder>, ProviderError> {
        let url = format!(
            "{}{}?status=open",
            self.settings.base_url,
            self.endpoint("orders")?
        );
        self.with_retries("get_open_orders", || self.get_json(&url))
    }

    /// Submit an order from its JSON body. Broker-side rejections surface as
    /// `BadRequest` and are not retried.
    pub fn place_order(&self, order_json: &serde_json::Value) -> Result<AlpacaOrder, ProviderError> {
        let url = format!("{}{}", self.settings.base_url, self.endpoint("orders")?);
        self.with_retries("place_order", || {
            let order: AlpacaOrder = self.post_json(&url, order_json)?;
            debug!("order accepted: id={} status={}", order.id, order.status);
            Ok(order)
        })
    }

    pub fn cancel_order(&self, order_id: &str) -> Result<(), ProviderError> {
        let url = format!(
            "{}{}/{}",
            self.settings.base_url,
            self.endpoint("orders")?,
            order_id
        );
        self.with_retries("cancel_order", || self.delete(&url))
    }

    /// Close `qty` shares of an open position with a DELETE to the position
    /// endpoint (the broker emits the offsetting market order).
    pub fn close_position(&self, symbol: &str, qty: i64) -> Result<(), ProviderError> {
        let url = format!(
            "{}{}/{}?qty={}",
            self.settings.base_url,
            self.endpoint("positions")?,
            symbol,
            qty.abs()
        );
        self.with_retries("close_position", || self.delete(&url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    fn test_client() -> AlpacaClient {
        let config = test_config();
        let mut settings = config.alpaca.clone();
        settings.retry_count = 2;
        settings.rate_limit_delay = Duration::from_millis(0);
        let connectivity = Arc::new(ConnectivityManager::new(config.connectivity.clone()));
        AlpacaClient::new(settings, connectivity).unwrap()
    }

    #[test]
    fn each_failed_attempt_counts_toward_health() {
        let client = test_client();
        let result: Result<(), ProviderError> = client.with_retries("bars", || {
            Err(ProviderError::Network("connection refused".to_string()))
        });
        assert!(result.is_err());
        // retry_count = 2 means three attempts, each recorded.
        assert_eq!(client.connectivity.total_failures(), 3);
        assert_eq!(client.connectivity.consecutive_failures(), 3);
    }

    #[test]
    fn hard_errors_record_one_failure_and_stop() {
        let client = test_client();
        let attempts = std::cell::Cell::new(0u32);
        let result: Result<(), ProviderError> = client.with_retries("auth", || {
            attempts.set(attempts.get() + 1);
            Err(ProviderError::Auth("bad key".to_string()))
        });
        assert!(matches!(result, Err(ProviderError::Auth(_))));
        assert_eq!(attempts.get(), 1);
        assert_eq!(client.connectivity.total_failures(), 1);
    }

    #[test]
    fn success_clears_consecutive_failures() {
        let client = test_client();
        let attempts = std::cell::Cell::new(0u32);
        let result = client.with_retries("flaky", || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 2 {
                Err(ProviderError::Unavailable("502".to_string()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(client.connectivity.total_failures(), 1);
        assert_eq!(client.connectivity.consecutive_failures(), 0);
    }
}
