//! Polygon REST client for crypto aggregate bars.
//!
//! Auth is a bearer token. The bars URL template carries `{symbol}`,
//! `{from}` and `{to}` placeholders; the lookback window is sized from the
//! requested bar count assuming minute aggregates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::blocking::Client;
use tracing::{debug, warn};

use super::models::AggsResponse;
use crate::alpaca::models::fill_template;
use crate::config::ProviderSettings;
use crate::connectivity::ConnectivityManager;
use crate::errors::ProviderError;
use crate::types::Bar;

pub struct PolygonClient {
    client: Client,
    settings: ProviderSettings,
    connectivity: Arc<ConnectivityManager>,
}

impl PolygonClient {
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

    fn get_json<R: serde::de::DeserializeOwned>(&self, url: &str) -> Result<R, ProviderError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.settings.api_key)
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

    /// Fetch the most recent `limit` minute bars for a crypto ticker
    /// (e.g. `X:BTCUSD`).
    pub fn get_recent_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, ProviderError> {
        if !self.connectivity.should_attempt_connection() {
            return Err(ProviderError::Unavailable(format!(
                "in backoff window, retry in {:.0}s",
                self.connectivity.seconds_until_retry()
            )));
        }

        let template = self
            .settings
            .endpoints
            .get("bars")
            .ok_or_else(|| ProviderError::BadRequest("no polygon bars endpoint".to_string()))?;

        // Minute aggregates: look back limit minutes plus slack for gaps.
        let to = Utc::now();
        let from = to - ChronoDuration::minutes(limit as i64 * 2);
        let mut values = HashMap::new();
        values.insert("symbol", symbol.to_string());
        values.insert("limit", limit.to_string());
        values.insert("from", from.timestamp_millis().to_string());
        values.insert("to", to.timestamp_millis().to_string());
        let url = format!("{}{}", self.settings.base_url, fill_template(template, &values));

        let mut last_err = None;
        for attempt in 0..=self.settings.retry_count {
            if attempt > 0 {
                std::thread::sleep(self.settings.rate_limit_delay);
            }
            match self.get_json::<AggsResponse>(&url) {
                Ok(response) => {
                    self.connectivity.record_success();
                    let mut bars: Vec<Bar> =
                        response.results.into_iter().map(Bar::from).collect();
                    // Aggregates arrive oldest-first already; keep only the
                    // newest `limit` in case the window over-fetched.
                    if bars.len() > limit {
                        bars.drain(..bars.len() - limit);
                    }
                    debug!("fetched {} crypto bars for {}", bars.len(), symbol);
                    return Ok(bars);
                }
                Err(e) if e.is_retryable() => {
                    self.connectivity.record_failure();
                    warn!("polygon bars attempt {} failed: {}", attempt + 1, e);
                    last_err = Some(e);
                }
                Err(e) => {
                    self.connectivity.record_failure();
                    return Err(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| ProviderError::Unavailable("polygon bars: no attempts".to_string())))
    }
}
