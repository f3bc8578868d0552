//! Provider façade.
//!
//! `ApiManager` routes each call to the right vendor client by trading mode:
//! crypto bars come from Polygon, everything else (stock bars, quotes,
//! account, clock, order flow) goes through Alpaca. All clients share one
//! `ConnectivityManager`, so health and backoff are judged across the whole
//! provider surface.

use std::sync::Arc;

use crate::alpaca::models::{AlpacaAccount, AlpacaOrder, AlpacaPosition, MarketClock};
use crate::alpaca::AlpacaClient;
use crate::config::Config;
use crate::connectivity::ConnectivityManager;
use crate::errors::ProviderError;
use crate::polygon::PolygonClient;
use crate::types::{Bar, Quote, TradingMode};

/// Which concrete provider served a call; used in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    AlpacaTrading,
    AlpacaStocks,
    PolygonCrypto,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlpacaTrading => write!(f, "alpaca-trading"),
            Self::AlpacaStocks => write!(f, "alpaca-stocks"),
            Self::PolygonCrypto => write!(f, "polygon-crypto"),
        }
    }
}

/// Uniform interface over the broker / market-data providers.
pub struct ApiManager {
    mode: TradingMode,
    alpaca: AlpacaClient,
    polygon: Option<PolygonClient>,
    connectivity: Arc<ConnectivityManager>,
}

impl ApiManager {
    pub fn new(config: &Config, connectivity: Arc<ConnectivityManager>) -> Result<Self, ProviderError> {
        let alpaca = AlpacaClient::new(config.alpaca.clone(), Arc::clone(&connectivity))?;
        let polygon = match config.mode {
            TradingMode::Crypto => Some(PolygonClient::new(
                config.polygon.clone(),
                Arc::clone(&connectivity),
            )?),
            TradingMode::Stocks => None,
        };
        Ok(Self {
            mode: config.mode,
            alpaca,
            polygon,
            connectivity,
        })
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityManager> {
        &self.connectivity
    }

    /// Provider that serves bar data for the active mode.
    pub fn bars_provider(&self) -> ProviderKind {
        match self.mode {
            TradingMode::Stocks => ProviderKind::AlpacaStocks,
            TradingMode::Crypto => ProviderKind::PolygonCrypto,
        }
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    pub fn get_recent_bars(&self, symbol: &str, limit: usize) -> Result<Vec<Bar>, ProviderError> {
        match (&self.polygon, self.mode) {
            (Some(polygon), TradingMode::Crypto) => polygon.get_recent_bars(symbol, limit),
            _ => self.alpaca.get_recent_bars(symbol, limit),
        }
    }

    pub fn get_quote(&self, symbol: &str) -> Result<Quote, ProviderError> {
        // Quotes always come from the trading provider; Polygon's crypto
        // aggregates carry no book.
        self.alpaca.get_quote(symbol)
    }

    pub fn get_current_price(&self, symbol: &str) -> Result<f64, ProviderError> {
        match (&self.polygon, self.mode) {
            (Some(polygon), TradingMode::Crypto) => {
                let bars = polygon.get_recent_bars(symbol, 1)?;
                bars.last()
                    .map(|b| b.close)
                    .filter(|p| *p > 0.0)
                    .ok_or_else(|| {
                        ProviderError::Unavailable(format!("no crypto price for {symbol}"))
                    })
            }
            _ => self.alpaca.get_current_price(symbol),
        }
    }

    /// Session check. Crypto trades around the clock so the calendar never
    /// gates it; stocks consult the broker's market clock.
    pub fn is_market_open(&self, _symbol: &str) -> Result<bool, ProviderError> {
        match self.mode {
            TradingMode::Crypto => Ok(true),
            TradingMode::Stocks => Ok(self.alpaca.get_clock()?.is_open),
        }
    }

    /// Full market clock; `None` in crypto mode where no calendar applies.
    pub fn get_clock(&self) -> Result<Option<MarketClock>, ProviderError> {
        match self.mode {
            TradingMode::Crypto => Ok(None),
            TradingMode::Stocks => Ok(Some(self.alpaca.get_clock()?)),
        }
    }

    // ========================================================================
    // Account / Trading (always the trading provider)
    // ========================================================================

    pub fn get_account(&self) -> Result<AlpacaAccount, ProviderError> {
        self.alpaca.get_account()
    }

    pub fn get_position(&self, symbol: &str) -> Result<Option<AlpacaPosition>, ProviderError> {
        self.alpaca.get_position(symbol)
    }

    pub fn get_open_orders(&self) -> Result<Vec<AlpacaOrder>, ProviderError> {
        self.alpaca.get_open_orders()
    }

    pub fn place_order(&self, order_json: &serde_json::Value) -> Result<AlpacaOrder, ProviderError> {
        self.alpaca.place_order(order_json)
    }

    pub fn cancel_order(&self, order_id: &str) -> Result<(), ProviderError> {
        self.alpaca.cancel_order(order_id)
    }

    pub fn close_position(&self, symbol: &str, qty: i64) -> Result<(), ProviderError> {
        self.alpaca.close_position(symbol, qty)
    }
}
