//! Alpaca provider: trading, account state and stock market data.

pub mod client;
pub mod models;

pub use client::AlpacaClient;
