// Library crate - exports the trading pipeline building blocks

pub mod account;
pub mod alpaca;
pub mod api;
pub mod config;
pub mod connectivity;
pub mod countdown;
pub mod errors;
pub mod logging;
pub mod market_data;
pub mod polygon;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod trading_core;
pub mod types;
pub mod workers;

// Re-export commonly used types
pub use errors::{ConfigError, OrderError, ProviderError};
pub use types::*;
