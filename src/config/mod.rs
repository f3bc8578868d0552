//! Typed configuration record.
//!
//! Loaded once at startup from `config/*.csv`, validated, then shared
//! immutably (`Arc<Config>`) with every worker. Nothing here is mutated after
//! load, so no synchronization is needed.

pub mod loader;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::types::TradingMode;
use loader::KeyValueMap;

/// Candlestick signal scoring and filter parameters.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Bars required before a fetch is considered processable.
    pub bars_to_fetch_for_calculations: usize,
    /// ATR lookback period in bars.
    pub atr_calculation_bars: usize,
    /// avg_atr lookback = atr_calculation_bars * this multiplier.
    pub average_atr_comparison_multiplier: usize,
    /// Floor returned by average-volume when the window mean is zero.
    pub minimum_average_volume_threshold: f64,

    /// Treat close == open as satisfying the base pattern.
    pub allow_equal_close_open: bool,
    /// Buy additionally requires curr.high > prev.high (mirrored for sell).
    pub require_higher_high: bool,
    /// Buy additionally requires curr.low >= prev.low (mirrored for sell).
    pub require_higher_low: bool,

    // Scoring weights; a side fires when its total reaches the threshold.
    pub basic_price_pattern_weight: f64,
    pub momentum_indicator_weight: f64,
    pub volume_analysis_weight: f64,
    pub volatility_analysis_weight: f64,
    pub minimum_signal_strength_threshold: f64,

    pub minimum_price_change_pct_for_momentum: f64,
    pub minimum_volume_increase_pct_for_buy: f64,
    pub minimum_volume_increase_pct_for_sell: f64,
    pub minimum_volatility_pct_for_buy: f64,
    pub minimum_volatility_pct_for_sell: f64,

    /// Filter mode: absolute ATR floor instead of multiple-of-average.
    pub use_atr_absolute_threshold: bool,
    pub atr_absolute_minimum_threshold: f64,
    pub entry_signal_atr_multiplier: f64,
    pub entry_signal_volume_multiplier: f64,
}

/// Position sizing, exposure and daily-limit parameters.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub risk_percentage_per_trade: f64,
    pub max_daily_loss_pct: f64,
    pub daily_profit_target_pct: f64,
    pub max_account_exposure_pct: f64,
    pub maximum_dollar_value_per_trade: f64,
    pub buying_power_utilization_pct: f64,
    pub buying_power_validation_safety_margin: f64,

    pub enable_fixed_share_quantity_per_trade: bool,
    pub fixed_share_quantity_per_trade: i64,
    pub enable_risk_based_multiplier: bool,
    pub risk_based_position_size_multiplier: f64,

    pub allow_position_scaling: bool,
    pub position_scaling_multiplier: f64,
    pub maximum_position_layers: u32,

    pub rr_ratio: f64,
    pub use_take_profit_percentage: bool,
    pub take_profit_pct: f64,
    pub price_buffer_pct: f64,
    pub min_price_buffer: f64,
    pub max_price_buffer: f64,
    pub stop_loss_buffer_amount_dollars: f64,

    pub enable_wash_trade_prevention: bool,
    pub minimum_interval_between_orders_seconds: i64,
}

/// Poll cadences, staleness thresholds and session buffers.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    pub thread_market_poll_interval_sec: u64,
    pub thread_account_poll_interval_sec: u64,
    pub thread_market_gate_poll_interval_sec: u64,
    pub thread_trader_poll_interval_sec: u64,
    pub countdown_display_refresh_interval_seconds: f64,

    pub market_data_staleness_threshold_seconds: i64,
    pub crypto_data_staleness_threshold_seconds: i64,

    pub pre_market_open_buffer_minutes: i64,
    pub post_market_close_buffer_minutes: i64,
    pub market_close_grace_period_minutes: i64,
    pub emergency_trading_halt_duration_minutes: u64,

    pub position_settlement_timeout_milliseconds: u64,
    pub maximum_position_verification_attempts: u32,
}

/// Connectivity health thresholds and backoff policy.
#[derive(Debug, Clone)]
pub struct ConnectivityConfig {
    pub degraded_threshold: u32,
    pub disconnected_threshold: u32,
    pub base_retry_delay_seconds: f64,
    pub backoff_multiplier: f64,
    pub max_retry_delay_seconds: f64,
}

/// Output file names within the per-run directory.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub runtime_log_root: String,
    pub text_log_filename: String,
    pub bars_csv_filename: String,
    pub trade_events_csv_filename: String,
    /// Capacity of the bounded log queue drained by the logger thread.
    pub log_queue_capacity: usize,
}

/// Per-worker-thread settings (`thread.<worker>.*` keys).
#[derive(Debug, Clone)]
pub struct ThreadSettings {
    pub name: String,
    pub priority: i32,
    pub cpu_affinity: i32,
    pub use_cpu_affinity: bool,
}

/// Per-provider endpoint and credential settings.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: String,
    pub api_secret: String,
    pub base_url: String,
    /// Secondary host for market data, when the vendor splits them.
    pub data_url: String,
    /// endpoint name -> URL template with `{symbol}`/`{limit}` placeholders.
    pub endpoints: HashMap<String, String>,
    pub timeout: Duration,
    pub retry_count: u32,
    pub rate_limit_delay: Duration,
}

/// The complete immutable configuration record.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: TradingMode,
    pub symbol: String,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub timing: TimingConfig,
    pub connectivity: ConnectivityConfig,
    pub logging: LoggingConfig,
    pub threads: HashMap<String, ThreadSettings>,
    pub alpaca: ProviderSettings,
    pub polygon: ProviderSettings,
}

/// Worker names that carry `thread.<name>.*` settings.
pub const WORKER_NAMES: [&str; 5] = ["market", "account", "gate", "trader", "logger"];

impl Config {
    /// Load, type and validate the full configuration from a directory.
    pub fn load(dir: &Path) -> Result<Self, ConfigError> {
        let map = KeyValueMap::load_dir(dir)?;
        let config = Self::from_map(&map)?;
        config.validate()?;
        Ok(config)
    }

    /// Typed extraction; unknown keys in the map are simply never read.
    pub fn from_map(map: &KeyValueMap) -> Result<Self, ConfigError> {
        let mode = match map.require("trading_mode")? {
            "stocks" => TradingMode::Stocks,
            "crypto" => TradingMode::Crypto,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "trading_mode".to_string(),
                    value: other.to_string(),
                    reason: "expected 'stocks' or 'crypto'".to_string(),
                })
            }
        };
        let symbol = map.require("symbol")?.to_string();

        let strategy = StrategyConfig {
            bars_to_fetch_for_calculations: map.usize_or("bars_to_fetch_for_calculations", 30)?,
            atr_calculation_bars: map.usize_or("atr_calculation_bars", 14)?,
            average_atr_comparison_multiplier: map.usize_or("average_atr_comparison_multiplier", 2)?,
            minimum_average_volume_threshold: map.f64_or("minimum_average_volume_threshold", 1.0)?,
            allow_equal_close_open: map.bool_or("allow_equal_close_open", false)?,
            require_higher_high: map.bool_or("require_higher_high", true)?,
            require_higher_low: map.bool_or("require_higher_low", false)?,
            basic_price_pattern_weight: map.f64_or("basic_price_pattern_weight", 0.3)?,
            momentum_indicator_weight: map.f64_or("momentum_indicator_weight", 0.3)?,
            volume_analysis_weight: map.f64_or("volume_analysis_weight", 0.2)?,
            volatility_analysis_weight: map.f64_or("volatility_analysis_weight", 0.2)?,
            minimum_signal_strength_threshold: map.f64_or("minimum_signal_strength_threshold", 0.5)?,
            minimum_price_change_pct_for_momentum: map
                .f64_or("minimum_price_change_pct_for_momentum", 0.1)?,
            minimum_volume_increase_pct_for_buy: map
                .f64_or("minimum_volume_increase_pct_for_buy", 10.0)?,
            minimum_volume_increase_pct_for_sell: map
                .f64_or("minimum_volume_increase_pct_for_sell", 10.0)?,
            minimum_volatility_pct_for_buy: map.f64_or("minimum_volatility_pct_for_buy", 0.5)?,
            minimum_volatility_pct_for_sell: map.f64_or("minimum_volatility_pct_for_sell", 0.5)?,
            use_atr_absolute_threshold: map.bool_or("use_atr_absolute_threshold", false)?,
            atr_absolute_minimum_threshold: map.f64_or("atr_absolute_minimum_threshold", 0.0)?,
            entry_signal_atr_multiplier: map.f64_or("entry_signal_atr_multiplier", 1.0)?,
            entry_signal_volume_multiplier: map.f64_or("entry_signal_volume_multiplier", 1.0)?,
        };

        let risk = RiskConfig {
            risk_percentage_per_trade: map.f64_or("risk_percentage_per_trade", 0.01)?,
            max_daily_loss_pct: map.f64_or("max_daily_loss_pct", 3.0)?,
            daily_profit_target_pct: map.f64_or("daily_profit_target_pct", 100.0)?,
            max_account_exposure_pct: map.f64_or("max_account_exposure_pct", 100.0)?,
            maximum_dollar_value_per_trade: map.f64_or("maximum_dollar_value_per_trade", 0.0)?,
            buying_power_utilization_pct: map.f64_or("buying_power_utilization_pct", 1.0)?,
            buying_power_validation_safety_margin: map
                .f64_or("buying_power_validation_safety_margin", 1.0)?,
            enable_fixed_share_quantity_per_trade: map
                .bool_or("enable_fixed_share_quantity_per_trade", false)?,
            fixed_share_quantity_per_trade: map.i64_or("fixed_share_quantity_per_trade", 1)?,
            enable_risk_based_multiplier: map.bool_or("enable_risk_based_multiplier", false)?,
            risk_based_position_size_multiplier: map
                .f64_or("risk_based_position_size_multiplier", 1.0)?,
            allow_position_scaling: map.bool_or("allow_position_scaling", false)?,
            position_scaling_multiplier: map.f64_or("position_scaling_multiplier", 1.0)?,
            maximum_position_layers: map.i64_or("maximum_position_layers", 1)? as u32,
            rr_ratio: map.f64_or("rr_ratio", 2.0)?,
            use_take_profit_percentage: map.bool_or("use_take_profit_percentage", false)?,
            take_profit_pct: map.f64_or("take_profit_pct", 0.02)?,
            price_buffer_pct: map.f64_or("price_buffer_pct", 0.001)?,
            min_price_buffer: map.f64_or("min_price_buffer", 0.01)?,
            max_price_buffer: map.f64_or("max_price_buffer", 1.00)?,
            stop_loss_buffer_amount_dollars: map.f64_or("stop_loss_buffer_amount_dollars", 0.0)?,
            enable_wash_trade_prevention: map.bool_or("enable_wash_trade_prevention", true)?,
            minimum_interval_between_orders_seconds: map
                .i64_or("minimum_interval_between_orders_seconds", 60)?,
        };

        let timing = TimingConfig {
            thread_market_poll_interval_sec: map.u64_or("thread_market_poll_interval_sec", 10)?,
            thread_account_poll_interval_sec: map.u64_or("thread_account_poll_interval_sec", 15)?,
            thread_market_gate_poll_interval_sec: map
                .u64_or("thread_market_gate_poll_interval_sec", 30)?,
            thread_trader_poll_interval_sec: map.u64_or("thread_trader_poll_interval_sec", 10)?,
            countdown_display_refresh_interval_seconds: map
                .f64_or("countdown_display_refresh_interval_seconds", 1.0)?,
            market_data_staleness_threshold_seconds: map
                .i64_or("market_data_staleness_threshold_seconds", 120)?,
            crypto_data_staleness_threshold_seconds: map
                .i64_or("crypto_data_staleness_threshold_seconds", 300)?,
            pre_market_open_buffer_minutes: map.i64_or("pre_market_open_buffer_minutes", 5)?,
            post_market_close_buffer_minutes: map.i64_or("post_market_close_buffer_minutes", 5)?,
            market_close_grace_period_minutes: map.i64_or("market_close_grace_period_minutes", 10)?,
            emergency_trading_halt_duration_minutes: map
                .u64_or("emergency_trading_halt_duration_minutes", 5)?,
            position_settlement_timeout_milliseconds: map
                .u64_or("position_settlement_timeout_milliseconds", 5000)?,
            maximum_position_verification_attempts: map
                .i64_or("maximum_position_verification_attempts", 5)? as u32,
        };

        let connectivity = ConnectivityConfig {
            degraded_threshold: map.i64_or("connectivity.degraded_threshold", 3)? as u32,
            disconnected_threshold: map.i64_or("connectivity.disconnected_threshold", 10)? as u32,
            base_retry_delay_seconds: map.f64_or("connectivity.base_retry_delay_seconds", 1.0)?,
            backoff_multiplier: map.f64_or("connectivity.backoff_multiplier", 2.0)?,
            max_retry_delay_seconds: map.f64_or("connectivity.max_retry_delay_seconds", 300.0)?,
        };

        let logging = LoggingConfig {
            runtime_log_root: map.string_or("logging.runtime_log_root", "runtime_logs"),
            text_log_filename: map.string_or("logging.text_log_filename", "trading.log"),
            bars_csv_filename: map.string_or("logging.bars_csv_filename", "bars.csv"),
            trade_events_csv_filename: map
                .string_or("logging.trade_events_csv_filename", "trade_events.csv"),
            log_queue_capacity: map.usize_or("logging.log_queue_capacity", 4096)?,
        };

        let mut threads = HashMap::new();
        for worker in WORKER_NAMES {
            let prefix = format!("thread.{worker}");
            threads.insert(
                worker.to_string(),
                ThreadSettings {
                    name: map.string_or(&format!("{prefix}.name"), worker),
                    priority: map.i64_or(&format!("{prefix}.priority"), 0)? as i32,
                    cpu_affinity: map.i64_or(&format!("{prefix}.cpu_affinity"), -1)? as i32,
                    use_cpu_affinity: map.bool_or(&format!("{prefix}.use_cpu_affinity"), false)?,
                },
            );
        }

        let alpaca = Self::provider_settings(map, "alpaca", true)?;
        let polygon = Self::provider_settings(map, "polygon", mode == TradingMode::Crypto)?;

        Ok(Self {
            mode,
            symbol,
            strategy,
            risk,
            timing,
            connectivity,
            logging,
            threads,
            alpaca,
            polygon,
        })
    }

    fn provider_settings(
        map: &KeyValueMap,
        provider: &str,
        required: bool,
    ) -> Result<ProviderSettings, ConfigError> {
        let key = format!("{provider}.api_key");
        // Environment variables override file-supplied credentials.
        let env_key = std::env::var(format!("{}_API_KEY", provider.to_uppercase())).ok();
        let env_secret = std::env::var(format!("{}_API_SECRET", provider.to_uppercase())).ok();

        let api_key = match env_key {
            Some(v) if !v.is_empty() => v,
            _ if required => map.require(&key)?.to_string(),
            _ => map.string_or(&key, ""),
        };
        let api_secret = match env_secret {
            Some(v) if !v.is_empty() => v,
            _ => map.string_or(&format!("{provider}.api_secret"), ""),
        };

        let base_url = if required {
            map.require(&format!("{provider}.base_url"))?.to_string()
        } else {
            map.string_or(&format!("{provider}.base_url"), "")
        };

        let mut endpoints = HashMap::new();
        for endpoint in ["bars", "quote", "account", "positions", "orders", "clock"] {
            if let Some(template) = map.get(&format!("{provider}.endpoints.{endpoint}")) {
                endpoints.insert(endpoint.to_string(), template.to_string());
            }
        }

        Ok(ProviderSettings {
            api_key,
            api_secret,
            base_url,
            data_url: map.string_or(&format!("{provider}.data_url"), ""),
            endpoints,
            timeout: Duration::from_secs(map.u64_or(&format!("{provider}.timeout_seconds"), 30)?),
            retry_count: map.i64_or(&format!("{provider}.retry_count"), 3)? as u32,
            rate_limit_delay: Duration::from_millis(
                map.u64_or(&format!("{provider}.rate_limit_delay_ms"), 1000)?,
            ),
        })
    }

    /// Cross-field invariants checked once at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk.enable_fixed_share_quantity_per_trade && self.risk.enable_risk_based_multiplier
        {
            return Err(ConfigError::MutuallyExclusive {
                a: "enable_fixed_share_quantity_per_trade".to_string(),
                b: "enable_risk_based_multiplier".to_string(),
            });
        }
        // TP percentage mode and RR-driven targets are exclusive; RR still
        // always drives the stop distance.
        if self.risk.use_take_profit_percentage && self.risk.take_profit_pct <= 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "take_profit_pct".to_string(),
                value: self.risk.take_profit_pct.to_string(),
                reason: "must be > 0 when use_take_profit_percentage is enabled".to_string(),
            });
        }

        let positive = [
            ("risk_percentage_per_trade", self.risk.risk_percentage_per_trade),
            ("max_daily_loss_pct", self.risk.max_daily_loss_pct),
            ("max_account_exposure_pct", self.risk.max_account_exposure_pct),
            ("rr_ratio", self.risk.rr_ratio),
            (
                "minimum_signal_strength_threshold",
                self.strategy.minimum_signal_strength_threshold,
            ),
        ];
        for (key, value) in positive {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                    reason: "must be a positive finite number".to_string(),
                });
            }
        }

        if self.strategy.bars_to_fetch_for_calculations < 2 {
            return Err(ConfigError::InvalidValue {
                key: "bars_to_fetch_for_calculations".to_string(),
                value: self.strategy.bars_to_fetch_for_calculations.to_string(),
                reason: "need at least two bars (current + previous)".to_string(),
            });
        }

        if self.mode == TradingMode::Crypto && self.polygon.api_key.is_empty() {
            return Err(ConfigError::MissingKey("polygon.api_key".to_string()));
        }
        Ok(())
    }

    /// Staleness threshold for the active trading mode.
    pub fn staleness_threshold_seconds(&self) -> i64 {
        match self.mode {
            TradingMode::Stocks => self.timing.market_data_staleness_threshold_seconds,
            TradingMode::Crypto => self.timing.crypto_data_staleness_threshold_seconds,
        }
    }
}
