//! Error taxonomy shared across the provider and order layers.
//!
//! Provider errors classify HTTP failures so the retry loop and the
//! connectivity manager can tell transient conditions (network, rate limit)
//! apart from hard ones (auth, bad request). Order errors carry the reason a
//! trade was rejected so the coordinator can log a structured trade event.

use thiserror::Error;

/// A failure while talking to a market-data or broker provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, DNS). Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// 401/403 - credentials rejected. Not retryable.
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// 429 - provider rate limit. Retryable after a delay.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// 4xx other than auth/rate-limit - the request itself is wrong.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 5xx or an unparseable response - provider side trouble.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether the retry loop may re-issue the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_) | Self::Unavailable(_))
    }

    /// Classify an HTTP status + body into an error kind.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let detail = format!("{}: {}", status, body.chars().take(200).collect::<String>());
        match status.as_u16() {
            401 | 403 => Self::Auth(detail),
            429 => Self::RateLimit(detail),
            400..=499 => Self::BadRequest(detail),
            _ => Self::Unavailable(detail),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e.to_string())
    }
}

/// A failure (or structured rejection) in the order execution state machine.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("insufficient buying power: need {required:.2}, have {available:.2}")]
    InsufficientBuyingPower { required: f64, available: f64 },

    #[error("position limit reached ({layers} layers, max {max_layers})")]
    PositionLimitReached { layers: u32, max_layers: u32 },

    #[error("wash trade prevented: {elapsed}s since last order, minimum {minimum}s")]
    WashTradePrevented { elapsed: i64, minimum: i64 },

    #[error("broker rejected order: {0}")]
    BrokerRejected(String),

    #[error("network error during order flow: {0}")]
    NetworkError(#[from] ProviderError),

    #[error("failed to close existing position: {0}")]
    ClosureFailed(String),
}

impl OrderError {
    /// Short tag used in the trade-events CSV.
    pub fn event_tag(&self) -> &'static str {
        match self {
            Self::InsufficientBuyingPower { .. } => "REJECT_BUYING_POWER",
            Self::PositionLimitReached { .. } => "REJECT_POSITION_LIMIT",
            Self::WashTradePrevented { .. } => "REJECT_WASH_TRADE",
            Self::BrokerRejected(_) => "REJECT_BROKER",
            Self::NetworkError(_) => "REJECT_NETWORK",
            Self::ClosureFailed(_) => "REJECT_CLOSURE",
        }
    }
}

/// Fatal configuration problems. These abort startup with exit code 1.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required config key '{0}'")]
    MissingKey(String),

    #[error("config key '{key}' has invalid value '{value}': {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("config keys '{a}' and '{b}' are mutually exclusive but both enabled")]
    MutuallyExclusive { a: String, b: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
