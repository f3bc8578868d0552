//! Connectivity health tracking for provider APIs.
//!
//! Every HTTP call reports its outcome here. Consecutive failures walk the
//! status from `Healthy` through `Degraded` to `Disconnected`, and each
//! failure widens an exponential backoff window during which
//! `should_attempt_connection` returns false.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::ConnectivityConfig;

/// Connection health derived from consecutive failure counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Healthy,
    Degraded,
    Disconnected,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded => write!(f, "DEGRADED"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    consecutive_failures: u32,
    consecutive_successes: u32,
    total_failures: u64,
    next_attempt_after: Option<Instant>,
}

/// Thread-safe health tracker shared by all provider clients.
#[derive(Debug)]
pub struct ConnectivityManager {
    counters: Mutex<Counters>,
    config: ConnectivityConfig,
}

impl ConnectivityManager {
    pub fn new(config: ConnectivityConfig) -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
            config,
        }
    }

    /// Record a successful request. Resets consecutive failures and clears
    /// any backoff window.
    pub fn record_success(&self) {
        let mut c = self.counters.lock().unwrap();
        c.consecutive_failures = 0;
        c.consecutive_successes = c.consecutive_successes.saturating_add(1);
        c.next_attempt_after = None;
    }

    /// Record a failed request and schedule the next allowed attempt at
    /// `min(max_delay, base * multiplier^consecutive_failures)`.
    pub fn record_failure(&self) {
        let mut c = self.counters.lock().unwrap();
        c.consecutive_successes = 0;
        c.consecutive_failures = c.consecutive_failures.saturating_add(1);
        c.total_failures += 1;

        let delay = self.retry_delay_for(c.consecutive_failures);
        c.next_attempt_after = Some(Instant::now() + delay);
    }

    fn retry_delay_for(&self, consecutive_failures: u32) -> Duration {
        let exp = self
            .config
            .backoff_multiplier
            .powi(consecutive_failures.min(30) as i32);
        let secs = (self.config.base_retry_delay_seconds * exp)
            .min(self.config.max_retry_delay_seconds)
            .max(0.0);
        Duration::from_secs_f64(secs)
    }

    /// False while inside the backoff window after a failure.
    pub fn should_attempt_connection(&self) -> bool {
        let c = self.counters.lock().unwrap();
        match c.next_attempt_after {
            Some(at) => Instant::now() >= at,
            None => true,
        }
    }

    /// Seconds until the backoff window expires (zero when it already has).
    pub fn seconds_until_retry(&self) -> f64 {
        let c = self.counters.lock().unwrap();
        match c.next_attempt_after {
            Some(at) => at.saturating_duration_since(Instant::now()).as_secs_f64(),
            None => 0.0,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        let c = self.counters.lock().unwrap();
        if c.consecutive_failures >= self.config.disconnected_threshold {
            ConnectionStatus::Disconnected
        } else if c.consecutive_failures >= self.config.degraded_threshold {
            ConnectionStatus::Degraded
        } else {
            ConnectionStatus::Healthy
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == ConnectionStatus::Healthy
    }

    /// One-line health summary for the operator log.
    pub fn status_string(&self) -> String {
        let status = self.status();
        let c = self.counters.lock().unwrap();
        format!(
            "{} (consecutive failures: {}, total: {})",
            status, c.consecutive_failures, c.total_failures
        )
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.counters.lock().unwrap().consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.counters.lock().unwrap().total_failures
    }
}
