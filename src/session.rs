//! Session gating from the broker clock.
//!
//! The gate decides two flags each cycle: whether workers may fetch data
//! (regular hours plus the pre-open and post-close buffers) and whether the
//! close grace window is active, during which the trader force-flattens
//! instead of entering. The broker clock only reports the next open and next
//! close, so the most recent instant the market was seen open is tracked
//! locally to anchor the post-close windows.

use chrono::{DateTime, Duration, Utc};

use crate::alpaca::models::MarketClock;
use crate::config::TimingConfig;
use crate::types::TradingMode;

/// Gate outcome for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDecision {
    /// Market and account workers may hit the providers.
    pub allow_fetch: bool,
    /// Regular session is open right now.
    pub session_open: bool,
    /// Inside the post-close grace window where positions are flattened.
    pub in_close_grace: bool,
}

impl SessionDecision {
    /// Crypto trades around the clock with no grace window.
    pub fn always_open() -> Self {
        Self {
            allow_fetch: true,
            session_open: true,
            in_close_grace: false,
        }
    }
}

/// Tracks the last instant the market was reported open and evaluates the
/// session windows against the broker clock.
pub struct SessionGate {
    mode: TradingMode,
    pre_open_buffer: Duration,
    post_close_buffer: Duration,
    close_grace: Duration,
    last_seen_open: Option<DateTime<Utc>>,
}

impl SessionGate {
    pub fn new(mode: TradingMode, timing: &TimingConfig) -> Self {
        Self {
            mode,
            pre_open_buffer: Duration::minutes(timing.pre_market_open_buffer_minutes),
            post_close_buffer: Duration::minutes(timing.post_market_close_buffer_minutes),
            close_grace: Duration::minutes(timing.market_close_grace_period_minutes),
            last_seen_open: None,
        }
    }

    /// Evaluate the gate for `now`. `clock` is None when the clock endpoint
    /// failed; the previous open observation then drives the close windows.
    pub fn evaluate(&mut self, clock: Option<&MarketClock>, now: DateTime<Utc>) -> SessionDecision {
        if self.mode == TradingMode::Crypto {
            return SessionDecision::always_open();
        }

        let session_open = clock.map(|c| c.is_open).unwrap_or(false);
        if session_open {
            self.last_seen_open = Some(now);
        }

        let in_pre_open = clock
            .and_then(|c| parse_rfc3339(&c.next_open))
            .map(|next_open| now >= next_open - self.pre_open_buffer && now < next_open)
            .unwrap_or(false);

        let since_open = self.last_seen_open.map(|seen| now - seen);
        let in_post_close = !session_open
            && since_open.map(|d| d <= self.post_close_buffer).unwrap_or(false);
        let in_close_grace = !session_open
            && since_open.map(|d| d <= self.close_grace).unwrap_or(false);

        SessionDecision {
            allow_fetch: session_open || in_pre_open || in_post_close,
            session_open,
            in_close_grace,
        }
    }

}

/// Render an instant in exchange-local time for operator logs.
pub fn exchange_time(now: DateTime<Utc>) -> String {
    now.with_timezone(&chrono_tz::America::New_York)
        .format("%H:%M:%S %Z")
        .to_string()
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    fn gate(mode: TradingMode) -> SessionGate {
        SessionGate::new(mode, &test_config().timing)
    }

    fn clock(is_open: bool, next_open: &str, next_close: &str) -> MarketClock {
        MarketClock {
            is_open,
            next_open: next_open.to_string(),
            next_close: next_close.to_string(),
        }
    }

    fn at(raw: &str) -> DateTime<Utc> {
        parse_rfc3339(raw).unwrap()
    }

    #[test]
    fn crypto_is_always_open() {
        let mut gate = gate(TradingMode::Crypto);
        let decision = gate.evaluate(None, Utc::now());
        assert!(decision.allow_fetch);
        assert!(decision.session_open);
        assert!(!decision.in_close_grace);
    }

    #[test]
    fn open_market_allows_fetch() {
        let mut gate = gate(TradingMode::Stocks);
        let c = clock(true, "2024-06-04T13:30:00Z", "2024-06-03T20:00:00Z");
        let decision = gate.evaluate(Some(&c), at("2024-06-03T15:00:00Z"));
        assert!(decision.allow_fetch);
        assert!(decision.session_open);
        assert!(!decision.in_close_grace);
    }

    #[test]
    fn pre_open_buffer_admits_fetch_before_open() {
        // Buffer is 5 minutes; 3 minutes before the open is inside it.
        let mut gate = gate(TradingMode::Stocks);
        let c = clock(false, "2024-06-03T13:30:00Z", "2024-06-03T20:00:00Z");
        let decision = gate.evaluate(Some(&c), at("2024-06-03T13:27:00Z"));
        assert!(decision.allow_fetch);
        assert!(!decision.session_open);
    }

    #[test]
    fn well_before_open_blocks_fetch() {
        let mut gate = gate(TradingMode::Stocks);
        let c = clock(false, "2024-06-03T13:30:00Z", "2024-06-03T20:00:00Z");
        let decision = gate.evaluate(Some(&c), at("2024-06-03T12:00:00Z"));
        assert!(!decision.allow_fetch);
    }

    #[test]
    fn post_close_buffer_and_grace_follow_last_open_sighting() {
        let mut gate = gate(TradingMode::Stocks);
        let open_clock = clock(true, "2024-06-04T13:30:00Z", "2024-06-03T20:00:00Z");
        gate.evaluate(Some(&open_clock), at("2024-06-03T19:59:30Z"));

        // 3 minutes after the last open sighting: both windows active
        // (buffer 5m, grace 10m).
        let closed_clock = clock(false, "2024-06-04T13:30:00Z", "2024-06-04T20:00:00Z");
        let decision = gate.evaluate(Some(&closed_clock), at("2024-06-03T20:02:30Z"));
        assert!(decision.allow_fetch);
        assert!(decision.in_close_grace);

        // 8 minutes after: past the fetch buffer, still inside the grace.
        let decision = gate.evaluate(Some(&closed_clock), at("2024-06-03T20:07:30Z"));
        assert!(!decision.allow_fetch);
        assert!(decision.in_close_grace);

        // 15 minutes after: everything closed down.
        let decision = gate.evaluate(Some(&closed_clock), at("2024-06-03T20:14:30Z"));
        assert!(!decision.allow_fetch);
        assert!(!decision.in_close_grace);
    }

    #[test]
    fn exchange_time_renders_eastern() {
        assert_eq!(exchange_time(at("2024-01-15T15:00:00Z")), "10:00:00 EST");
        assert_eq!(exchange_time(at("2024-06-03T15:00:00Z")), "11:00:00 EDT");
    }

    #[test]
    fn clock_outage_without_open_history_blocks() {
        let mut gate = gate(TradingMode::Stocks);
        let decision = gate.evaluate(None, Utc::now());
        assert!(!decision.allow_fetch);
        assert!(!decision.in_close_grace);
    }
}
