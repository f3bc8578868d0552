//! Central shared state.
//!
//! One mutex protects the two snapshots and their has-data flags so readers
//! always see a consistent pair; a condition variable wakes the trader when
//! either is published. Flags and freshness timestamps that are read on hot
//! paths live in atomics outside the lock. Each freshness timestamp has a
//! single writer (its publishing worker), which keeps it monotonically
//! non-decreasing.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::types::{AccountSnapshot, MarketSnapshot};

#[derive(Debug, Default)]
struct SnapshotCell {
    market: MarketSnapshot,
    account: AccountSnapshot,
    has_market: bool,
    has_account: bool,
}

/// Shared by every worker loop via `Arc`.
pub struct SharedState {
    cell: Mutex<SnapshotCell>,
    data_cv: Condvar,

    /// Cleared by the signal handler or a fatal error; every loop exits on
    /// its next check.
    pub running: AtomicBool,
    /// Session gate: whether the market worker may fetch at all.
    pub allow_fetch: AtomicBool,
    /// Regular session is open right now (pre-open buffer excluded).
    pub session_open: AtomicBool,
    /// Set while inside the post-close grace window (forced flattening).
    pub in_close_grace: AtomicBool,

    /// Epoch seconds of the last market / account publication.
    market_updated_at: AtomicI64,
    account_updated_at: AtomicI64,
    /// Epoch seconds of the last successfully submitted order.
    last_order_at: AtomicI64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            cell: Mutex::new(SnapshotCell::default()),
            data_cv: Condvar::new(),
            running: AtomicBool::new(true),
            allow_fetch: AtomicBool::new(false),
            session_open: AtomicBool::new(false),
            in_close_grace: AtomicBool::new(false),
            market_updated_at: AtomicI64::new(0),
            account_updated_at: AtomicI64::new(0),
            last_order_at: AtomicI64::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request shutdown and wake every CV waiter.
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.data_cv.notify_all();
    }

    /// Publish a new market snapshot: write + flag in one critical section,
    /// notify after unlock, freshness timestamp last.
    pub fn publish_market(&self, snapshot: MarketSnapshot) {
        {
            let mut cell = self.cell.lock().unwrap();
            cell.market = snapshot;
            cell.has_market = true;
        }
        self.data_cv.notify_all();
        self.market_updated_at
            .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
    }

    pub fn publish_account(&self, snapshot: AccountSnapshot) {
        {
            let mut cell = self.cell.lock().unwrap();
            cell.account = snapshot;
            cell.has_account = true;
        }
        self.data_cv.notify_all();
        self.account_updated_at
            .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
    }

    /// Copy both snapshots out under the lock, or `None` until both have
    /// been published at least once.
    pub fn snapshot_pair(&self) -> Option<(MarketSnapshot, AccountSnapshot)> {
        let cell = self.cell.lock().unwrap();
        (cell.has_market && cell.has_account)
            .then(|| (cell.market.clone(), cell.account.clone()))
    }

    /// Block until both snapshots are available or the timeout elapses.
    /// Wakes early on shutdown. Returns whether both flags are set.
    ///
    /// Each CV wait is capped at one second, so a wakeup racing the wait
    /// entry costs at most that before the flags are re-read.
    pub fn wait_for_fresh_data(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cell = self.cell.lock().unwrap();
        loop {
            if cell.has_market && cell.has_account {
                return true;
            }
            if !self.is_running() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, _result) = self
                .data_cv
                .wait_timeout(cell, remaining.min(Duration::from_secs(1)))
                .unwrap();
            cell = guard;
        }
    }

    /// Epoch seconds of the last market publication (0 = never).
    pub fn market_updated_at(&self) -> i64 {
        self.market_updated_at.load(Ordering::SeqCst)
    }

    pub fn account_updated_at(&self) -> i64 {
        self.account_updated_at.load(Ordering::SeqCst)
    }

    /// Whether the market snapshot is younger than `threshold_seconds`.
    /// False until the first publication.
    pub fn is_market_data_fresh(&self, threshold_seconds: i64) -> bool {
        let updated = self.market_updated_at();
        if updated == 0 {
            return false;
        }
        chrono::Utc::now().timestamp() - updated <= threshold_seconds
    }

    pub fn record_order_submitted(&self) {
        self.last_order_at
            .store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
    }

    /// Seconds since the last submitted order; `None` if none yet.
    pub fn seconds_since_last_order(&self) -> Option<i64> {
        let at = self.last_order_at.load(Ordering::SeqCst);
        (at > 0).then(|| chrono::Utc::now().timestamp() - at)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn no_pair_until_both_published() {
        let state = SharedState::new();
        assert!(state.snapshot_pair().is_none());
        state.publish_market(MarketSnapshot::default());
        assert!(state.snapshot_pair().is_none());
        state.publish_account(AccountSnapshot::default());
        assert!(state.snapshot_pair().is_some());
    }

    #[test]
    fn wait_times_out_without_data() {
        let state = SharedState::new();
        assert!(!state.wait_for_fresh_data(Duration::from_millis(20)));
    }

    #[test]
    fn wait_wakes_on_publication() {
        let state = Arc::new(SharedState::new());
        state.publish_account(AccountSnapshot::default());

        let publisher = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                state.publish_market(MarketSnapshot::default());
            })
        };

        assert!(state.wait_for_fresh_data(Duration::from_secs(2)));
        publisher.join().unwrap();
    }

    #[test]
    fn wait_wakes_on_shutdown() {
        let state = Arc::new(SharedState::new());
        let stopper = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                state.request_shutdown();
            })
        };
        // Returns promptly (false) once shutdown clears the predicate guard.
        assert!(!state.wait_for_fresh_data(Duration::from_secs(5)));
        stopper.join().unwrap();
    }

    #[test]
    fn wait_notices_flag_changes_without_a_notify() {
        // A state change that skips the CV entirely is still observed within
        // the one-second wait cap, not after the full timeout.
        let state = Arc::new(SharedState::new());
        let waiter = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                let started = Instant::now();
                let got = state.wait_for_fresh_data(Duration::from_secs(10));
                (got, started.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(100));
        state.running.store(false, Ordering::SeqCst);
        let (got, elapsed) = waiter.join().unwrap();
        assert!(!got);
        assert!(elapsed < Duration::from_secs(3));
    }

    #[test]
    fn freshness_flips_with_threshold() {
        let state = SharedState::new();
        assert!(!state.is_market_data_fresh(3600)); // never published
        state.publish_market(MarketSnapshot::default());
        assert!(state.is_market_data_fresh(3600));
        assert!(!state.is_market_data_fresh(-1)); // already "too old"
    }

    #[test]
    fn freshness_timestamp_monotonic() {
        let state = SharedState::new();
        state.publish_market(MarketSnapshot::default());
        let first = state.market_updated_at();
        state.publish_market(MarketSnapshot::default());
        assert!(state.market_updated_at() >= first);
    }

    #[test]
    fn order_timestamp_roundtrip() {
        let state = SharedState::new();
        assert!(state.seconds_since_last_order().is_none());
        state.record_order_submitted();
        assert!(state.seconds_since_last_order().unwrap() <= 1);
    }
}
