//! Worker thread loop bodies.
//!
//! Each loop runs one iteration inside a panic guard, then sleeps its poll
//! interval in interruptible chunks. Shutdown is cooperative: every loop
//! re-checks `SharedState::is_running` and exits cleanly.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::account::AccountManager;
use crate::api::ApiManager;
use crate::config::{Config, ThreadSettings};
use crate::countdown::interruptible_sleep;
use crate::logging::LoggingContext;
use crate::market_data::{FetchOutcome, MarketDataManager};
use crate::session::SessionGate;
use crate::state::SharedState;
use crate::trading_core::coordinator::TradeCoordinator;

/// Shared handles passed to every worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub config: Arc<Config>,
    pub state: Arc<SharedState>,
    pub api: Arc<ApiManager>,
    pub accounts: Arc<AccountManager>,
    pub logs: Arc<LoggingContext>,
}

/// Pin the current thread when affinity is enabled. Priority is advisory on
/// unprivileged Linux, so it is logged rather than applied.
pub fn apply_thread_settings(settings: &ThreadSettings, logs: &LoggingContext) {
    if settings.use_cpu_affinity && settings.cpu_affinity >= 0 {
        match core_affinity::get_core_ids() {
            Some(cores) => {
                let wanted = settings.cpu_affinity as usize;
                match cores.get(wanted) {
                    Some(core) if core_affinity::set_for_current(*core) => {
                        logs.log(&format!("pinned to core {wanted}"));
                    }
                    Some(_) => warn!(core = wanted, "failed to pin thread"),
                    None => warn!(
                        core = wanted,
                        available = cores.len(),
                        "affinity core out of range"
                    ),
                }
            }
            None => warn!("core enumeration unavailable, affinity skipped"),
        }
    }
    if settings.priority != 0 {
        debug!(priority = settings.priority, "requested thread priority (advisory)");
    }
}

/// Run one iteration behind a panic guard so a bug in one cycle does not
/// kill the thread.
fn guarded<F: FnOnce()>(worker: &str, logs: &LoggingContext, iteration: F) {
    if std::panic::catch_unwind(AssertUnwindSafe(iteration)).is_err() {
        error!(worker, "worker iteration panicked");
        logs.log(&format!("{worker} iteration panicked, continuing"));
    }
}

// ============================================================================
// Market data worker
// ============================================================================

pub fn market_worker(ctx: WorkerContext) {
    apply_thread_settings(&ctx.config.threads["market"], &ctx.logs);
    ctx.logs.register_thread("MARKET");
    let manager = MarketDataManager::new(ctx.config.clone());
    let interval = Duration::from_secs(ctx.config.timing.thread_market_poll_interval_sec.max(1));
    let symbol = ctx.config.symbol.clone();

    info!(%symbol, provider = %ctx.api.bars_provider(), "market data worker started");
    while ctx.state.is_running() {
        guarded("market", &ctx.logs, || {
            if !ctx.state.allow_fetch.load(Ordering::SeqCst) {
                return;
            }
            match manager.fetch_and_process(&ctx.api, &ctx.accounts, &symbol) {
                Ok(FetchOutcome::Processed(data)) => {
                    let market = data.market.clone();
                    if let Err(e) = ctx.logs.bars_csv.log_bar(
                        &symbol,
                        &market.current_bar,
                        market.atr,
                        market.avg_atr,
                        market.avg_volume,
                    ) {
                        warn!(error = %e, "bar csv write failed");
                    }
                    ctx.state.publish_market(market);
                }
                Ok(FetchOutcome::Rejected(reason)) => {
                    ctx.logs.log(&format!("bar batch rejected: {reason}"));
                }
                Err(e) => {
                    ctx.logs.log(&format!("market fetch failed: {e}"));
                }
            }
        });
        if !interruptible_sleep(&ctx.state, interval) {
            break;
        }
    }
    info!("market data worker stopped");
}

// ============================================================================
// Account worker
// ============================================================================

pub fn account_worker(ctx: WorkerContext) {
    apply_thread_settings(&ctx.config.threads["account"], &ctx.logs);
    ctx.logs.register_thread("ACCOUNT");
    let interval = Duration::from_secs(ctx.config.timing.thread_account_poll_interval_sec.max(1));

    info!("account worker started");
    while ctx.state.is_running() {
        guarded("account", &ctx.logs, || {
            if !ctx.state.allow_fetch.load(Ordering::SeqCst) {
                return;
            }
            match ctx.accounts.fetch_snapshot(&ctx.api) {
                Ok(snapshot) => {
                    debug!(
                        equity = snapshot.equity,
                        position = snapshot.position.quantity,
                        "account snapshot refreshed"
                    );
                    ctx.state.publish_account(snapshot);
                }
                Err(e) => {
                    let age = ctx.accounts.seconds_since_fetch();
                    ctx.logs.log(&format!(
                        "account fetch failed (cache age {}): {e}",
                        age.map(|s| format!("{s:.0}s")).unwrap_or_else(|| "none".into())
                    ));
                }
            }
        });
        if !interruptible_sleep(&ctx.state, interval) {
            break;
        }
    }
    info!("account worker stopped");
}

// ============================================================================
// Session gate worker
// ============================================================================

pub fn gate_worker(ctx: WorkerContext) {
    apply_thread_settings(&ctx.config.threads["gate"], &ctx.logs);
    ctx.logs.register_thread("GATE");
    let mut gate = SessionGate::new(ctx.config.mode, &ctx.config.timing);
    let interval =
        Duration::from_secs(ctx.config.timing.thread_market_gate_poll_interval_sec.max(1));
    let mut last_allow: Option<bool> = None;

    info!(mode = %ctx.config.mode, "session gate worker started");
    while ctx.state.is_running() {
        guarded("gate", &ctx.logs, || {
            let clock = match ctx.api.get_clock() {
                Ok(clock) => clock,
                Err(e) => {
                    ctx.logs.log(&format!("clock fetch failed: {e}"));
                    None
                }
            };
            let now = Utc::now();
            let decision = gate.evaluate(clock.as_ref(), now);
            ctx.state
                .allow_fetch
                .store(decision.allow_fetch, Ordering::SeqCst);
            ctx.state
                .session_open
                .store(decision.session_open, Ordering::SeqCst);
            ctx.state
                .in_close_grace
                .store(decision.in_close_grace, Ordering::SeqCst);

            if last_allow != Some(decision.allow_fetch) {
                ctx.logs.log(&format!(
                    "session gate at {}: fetch {} (open={}, grace={})",
                    crate::session::exchange_time(now),
                    if decision.allow_fetch { "allowed" } else { "blocked" },
                    decision.session_open,
                    decision.in_close_grace
                ));
                last_allow = Some(decision.allow_fetch);
            }
        });
        if !interruptible_sleep(&ctx.state, interval) {
            break;
        }
    }
    info!("session gate worker stopped");
}

// ============================================================================
// Trader worker
// ============================================================================

pub fn trader_worker(ctx: WorkerContext) {
    apply_thread_settings(&ctx.config.threads["trader"], &ctx.logs);
    ctx.logs.register_thread("TRADER");
    let coordinator = TradeCoordinator::new(ctx.config.clone());
    let interval = ctx.config.timing.thread_trader_poll_interval_sec.max(1) as f64;
    let refresh = ctx.config.timing.countdown_display_refresh_interval_seconds;

    info!("trader worker started");
    while ctx.state.is_running() {
        guarded("trader", &ctx.logs, || {
            coordinator.run_cycle(&ctx.api, &ctx.accounts, &ctx.state, &ctx.logs);
        });
        if !crate::countdown::run_countdown(
            &ctx.state,
            ctx.logs.console(),
            interval,
            refresh,
            "next cycle",
        ) {
            break;
        }
    }
    info!("trader worker stopped");
}

// ============================================================================
// Logger worker
// ============================================================================

pub fn logger_worker(ctx: WorkerContext) {
    apply_thread_settings(&ctx.config.threads["logger"], &ctx.logs);
    ctx.logs.register_thread("LOGGER");
    info!("log drain started");
    if let Err(e) = ctx.logs.run_drain(&ctx.state) {
        error!(error = %e, "log drain failed");
    }
    info!("log drain stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;

    #[test]
    fn guarded_swallows_panics() {
        let config = test_config();
        let logs = LoggingContext::new(&crate::config::LoggingConfig {
            runtime_log_root: std::env::temp_dir()
                .join(format!("bracket-trader-workers-{}", std::process::id()))
                .display()
                .to_string(),
            ..config.logging.clone()
        })
        .unwrap();
        guarded("test", &logs, || panic!("boom"));
        guarded("test", &logs, || {});
        let _ = std::fs::remove_dir_all(logs.run_dir().parent().unwrap());
    }
}
