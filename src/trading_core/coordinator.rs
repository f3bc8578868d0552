//! Per-cycle trading decision flow.
//!
//! One call to `run_cycle` walks the full chain for the trader thread:
//! connectivity halt, fresh-data wait, forced close during the grace window,
//! risk permissions, entry filters, signal evaluation, position sizing, exit
//! targets, and finally order submission. Pure decision steps live in
//! `plan_entry` so they can be tested without a broker.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::account::AccountManager;
use crate::api::ApiManager;
use crate::config::Config;
use crate::countdown;
use crate::errors::OrderError;
use crate::logging::LoggingContext;
use crate::state::SharedState;
use crate::trading_core::executor::{OrderExecutor, OrderPlan};
use crate::trading_core::exits::compute_exit_targets;
use crate::trading_core::risk::validate_trading_permissions;
use crate::trading_core::signals::{evaluate_filters, evaluate_signal};
use crate::trading_core::sizing::compute_position_size;
use crate::types::ProcessedData;

// ============================================================================
// Pure decision chain
// ============================================================================

/// Why a cycle produced no order.
#[derive(Debug, Clone, PartialEq)]
pub enum NoEntry {
    FiltersFailed(String),
    NoSignal(String),
    WeakSignal { strength: f64, threshold: f64 },
    ZeroQuantity,
}

/// Run filters, signal and sizing against one processed snapshot.
/// `price` is the live execution price, not the bar close.
pub fn plan_entry(
    data: &ProcessedData,
    price: f64,
    config: &Config,
) -> Result<OrderPlan, NoEntry> {
    let filters = evaluate_filters(data, &config.strategy);
    if !filters.all_pass {
        return Err(NoEntry::FiltersFailed(format!(
            "atr={}({:.2}) vol={}({:.2}) doji={}",
            filters.atr_pass, filters.atr_ratio, filters.vol_pass, filters.vol_ratio,
            filters.doji_pass
        )));
    }

    let signal = evaluate_signal(data, &config.strategy);
    let side = match signal.side() {
        Some(side) => side,
        None => return Err(NoEntry::NoSignal(signal.reason)),
    };
    if signal.signal_strength < config.strategy.minimum_signal_strength_threshold {
        return Err(NoEntry::WeakSignal {
            strength: signal.signal_strength,
            threshold: config.strategy.minimum_signal_strength_threshold,
        });
    }

    let sizing = compute_position_size(data, side, price, &config.risk);
    if sizing.quantity < 1 {
        return Err(NoEntry::ZeroQuantity);
    }

    let targets = compute_exit_targets(side, price, data.market.atr, &config.risk);
    Ok(OrderPlan {
        side,
        quantity: sizing.quantity,
        entry_price: price,
        targets,
    })
}

// ============================================================================
// Coordinator
// ============================================================================

/// Drives the trader thread, one cycle per poll interval.
pub struct TradeCoordinator {
    config: Arc<Config>,
    executor: OrderExecutor,
}

impl TradeCoordinator {
    pub fn new(config: Arc<Config>) -> Self {
        let executor = OrderExecutor::new(config.clone());
        Self { config, executor }
    }

    /// One trader cycle. Errors never escape; every failure path logs and
    /// lets the next cycle try again.
    pub fn run_cycle(
        &self,
        api: &ApiManager,
        accounts: &AccountManager,
        state: &SharedState,
        logs: &LoggingContext,
    ) {
        let symbol = &self.config.symbol;

        if !api.connectivity().is_healthy() {
            logs.log(&format!(
                "connectivity {} ({} consecutive failures), trading halted",
                api.connectivity().status_string(),
                api.connectivity().consecutive_failures()
            ));
            self.halt(state, logs, "connectivity degraded");
            return;
        }

        if state.in_close_grace.load(std::sync::atomic::Ordering::SeqCst) {
            self.force_close(api, accounts, logs);
            return;
        }

        if !state.allow_fetch.load(std::sync::atomic::Ordering::SeqCst) {
            debug!("market session closed, trader idle");
            return;
        }

        let wait = Duration::from_secs(self.config.timing.thread_trader_poll_interval_sec.max(1));
        if !state.wait_for_fresh_data(wait) {
            debug!("no fresh snapshot pair within the wait window");
            return;
        }
        if !state.is_market_data_fresh(self.config.staleness_threshold_seconds()) {
            logs.log("market data stale, skipping cycle");
            return;
        }
        let (market, account) = match state.snapshot_pair() {
            Some(pair) => pair,
            None => return,
        };
        let data = ProcessedData { market, account };
        if let Err(e) = logs.trade_events_csv.log_account(symbol, &data.account) {
            warn!(error = %e, "account csv write failed");
        }

        let session_open = state.session_open.load(std::sync::atomic::Ordering::SeqCst);
        let initial_equity = accounts.initial_equity().unwrap_or(data.account.equity);
        if let Err(denial) = validate_trading_permissions(
            &data,
            data.account.equity,
            initial_equity,
            session_open,
            &self.config.risk,
        ) {
            logs.log(&format!("trading blocked: {denial}"));
            let _ = logs.trade_events_csv.log_event(
                symbol,
                "RISK_BLOCKED",
                &[format!("{:.2}", data.account.equity)],
                &denial.to_string(),
            );
            return;
        }

        let price = match api.get_current_price(symbol) {
            Ok(price) if price > 0.0 => price,
            Ok(_) | Err(_) => {
                debug!("live price unavailable, using last bar close");
                data.market.current_bar.close
            }
        };

        let plan = match plan_entry(&data, price, &self.config) {
            Ok(plan) => plan,
            Err(NoEntry::FiltersFailed(detail)) => {
                debug!(%detail, "entry filters failed");
                return;
            }
            Err(NoEntry::NoSignal(reason)) => {
                debug!(%reason, "no entry signal");
                return;
            }
            Err(NoEntry::WeakSignal { strength, threshold }) => {
                debug!(strength, threshold, "signal below strength threshold");
                return;
            }
            Err(NoEntry::ZeroQuantity) => {
                logs.log("signal fired but position size computed to zero shares");
                return;
            }
        };

        logs.log(&format!(
            "{} signal: {} x{} @ {:.2} (stop {:.2}, target {:.2})",
            symbol,
            plan.side,
            plan.quantity,
            plan.entry_price,
            plan.targets.stop_loss,
            plan.targets.take_profit
        ));

        match self
            .executor
            .execute_entry(api, accounts, state, &data.account, &plan)
        {
            Ok(order) => {
                logs.log(&format!(
                    "order {} accepted with status {}",
                    order.id, order.status
                ));
                let _ = logs.trade_events_csv.log_event(
                    symbol,
                    "ORDER_SUBMITTED",
                    &[
                        plan.side.to_string(),
                        plan.quantity.to_string(),
                        format!("{:.2}", plan.entry_price),
                        format!("{:.2}", plan.targets.stop_loss),
                        format!("{:.2}", plan.targets.take_profit),
                    ],
                    &order.id,
                );
            }
            Err(e) => {
                logs.log(&format!("order rejected: {e}"));
                let _ = logs.trade_events_csv.log_event(
                    symbol,
                    e.event_tag(),
                    &[plan.side.to_string(), plan.quantity.to_string()],
                    &e.to_string(),
                );
                if matches!(e, OrderError::NetworkError(_) | OrderError::ClosureFailed(_)) {
                    self.halt(state, logs, &e.to_string());
                }
            }
        }
    }

    /// Flatten everything during the close grace window.
    fn force_close(&self, api: &ApiManager, accounts: &AccountManager, logs: &LoggingContext) {
        match self.executor.close_all_positions(api, accounts) {
            Ok(()) => {
                logs.log("close grace window: all positions flat");
                let _ = logs.trade_events_csv.log_event(
                    &self.config.symbol,
                    "FORCED_CLOSE",
                    &[],
                    "session close grace window",
                );
            }
            Err(e) => {
                warn!(error = %e, "forced close failed");
                logs.log(&format!("forced close failed: {e}"));
            }
        }
    }

    /// Pause the trader for the emergency halt duration with a countdown.
    fn halt(&self, state: &SharedState, logs: &LoggingContext, reason: &str) {
        let minutes = self.config.timing.emergency_trading_halt_duration_minutes;
        logs.log(&format!("trading halted for {minutes}m: {reason}"));
        let _ = logs.trade_events_csv.log_event(
            &self.config.symbol,
            "TRADING_HALT",
            &[format!("{minutes}")],
            reason,
        );
        countdown::run_countdown(
            state,
            logs.console(),
            (minutes * 60) as f64,
            self.config.timing.countdown_display_refresh_interval_seconds,
            "trading halt",
        );
    }
}
