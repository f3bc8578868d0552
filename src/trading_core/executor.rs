//! Order execution state machine.
//!
//! An entry moves through validation, optional flattening of an opposite
//! position, and bracket submission. Every order carries a generated client
//! order id, and the shared state records the submission instant so the wash
//! trade check applies across the whole process.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::AccountManager;
use crate::alpaca::models::{
    order_to_json, format_price, AlpacaOrder, PlaceOrderRequest, StopLossSpec, TakeProfitSpec,
};
use crate::api::ApiManager;
use crate::config::{Config, RiskConfig};
use crate::errors::{OrderError, ProviderError};
use crate::state::SharedState;
use crate::types::{AccountSnapshot, ExitTargets, PositionDetails, Side, TradingMode};

// ============================================================================
// Order plan
// ============================================================================

/// Everything the executor needs to place one bracket entry.
#[derive(Debug, Clone)]
pub struct OrderPlan {
    pub side: Side,
    pub quantity: i64,
    pub entry_price: f64,
    pub targets: ExitTargets,
}

// ============================================================================
// Validation
// ============================================================================

/// Pre-submission constraint checks, free of any I/O so they can be tested
/// in isolation.
pub fn check_order_constraints(
    plan: &OrderPlan,
    account: &AccountSnapshot,
    current_layers: u32,
    seconds_since_last_order: Option<i64>,
    risk: &RiskConfig,
) -> Result<(), OrderError> {
    if plan.quantity < 1 {
        return Err(OrderError::BrokerRejected(
            "computed quantity below one share".to_string(),
        ));
    }

    if account.trading_blocked {
        return Err(OrderError::BrokerRejected(
            "account is blocked from trading".to_string(),
        ));
    }

    let required = plan.quantity as f64
        * plan.entry_price
        * risk.buying_power_validation_safety_margin;
    if required > account.buying_power {
        return Err(OrderError::InsufficientBuyingPower {
            required,
            available: account.buying_power,
        });
    }

    // Layer cap only applies when adding to an existing same-direction
    // position. Reversals flatten first and start at layer one.
    let same_direction = match plan.side {
        Side::Buy => account.position.is_long(),
        Side::Sell => account.position.is_short(),
    };
    if same_direction && current_layers >= risk.maximum_position_layers {
        return Err(OrderError::PositionLimitReached {
            layers: current_layers,
            max_layers: risk.maximum_position_layers,
        });
    }

    if risk.enable_wash_trade_prevention {
        if let Some(elapsed) = seconds_since_last_order {
            if elapsed < risk.minimum_interval_between_orders_seconds {
                return Err(OrderError::WashTradePrevented {
                    elapsed,
                    minimum: risk.minimum_interval_between_orders_seconds,
                });
            }
        }
    }

    Ok(())
}

// ============================================================================
// Executor
// ============================================================================

/// Submits bracket orders and manages position transitions for one symbol.
pub struct OrderExecutor {
    config: Arc<Config>,
    /// Same-direction entries since the position was last flat.
    layers: AtomicU32,
}

impl OrderExecutor {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            layers: AtomicU32::new(0),
        }
    }

    pub fn current_layers(&self) -> u32 {
        self.layers.load(Ordering::Relaxed)
    }

    /// Run the full entry flow: validate, flatten an opposite position if
    /// present, submit the bracket, record the submission time.
    pub fn execute_entry(
        &self,
        api: &ApiManager,
        accounts: &AccountManager,
        state: &SharedState,
        account: &AccountSnapshot,
        plan: &OrderPlan,
    ) -> Result<AlpacaOrder, OrderError> {
        check_order_constraints(
            plan,
            account,
            self.current_layers(),
            state.seconds_since_last_order(),
            &self.config.risk,
        )?;

        let reversal = match plan.side {
            Side::Buy => account.position.is_short(),
            Side::Sell => account.position.is_long(),
        };
        if reversal {
            info!(
                symbol = %self.config.symbol,
                qty = account.position.quantity,
                "closing opposite position before reversal entry"
            );
            self.flatten(api, accounts, &account.position)?;
        }

        let order = self.submit_bracket(api, plan)?;
        state.record_order_submitted();

        if account.position.is_flat() || reversal {
            self.layers.store(1, Ordering::Relaxed);
        } else {
            self.layers.fetch_add(1, Ordering::Relaxed);
        }

        info!(
            order_id = %order.id,
            status = %order.status,
            side = %plan.side,
            qty = plan.quantity,
            "bracket order submitted"
        );
        Ok(order)
    }

    /// Close whatever position exists, for the end-of-session grace window
    /// and emergency shutdown. A flat position is a no-op success.
    pub fn close_all_positions(
        &self,
        api: &ApiManager,
        accounts: &AccountManager,
    ) -> Result<(), OrderError> {
        let position = accounts.refresh_position(api)?;
        if position.is_flat() {
            debug!("close-all requested with no open position");
            return Ok(());
        }
        self.flatten(api, accounts, &position)
    }

    fn flatten(
        &self,
        api: &ApiManager,
        accounts: &AccountManager,
        position: &PositionDetails,
    ) -> Result<(), OrderError> {
        // Cancel resting brackets first so the close is not rejected for
        // held shares.
        match api.get_open_orders() {
            Ok(orders) => {
                for order in orders {
                    if order.symbol == self.config.symbol {
                        if let Err(e) = api.cancel_order(&order.id) {
                            warn!(order_id = %order.id, error = %e, "cancel before flatten failed");
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not list open orders before flatten"),
        }

        self.flatten_with(
            position,
            |qty| api.close_position(&self.config.symbol, qty),
            || accounts.refresh_position(api),
        )
    }

    /// Close-and-settle sequence with the broker calls injected, so the
    /// transition logic can be tested without a live endpoint.
    fn flatten_with<C, P>(
        &self,
        position: &PositionDetails,
        close: C,
        poll: P,
    ) -> Result<(), OrderError>
    where
        C: FnOnce(i64) -> Result<(), ProviderError>,
        P: FnMut() -> Result<PositionDetails, ProviderError>,
    {
        close(position.quantity.abs())?;
        self.verify_settlement(poll)?;
        self.layers.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Poll the position until the broker reports flat, within the
    /// configured settlement window.
    fn verify_settlement<P>(&self, mut poll: P) -> Result<(), OrderError>
    where
        P: FnMut() -> Result<PositionDetails, ProviderError>,
    {
        let timing = &self.config.timing;
        let attempts = timing.maximum_position_verification_attempts.max(1);
        let deadline = Instant::now()
            + Duration::from_millis(timing.position_settlement_timeout_milliseconds);
        let pause = Duration::from_millis(
            timing.position_settlement_timeout_milliseconds / attempts as u64,
        );

        for attempt in 1..=attempts {
            match poll() {
                Ok(position) if position.is_flat() => {
                    debug!(attempt, "position settled flat");
                    return Ok(());
                }
                Ok(position) => {
                    debug!(attempt, qty = position.quantity, "position not yet settled");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "settlement check failed");
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(pause);
        }
        Err(OrderError::ClosureFailed(format!(
            "position still open after {attempts} verification attempts"
        )))
    }

    fn submit_bracket(
        &self,
        api: &ApiManager,
        plan: &OrderPlan,
    ) -> Result<AlpacaOrder, OrderError> {
        let time_in_force = match self.config.mode {
            TradingMode::Stocks => "day",
            TradingMode::Crypto => "gtc",
        };
        let request = PlaceOrderRequest {
            symbol: self.config.symbol.clone(),
            qty: plan.quantity.to_string(),
            side: match plan.side {
                Side::Buy => "buy".to_string(),
                Side::Sell => "sell".to_string(),
            },
            order_type: "market".to_string(),
            time_in_force: time_in_force.to_string(),
            order_class: Some("bracket".to_string()),
            take_profit: Some(TakeProfitSpec {
                limit_price: format_price(plan.targets.take_profit),
            }),
            stop_loss: Some(StopLossSpec {
                stop_price: format_price(plan.targets.stop_loss),
            }),
            client_order_id: Some(Uuid::new_v4().to_string()),
        };

        match api.place_order(&order_to_json(&request)) {
            Ok(order) => Ok(order),
            Err(ProviderError::BadRequest(msg)) => Err(OrderError::BrokerRejected(msg)),
            Err(ProviderError::Auth(msg)) => Err(OrderError::BrokerRejected(msg)),
            Err(e) => Err(OrderError::NetworkError(e)),
        }
    }
}
