//! Trading permission gating: daily loss, profit target, exposure, session.

use tracing::warn;

use crate::config::RiskConfig;
use crate::types::ProcessedData;

/// Why trading was denied this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDenial {
    DailyLossLimit { daily_pnl_pct: f64, limit_pct: f64 },
    DailyProfitTarget { daily_pnl_pct: f64, target_pct: f64 },
    ExposureLimit { exposure_pct: f64, limit_pct: f64 },
    SessionClosed,
}

impl std::fmt::Display for RiskDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DailyLossLimit { daily_pnl_pct, limit_pct } => write!(
                f,
                "daily loss limit: pnl {:.2}% <= -{:.2}%",
                daily_pnl_pct, limit_pct
            ),
            Self::DailyProfitTarget { daily_pnl_pct, target_pct } => write!(
                f,
                "daily profit target reached: pnl {:.2}% >= {:.2}%",
                daily_pnl_pct, target_pct
            ),
            Self::ExposureLimit { exposure_pct, limit_pct } => write!(
                f,
                "exposure limit: {:.2}% >= {:.2}%",
                exposure_pct, limit_pct
            ),
            Self::SessionClosed => write!(f, "outside session window"),
        }
    }
}

/// Check whether trading is permitted. `session_open` is the gate worker's
/// buffered session verdict. Returns the first denial encountered.
pub fn validate_trading_permissions(
    data: &ProcessedData,
    equity: f64,
    initial_equity: f64,
    session_open: bool,
    config: &RiskConfig,
) -> Result<(), RiskDenial> {
    if initial_equity > 0.0 {
        let daily_pnl_pct = (equity - initial_equity) / initial_equity * 100.0;

        if daily_pnl_pct <= -config.max_daily_loss_pct {
            warn!(
                "risk: daily pnl {:.2}% breaches loss limit -{:.2}%",
                daily_pnl_pct, config.max_daily_loss_pct
            );
            return Err(RiskDenial::DailyLossLimit {
                daily_pnl_pct,
                limit_pct: config.max_daily_loss_pct,
            });
        }
        if daily_pnl_pct >= config.daily_profit_target_pct {
            return Err(RiskDenial::DailyProfitTarget {
                daily_pnl_pct,
                target_pct: config.daily_profit_target_pct,
            });
        }
    }

    let exposure_pct = data.account.exposure_pct();
    if exposure_pct >= config.max_account_exposure_pct {
        return Err(RiskDenial::ExposureLimit {
            exposure_pct,
            limit_pct: config.max_account_exposure_pct,
        });
    }

    if !session_open {
        return Err(RiskDenial::SessionClosed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_support::test_config;
    use crate::types::{AccountSnapshot, PositionDetails};

    fn data_with_exposure(equity: f64, market_value: f64) -> ProcessedData {
        ProcessedData {
            account: AccountSnapshot {
                equity,
                buying_power: equity,
                position: PositionDetails {
                    quantity: 10,
                    unrealized_pnl: 0.0,
                    market_value,
                },
                open_order_count: 0,
                trading_blocked: false,
            },
            ..Default::default()
        }
    }

    fn risk() -> crate::config::RiskConfig {
        test_config().risk // max_daily_loss_pct 3.0, profit target 100.0, exposure 100.0
    }

    #[test]
    fn allows_normal_conditions() {
        let data = data_with_exposure(100_000.0, 5_000.0);
        assert!(validate_trading_permissions(&data, 100_000.0, 100_000.0, true, &risk()).is_ok());
    }

    #[test]
    fn daily_loss_halts() {
        // -5% against a 3% limit.
        let data = data_with_exposure(95_000.0, 0.0);
        let denial =
            validate_trading_permissions(&data, 95_000.0, 100_000.0, true, &risk()).unwrap_err();
        assert!(matches!(denial, RiskDenial::DailyLossLimit { .. }));
    }

    #[test]
    fn profit_target_halts() {
        let mut config = risk();
        config.daily_profit_target_pct = 2.0;
        let data = data_with_exposure(103_000.0, 0.0);
        let denial =
            validate_trading_permissions(&data, 103_000.0, 100_000.0, true, &config).unwrap_err();
        assert!(matches!(denial, RiskDenial::DailyProfitTarget { .. }));
    }

    #[test]
    fn exposure_limit_halts() {
        let mut config = risk();
        config.max_account_exposure_pct = 10.0;
        let data = data_with_exposure(100_000.0, 15_000.0);
        let denial =
            validate_trading_permissions(&data, 100_000.0, 100_000.0, true, &config).unwrap_err();
        assert!(matches!(denial, RiskDenial::ExposureLimit { .. }));
    }

    #[test]
    fn closed_session_halts() {
        let data = data_with_exposure(100_000.0, 0.0);
        let denial =
            validate_trading_permissions(&data, 100_000.0, 100_000.0, false, &risk()).unwrap_err();
        assert_eq!(denial, RiskDenial::SessionClosed);
    }

    #[test]
    fn boundary_loss_exactly_at_limit_halts() {
        let data = data_with_exposure(97_000.0, 0.0);
        // Exactly -3.0% triggers: the comparison is <=.
        let denial =
            validate_trading_permissions(&data, 97_000.0, 100_000.0, true, &risk()).unwrap_err();
        assert!(matches!(denial, RiskDenial::DailyLossLimit { .. }));
    }
}
